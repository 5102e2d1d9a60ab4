#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use caucus_core::{
    AttendanceEntry, AttendanceEntryType, AttendanceSession, CommitteeId, CommitteeSnapshot,
    CommitteeUpdate, Delegation, DelegationId, PollState, Procedure, ReconnectPolicy,
    SessionEvent, SessionStatus,
};
use caucus_session::{ApiError, ChannelError, ChannelHandler, ResourceApi, SessionConfig};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

pub const COMMITTEE: CommitteeId = CommitteeId(4);

// ─── Session server ───────────────────────────────────────────────

/// Which of a committee's sockets a connection opened, by request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Session,
    Attendance,
}

impl Route {
    fn of(path: &str) -> Self {
        if path.starts_with("/attendance/") {
            Self::Attendance
        } else {
            Self::Session
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Session => 0,
            Self::Attendance => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Push {
    Text(Route, String),
    DropAll,
}

#[derive(Default)]
struct Counts {
    accepted: [AtomicUsize; 2],
    live: [AtomicUsize; 2],
    heartbeats: AtomicUsize,
}

/// Local session server: pushes frames to the connections of one route,
/// counts heartbeats, and can sever all connections without a close
/// handshake.
pub struct TestServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    push: broadcast::Sender<Push>,
    counts: Arc<Counts>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push, _) = broadcast::channel(64);
        let server = Self {
            addr,
            cancel: CancellationToken::new(),
            push,
            counts: Arc::new(Counts::default()),
        };

        let cancel = server.cancel.clone();
        let push = server.push.clone();
        let counts = Arc::clone(&server.counts);
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = cancel.cancelled() => return,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => return,
                    },
                };
                let conn = Connection {
                    pushes: push.subscribe(),
                    counts: Arc::clone(&counts),
                    cancel: cancel.clone(),
                };
                tokio::spawn(conn.serve(stream));
            }
        });

        server
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn pusher(&self) -> broadcast::Sender<Push> {
        self.push.clone()
    }

    /// Push a frame to the session feed.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.push.send(Push::Text(Route::Session, text.into()));
    }

    pub fn push_attendance(&self, text: impl Into<String>) {
        let _ = self.push.send(Push::Text(Route::Attendance, text.into()));
    }

    pub fn drop_connections(&self) {
        let _ = self.push.send(Push::DropAll);
    }

    pub fn accepted(&self) -> usize {
        self.accepted_on(Route::Session)
    }

    pub fn live(&self) -> usize {
        self.live_on(Route::Session)
    }

    pub fn accepted_on(&self, route: Route) -> usize {
        self.counts.accepted[route.index()].load(Ordering::SeqCst)
    }

    pub fn live_on(&self, route: Route) -> usize {
        self.counts.live[route.index()].load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> usize {
        self.counts.heartbeats.load(Ordering::SeqCst)
    }

    /// Wait until `n` session connections were accepted in total and one
    /// is live.
    pub async fn wait_for_connections(&self, n: usize) {
        wait_until(|| self.accepted() >= n && self.live() >= 1).await;
    }

    /// Same, for both the session and the attendance route.
    pub async fn wait_for_feeds(&self, n: usize) {
        wait_until(|| {
            [Route::Session, Route::Attendance]
                .into_iter()
                .all(|route| self.accepted_on(route) >= n && self.live_on(route) >= 1)
        })
        .await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Connection {
    pushes: broadcast::Receiver<Push>,
    counts: Arc<Counts>,
    cancel: CancellationToken,
}

impl Connection {
    async fn serve(mut self, stream: TcpStream) {
        let mut path = String::new();
        let record_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            path = request.uri().path().to_owned();
            Ok(response)
        };
        let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, record_path).await else {
            return;
        };
        let route = Route::of(&path);
        let (mut ws_tx, mut ws_rx) = ws.split();
        self.counts.live[route.index()].fetch_add(1, Ordering::SeqCst);
        self.counts.accepted[route.index()].fetch_add(1, Ordering::SeqCst);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                push = self.pushes.recv() => match push {
                    Ok(Push::Text(to, text)) if to == route => {
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Push::Text(..)) => {}
                    Ok(Push::DropAll) | Err(_) => break,
                },
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Text(text))) if text == "heartbeat" => {
                        self.counts.heartbeats.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }

        self.counts.live[route.index()].fetch_sub(1, Ordering::SeqCst);
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

pub fn test_config(server: &TestServer) -> SessionConfig {
    SessionConfig {
        api_base_url: "http://127.0.0.1:9".into(),
        ws_base_url: server.ws_url(),
        heartbeat_interval_ms: 50,
        mutation_timeout_ms: 2_000,
        first_event_grace_ms: 100,
        reconnect: ReconnectPolicy {
            initial_backoff_ms: 20,
            multiplier: 2.0,
            max_backoff_ms: 200,
            jitter_pct: 0.0,
        },
    }
}

// ─── Channel handler ──────────────────────────────────────────────

pub type Recorded = Result<SessionEvent, String>;

/// Forwards everything the channel delivers into an mpsc queue.
pub struct Recorder(pub mpsc::UnboundedSender<Recorded>);

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Recorded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl ChannelHandler for Recorder {
    fn on_event(&mut self, event: SessionEvent) {
        let _ = self.0.send(Ok(event));
    }

    fn on_error(&mut self, error: &ChannelError) {
        let _ = self.0.send(Err(error.to_string()));
    }
}

/// Next delivered event, skipping reported errors.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Recorded>) -> SessionEvent {
    loop {
        let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for session event")
            .expect("handler dropped");
        if let Ok(event) = item {
            return event;
        }
    }
}

// ─── Resource API fake ────────────────────────────────────────────

pub fn delegation(id: u32, name: &str) -> Delegation {
    Delegation {
        delegation_id: DelegationId(id),
        delegation_name: name.into(),
        committees: vec![COMMITTEE],
    }
}

pub fn committee() -> CommitteeSnapshot {
    CommitteeSnapshot {
        committee_id: COMMITTEE,
        committee_name: "Security Council".into(),
        committee_abbreviation: "UNSC".into(),
        committee_description: "Maintains international peace.".into(),
        committee_announcement: "Resolution draft due at noon.".into(),
        status: SessionStatus::InSession,
        procedure: Procedure::None,
        speaker_list_open: true,
        delegations: vec![delegation(1, "France"), delegation(2, "Ghana")],
        working_papers: Vec::new(),
        poll: PollState::default(),
    }
}

pub fn attendance_json(session_id: u32, committee_id: u32, live: bool, entries: &[(u32, u8)]) -> String {
    let entries: Vec<serde_json::Value> = entries
        .iter()
        .enumerate()
        .map(|(i, (delegation, entry))| {
            serde_json::json!({
                "attendance_entry_id": i + 1,
                "attendance_session_id": session_id,
                "delegation_id": delegation,
                "timestamp": "2024-03-01T09:00:10",
                "entry": entry,
            })
        })
        .collect();
    serde_json::json!({
        "attendance_session_id": session_id,
        "committee_id": committee_id,
        "live": live,
        "open_time": "2024-03-01T09:00:00",
        "close_time": if live { serde_json::Value::Null } else { "2024-03-01T09:05:00".into() },
        "entries": entries,
    })
    .to_string()
}

/// In-memory resource API. When an echo server is attached, accepted
/// mutations are broadcast back the way the real server does.
#[derive(Default)]
pub struct FakeApi {
    pub committee: Mutex<Option<CommitteeSnapshot>>,
    pub attendance: Mutex<Option<AttendanceSession>>,
    pub fail_committee: AtomicBool,
    pub fetch_delay: Mutex<Duration>,
    pub echo: Mutex<Option<broadcast::Sender<Push>>>,
    pub updates: Mutex<Vec<CommitteeUpdate>>,
    pub submissions: Mutex<Vec<(DelegationId, AttendanceEntryType)>>,
    pub rosters: Mutex<Vec<Vec<DelegationId>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        let api = Self::default();
        *api.committee.lock().unwrap() = Some(committee());
        api
    }

    pub fn echo_to(self, server: &TestServer) -> Self {
        *self.echo.lock().unwrap() = Some(server.pusher());
        self
    }

    fn broadcast(&self, route: Route, text: String) {
        if let Some(push) = self.echo.lock().unwrap().as_ref() {
            let _ = push.send(Push::Text(route, text));
        }
    }
}

/// Every delegation the fake knows about, members or not.
pub fn catalog() -> Vec<Delegation> {
    let mut all = committee().delegations;
    all.push(Delegation {
        delegation_id: DelegationId(3),
        delegation_name: "Kenya".into(),
        committees: Vec::new(),
    });
    all
}

impl ResourceApi for FakeApi {
    fn fetch_committee(
        &self,
        _committee_id: CommitteeId,
    ) -> impl Future<Output = Result<CommitteeSnapshot, ApiError>> + Send {
        async move {
            let delay = *self.fetch_delay.lock().unwrap();
            tokio::time::sleep(delay).await;
            if self.fail_committee.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    url: "fake://committees/4".into(),
                    status: 503,
                });
            }
            let committee = self.committee.lock().unwrap().clone();
            committee.ok_or(ApiError::Status {
                url: "fake://committees/4".into(),
                status: 404,
            })
        }
    }

    fn fetch_attendance(
        &self,
        _committee_id: CommitteeId,
    ) -> impl Future<Output = Result<Option<AttendanceSession>, ApiError>> + Send {
        async move { Ok(self.attendance.lock().unwrap().clone()) }
    }

    fn update_committee(
        &self,
        update: CommitteeUpdate,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        async move {
            let code = update.committee_poll.code();
            self.updates.lock().unwrap().push(update);
            self.broadcast(Route::Session, code.to_string());
            Ok(())
        }
    }

    fn submit_attendance(
        &self,
        committee_id: CommitteeId,
        delegation_id: DelegationId,
        entry: AttendanceEntryType,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        async move {
            self.submissions.lock().unwrap().push((delegation_id, entry));
            let roll = {
                let mut attendance = self.attendance.lock().unwrap();
                let session = attendance.get_or_insert_with(|| AttendanceSession {
                    attendance_session_id: 1,
                    committee_id,
                    live: true,
                    open_time: None,
                    close_time: None,
                    entries: Vec::new(),
                });
                let next_id = session.entries.len() as u32 + 1;
                session.entries.push(AttendanceEntry {
                    attendance_entry_id: next_id,
                    attendance_session_id: session.attendance_session_id,
                    delegation_id,
                    timestamp: None,
                    entry,
                });
                serde_json::to_string(session).unwrap()
            };
            // The real server answers on the attendance socket only.
            self.broadcast(Route::Attendance, roll);
            Ok(())
        }
    }

    fn update_participants(
        &self,
        _committee_id: CommitteeId,
        delegations: Vec<DelegationId>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        async move {
            if let Some(committee) = self.committee.lock().unwrap().as_mut() {
                committee.delegations = catalog()
                    .into_iter()
                    .filter(|d| delegations.contains(&d.delegation_id))
                    .collect();
            }
            self.rosters.lock().unwrap().push(delegations);
            Ok(())
        }
    }

    fn list_delegations(&self) -> impl Future<Output = Result<Vec<Delegation>, ApiError>> + Send {
        async move { Ok(catalog()) }
    }
}
