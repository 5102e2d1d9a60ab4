//! Session channel: one persistent WebSocket subscription per viewed
//! committee and feed.
//!
//! The channel reconnects on its own with capped exponential backoff and
//! sends a heartbeat while open. After [`SessionChannel::close`] returns
//! the handler is never invoked again, even if a frame was already in
//! flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use caucus_core::{
    ChannelState, CommitteeId, DecodeError, HEARTBEAT_TOKEN, ReconnectBackoff, ReconnectPolicy,
    SessionEvent, decode_frame, jittered_ms,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{Feed, SessionConfig};
use crate::error::ChannelError;
use crate::{lock, try_lock};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Receives decoded session events. Called from the channel's task, one
/// call at a time, in arrival order.
pub trait ChannelHandler: Send + 'static {
    fn on_event(&mut self, event: SessionEvent);

    /// Transport or decode failure. The channel keeps running.
    fn on_error(&mut self, error: &ChannelError) {
        let _ = error;
    }
}

struct Shared {
    committee_id: CommitteeId,
    feed: Feed,
    handler: Mutex<Option<Box<dyn ChannelHandler>>>,
    closed: AtomicBool,
    state: watch::Sender<ChannelState>,
}

impl Shared {
    /// Move to `next` unless already closed. Returns whether it changed.
    fn transition(&self, next: ChannelState) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            trace!(committee_id = %self.committee_id, feed = %self.feed, from = %state, to = %next, "channel state");
            *state = next;
            true
        })
    }

    fn deliver(&self, event: SessionEvent) {
        let mut handler = lock(&self.handler);
        if self.closed.load(Ordering::Acquire) {
            trace!(kind = event.kind(), "dropping event received after close");
            return;
        }
        if let Some(handler) = handler.as_mut() {
            handler.on_event(event);
        }
    }

    fn report(&self, error: &ChannelError) {
        let mut handler = lock(&self.handler);
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(handler) = handler.as_mut() {
            handler.on_error(error);
        }
    }

    fn shut(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.send_replace(ChannelState::Closed);
        // Deliveries re-check `closed` under the handler lock. If one holds
        // it right now (possibly this very call, from inside a handler) the
        // task releases the handler on its way out instead.
        if let Some(mut handler) = try_lock(&self.handler) {
            handler.take();
        }
    }

    fn release_handler(&self) {
        lock(&self.handler).take();
    }
}

/// Handle to a running session channel. Dropping it closes the channel.
pub struct SessionChannel {
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl SessionChannel {
    /// Start connecting to the committee's session feed. Must be called
    /// from within a tokio runtime.
    pub fn open(
        config: &SessionConfig,
        committee_id: CommitteeId,
        handler: impl ChannelHandler,
    ) -> Self {
        Self::open_feed(config, Feed::Session, committee_id, handler)
    }

    pub fn open_feed(
        config: &SessionConfig,
        feed: Feed,
        committee_id: CommitteeId,
        handler: impl ChannelHandler,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Connecting);
        let shared = Arc::new(Shared {
            committee_id,
            feed,
            handler: Mutex::new(Some(Box::new(handler))),
            closed: AtomicBool::new(false),
            state,
        });
        let cancel = CancellationToken::new();

        let task = ChannelTask {
            shared: Arc::clone(&shared),
            url: config.feed_url(feed, committee_id),
            heartbeat_every: config.heartbeat_interval(),
            policy: config.reconnect.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Self { shared, cancel }
    }

    pub fn committee_id(&self) -> CommitteeId {
        self.shared.committee_id
    }

    pub fn feed(&self) -> Feed {
        self.shared.feed
    }

    /// Replace the event handler. Ignored once the channel is closed.
    pub fn on_event(&self, handler: impl ChannelHandler) {
        let mut slot = lock(&self.shared.handler);
        if !self.shared.closed.load(Ordering::Acquire) {
            *slot = Some(Box::new(handler));
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Observe connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Tear the channel down. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
        self.shared.shut();
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ─── Connection task ──────────────────────────────────────────────

enum Ended {
    Cancelled,
    ClosedByPeer,
}

struct ChannelTask {
    shared: Arc<Shared>,
    url: String,
    heartbeat_every: Duration,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
}

impl ChannelTask {
    async fn run(self) {
        let committee_id = self.shared.committee_id;
        let feed = self.shared.feed;
        let jitter_pct = self.policy.jitter_pct;
        let mut backoff = ReconnectBackoff::new(self.policy.clone());
        // One timer for the life of the subscription. It is only polled
        // while a connection is open, so ticks during an outage are skipped.
        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + self.heartbeat_every, self.heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
            };

            match connected {
                Ok((ws, _)) => {
                    backoff.reset();
                    self.shared.transition(ChannelState::Open);
                    info!(%committee_id, %feed, url = %self.url, "session channel open");
                    match self.pump(ws, &mut heartbeat).await {
                        Ok(Ended::Cancelled) => break,
                        Ok(Ended::ClosedByPeer) => {
                            info!(%committee_id, %feed, "session channel closed by server");
                            self.shared.report(&ChannelError::ClosedByPeer);
                        }
                        Err(e) => {
                            warn!(%committee_id, %feed, error = %e, "session channel dropped");
                            self.shared.report(&e);
                        }
                    }
                }
                Err(source) => {
                    let e = ChannelError::Connect {
                        url: self.url.clone(),
                        source: Box::new(source),
                    };
                    warn!(%committee_id, %feed, error = %e, "session channel connect failed");
                    self.shared.report(&e);
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
            self.shared.transition(ChannelState::Reconnecting);
            let delay_ms = jittered_ms(backoff.next_delay_ms(), jitter_pct, rand::random::<f64>());
            debug!(%committee_id, %feed, attempt = backoff.attempt(), delay_ms, "session channel backing off");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
        }

        self.shared.shut();
        self.shared.release_handler();
        debug!(%committee_id, %feed, "session channel task finished");
    }

    /// Drive one open connection until it ends.
    async fn pump(&self, ws: WsStream, heartbeat: &mut Interval) -> Result<Ended, ChannelError> {
        let (mut ws_tx, mut ws_rx) = ws.split();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(Ended::Cancelled);
                }

                msg = ws_rx.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => return Err(ChannelError::Dropped(Box::new(e))),
                        None => return Ok(Ended::ClosedByPeer),
                    };
                    match msg {
                        Message::Text(text) => self.on_frame(&text),
                        Message::Binary(bytes) => match String::from_utf8(bytes) {
                            Ok(text) => self.on_frame(&text),
                            Err(_) => self.shared.report(&ChannelError::MalformedFrame(
                                DecodeError::UnsupportedShape("non-UTF-8 binary frame".into()),
                            )),
                        },
                        Message::Ping(data) => {
                            if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                                return Err(ChannelError::Dropped(Box::new(e)));
                            }
                        }
                        Message::Close(_) => return Ok(Ended::ClosedByPeer),
                        _ => {}
                    }
                }

                _ = heartbeat.tick() => {
                    // A failed send is not an error; the read side reports
                    // the drop.
                    if let Err(e) = ws_tx.send(Message::Text(HEARTBEAT_TOKEN.to_owned())).await {
                        debug!(error = %e, "heartbeat not sent");
                    }
                }
            }
        }
    }

    fn on_frame(&self, text: &str) {
        match decode_frame(text) {
            Ok(event) => {
                trace!(committee_id = %self.shared.committee_id, kind = event.kind(), "session event");
                self.shared.deliver(event);
            }
            Err(e) => {
                warn!(committee_id = %self.shared.committee_id, error = %e, "discarding malformed session frame");
                self.shared.report(&ChannelError::MalformedFrame(e));
            }
        }
    }
}
