//! Committee session store: the client's single source of truth for one
//! committee.
//!
//! Fetches the initial snapshot over the resource API, patches it from the
//! broadcasts of both committee feeds, and fans changes out to subscribers.
//! Mutations are intents: the store sends them and resolves once the
//! matching broadcast has been applied, never by writing local state
//! directly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use caucus_core::{
    AttendanceEntryType, AttendanceStatus, ChannelState, CommitteeId, CommitteeSnapshot,
    CommitteeUpdate, DelegationId, Procedure, SessionEvent, apply_event,
};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, trace, warn};

use crate::api::ResourceApi;
use crate::channel::{ChannelHandler, SessionChannel};
use crate::config::{Feed, SessionConfig};
use crate::error::{ApiError, ChannelError, StoreError};
use crate::lock;

/// Subscriber callback. Invoked with the latest snapshot after every
/// applied change, in subscription order.
pub type Listener = Arc<dyn Fn(&CommitteeSnapshot) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What a reader sees: nothing until the initial load has settled.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotState {
    Loading,
    Ready(Arc<CommitteeSnapshot>),
}

impl SnapshotState {
    pub fn ready(&self) -> Option<&Arc<CommitteeSnapshot>> {
        match self {
            Self::Ready(snapshot) => Some(snapshot),
            Self::Loading => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

type ConfirmFn = Box<dyn Fn(&SessionEvent) -> bool + Send>;

struct Confirmation {
    id: u64,
    matches: ConfirmFn,
    done: oneshot::Sender<()>,
}

#[derive(Default)]
struct Phase {
    /// Bumped when an unfinished load is rolled back; feeds opened by that
    /// load are ignored from then on.
    generation: u64,
    snapshot: Option<Arc<CommitteeSnapshot>>,
    /// Events that arrived before the initial fetch completed.
    backlog: Vec<SessionEvent>,
    ready: bool,
}

#[derive(Clone)]
struct Links {
    session: watch::Receiver<ChannelState>,
    attendance: watch::Receiver<ChannelState>,
}

impl Links {
    fn get(&self, feed: Feed) -> &watch::Receiver<ChannelState> {
        match feed {
            Feed::Session => &self.session,
            Feed::Attendance => &self.attendance,
        }
    }
}

// ─── Shared state ─────────────────────────────────────────────────

struct StoreInner {
    committee_id: CommitteeId,
    phase: Mutex<Phase>,
    /// Held across apply-and-publish so subscribers see changes in order.
    publishing: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Listener)>>,
    confirmations: Mutex<Vec<Confirmation>>,
    next_id: AtomicU64,
    first_event: watch::Sender<bool>,
    connection: Mutex<Option<Links>>,
    closed: AtomicBool,
}

impl StoreInner {
    fn new(committee_id: CommitteeId) -> Self {
        Self {
            committee_id,
            phase: Mutex::new(Phase::default()),
            publishing: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            confirmations: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            first_event: watch::channel(false).0,
            connection: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn current(&self) -> SnapshotState {
        let phase = lock(&self.phase);
        match (&phase.snapshot, phase.ready) {
            (Some(snapshot), true) => SnapshotState::Ready(Arc::clone(snapshot)),
            _ => SnapshotState::Loading,
        }
    }

    fn generation(&self) -> u64 {
        lock(&self.phase).generation
    }

    fn ingest(&self, generation: u64, event: SessionEvent) {
        if self.is_closed() {
            return;
        }
        let _ordered = lock(&self.publishing);
        let published = {
            let mut guard = lock(&self.phase);
            let phase = &mut *guard;
            if phase.generation != generation {
                trace!(committee_id = %self.committee_id, kind = event.kind(), "dropping event from an abandoned load");
                return;
            }
            match phase.snapshot.as_mut() {
                None => {
                    debug!(committee_id = %self.committee_id, kind = event.kind(), "buffering event until snapshot is fetched");
                    phase.backlog.push(event.clone());
                    None
                }
                Some(snapshot) => {
                    let applied = apply_event(Arc::make_mut(snapshot), &event);
                    if !applied.changed() {
                        debug!(committee_id = %self.committee_id, kind = event.kind(), "ignoring session event");
                        None
                    } else if phase.ready {
                        Some(Arc::clone(snapshot))
                    } else {
                        None
                    }
                }
            }
        };

        self.first_event.send_if_modified(|seen| !std::mem::replace(seen, true));

        if let Some(snapshot) = published {
            self.publish(&snapshot);
            self.settle(&event);
        }
    }

    /// Install the fetched snapshot and replay anything that raced it.
    fn install(&self, mut snapshot: CommitteeSnapshot) {
        let mut phase = lock(&self.phase);
        for event in phase.backlog.drain(..) {
            apply_event(&mut snapshot, &event);
        }
        phase.snapshot = Some(Arc::new(snapshot));
    }

    /// Swap in a refetched committee record. The poll payload only ever
    /// arrives by broadcast, so it is carried over.
    fn replace(&self, mut fresh: CommitteeSnapshot) -> Option<Arc<CommitteeSnapshot>> {
        if self.is_closed() {
            return None;
        }
        let _ordered = lock(&self.publishing);
        let snapshot = {
            let mut phase = lock(&self.phase);
            if !phase.ready {
                return None;
            }
            if let Some(current) = &phase.snapshot {
                fresh.poll = current.poll.clone();
            }
            let fresh = Arc::new(fresh);
            phase.snapshot = Some(Arc::clone(&fresh));
            fresh
        };
        self.publish(&snapshot);
        Some(snapshot)
    }

    /// Forget everything an unfinished load produced.
    fn rollback_load(&self) {
        let _ordered = lock(&self.publishing);
        {
            let mut phase = lock(&self.phase);
            phase.generation += 1;
            phase.snapshot = None;
            phase.backlog.clear();
            phase.ready = false;
        }
        self.first_event.send_replace(false);
        lock(&self.connection).take();
    }

    fn mark_ready(&self) -> Option<Arc<CommitteeSnapshot>> {
        let _ordered = lock(&self.publishing);
        let snapshot = {
            let mut phase = lock(&self.phase);
            phase.ready = true;
            phase.snapshot.clone()
        };
        if let Some(snapshot) = &snapshot {
            self.publish(snapshot);
        }
        snapshot
    }

    fn publish(&self, snapshot: &CommitteeSnapshot) {
        let listeners: Vec<Listener> = lock(&self.subscribers)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            if self.is_closed() {
                break;
            }
            listener(snapshot);
        }
    }

    fn settle(&self, event: &SessionEvent) {
        let matched: Vec<Confirmation> = {
            let mut pending = lock(&self.confirmations);
            let (matched, waiting): (Vec<_>, Vec<_>) = pending.drain(..).partition(|c| (c.matches)(event));
            *pending = waiting;
            matched
        };
        for confirmation in matched {
            let _ = confirmation.done.send(());
        }
    }

    fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id());
        if !self.is_closed() {
            lock(&self.subscribers).push((id, listener));
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    fn expect(&self, matches: ConfirmFn) -> (u64, oneshot::Receiver<()>) {
        let (done, confirmed) = oneshot::channel();
        let id = self.next_id();
        lock(&self.confirmations).push(Confirmation { id, matches, done });
        (id, confirmed)
    }

    fn forget(&self, id: u64) {
        lock(&self.confirmations).retain(|c| c.id != id);
    }

    fn connection(&self, feed: Feed) -> Option<watch::Receiver<ChannelState>> {
        lock(&self.connection)
            .as_ref()
            .map(|links| links.get(feed).clone())
    }

    fn connection_state(&self, feed: Feed) -> ChannelState {
        match lock(&self.connection).as_ref() {
            Some(links) => *links.get(feed).borrow(),
            None if self.is_closed() => ChannelState::Closed,
            None => ChannelState::Connecting,
        }
    }

    /// Returns false if the store was already closed.
    fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        lock(&self.subscribers).clear();
        // Dropping the senders fails every pending intent.
        lock(&self.confirmations).clear();
        true
    }
}

/// Routes one feed's events into the store.
struct StoreFeed {
    inner: Arc<StoreInner>,
    feed: Feed,
    generation: u64,
}

impl ChannelHandler for StoreFeed {
    fn on_event(&mut self, event: SessionEvent) {
        self.inner.ingest(self.generation, event);
    }

    fn on_error(&mut self, error: &ChannelError) {
        debug!(committee_id = %self.inner.committee_id, feed = %self.feed, error = %error, "session channel error");
    }
}

// ─── Reader ───────────────────────────────────────────────────────

/// Read-only, cloneable view of a store. Handed to collaborators such as
/// the delegation resolver.
#[derive(Clone)]
pub struct StoreReader {
    inner: Arc<StoreInner>,
}

impl StoreReader {
    pub fn committee_id(&self) -> CommitteeId {
        self.inner.committee_id
    }

    pub fn current(&self) -> SnapshotState {
        self.inner.current()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&CommitteeSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// State of the session feed.
    pub fn connection_state(&self) -> ChannelState {
        self.inner.connection_state(Feed::Session)
    }
}

// ─── Store ────────────────────────────────────────────────────────

pub struct CommitteeStore<A: ResourceApi> {
    committee_id: CommitteeId,
    api: Arc<A>,
    config: SessionConfig,
    inner: Arc<StoreInner>,
    channels: Mutex<Vec<SessionChannel>>,
    load_started: AtomicBool,
}

impl<A: ResourceApi> CommitteeStore<A> {
    pub fn new(committee_id: CommitteeId, api: Arc<A>, config: SessionConfig) -> Self {
        Self {
            committee_id,
            api,
            config,
            inner: Arc::new(StoreInner::new(committee_id)),
            channels: Mutex::new(Vec::new()),
            load_started: AtomicBool::new(false),
        }
    }

    pub fn committee_id(&self) -> CommitteeId {
        self.committee_id
    }

    pub fn reader(&self) -> StoreReader {
        StoreReader {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Latest snapshot, or `Loading` until [`load`](Self::load) succeeds.
    pub fn current(&self) -> SnapshotState {
        self.inner.current()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&CommitteeSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// State of the session feed.
    pub fn connection_state(&self) -> ChannelState {
        self.inner.connection_state(Feed::Session)
    }

    pub fn feed_state(&self, feed: Feed) -> ChannelState {
        self.inner.connection_state(feed)
    }

    /// Session feed state transitions, once the channels have been opened.
    pub fn connection_watch(&self) -> Option<watch::Receiver<ChannelState>> {
        self.inner.connection(Feed::Session)
    }

    /// Open both feeds, fetch the initial snapshot, then wait briefly for
    /// a first broadcast before reporting ready.
    ///
    /// The feeds are opened first so no broadcast can slip between the
    /// fetch and the subscription; events that beat the fetch are
    /// buffered and replayed on top of it. Dropping the returned future
    /// before it completes rolls the attempt back, and `load` may be
    /// called again.
    pub async fn load(&self) -> Result<Arc<CommitteeSnapshot>, StoreError> {
        if self.inner.is_closed() {
            return Err(StoreError::Closed(self.committee_id));
        }
        if let SnapshotState::Ready(snapshot) = self.current() {
            return Ok(snapshot);
        }
        if self.load_started.swap(true, Ordering::AcqRel) {
            return Err(StoreError::NotLoaded(self.committee_id));
        }

        let attempt = LoadAttempt {
            store: self,
            settled: false,
        };

        let generation = self.inner.generation();
        let open = |feed| {
            SessionChannel::open_feed(
                &self.config,
                feed,
                self.committee_id,
                StoreFeed {
                    inner: Arc::clone(&self.inner),
                    feed,
                    generation,
                },
            )
        };
        let session_feed = open(Feed::Session);
        let attendance_feed = open(Feed::Attendance);
        *lock(&self.inner.connection) = Some(Links {
            session: session_feed.watch_state(),
            attendance: attendance_feed.watch_state(),
        });
        lock(&self.channels).extend([session_feed, attendance_feed]);

        let (committee, attendance) = tokio::join!(
            self.api.fetch_committee(self.committee_id),
            self.api.fetch_attendance(self.committee_id),
        );
        let mut snapshot = match committee {
            Ok(snapshot) => snapshot,
            Err(source) => {
                error!(committee_id = %self.committee_id, error = %source, "initial committee fetch failed");
                attempt.settle();
                self.close();
                return Err(StoreError::Load {
                    committee_id: self.committee_id,
                    source,
                });
            }
        };
        match attendance {
            Ok(session) => snapshot.poll.attendance = session,
            Err(e) => {
                warn!(committee_id = %self.committee_id, error = %e, "attendance fetch failed; starting without a roll");
            }
        }
        self.inner.install(snapshot);

        let grace = self.config.first_event_grace();
        let mut first_event = self.inner.first_event.subscribe();
        if tokio::time::timeout(grace, first_event.wait_for(|seen| *seen))
            .await
            .is_err()
        {
            debug!(committee_id = %self.committee_id, grace_ms = grace.as_millis() as u64, "no session event within grace period");
        }

        attempt.settle();
        if self.inner.is_closed() {
            return Err(StoreError::Closed(self.committee_id));
        }
        let snapshot = self
            .inner
            .mark_ready()
            .ok_or(StoreError::NotLoaded(self.committee_id))?;
        info!(
            committee_id = %self.committee_id,
            procedure = %snapshot.procedure,
            delegations = snapshot.delegations.len(),
            "committee session ready"
        );
        Ok(snapshot)
    }

    /// Ask the server to switch the active procedure. Resolves once the
    /// broadcast carrying `procedure` has been applied.
    pub async fn request_procedure_change(&self, procedure: Procedure) -> Result<(), StoreError> {
        let snapshot = self.ready_snapshot()?;
        let update = CommitteeUpdate::from(snapshot.as_ref()).with_procedure(procedure);
        info!(committee_id = %self.committee_id, from = %snapshot.procedure, to = %procedure, "requesting procedure change");

        let api = Arc::clone(&self.api);
        self.round_trip(
            Feed::Session,
            Box::new(move |event: &SessionEvent| matches!(event, SessionEvent::Procedure(p) if *p == procedure)),
            async move { api.update_committee(update).await },
        )
        .await
    }

    /// Submit an attendance entry for a delegation. Resolves once a roll
    /// broadcast on the attendance feed shows the entry.
    pub async fn request_attendance_submission(
        &self,
        delegation_id: DelegationId,
        entry: AttendanceEntryType,
    ) -> Result<(), StoreError> {
        self.ready_snapshot()?;
        let committee_id = self.committee_id;
        let expected = AttendanceStatus::from(entry);
        info!(%committee_id, %delegation_id, entry = expected.as_str(), "submitting attendance");

        let api = Arc::clone(&self.api);
        self.round_trip(
            Feed::Attendance,
            Box::new(move |event: &SessionEvent| match event {
                SessionEvent::Attendance(session) => {
                    session.committee_id == committee_id
                        && session.status_of(delegation_id) == expected
                }
                _ => false,
            }),
            async move {
                api.submit_attendance(committee_id, delegation_id, entry)
                    .await
            },
        )
        .await
    }

    /// Replace the committee's delegation roster. The server does not
    /// broadcast roster edits, so the committee is refetched and swapped in
    /// with a single notification. Both requests share the mutation
    /// timeout.
    pub async fn request_roster_change(
        &self,
        delegations: Vec<DelegationId>,
    ) -> Result<Arc<CommitteeSnapshot>, StoreError> {
        self.ready_snapshot()?;
        let committee_id = self.committee_id;
        info!(%committee_id, delegations = delegations.len(), "requesting roster change");

        let limit = self.config.mutation_timeout();
        let refetched = tokio::time::timeout(limit, async {
            self.api
                .update_participants(committee_id, delegations)
                .await?;
            self.api.fetch_committee(committee_id).await
        })
        .await
        .map_err(|_| {
            warn!(%committee_id, timeout_ms = limit.as_millis() as u64, "roster change not completed in time");
            StoreError::MutationTimeout(limit)
        })?
        .map_err(StoreError::Mutation)?;

        self.inner
            .replace(refetched)
            .ok_or(StoreError::Closed(committee_id))
    }

    /// Close both feeds and detach every subscriber. Idempotent.
    pub fn close(&self) {
        if !self.inner.shutdown() {
            return;
        }
        for channel in lock(&self.channels).drain(..) {
            channel.close();
        }
        info!(committee_id = %self.committee_id, "committee session closed");
    }

    fn abandon_load(&self) {
        for channel in lock(&self.channels).drain(..) {
            channel.close();
        }
        self.inner.rollback_load();
        self.load_started.store(false, Ordering::Release);
        debug!(committee_id = %self.committee_id, "unfinished load rolled back");
    }

    fn ready_snapshot(&self) -> Result<Arc<CommitteeSnapshot>, StoreError> {
        if self.inner.is_closed() {
            return Err(StoreError::Closed(self.committee_id));
        }
        match self.current() {
            SnapshotState::Ready(snapshot) => Ok(snapshot),
            SnapshotState::Loading => Err(StoreError::NotLoaded(self.committee_id)),
        }
    }

    /// Issue a mutation and wait for its confirming broadcast, all within
    /// the mutation timeout. The expectation is registered before the
    /// request goes out so a fast broadcast cannot be missed.
    async fn round_trip(
        &self,
        feed: Feed,
        matches: ConfirmFn,
        issue: impl Future<Output = Result<(), ApiError>>,
    ) -> Result<(), StoreError> {
        let (id, confirmed) = self.inner.expect(matches);
        let limit = self.config.mutation_timeout();

        let attempt = async move {
            self.wait_until_open(feed).await?;
            issue.await.map_err(StoreError::Mutation)?;
            confirmed
                .await
                .map_err(|_| StoreError::Closed(self.committee_id))
        };
        let outcome = match tokio::time::timeout(limit, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(committee_id = %self.committee_id, timeout_ms = limit.as_millis() as u64, "mutation not confirmed in time");
                Err(StoreError::MutationTimeout(limit))
            }
        };
        if outcome.is_err() {
            self.inner.forget(id);
        }
        outcome
    }

    async fn wait_until_open(&self, feed: Feed) -> Result<(), StoreError> {
        let Some(mut state) = self.inner.connection(feed) else {
            return Err(StoreError::NotLoaded(self.committee_id));
        };
        let reached = state
            .wait_for(|s| matches!(s, ChannelState::Open | ChannelState::Closed))
            .await
            .map(|s| *s);
        match reached {
            Ok(ChannelState::Open) => Ok(()),
            _ => Err(StoreError::Closed(self.committee_id)),
        }
    }
}

/// Rolls `load` back if its future is dropped before it settles.
struct LoadAttempt<'a, A: ResourceApi> {
    store: &'a CommitteeStore<A>,
    settled: bool,
}

impl<A: ResourceApi> LoadAttempt<'_, A> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl<A: ResourceApi> Drop for LoadAttempt<'_, A> {
    fn drop(&mut self) {
        if !self.settled {
            self.store.abandon_load();
        }
    }
}

impl<A: ResourceApi> Drop for CommitteeStore<A> {
    fn drop(&mut self) {
        self.close();
    }
}
