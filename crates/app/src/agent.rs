//! Client sync agent
//!
//! Keeps one device's view of one counter. The authority is only reachable
//! by polling, so the agent pulls a snapshot every `poll_interval`, decides
//! whether it is newer than what is shown, and turns the difference into
//! events for the presentation layer (progress, joins, completion, resets,
//! connection trouble).
//!
//! The shown count is always the last accepted server value. Tap feedback is
//! emitted before the increment request goes out and is purely cosmetic.

use std::time::Duration;

use tasbih_core::{invariants, Counter, CounterId};
use tasbih_net::{CounterApi, ErrorKind};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Local participant identity, persisted per device by the app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub haptics: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub poll_interval: Duration,
    /// Consecutive not-found polls before the session closes
    pub not_found_limit: u32,
    /// Consecutive failed requests before connection trouble is reported
    pub transient_alert_after: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            not_found_limit: 2,
            transient_alert_after: 5,
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No display name yet. The counter is observed but cannot be tapped.
    Unidentified,
    /// Join request outstanding (retried on every tick)
    Joining,
    Active,
    /// Counter missing or session left
    Closed,
}

/// Events from the agent to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    PhaseChanged(SessionPhase),
    /// A newer snapshot was accepted
    Updated(Counter),
    /// A name not seen in the previous snapshot
    ParticipantJoined(String),
    /// Local tap feedback, emitted before the request is confirmed
    Feedback { haptic: bool },
    /// The goal was reached. Fires once per reset generation.
    Completed { haptic: bool },
    ResetObserved,
    /// Increment refused because the goal is already reached
    GoalAlreadyReached,
    /// A request was refused (bad name, not the creator, ...)
    Rejected(String),
    ConnectionTrouble { failures: u32 },
    ConnectionRestored,
    CounterMissing,
}

/// Commands from the presentation layer to the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    /// Supply the display name for an unidentified session
    Identify(Identity),
    Increment,
    Reset,
    Refresh,
    Leave,
}

/// Locally shown state and the completion latch
#[derive(Debug, Default)]
pub struct View {
    counter: Option<Counter>,
    completion_seen: bool,
}

impl View {
    pub fn counter(&self) -> Option<&Counter> {
        self.counter.as_ref()
    }

    pub fn shows_completion(&self) -> bool {
        self.counter.as_ref().is_some_and(|c| c.is_completed)
    }

    /// Offer a snapshot to the view.
    ///
    /// Snapshots ordered below the shown one by `(epoch, current_count)` are
    /// stale and dropped. A higher epoch is a confirmed reset: the count may
    /// go down and the completion latch is re-armed. The first snapshot only
    /// primes the latch, so opening an already finished counter is silent.
    pub fn apply(&mut self, next: Counter, me: Option<&str>, haptic: bool) -> Vec<AgentEvent> {
        let mut events = Vec::new();

        let Some(shown) = self.counter.as_ref() else {
            self.completion_seen = next.is_completed;
            self.counter = Some(next.clone());
            events.push(AgentEvent::Updated(next));
            return events;
        };

        if next.id != shown.id {
            warn!(shown = %shown.id, received = %next.id, "Snapshot for another counter");
            return events;
        }
        if (next.epoch, next.current_count) < (shown.epoch, shown.current_count) {
            debug!(
                shown_epoch = shown.epoch,
                shown_count = shown.current_count,
                epoch = next.epoch,
                count = next.current_count,
                "Dropping stale snapshot"
            );
            return events;
        }
        invariants::assert_monotonic(shown, &next);
        if next == *shown {
            return events;
        }

        if next.epoch > shown.epoch {
            self.completion_seen = false;
            events.push(AgentEvent::ResetObserved);
        }

        for participant in &next.participants {
            let is_me = me == Some(participant.name.as_str());
            if !is_me && shown.participant(&participant.name).is_none() {
                events.push(AgentEvent::ParticipantJoined(participant.name.clone()));
            }
        }

        let completed_now = next.is_completed && !self.completion_seen;
        if next.is_completed {
            self.completion_seen = true;
        }

        self.counter = Some(next.clone());
        events.push(AgentEvent::Updated(next));
        if completed_now {
            events.push(AgentEvent::Completed { haptic });
        }
        events
    }
}

/// Per-device sync agent for one counter
pub struct SyncAgent<A> {
    api: A,
    counter_id: CounterId,
    identity: Option<Identity>,
    config: AgentConfig,
    phase: SessionPhase,
    view: View,
    not_found_streak: u32,
    failure_streak: u32,
    trouble_reported: bool,
}

impl<A: CounterApi> SyncAgent<A> {
    /// Create an agent. With an identity the first tick joins the counter;
    /// without one the session observes until `Identify` arrives.
    pub fn new(
        api: A,
        counter_id: CounterId,
        identity: Option<Identity>,
        config: AgentConfig,
    ) -> Self {
        let phase = if identity.is_some() {
            SessionPhase::Joining
        } else {
            SessionPhase::Unidentified
        };
        Self {
            api,
            counter_id,
            identity,
            config,
            phase,
            view: View::default(),
            not_found_streak: 0,
            failure_streak: 0,
            trouble_reported: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    fn my_name(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.name.as_str())
    }

    fn haptic(&self) -> bool {
        self.identity.as_ref().is_some_and(|i| i.haptics)
    }

    fn set_phase(&mut self, phase: SessionPhase, events: &mut Vec<AgentEvent>) {
        if self.phase != phase {
            info!(counter_id = %self.counter_id, from = ?self.phase, to = ?phase, "Session phase changed");
            self.phase = phase;
            events.push(AgentEvent::PhaseChanged(phase));
        }
    }

    fn accept(&mut self, counter: Counter) -> Vec<AgentEvent> {
        let haptic = self.haptic();
        let me = self.identity.as_ref().map(|i| i.name.as_str());
        self.view.apply(counter, me, haptic)
    }

    fn record_success(&mut self, events: &mut Vec<AgentEvent>) {
        self.failure_streak = 0;
        if self.trouble_reported {
            self.trouble_reported = false;
            info!(counter_id = %self.counter_id, "Connection restored");
            events.push(AgentEvent::ConnectionRestored);
        }
    }

    fn record_failure(&mut self, error: &tasbih_net::Error, events: &mut Vec<AgentEvent>) {
        self.failure_streak += 1;
        debug!(failures = self.failure_streak, error = %error, "Request failed");
        if !self.trouble_reported && self.failure_streak >= self.config.transient_alert_after {
            self.trouble_reported = true;
            warn!(counter_id = %self.counter_id, failures = self.failure_streak, "Connection trouble");
            events.push(AgentEvent::ConnectionTrouble {
                failures: self.failure_streak,
            });
        }
    }

    /// One scheduled step: join while joining, poll otherwise
    pub async fn tick(&mut self) -> Vec<AgentEvent> {
        match self.phase {
            SessionPhase::Joining => self.join().await,
            SessionPhase::Unidentified | SessionPhase::Active => self.refresh().await,
            SessionPhase::Closed => Vec::new(),
        }
    }

    /// Register this device's name on the counter. A missing counter ends
    /// the session immediately.
    pub async fn join(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        let Some(name) = self.my_name().map(str::to_string) else {
            events.push(AgentEvent::Rejected("Choose a display name first".into()));
            return events;
        };
        self.set_phase(SessionPhase::Joining, &mut events);

        match self.api.join(self.counter_id, &name).await {
            Ok(counter) => {
                self.record_success(&mut events);
                self.not_found_streak = 0;
                info!(counter_id = %self.counter_id, participant = %name, "Joined counter");
                self.set_phase(SessionPhase::Active, &mut events);
                events.extend(self.accept(counter));
            }
            Err(e) => match e.kind() {
                Some(ErrorKind::NotFound) => {
                    warn!(counter_id = %self.counter_id, "Counter not found on join");
                    self.set_phase(SessionPhase::Closed, &mut events);
                    events.push(AgentEvent::CounterMissing);
                }
                Some(ErrorKind::InvalidName) => {
                    self.identity = None;
                    self.set_phase(SessionPhase::Unidentified, &mut events);
                    events.push(AgentEvent::Rejected(detail(&e)));
                }
                _ => self.record_failure(&e, &mut events),
            },
        }
        events
    }

    /// Pull a fresh snapshot
    pub async fn refresh(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        if self.phase == SessionPhase::Closed {
            return events;
        }

        match self.api.get_state(self.counter_id).await {
            Ok(counter) => {
                self.record_success(&mut events);
                self.not_found_streak = 0;
                events.extend(self.accept(counter));
            }
            Err(e) if e.kind() == Some(ErrorKind::NotFound) => {
                self.record_success(&mut events);
                self.not_found_streak += 1;
                debug!(streak = self.not_found_streak, "Counter not found");
                if self.not_found_streak >= self.config.not_found_limit {
                    warn!(counter_id = %self.counter_id, "Counter no longer exists");
                    self.set_phase(SessionPhase::Closed, &mut events);
                    events.push(AgentEvent::CounterMissing);
                }
            }
            Err(e) => self.record_failure(&e, &mut events),
        }
        events
    }

    /// Local checks before a tap goes out. `Ok` carries the name to count
    /// under; `Err` is the event to show instead.
    fn prepare_increment(&self) -> Result<String, AgentEvent> {
        let name = match (self.phase, self.my_name()) {
            (SessionPhase::Active, Some(name)) => name.to_string(),
            (SessionPhase::Unidentified, _) | (_, None) => {
                return Err(AgentEvent::Rejected("Choose a display name first".into()));
            }
            _ => return Err(AgentEvent::Rejected("Not connected to the counter yet".into())),
        };
        if self.view.shows_completion() {
            return Err(AgentEvent::GoalAlreadyReached);
        }
        Ok(name)
    }

    fn feedback(&self) -> AgentEvent {
        AgentEvent::Feedback {
            haptic: self.haptic(),
        }
    }

    /// Tap. Feedback is immediate; the count changes only once the server
    /// confirms.
    pub async fn increment(&mut self) -> Vec<AgentEvent> {
        match self.prepare_increment() {
            Ok(name) => {
                let mut events = vec![self.feedback()];
                events.extend(self.send_increment(name).await);
                events
            }
            Err(refusal) => vec![refusal],
        }
    }

    /// The network half of a tap: the increment request and a refresh
    async fn send_increment(&mut self, name: String) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        match self.api.increment(self.counter_id, &name).await {
            Ok(outcome) => {
                self.record_success(&mut events);
                if outcome.transitioned_now {
                    info!(counter_id = %self.counter_id, "This tap completed the goal");
                }
                events.extend(self.accept(outcome.counter));
                events.extend(self.refresh().await);
            }
            Err(e) => match e.kind() {
                Some(ErrorKind::AlreadyCompleted) => {
                    self.record_success(&mut events);
                    events.push(AgentEvent::GoalAlreadyReached);
                    events.extend(self.refresh().await);
                }
                Some(ErrorKind::Internal) | None => self.record_failure(&e, &mut events),
                Some(_) => {
                    self.record_success(&mut events);
                    events.push(AgentEvent::Rejected(detail(&e)));
                }
            },
        }
        events
    }

    /// Ask the server to zero the counter. Only the creator is allowed; the
    /// server decides.
    pub async fn reset(&mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        let Some(name) = self.my_name().map(str::to_string) else {
            events.push(AgentEvent::Rejected("Choose a display name first".into()));
            return events;
        };

        match self.api.reset(self.counter_id, &name).await {
            Ok(counter) => {
                self.record_success(&mut events);
                events.extend(self.accept(counter));
            }
            Err(e) => match e.kind() {
                Some(ErrorKind::Internal) | None => self.record_failure(&e, &mut events),
                Some(_) => {
                    self.record_success(&mut events);
                    events.push(AgentEvent::Rejected(detail(&e)));
                }
            },
        }
        events
    }

    pub async fn handle(&mut self, command: AgentCommand) -> Vec<AgentEvent> {
        match command {
            AgentCommand::Identify(identity) => {
                self.identity = Some(identity);
                match self.phase {
                    SessionPhase::Unidentified => self.join().await,
                    _ => Vec::new(),
                }
            }
            AgentCommand::Increment => self.increment().await,
            AgentCommand::Reset => self.reset().await,
            AgentCommand::Refresh => self.tick().await,
            AgentCommand::Leave => {
                let mut events = Vec::new();
                self.set_phase(SessionPhase::Closed, &mut events);
                events
            }
        }
    }

    /// Poll loop. Runs until the session closes, the command channel closes,
    /// or nobody is listening for events.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<AgentCommand>,
        events: mpsc::Sender<AgentEvent>,
    ) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let batch = tokio::select! {
                _ = ticker.tick() => self.tick().await,
                cmd = commands.recv() => match cmd {
                    // Tap feedback is delivered before the request goes out
                    Some(AgentCommand::Increment) => match self.prepare_increment() {
                        Ok(name) => {
                            if events.send(self.feedback()).await.is_err() {
                                debug!("Agent event receiver dropped");
                                return;
                            }
                            self.send_increment(name).await
                        }
                        Err(refusal) => vec![refusal],
                    },
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        debug!("Agent command channel closed");
                        break;
                    }
                },
            };

            for event in batch {
                if events.send(event).await.is_err() {
                    debug!("Agent event receiver dropped");
                    return;
                }
            }

            if self.phase == SessionPhase::Closed {
                break;
            }
        }
        info!(counter_id = %self.counter_id, "Sync agent stopped");
    }
}

fn detail(error: &tasbih_net::Error) -> String {
    match error {
        tasbih_net::Error::Api(e) => e.detail.clone(),
        other => other.to_string(),
    }
}

/// Handle to a spawned agent
pub struct AgentHandle {
    cmd_tx: mpsc::Sender<AgentCommand>,
    event_rx: mpsc::Receiver<AgentEvent>,
}

impl AgentHandle {
    /// Spawn `agent` on the current runtime
    pub fn spawn<A: CounterApi + 'static>(agent: SyncAgent<A>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(agent.run(cmd_rx, event_tx));

        Self { cmd_tx, event_rx }
    }

    pub async fn send(&self, command: AgentCommand) -> Result<(), &'static str> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| "Sync agent not running")
    }

    /// Next event; `None` once the agent has stopped and the queue is drained
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        self.event_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tasbih_core::{CounterService, IncrementOutcome, MemoryStore};
    use tasbih_net::{ApiError, LocalApi};

    type Api = LocalApi<MemoryStore>;

    fn local() -> Api {
        LocalApi::new(Arc::new(CounterService::new(MemoryStore::new())))
    }

    fn identity(name: &str) -> Option<Identity> {
        Some(Identity {
            name: name.to_string(),
            haptics: true,
        })
    }

    fn fast() -> AgentConfig {
        AgentConfig {
            poll_interval: Duration::from_millis(20),
            ..AgentConfig::default()
        }
    }

    fn count_completed(events: &[AgentEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Completed { .. }))
            .count()
    }

    /// Serves `get_state` from a script, then repeats the last entry
    struct ScriptedApi {
        script: Mutex<VecDeque<tasbih_net::Result<Counter>>>,
        calls: AtomicUsize,
    }

    impl ScriptedApi {
        fn new(script: Vec<tasbih_net::Result<Counter>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn next(&self) -> tasbih_net::Result<Counter> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(tasbih_net::Error::ConnectionClosed))
        }
    }

    fn not_found() -> tasbih_net::Error {
        tasbih_net::Error::Api(ApiError::new(ErrorKind::NotFound, "gone"))
    }

    #[async_trait]
    impl CounterApi for ScriptedApi {
        async fn create(&self, _goal: i64, _created_by: &str) -> tasbih_net::Result<Counter> {
            self.next()
        }

        async fn get_state(&self, _id: CounterId) -> tasbih_net::Result<Counter> {
            self.next()
        }

        async fn join(&self, _id: CounterId, _name: &str) -> tasbih_net::Result<Counter> {
            self.next()
        }

        async fn increment(
            &self,
            _id: CounterId,
            _name: &str,
        ) -> tasbih_net::Result<IncrementOutcome> {
            self.next().map(|counter| IncrementOutcome {
                counter,
                transitioned_now: false,
            })
        }

        async fn reset(&self, _id: CounterId, _name: &str) -> tasbih_net::Result<Counter> {
            self.next()
        }
    }

    /// Local API whose increments take `delay` to answer
    struct SlowApi {
        inner: Api,
        delay: Duration,
    }

    #[async_trait]
    impl CounterApi for SlowApi {
        async fn create(&self, goal: i64, created_by: &str) -> tasbih_net::Result<Counter> {
            self.inner.create(goal, created_by).await
        }

        async fn get_state(&self, id: CounterId) -> tasbih_net::Result<Counter> {
            self.inner.get_state(id).await
        }

        async fn join(&self, id: CounterId, name: &str) -> tasbih_net::Result<Counter> {
            self.inner.join(id, name).await
        }

        async fn increment(
            &self,
            id: CounterId,
            name: &str,
        ) -> tasbih_net::Result<IncrementOutcome> {
            tokio::time::sleep(self.delay).await;
            self.inner.increment(id, name).await
        }

        async fn reset(&self, id: CounterId, name: &str) -> tasbih_net::Result<Counter> {
            self.inner.reset(id, name).await
        }
    }

    async fn wait_for(
        handle: &mut AgentHandle,
        limit: Duration,
        wanted: impl Fn(&AgentEvent) -> bool,
    ) -> bool {
        tokio::time::timeout(limit, async {
            while let Some(event) = handle.next_event().await {
                if wanted(&event) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false)
    }

    fn counter_at(counter: &Counter, count: u64, epoch: u64) -> Counter {
        let mut next = counter.clone();
        next.current_count = count;
        next.participants[0].count = count;
        next.is_completed = count >= next.goal;
        next.epoch = epoch;
        next
    }

    #[test]
    fn test_view_drops_stale_snapshots() {
        let base = Counter::new(10, "A").unwrap();
        let mut view = View::default();

        view.apply(counter_at(&base, 4, 0), Some("A"), false);
        assert!(view.apply(counter_at(&base, 3, 0), Some("A"), false).is_empty());
        assert_eq!(view.counter().unwrap().current_count, 4);

        // Same snapshot again is not news
        assert!(view.apply(counter_at(&base, 4, 0), Some("A"), false).is_empty());

        // A reset is allowed to go down
        let events = view.apply(counter_at(&base, 1, 1), Some("A"), false);
        assert_eq!(events[0], AgentEvent::ResetObserved);
        assert_eq!(view.counter().unwrap().current_count, 1);

        // Old epoch after the reset is stale even with a higher count
        assert!(view.apply(counter_at(&base, 9, 0), Some("A"), false).is_empty());
    }

    #[test]
    fn test_view_completion_latch() {
        let base = Counter::new(3, "A").unwrap();
        let mut view = View::default();

        view.apply(counter_at(&base, 2, 0), None, false);
        let events = view.apply(counter_at(&base, 3, 0), None, true);
        assert_eq!(count_completed(&events), 1);
        assert!(events.contains(&AgentEvent::Completed { haptic: true }));

        // Duplicate completed snapshots stay quiet
        let mut again = counter_at(&base, 3, 0);
        again.participants.push(tasbih_core::Participant::new("C"));
        let events = view.apply(again, None, true);
        assert_eq!(count_completed(&events), 0);
        assert!(events.contains(&AgentEvent::ParticipantJoined("C".into())));

        // Completing again after a reset fires again, even when the reset
        // itself was never seen at zero
        let events = view.apply(counter_at(&base, 3, 1), None, true);
        assert!(events.contains(&AgentEvent::ResetObserved));
        assert_eq!(count_completed(&events), 1);
    }

    #[test]
    fn test_view_first_snapshot_is_silent() {
        let base = Counter::new(2, "A").unwrap();
        let mut view = View::default();

        let events = view.apply(counter_at(&base, 2, 0), Some("A"), true);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AgentEvent::Updated(_)));
        assert!(view.shows_completion());
    }

    #[tokio::test]
    async fn test_join_and_complete_once() {
        let api = local();
        let counter = api.create(3, "A").await.unwrap();
        let mut agent = SyncAgent::new(api.clone(), counter.id, identity("B"), fast());

        let events = agent.tick().await;
        assert!(events.contains(&AgentEvent::PhaseChanged(SessionPhase::Active)));
        assert_eq!(agent.phase(), SessionPhase::Active);
        assert_eq!(agent.view().counter().unwrap().participants.len(), 2);

        let mut all = Vec::new();
        for _ in 0..3 {
            let events = agent.increment().await;
            assert_eq!(events[0], AgentEvent::Feedback { haptic: true });
            all.extend(events);
        }
        all.extend(agent.refresh().await);
        all.extend(agent.refresh().await);

        assert_eq!(count_completed(&all), 1);
        let shown = agent.view().counter().unwrap();
        assert_eq!(shown.current_count, 3);
        assert_eq!(shown.count_for("B"), 3);
    }

    #[tokio::test]
    async fn test_increment_after_completion_skips_network() {
        let base = Counter::new(1, "A").unwrap();
        let done = counter_at(&base, 1, 0);
        let api = Arc::new(ScriptedApi::new(vec![Ok(done)]));
        let mut agent = SyncAgent::new(api.clone(), base.id, identity("A"), fast());

        let events = agent.join().await;
        assert_eq!(count_completed(&events), 0);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        let events = agent.increment().await;
        assert_eq!(events, vec![AgentEvent::GoalAlreadyReached]);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_already_completed_from_server() {
        let api = local();
        let counter = api.create(1, "A").await.unwrap();
        let mut agent = SyncAgent::new(api.clone(), counter.id, identity("B"), fast());
        agent.join().await;

        // Someone else finishes between polls
        api.increment(counter.id, "A").await.unwrap();

        let events = agent.increment().await;
        assert!(events.contains(&AgentEvent::GoalAlreadyReached));
        assert_eq!(count_completed(&events), 1);
        assert_eq!(agent.view().counter().unwrap().count_for("B"), 0);
    }

    #[tokio::test]
    async fn test_reset_observed_and_rearmed() {
        let api = local();
        let counter = api.create(2, "A").await.unwrap();
        let mut creator = SyncAgent::new(api.clone(), counter.id, identity("A"), fast());
        let mut guest = SyncAgent::new(api.clone(), counter.id, identity("B"), fast());
        creator.join().await;
        guest.join().await;

        creator.increment().await;
        let events = guest.increment().await;
        assert_eq!(count_completed(&events), 1);

        let events = guest.reset().await;
        assert!(matches!(events.as_slice(), [AgentEvent::Rejected(_)]));

        creator.reset().await;
        let events = guest.refresh().await;
        assert!(events.contains(&AgentEvent::ResetObserved));
        assert_eq!(guest.view().counter().unwrap().current_count, 0);

        guest.increment().await;
        let events = guest.increment().await;
        assert_eq!(count_completed(&events), 1);
    }

    #[tokio::test]
    async fn test_participant_joined_event() {
        let api = local();
        let counter = api.create(5, "A").await.unwrap();
        let mut agent = SyncAgent::new(api.clone(), counter.id, identity("A"), fast());
        agent.join().await;

        api.join(counter.id, "C").await.unwrap();
        let events = agent.refresh().await;
        assert!(events.contains(&AgentEvent::ParticipantJoined("C".into())));
    }

    #[tokio::test]
    async fn test_join_unknown_counter_closes() {
        let mut agent = SyncAgent::new(local(), CounterId::new(), identity("A"), fast());

        let events = agent.tick().await;
        assert!(events.contains(&AgentEvent::CounterMissing));
        assert_eq!(agent.phase(), SessionPhase::Closed);
        assert!(agent.tick().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_counter_during_poll() {
        let base = Counter::new(5, "A").unwrap();
        let api = ScriptedApi::new(vec![
            Ok(base.clone()),
            Err(not_found()),
            Ok(base.clone()),
            Err(not_found()),
            Err(not_found()),
        ]);
        let mut agent = SyncAgent::new(api, base.id, identity("A"), fast());
        agent.join().await;

        // A single miss is tolerated and the streak resets on success
        assert!(agent.refresh().await.is_empty());
        agent.refresh().await;
        assert!(agent.refresh().await.is_empty());
        assert_eq!(agent.phase(), SessionPhase::Active);

        let events = agent.refresh().await;
        assert!(events.contains(&AgentEvent::CounterMissing));
        assert_eq!(agent.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn test_connection_trouble_reported_once() {
        let base = Counter::new(5, "A").unwrap();
        let mut script = vec![Ok(base.clone())];
        script.extend((0..6).map(|_| Err(tasbih_net::Error::Timeout(Duration::from_secs(5)))));
        script.push(Ok(counter_at(&base, 1, 0)));
        let mut agent = SyncAgent::new(ScriptedApi::new(script), base.id, identity("A"), fast());
        agent.join().await;

        let mut trouble = Vec::new();
        for _ in 0..6 {
            trouble.extend(agent.refresh().await);
        }
        assert_eq!(trouble, vec![AgentEvent::ConnectionTrouble { failures: 5 }]);

        let events = agent.refresh().await;
        assert_eq!(events[0], AgentEvent::ConnectionRestored);
        assert_eq!(agent.view().counter().unwrap().current_count, 1);
    }

    #[tokio::test]
    async fn test_unidentified_session_observes() {
        let api = local();
        let counter = api.create(5, "A").await.unwrap();
        let mut agent = SyncAgent::new(api.clone(), counter.id, None, fast());
        assert_eq!(agent.phase(), SessionPhase::Unidentified);

        agent.tick().await;
        assert_eq!(agent.view().counter().unwrap().id, counter.id);

        let events = agent.increment().await;
        assert!(matches!(events.as_slice(), [AgentEvent::Rejected(_)]));

        let events = agent
            .handle(AgentCommand::Identify(Identity {
                name: "B".into(),
                haptics: false,
            }))
            .await;
        assert!(events.contains(&AgentEvent::PhaseChanged(SessionPhase::Active)));

        let events = agent.increment().await;
        assert_eq!(events[0], AgentEvent::Feedback { haptic: false });
        assert_eq!(api.get_state(counter.id).await.unwrap().count_for("B"), 1);
    }

    #[tokio::test]
    async fn test_tap_feedback_precedes_slow_increment() {
        let inner = local();
        let counter = inner.create(5, "A").await.unwrap();
        let api = SlowApi {
            inner: inner.clone(),
            delay: Duration::from_millis(1500),
        };
        let mut handle = AgentHandle::spawn(SyncAgent::new(api, counter.id, identity("B"), fast()));

        let active = AgentEvent::PhaseChanged(SessionPhase::Active);
        assert!(wait_for(&mut handle, Duration::from_secs(5), |e| *e == active).await);

        let sent = tokio::time::Instant::now();
        handle.send(AgentCommand::Increment).await.unwrap();
        let feedback = wait_for(&mut handle, Duration::from_secs(1), |e| {
            matches!(e, AgentEvent::Feedback { .. })
        })
        .await;
        assert!(feedback);
        assert!(sent.elapsed() < Duration::from_millis(500));
        assert_eq!(inner.get_state(counter.id).await.unwrap().count_for("B"), 0);

        let confirmed = wait_for(&mut handle, Duration::from_secs(5), |e| {
            matches!(e, AgentEvent::Updated(c) if c.count_for("B") == 1)
        })
        .await;
        assert!(confirmed);
    }

    #[tokio::test]
    async fn test_spawned_agent_loop() {
        let api = local();
        let counter = api.create(2, "A").await.unwrap();
        let mut handle = AgentHandle::spawn(SyncAgent::new(
            api.clone(),
            counter.id,
            identity("B"),
            fast(),
        ));

        let joined = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = handle.next_event().await {
                if event == AgentEvent::PhaseChanged(SessionPhase::Active) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(joined);

        handle.send(AgentCommand::Increment).await.unwrap();
        handle.send(AgentCommand::Increment).await.unwrap();

        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = handle.next_event().await {
                if matches!(event, AgentEvent::Completed { .. }) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(completed);

        handle.send(AgentCommand::Leave).await.unwrap();
        while handle.next_event().await.is_some() {}
        assert!(handle.send(AgentCommand::Refresh).await.is_err());
    }
}
