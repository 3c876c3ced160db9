#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use uuid::Uuid;

use gatehouse_core::{
    Command, Engine, GatehouseConfig, Messenger, MoveOutcome, PriorityResolver, QueueStats,
    TimerService, Transport,
};

/// A full engine wired to scripted collaborators. Commands flow through the
/// real channel into the real core thread; only the edges are fake.
pub struct Harness {
    pub engine: Engine,
    pub transport: Arc<ScriptedTransport>,
    pub resolver: Arc<GrantTable>,
    pub messenger: Arc<RecordingMessenger>,
    pub timer: Arc<StepTimer>,
}

pub const ENTRY: &str = "lobby";
pub const DESTINATION: &str = "survival";

const DEFAULT_CONFIG: &str = r#"
    entry_server = "lobby"
    destination = "survival"

    [intervals]
    update_secs = 0
    message_secs = 0

    [engine]
    idle_timeout_ms = 5

    [priorities]
    10 = "vip"
    0 = "none"
"#;

impl Harness {
    pub fn start() -> Self {
        Self::start_with(DEFAULT_CONFIG)
    }

    pub fn start_with(config_toml: &str) -> Self {
        Self::build(config_toml, Arc::new(ScriptedTransport::new()))
    }

    /// Start with a destination whose capacity probes fail from the outset,
    /// so the limit stays at zero until a probe succeeds.
    pub fn start_with_failing_capacity() -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_capacity(None);
        Self::build(DEFAULT_CONFIG, transport)
    }

    fn build(config_toml: &str, transport: Arc<ScriptedTransport>) -> Self {
        let config = GatehouseConfig::from_toml(config_toml).expect("parse test config");
        let resolver = Arc::new(GrantTable::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let timer = Arc::new(StepTimer::new());

        let engine = Engine::new(
            config,
            transport.clone(),
            resolver.clone(),
            messenger.clone(),
            timer.clone(),
        )
        .expect("start engine");

        Self {
            engine,
            transport,
            resolver,
            messenger,
            timer,
        }
    }

    /// Connect a fresh client to a server and deliver the event hook.
    pub fn connect(&self, name: &str, server: &str) -> Uuid {
        let uuid = Uuid::new_v4();
        self.connect_as(uuid, name, server);
        uuid
    }

    pub fn connect_as(&self, uuid: Uuid, name: &str, server: &str) {
        self.transport.connect(uuid, server);
        self.engine
            .send(Command::ServerConnected {
                uuid,
                name: name.to_string(),
                server: server.to_string(),
            })
            .expect("send connect event");
    }

    pub fn disconnect(&self, uuid: Uuid) {
        self.transport.disconnect(uuid);
        self.engine
            .send(Command::ClientDisconnected { uuid })
            .expect("send disconnect event");
    }

    /// One dispatch tick, driving the first-cycle deferral through the
    /// manual timer when it appears.
    pub fn tick(&self) {
        self.engine
            .send(Command::DispatchTick)
            .expect("send dispatch tick");
        self.barrier();
        if self.timer.pending_one_shots() > 0 {
            self.timer.fire_one_shots();
            self.barrier();
        }
    }

    /// Wait until the core has processed everything sent so far.
    pub fn barrier(&self) {
        let _ = self.stats();
    }

    pub fn stats(&self) -> Vec<QueueStats> {
        let (reply, rx) = oneshot::channel();
        self.engine
            .send(Command::Stats { reply })
            .expect("send stats query");
        rx.blocking_recv().expect("stats reply")
    }

    pub fn position(&self, uuid: Uuid) -> Option<usize> {
        let (reply, rx) = oneshot::channel();
        self.engine
            .send(Command::Position { uuid, reply })
            .expect("send position query");
        rx.blocking_recv().expect("position reply")
    }

    pub fn waiting(&self) -> usize {
        self.stats()[0].waiting
    }

    /// Block until the startup capacity probe has been applied, so
    /// dispatch ticks are not gated on a still-zero capacity.
    pub fn wait_ready(&self) {
        self.wait_until("startup capacity probe", |h| h.stats()[0].max_capacity > 0);
    }

    /// Poll until `check` passes. Used for effects the core only observes
    /// on its completion-poll phase.
    pub fn wait_until(&self, what: &str, check: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check(self) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

#[derive(Default)]
struct TransportState {
    connected: HashSet<Uuid>,
    locations: HashMap<Uuid, String>,
    occupancy: HashMap<String, usize>,
    capacity: Option<u32>,
    outcomes: VecDeque<MoveOutcome>,
    hold: bool,
    held: VecDeque<(Uuid, oneshot::Sender<MoveOutcome>)>,
    moves: Vec<(Uuid, String)>,
}

/// Transport whose move attempts complete with scripted outcomes
/// (`Success` by default), inline or held back until `complete_next`.
pub struct ScriptedTransport {
    state: Mutex<TransportState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TransportState {
                capacity: Some(100),
                ..TransportState::default()
            }),
        }
    }

    pub fn connect(&self, client: Uuid, server: &str) {
        let mut state = self.state.lock().unwrap();
        state.connected.insert(client);
        state.locations.insert(client, server.to_string());
    }

    pub fn disconnect(&self, client: Uuid) {
        let mut state = self.state.lock().unwrap();
        state.connected.remove(&client);
        state.locations.remove(&client);
    }

    pub fn set_occupancy(&self, destination: &str, occupancy: usize) {
        self.state
            .lock()
            .unwrap()
            .occupancy
            .insert(destination.to_string(), occupancy);
    }

    /// `None` makes capacity probes fail.
    pub fn set_capacity(&self, capacity: Option<u32>) {
        self.state.lock().unwrap().capacity = capacity;
    }

    pub fn script_outcome(&self, outcome: MoveOutcome) {
        self.state.lock().unwrap().outcomes.push_back(outcome);
    }

    pub fn hold_moves(&self) {
        self.state.lock().unwrap().hold = true;
    }

    pub fn complete_next(&self, outcome: MoveOutcome) {
        let held = self.state.lock().unwrap().held.pop_front();
        if let Some((_, tx)) = held {
            let _ = tx.send(outcome);
        }
    }

    /// Every move attempted so far, in order.
    pub fn moves(&self) -> Vec<(Uuid, String)> {
        self.state.lock().unwrap().moves.clone()
    }
}

impl Transport for ScriptedTransport {
    fn attempt_move(&self, client: Uuid, destination: &str) -> oneshot::Receiver<MoveOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().unwrap();
        state.moves.push((client, destination.to_string()));
        if state.hold {
            state.held.push_back((client, tx));
        } else {
            let outcome = state.outcomes.pop_front().unwrap_or(MoveOutcome::Success);
            let _ = tx.send(outcome);
        }
        rx
    }

    fn current_occupancy(&self, destination: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .occupancy
            .get(destination)
            .copied()
            .unwrap_or(0)
    }

    fn query_capacity(&self, _destination: &str) -> oneshot::Receiver<Option<u32>> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(self.state.lock().unwrap().capacity);
        rx
    }

    fn is_connected(&self, client: Uuid) -> bool {
        self.state.lock().unwrap().connected.contains(&client)
    }

    fn current_server(&self, client: Uuid) -> Option<String> {
        self.state.lock().unwrap().locations.get(&client).cloned()
    }
}

/// Permission lookup backed by an explicit grant table.
#[derive(Default)]
pub struct GrantTable {
    grants: Mutex<HashMap<Uuid, HashSet<String>>>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, client: Uuid, permission: &str) {
        self.grants
            .lock()
            .unwrap()
            .entry(client)
            .or_default()
            .insert(permission.to_string());
    }
}

impl PriorityResolver for GrantTable {
    fn has_tier(&self, client: Uuid, permission: &str) -> bool {
        self.grants
            .lock()
            .unwrap()
            .get(&client)
            .is_some_and(|perms| perms.contains(permission))
    }
}

/// Messenger that records every delivery.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(Uuid, String)>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages_for(&self, client: Uuid) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == client)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl Messenger for RecordingMessenger {
    fn send(&self, client: Uuid, text: &str) {
        self.sent.lock().unwrap().push((client, text.to_string()));
    }
}

type OnceTask = Box<dyn FnOnce() + Send>;

/// Timer that only fires when the test steps it.
#[derive(Default)]
pub struct StepTimer {
    one_shots: Mutex<Vec<(Duration, OnceTask)>>,
    repeating: Mutex<Vec<(Duration, Box<dyn Fn() -> bool + Send>)>>,
}

impl StepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_one_shots(&self) -> usize {
        self.one_shots.lock().unwrap().len()
    }

    pub fn fire_one_shots(&self) {
        let tasks: Vec<_> = self.one_shots.lock().unwrap().drain(..).collect();
        for (_, task) in tasks {
            task();
        }
    }

    pub fn tick_repeating(&self) {
        let mut repeating = self.repeating.lock().unwrap();
        repeating.retain(|(_, task)| task());
    }
}

impl TimerService for StepTimer {
    fn schedule_once(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        self.one_shots.lock().unwrap().push((delay, task));
    }

    fn schedule_repeating(&self, interval: Duration, task: Box<dyn Fn() -> bool + Send>) {
        self.repeating.lock().unwrap().push((interval, task));
    }
}
