//! Collaborator doubles shared by the lifecycle tests
#![allow(dead_code)]

use machine_core::config::{MachineConfig, PoolConfig};
use machine_core::host::{Display, Network, Owner, StaticCatalog};
use machine_core::{Collaborators, Engine, Instance, MachineState, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ADDRESS: &str = "computer-1";

/// A call that reached the network: (sender, target, method, args)
pub type Sent = (String, String, String, Vec<Value>);

/// Network that records traffic and echoes calls to known components
#[derive(Default)]
pub struct RecordingNetwork {
    /// Addresses already connected when the instance starts
    pub peers: Vec<String>,
    /// Component address to node name
    pub components: BTreeMap<String, String>,
    pub sent: Mutex<Vec<Sent>>,
    /// (sender, event) in order of emission
    pub events: Mutex<Vec<(String, String)>>,
}

impl RecordingNetwork {
    pub fn with_peer(mut self, address: &str) -> Self {
        self.peers.push(address.to_string());
        self
    }

    pub fn with_component(mut self, address: &str, name: &str) -> Self {
        self.components.insert(address.to_string(), name.to_string());
        self
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn calls(&self, method: &str) -> Vec<Vec<Value>> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, _, m, _)| m == method)
            .map(|(_, _, _, args)| args.clone())
            .collect()
    }
}

impl Network for RecordingNetwork {
    fn send_to_address(
        &self,
        sender: &str,
        target: &str,
        method: &str,
        args: &[Value],
    ) -> Option<Vec<Value>> {
        self.sent.lock().push((
            sender.to_string(),
            target.to_string(),
            method.to_string(),
            args.to_vec(),
        ));
        self.components.get(target).map(|_| args.to_vec())
    }

    fn lookup_node(&self, address: &str) -> Option<String> {
        self.components.get(address).cloned()
    }

    fn connected_peers(&self, _address: &str) -> Vec<String> {
        self.peers.clone()
    }

    fn connect(&self, _address: &str) {}

    fn remove(&self, _address: &str) {}

    fn send_to_visible(&self, sender: &str, event: &str, _args: &[Value]) {
        self.events.lock().push((sender.to_string(), event.to_string()));
    }

    fn send_to_neighbors(&self, sender: &str, event: &str, _args: &[Value]) {
        self.events.lock().push((sender.to_string(), event.to_string()));
    }
}

/// Text surface that keeps its rows in memory
pub struct RecordingDisplay {
    pub width: usize,
    pub rows: Mutex<Vec<String>>,
    pub clears: AtomicUsize,
}

impl RecordingDisplay {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            rows: Mutex::new(Vec::new()),
            clears: AtomicUsize::new(0),
        }
    }

    pub fn text(&self) -> String {
        self.rows.lock().join("\n")
    }
}

impl Display for RecordingDisplay {
    fn width(&self) -> usize {
        self.width
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
        self.rows.lock().clear();
    }

    fn set_line(&self, row: usize, text: &str) {
        let mut rows = self.rows.lock();
        if rows.len() <= row {
            rows.resize(row + 1, String::new());
        }
        rows[row] = text.to_string();
    }
}

/// Owner with a settable world clock
pub struct TestOwner {
    pub world_time: AtomicI64,
    pub dirty: AtomicUsize,
    pub display: Arc<RecordingDisplay>,
}

impl Default for TestOwner {
    fn default() -> Self {
        Self {
            world_time: AtomicI64::new(0),
            dirty: AtomicUsize::new(0),
            display: Arc::new(RecordingDisplay::new(16)),
        }
    }
}

impl TestOwner {
    pub fn set_world_time(&self, ticks: i64) {
        self.world_time.store(ticks, Ordering::Release);
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.load(Ordering::Relaxed)
    }
}

impl Owner for TestOwner {
    fn world_time(&self) -> i64 {
        self.world_time.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.dirty.fetch_add(1, Ordering::Relaxed);
    }

    fn displays(&self) -> Vec<Arc<dyn Display>> {
        vec![self.display.clone()]
    }
}

/// One instance wired to recording doubles
pub struct Fixture {
    pub instance: Instance,
    pub network: Arc<RecordingNetwork>,
    pub owner: Arc<TestOwner>,
    pub catalog: Arc<StaticCatalog>,
    pub engine: Arc<Engine>,
}

pub fn pool(threads: usize) -> PoolConfig {
    PoolConfig {
        worker_threads: threads,
        thread_name: "machine-test".to_string(),
        niceness: 0,
    }
}

/// Limits with a pause threshold long enough that slow test hosts never look stalled
pub fn machine_config() -> MachineConfig {
    MachineConfig {
        pause_threshold_ms: 60_000,
        ..MachineConfig::default()
    }
}

pub fn fixture(kernel: &str) -> Fixture {
    fixture_with(kernel, RecordingNetwork::default(), machine_config(), pool(2))
}

pub fn fixture_with(
    kernel: &str,
    network: RecordingNetwork,
    config: MachineConfig,
    pool: PoolConfig,
) -> Fixture {
    let engine = Arc::new(Engine::new(&pool).expect("worker pool"));
    let catalog = Arc::new(StaticCatalog::new().with_kernel(kernel).with_address("disk-1"));
    fixture_on(engine, catalog, Arc::new(network), config)
}

/// A second instance sharing the catalog and engine of `other`
pub fn sibling(other: &Fixture, network: RecordingNetwork) -> Fixture {
    fixture_on(
        other.engine.clone(),
        other.catalog.clone(),
        Arc::new(network),
        machine_config(),
    )
}

fn fixture_on(
    engine: Arc<Engine>,
    catalog: Arc<StaticCatalog>,
    network: Arc<RecordingNetwork>,
    config: MachineConfig,
) -> Fixture {
    let owner = Arc::new(TestOwner::default());
    let instance = Instance::new(
        ADDRESS,
        config,
        engine.clone(),
        Collaborators {
            network: network.clone(),
            owner: owner.clone(),
            catalog: catalog.clone(),
        },
    );
    Fixture {
        instance,
        network,
        owner,
        catalog,
        engine,
    }
}

/// Wait for the outstanding worker task, if any, to finish
pub fn settle(instance: &Instance) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while instance.is_busy() {
        assert!(Instant::now() < deadline, "worker task never finished");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// One host tick followed by the work it scheduled
pub fn tick(instance: &Instance) {
    instance.update();
    settle(instance);
}

/// Tick until `state` is reached
pub fn tick_until(instance: &Instance, state: MachineState) {
    for _ in 0..50 {
        if instance.state() == state {
            return;
        }
        tick(instance);
    }
    assert_eq!(instance.state(), state, "state never reached");
}

/// Kernel that idles until signalled, then answers `call` signals with a
/// synchronized call to the named component
pub const ECHO_KERNEL: &str = r#"
let n = 0
while (true) {
    let s = yield;
    n = n + 1
    if (len(s) > 0 && s[0] == "call") {
        let r = yield component.invoke(s[1], "count", n)
        if (r[0] == true) {
            yield component.invoke(s[1], "result", r[1])
        }
    }
}
"#;
