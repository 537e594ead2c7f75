//! End-to-end bus scenarios: dispatcher sweep plus real extension pumps over
//! one shared state directory.

use std::sync::Arc;
use tempfile::TempDir;
use zeus_agent::pump::InboxPump;
use zeus_agent::runtime::{AgentRuntime, MockRuntime};
use zeus_core::caps;
use zeus_core::clock::epoch_now;
use zeus_core::schema::{AgentRole, CapabilityHeartbeat, DeliverAs, Envelope, Supports};
use zeus_core::state_dir::StateDir;
use zeus_core::store;
use zeus_dispatch::drain::{startup_recovery, sweep};
use zeus_dispatch::notify::RecordingNotifier;
use zeus_dispatch::queue::{EnqueueRequest, enqueue};
use zeus_dispatch::registry::{AgentInfo, InMemoryRegistry};
use zeus_dispatch::world::{Tunables, World};

struct Bus {
    _tmp: TempDir,
    state: StateDir,
    world: World,
    registry: Arc<InMemoryRegistry>,
    notifier: Arc<RecordingNotifier>,
}

fn bus() -> Bus {
    let tmp = TempDir::new().unwrap();
    let state = StateDir::at(tmp.path());
    state.ensure_layout().unwrap();
    let registry = Arc::new(InMemoryRegistry::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let world = World::new(
        state.clone(),
        Tunables::default(),
        registry.clone(),
        notifier.clone(),
    );
    Bus { _tmp: tmp, state, world, registry, notifier }
}

struct Agent {
    runtime: Arc<MockRuntime>,
    pump: InboxPump,
    id: String,
}

impl Agent {
    fn join(bus: &Bus, id: &str, name: &str, phalanx: Option<&str>, parent: Option<&str>) -> Self {
        bus.registry.upsert(AgentInfo {
            agent_id: id.to_string(),
            name: name.to_string(),
            role: AgentRole::Hippeus,
            phalanx_id: phalanx.map(String::from),
            parent_id: parent.map(String::from),
        });
        let runtime = Arc::new(MockRuntime::new());
        let pump = InboxPump::new(
            bus.state.clone(),
            id,
            Arc::clone(&runtime) as Arc<dyn AgentRuntime>,
        );
        let agent = Self { runtime, pump, id: id.to_string() };
        agent.heartbeat(bus);
        agent
    }

    fn heartbeat(&self, bus: &Bus) {
        caps::publish_heartbeat(&bus.state, &CapabilityHeartbeat {
            agent_id: self.id.clone(),
            role: AgentRole::Hippeus,
            session_id: "sess".to_string(),
            session_path: "/tmp/sess".to_string(),
            cwd: "/tmp".to_string(),
            updated_at: epoch_now(),
            supports: Supports { queue_bus: true, receipt_v1: true },
            extension: Default::default(),
            unknown_fields: Default::default(),
        })
        .unwrap();
    }
}

fn send(bus: &Bus, source: &str, target: &str, message: &str) -> String {
    enqueue(&bus.state, EnqueueRequest {
        source_agent_id: source.to_string(),
        source_name: source.to_string(),
        source_role: AgentRole::Hippeus,
        target: target.to_string(),
        message: message.to_string(),
        deliver_as: DeliverAs::Steer,
    })
    .unwrap()
}

fn force_due(bus: &Bus, id: &str) {
    let path = bus.state.queue_new().join(format!("{id}.json"));
    let mut envelope: Envelope = store::read_json(&path).unwrap();
    envelope.next_attempt_at = epoch_now() - 1.0;
    store::write_json_atomic(&path, &envelope).unwrap();
}

#[test]
fn happy_path_single_recipient() {
    let bus = bus();
    let bob = Agent::join(&bus, "bob", "Bob", None, None);
    let id = send(&bus, "alice", "name:bob", "hello");

    // Dispatcher fans out.
    sweep(&bus.world);
    assert!(bus.state.inbox_new("bob").join(format!("{id}.json")).exists());

    // Bob's extension pumps: item consumed, receipt written.
    bob.pump.run_pass();
    assert_eq!(bob.runtime.submit_count(), 1);
    assert!(bus.state.receipt_path("bob", &id).exists());
    assert!(!bus.state.inbox_new("bob").join(format!("{id}.json")).exists());

    // Dispatcher observes the receipt and removes the envelope.
    force_due(&bus, &id);
    sweep(&bus.world);
    assert!(!bus.state.queue_new().join(format!("{id}.json")).exists());
    assert!(!bus.state.queue_inflight().join(format!("{id}.json")).exists());
}

#[test]
fn phalanx_fan_out_survives_dispatcher_crash_between_writes() {
    let bus = bus();
    let _p = Agent::join(&bus, "p1", "Polemarch", Some("X"), None);
    let h1 = Agent::join(&bus, "h1", "Hoplite One", Some("X"), Some("p1"));
    let h2 = Agent::join(&bus, "h2", "Hoplite Two", Some("X"), Some("p1"));

    let id = send(&bus, "p1", "phalanx", "advance");

    // First dispatch pass fans out to both hoplites.
    sweep(&bus.world);
    let file = format!("{id}.json");
    assert!(bus.state.inbox_new("h1").join(&file).exists());
    assert!(bus.state.inbox_new("h2").join(&file).exists());

    // Simulate the dispatcher having crashed mid-pass: the envelope is stuck
    // in inflight/ with only h1's inbox item written.
    store::unlink(&bus.state.inbox_new("h2").join(&file)).unwrap();
    force_due(&bus, &id);
    store::claim_move(
        &bus.state.queue_new().join(&file),
        &bus.state.queue_inflight().join(&file),
    )
    .unwrap();

    // Restarted dispatcher reclaims and re-dispatches; h2's item reappears,
    // h1's is not duplicated.
    startup_recovery(&bus.world);
    assert!(bus.state.inbox_new("h2").join(&file).exists());

    h1.pump.run_pass();
    h2.pump.run_pass();
    assert_eq!(h1.runtime.submit_count(), 1);
    assert_eq!(h2.runtime.submit_count(), 1);

    force_due(&bus, &id);
    sweep(&bus.world);
    assert!(!bus.state.queue_new().join(&file).exists());
    assert!(!bus.state.queue_inflight().join(&file).exists());
}

#[test]
fn stale_recipient_blocks_until_heartbeat_returns() {
    let bus = bus();
    // carol is registered but her extension never started.
    bus.registry.upsert(AgentInfo {
        agent_id: "carol".to_string(),
        name: "Carol".to_string(),
        role: AgentRole::Hippeus,
        phalanx_id: None,
        parent_id: None,
    });

    let id = send(&bus, "alice", "name:carol", "wake up");
    sweep(&bus.world);

    // Blocked without inbox write.
    let file = format!("{id}.json");
    assert!(!bus.state.inbox_new("carol").join(&file).exists());
    assert!(bus.state.queue_new().join(&file).exists());

    // Her extension comes up: heartbeat, then delivery proceeds.
    let carol = Agent::join(&bus, "carol", "Carol", None, None);
    force_due(&bus, &id);
    sweep(&bus.world);
    assert!(bus.state.inbox_new("carol").join(&file).exists());

    carol.pump.run_pass();
    force_due(&bus, &id);
    sweep(&bus.world);
    assert_eq!(carol.runtime.submit_count(), 1);
    assert!(!bus.state.queue_new().join(&file).exists());
}

#[test]
fn envelope_survives_enqueue_before_any_dispatcher_ran() {
    let bus = bus();
    let id = send(&bus, "alice", "name:bob", "early bird");

    // No dispatcher running at enqueue time: the envelope is durably in new/.
    assert!(bus.state.queue_new().join(format!("{id}.json")).exists());

    // A dispatcher starting later picks it up (unknown recipient, so it
    // stays queued and notifies).
    startup_recovery(&bus.world);
    assert!(bus.state.queue_new().join(format!("{id}.json")).exists());
    assert_eq!(bus.notifier.count_matching("undeliverable"), 1);
}

#[test]
fn two_dispatchers_race_without_corruption() {
    let bus = bus();
    let bob = Agent::join(&bus, "bob", "Bob", None, None);

    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(send(&bus, "alice", "name:bob", &format!("msg {i}")));
    }

    // A second world over the same state dir: a stale prior dispatcher run.
    let other_world = World::new(
        bus.state.clone(),
        Tunables::default(),
        bus.registry.clone() as Arc<dyn zeus_dispatch::registry::AgentRegistry>,
        Arc::new(RecordingNotifier::new()),
    );

    let h1 = std::thread::spawn({
        let world = bus.world;
        move || sweep(&world)
    });
    let h2 = std::thread::spawn(move || sweep(&other_world));
    let s1 = h1.join().unwrap();
    let s2 = h2.join().unwrap();

    // Every envelope was claimed by exactly one of them.
    assert_eq!(s1.claimed + s2.claimed, 8);

    // All eight inbox items exist exactly once and deliver exactly once.
    bob.pump.run_pass();
    assert_eq!(bob.runtime.submit_count(), 8);
    for id in &ids {
        assert!(bus.state.receipt_path("bob", id).exists());
    }
}
