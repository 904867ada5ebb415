mod common;

use common::*;
use machine_core::{args, MachineState, Message, Value};

#[test]
fn test_cold_start() {
    let network = RecordingNetwork::default()
        .with_peer("disk-1")
        .with_peer("screen-1");
    let fx = fixture_with(ECHO_KERNEL, network, machine_config(), pool(2));
    fx.owner.set_world_time(400);

    assert_eq!(fx.instance.state(), MachineState::Stopped);
    assert!(fx.instance.start());

    assert_eq!(fx.instance.state(), MachineState::Suspended);
    assert_eq!(fx.instance.queued_signals(), 2);
    assert_eq!(fx.network.event_names(), vec!["computer.started"]);
    assert!(fx.instance.kernel_memory() > 0);

    // Not running until the host has ticked once
    assert!(!fx.instance.is_running());
    tick(&fx.instance);
    assert!(fx.instance.is_running());

    // A second start is refused
    assert!(!fx.instance.start());
}

#[test]
fn test_start_fails_on_bad_kernel() {
    let fx = fixture("let = broken");
    assert!(!fx.instance.start());
    assert_eq!(fx.instance.state(), MachineState::Stopped);
    assert!(fx.instance.message().is_some());
    assert!(fx.network.event_names().is_empty());
}

#[test]
fn test_kernel_with_undeclared_name_is_rejected() {
    let fx = fixture("yield;\nwhile (true) { yield missing }");
    assert!(!fx.instance.start());
    assert_eq!(fx.instance.state(), MachineState::Stopped);
    let message = fx.instance.message().expect("message");
    assert!(message.contains("missing"), "{}", message);
}

#[test]
fn test_kernel_that_never_yields_fails_to_boot() {
    let fx = fixture("let x = 1");
    assert!(!fx.instance.start());
    assert_eq!(fx.instance.state(), MachineState::Stopped);
}

#[test]
fn test_signals_are_delivered_in_order() {
    let fx = fixture(ECHO_KERNEL);
    let network = fx.network.clone();
    assert!(fx.instance.start());

    assert!(fx.instance.signal("noise", vec![]));
    assert!(fx.instance.signal("call", args!["echo-1"]));
    tick_until(&fx.instance, MachineState::SynchronizedCall);
    tick_until(&fx.instance, MachineState::Suspended);

    // The kernel counted both signals before the call went out
    assert_eq!(network.calls("count"), vec![args![2]]);
    assert_eq!(fx.instance.queued_signals(), 0);
}

#[test]
fn test_signal_rejected_when_stopped_or_stopping() {
    let fx = fixture(ECHO_KERNEL);
    assert!(!fx.instance.signal("early", vec![]));
    assert_eq!(fx.instance.queued_signals(), 0);

    assert!(fx.instance.start());
    assert!(fx.instance.stop());
    assert!(!fx.instance.signal("late", vec![]));
    assert_eq!(fx.instance.queued_signals(), 0);
}

#[test]
fn test_queue_overflow_drops_signals() {
    let mut config = machine_config();
    config.signal_queue_capacity = 2;
    let fx = fixture_with(ECHO_KERNEL, RecordingNetwork::default(), config, pool(1));
    assert!(fx.instance.start());

    assert!(fx.instance.signal("a", vec![]));
    assert!(fx.instance.signal("b", vec![]));
    assert!(!fx.instance.signal("c", vec![]));
    assert_eq!(fx.instance.queued_signals(), 2);
}

#[test]
fn test_sleep_and_early_wake() {
    let fx = fixture("yield;\nwhile (true) { yield 2.5 }");
    assert!(fx.instance.start());

    let before = machine_core::accounting::now_ms();
    assert!(fx.instance.signal("go", vec![]));
    tick(&fx.instance);

    assert_eq!(fx.instance.state(), MachineState::Sleeping);
    let deadline = fx.instance.sleep_until().expect("deadline");
    assert!(deadline >= before + 2_500);
    assert!(deadline <= machine_core::accounting::now_ms() + 2_500);

    // Nothing happens before the deadline
    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Sleeping);

    // A signal wakes it without waiting
    assert!(fx.instance.signal("wake", vec![]));
    tick(&fx.instance);
    assert_eq!(fx.instance.queued_signals(), 0);
    assert_eq!(fx.instance.state(), MachineState::Sleeping);
    assert!(fx.instance.sleep_until().expect("new deadline") >= deadline);
}

#[test]
fn test_zero_sleep_wakes_next_tick() {
    let fx = fixture_with(
        "let n = 0\nyield;\nwhile (true) { n = n + 1\nyield 0\nif (n == 3) { yield component.invoke(\"echo-1\", \"done\", n) } }",
        RecordingNetwork::default().with_component("echo-1", "echo"),
        machine_config(),
        pool(1),
    );
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));

    for _ in 0..10 {
        tick(&fx.instance);
    }
    assert_eq!(fx.network.calls("done"), vec![args![3]]);
}

#[test]
fn test_synchronized_call_round_trip() {
    let network = RecordingNetwork::default().with_component("echo-1", "echo");
    let fx = fixture_with(ECHO_KERNEL, network, machine_config(), pool(2));
    assert!(fx.instance.start());

    assert!(fx.instance.signal("call", args!["echo-1"]));
    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::SynchronizedCall);
    assert!(fx.network.calls("count").is_empty());

    // The controlling thread performs the call on the next tick
    fx.instance.update();
    assert_eq!(fx.network.calls("count"), vec![args![1]]);
    settle(&fx.instance);

    // The container came back as the yield's value
    assert_eq!(fx.instance.state(), MachineState::SynchronizedCall);
    tick(&fx.instance);
    assert_eq!(fx.network.calls("result"), vec![args![1]]);
    assert_eq!(fx.instance.state(), MachineState::Suspended);

    let (sender, target, _, _) = fx.network.sent.lock()[0].clone();
    assert_eq!(sender, ADDRESS);
    assert_eq!(target, "echo-1");
}

#[test]
fn test_call_to_missing_component_reports_failure() {
    let fx = fixture(ECHO_KERNEL);
    assert!(fx.instance.start());

    assert!(fx.instance.signal("call", args!["nowhere"]));
    tick_until(&fx.instance, MachineState::SynchronizedCall);
    tick_until(&fx.instance, MachineState::Suspended);

    // r[0] was false, so no result call followed
    assert_eq!(fx.network.calls("count").len(), 1);
    assert!(fx.network.calls("result").is_empty());
}

#[test]
fn test_synchronized_call_with_wrong_shape_is_protocol_error() {
    let fx = fixture("yield;\nyield defer(str, 5)\nwhile (true) { yield; }");
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));
    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::SynchronizedCall);

    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Stopped);
    assert_eq!(fx.instance.message().as_deref(), Some("protocol error"));

    // Shown on the next tick, then cleared from the instance
    tick(&fx.instance);
    assert_eq!(fx.owner.display.text(), "protocol error");
    assert_eq!(fx.instance.message(), None);
    assert!(fx.network.event_names().contains(&"computer.stopped".to_string()));
}

#[test]
fn test_failing_synchronized_call_reports_guest_message() {
    let fx = fixture("yield;\nyield defer(error, \"disk on fire\")\nwhile (true) { yield; }");
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));
    tick_until(&fx.instance, MachineState::SynchronizedCall);

    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Stopped);
    assert_eq!(fx.instance.message().as_deref(), Some("disk on fire"));
}

#[test]
fn test_kernel_error_is_shown_on_displays() {
    let fx = fixture("yield;\nerror(\"kernel exploded in a very long way\")");
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));
    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Stopped);

    tick(&fx.instance);
    assert_eq!(
        fx.owner.display.text(),
        "kernel exploded\nin a very long\nway"
    );
}

#[test]
fn test_kernel_return_stops_quietly() {
    let fx = fixture("yield;\nreturn 1");
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));
    tick(&fx.instance);

    assert_eq!(fx.instance.state(), MachineState::Stopped);
    assert_eq!(fx.instance.message(), None);
    assert_eq!(fx.instance.kernel_memory(), 0);
}

#[test]
fn test_allocation_limit_stops_machine() {
    let mut config = machine_config();
    config.memory_budget = 4 * 1024;
    let fx = fixture_with(
        "let s = \"x\"\nyield;\nwhile (true) { s = s + s }",
        RecordingNetwork::default(),
        config,
        pool(1),
    );
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));
    tick(&fx.instance);

    assert_eq!(fx.instance.state(), MachineState::Stopped);
    assert_eq!(fx.instance.message().as_deref(), Some("not enough memory"));
}

#[test]
fn test_reboot() {
    let fx = fixture("yield;\nyield true");
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));

    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Rebooting);
    assert_eq!(fx.instance.kernel_memory(), 0);

    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Suspended);
    assert_eq!(
        fx.network.event_names(),
        vec!["computer.started", "computer.stopped", "computer.started"]
    );
}

#[test]
fn test_shutdown() {
    let fx = fixture("yield;\nyield false");
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));
    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Stopped);

    tick(&fx.instance);
    assert_eq!(
        fx.network.event_names(),
        vec!["computer.started", "computer.stopped"]
    );
    assert_eq!(fx.instance.message(), None);
}

#[test]
fn test_stop_then_restart_from_every_resting_state() {
    let network = RecordingNetwork::default().with_component("echo-1", "echo");
    let fx = fixture_with(
        "yield;\nwhile (true) {\nlet s = yield;\nif (s[0] == \"sleep\") { yield 30 }\nif (s[0] == \"call\") { yield component.invoke(\"echo-1\", \"x\") }\n}",
        network,
        machine_config(),
        pool(2),
    );

    let reach = |signals: &[&str], state: MachineState| {
        assert!(fx.instance.start());
        for name in signals {
            assert!(fx.instance.signal(name, vec![]));
            tick(&fx.instance);
        }
        assert_eq!(fx.instance.state(), state);
    };

    let scenarios: Vec<(Vec<&str>, MachineState)> = vec![
        (vec![], MachineState::Suspended),
        (vec!["go", "sleep"], MachineState::Sleeping),
        (vec!["go", "call"], MachineState::SynchronizedCall),
    ];

    for (signals, state) in scenarios {
        reach(&signals, state);
        assert!(fx.instance.stop());
        tick_until(&fx.instance, MachineState::Stopped);
        assert_eq!(fx.instance.queued_signals(), 0);
        assert_eq!(fx.instance.cpu_time_ns(), 0);
    }

    assert!(fx.instance.start());
    assert!(fx.instance.stop());
    assert!(!fx.instance.stop());
}

#[test]
fn test_receive_network_messages() {
    let fx = fixture(ECHO_KERNEL);

    // Topology changes are ignored until the instance is running
    assert_eq!(fx.instance.receive(&Message::new("network.connect", "hub", args!["disk-9"])), None);
    assert_eq!(fx.instance.queued_signals(), 0);

    assert_eq!(
        fx.instance.receive(&Message::new("computer.running", "peer", vec![])),
        Some(Value::Bool(false))
    );
    assert_eq!(
        fx.instance.receive(&Message::new("computer.start", "peer", vec![])),
        Some(Value::Bool(true))
    );
    tick(&fx.instance);
    assert_eq!(
        fx.instance.receive(&Message::new("computer.running", "peer", vec![])),
        Some(Value::Bool(true))
    );

    fx.instance.receive(&Message::new("network.connect", "hub", args!["disk-9"]));
    fx.instance.receive(&Message::new("network.disconnect", "hub", args!["disk-8"]));
    fx.instance.receive(&Message::new("network.reconnect", "hub", args!["disk-7", "disk-6"]));
    fx.instance.receive(&Message::new("computer.signal", "peer-2", args!["ping", 4]));
    assert_eq!(fx.instance.queued_signals(), 4);

    assert_eq!(
        fx.instance.receive(&Message::new("computer.stop", "peer", vec![])),
        Some(Value::Bool(true))
    );
    assert_eq!(
        fx.instance.receive(&Message::new("computer.stop", "peer", vec![])),
        Some(Value::Bool(false))
    );
    assert_eq!(fx.instance.receive(&Message::new("unknown", "peer", vec![])), None);
}

#[test]
fn test_world_clock_drives_uptime() {
    let network = RecordingNetwork::default().with_component("echo-1", "echo");
    let fx = fixture_with(
        "yield;\nwhile (true) { yield;\nyield component.invoke(\"echo-1\", \"uptime\", computer.uptime()) }",
        network,
        machine_config(),
        pool(1),
    );
    fx.owner.set_world_time(1_000);
    assert!(fx.instance.start());

    // 20 ticks per second by default
    fx.owner.set_world_time(1_040);
    assert!(fx.instance.signal("go", vec![]));
    tick(&fx.instance);
    assert!(fx.instance.signal("go", vec![]));
    tick_until(&fx.instance, MachineState::SynchronizedCall);
    tick(&fx.instance);

    assert_eq!(fx.network.calls("uptime"), vec![args![2.0]]);
}

/// Network whose `halt` call routes `computer.stop` back to the calling instance
#[derive(Default)]
struct HaltingNetwork {
    target: std::sync::OnceLock<std::sync::Weak<machine_core::Instance>>,
    methods: parking_lot::Mutex<Vec<String>>,
}

impl machine_core::host::Network for HaltingNetwork {
    fn send_to_address(
        &self,
        sender: &str,
        _target: &str,
        method: &str,
        args: &[Value],
    ) -> Option<Vec<Value>> {
        self.methods.lock().push(method.to_string());
        if method == "halt" {
            let instance = self.target.get().and_then(std::sync::Weak::upgrade)?;
            let accepted = instance.receive(&Message::new("computer.stop", sender, vec![]));
            assert_eq!(accepted, Some(Value::Bool(true)));
        }
        Some(args.to_vec())
    }
    fn lookup_node(&self, _address: &str) -> Option<String> {
        None
    }
    fn connected_peers(&self, _address: &str) -> Vec<String> {
        Vec::new()
    }
    fn connect(&self, _address: &str) {}
    fn remove(&self, _address: &str) {}
    fn send_to_visible(&self, _sender: &str, _event: &str, _args: &[Value]) {}
    fn send_to_neighbors(&self, _sender: &str, _event: &str, _args: &[Value]) {}
}

#[test]
fn test_stop_requested_during_synchronized_call_tears_down() {
    use machine_core::host::StaticCatalog;
    use machine_core::{Collaborators, Engine, Instance};
    use std::sync::Arc;

    let kernel = "yield;\nyield component.invoke(\"self\", \"halt\")\nyield component.invoke(\"self\", \"after\")\nwhile (true) { yield; }";
    let network = Arc::new(HaltingNetwork::default());
    let owner = Arc::new(TestOwner::default());
    let instance = Arc::new(Instance::new(
        ADDRESS,
        machine_config(),
        Arc::new(Engine::new(&pool(1)).unwrap()),
        Collaborators {
            network: network.clone(),
            owner: owner.clone(),
            catalog: Arc::new(StaticCatalog::new().with_kernel(kernel)),
        },
    ));
    assert!(network.target.set(Arc::downgrade(&instance)).is_ok());

    assert!(instance.start());
    assert!(instance.signal("go", vec![]));
    tick(&instance);
    assert_eq!(instance.state(), MachineState::SynchronizedCall);

    // The call runs inline and stops the instance from inside
    instance.update();
    assert_eq!(instance.state(), MachineState::Stopped);
    assert!(!instance.is_busy());
    assert!(instance.message().is_none());

    for _ in 0..3 {
        tick(&instance);
    }
    assert_eq!(instance.state(), MachineState::Stopped);
    assert_eq!(*network.methods.lock(), vec!["halt".to_string()]);
}
