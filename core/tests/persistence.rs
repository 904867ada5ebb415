mod common;

use common::*;
use machine_core::persistence::MachineRecord;
use machine_core::{args, MachineState};
use serde_json::json;

fn echo_network() -> RecordingNetwork {
    RecordingNetwork::default().with_component("echo-1", "echo")
}

#[test]
fn test_stopped_instance_saves_only_its_state() {
    let fx = fixture(ECHO_KERNEL);
    let record = fx.instance.save().unwrap();
    assert_eq!(serde_json::to_value(&record).unwrap(), json!({ "state": 0 }));
}

#[test]
fn test_save_is_idempotent() {
    let fx = fixture_with(ECHO_KERNEL, echo_network(), machine_config(), pool(1));
    assert!(fx.instance.start());
    assert!(fx.instance.signal("a", vec![]));
    tick(&fx.instance);

    let first = fx.instance.save().unwrap();
    let second = fx.instance.save().unwrap();
    assert_eq!(first, second);
    assert!(!first.kernel.as_ref().unwrap().is_empty());
    assert_eq!(first.state, MachineState::Suspended.code());
    assert_eq!(first.stack, None);
    assert_eq!(first.rom, Some(json!({ "address": "disk-1" })));
}

#[test]
fn test_round_trip_resumes_where_it_left_off() {
    let fx = fixture_with(ECHO_KERNEL, echo_network(), machine_config(), pool(2));
    fx.owner.set_world_time(100);
    assert!(fx.instance.start());
    assert!(fx.instance.signal("a", vec![]));
    assert!(fx.instance.signal("b", vec![]));
    tick(&fx.instance);

    // Queued but not yet delivered
    assert!(fx.instance.signal("call", args!["echo-1", (), 3.5]));
    let record = fx.instance.save().unwrap();
    assert_eq!(record.signals.as_ref().unwrap().len(), 1);
    assert_eq!(record.time_started, Some(100));

    // Survives a trip through JSON
    let text = serde_json::to_string(&record).unwrap();
    let record: MachineRecord = serde_json::from_str(&text).unwrap();

    let restored = sibling(&fx, echo_network());
    restored.instance.load(&record);
    assert_eq!(restored.instance.state(), MachineState::Suspended);
    assert_eq!(restored.instance.queued_signals(), 1);
    assert_eq!(restored.instance.kernel_memory(), fx.instance.kernel_memory());

    tick_until(&restored.instance, MachineState::SynchronizedCall);
    tick_until(&restored.instance, MachineState::Suspended);

    // Two signals were counted before the save
    assert_eq!(restored.network.calls("count"), vec![args![3]]);
    assert_eq!(restored.network.calls("result"), vec![args![3]]);
}

#[test]
fn test_round_trip_of_pending_call() {
    let fx = fixture_with(ECHO_KERNEL, echo_network(), machine_config(), pool(2));
    assert!(fx.instance.start());
    assert!(fx.instance.signal("call", args!["echo-1"]));
    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::SynchronizedCall);

    let record = fx.instance.save().unwrap();
    assert_eq!(record.state, MachineState::SynchronizedCall.code());
    assert!(record.stack.is_some());

    let restored = sibling(&fx, echo_network());
    restored.instance.load(&record);
    assert_eq!(restored.instance.state(), MachineState::SynchronizedCall);

    tick_until(&restored.instance, MachineState::Suspended);
    assert_eq!(restored.network.calls("count"), vec![args![1]]);
    assert_eq!(restored.network.calls("result"), vec![args![1]]);
}

#[test]
fn test_sleeping_instance_restores_as_paused() {
    let fx = fixture("yield;\nwhile (true) { yield 30 }");
    assert!(fx.instance.start());
    assert!(fx.instance.signal("go", vec![]));
    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Sleeping);

    let record = fx.instance.save().unwrap();
    assert_eq!(record.state, MachineState::Yielded.code());

    let restored = sibling(&fx, RecordingNetwork::default());
    restored.instance.load(&record);
    assert_eq!(restored.instance.state(), MachineState::Paused);

    // Paused behaves like Yielded once the host ticks
    tick(&restored.instance);
    assert_eq!(restored.instance.state(), MachineState::Sleeping);
}

#[test]
fn test_rebooting_record_restarts() {
    let fx = fixture(ECHO_KERNEL);
    let record = MachineRecord {
        state: MachineState::Rebooting.code(),
        ..Default::default()
    };
    fx.instance.load(&record);
    assert_eq!(fx.instance.state(), MachineState::Rebooting);

    let noted = MachineRecord {
        state: MachineState::Rebooting.code(),
        message: Some("rebooted by update".to_string()),
        ..Default::default()
    };
    let other = sibling(&fx, RecordingNetwork::default());
    other.instance.load(&noted);
    assert_eq!(other.instance.message().as_deref(), Some("rebooted by update"));

    tick(&fx.instance);
    assert_eq!(fx.instance.state(), MachineState::Suspended);
}

#[test]
fn test_corrupt_records_fall_back_to_stopped() {
    let fx = fixture_with(ECHO_KERNEL, echo_network(), machine_config(), pool(1));
    assert!(fx.instance.start());
    let good = fx.instance.save().unwrap();
    assert!(fx.instance.stop());

    let corrupt = [
        MachineRecord {
            kernel: None,
            ..good.clone()
        },
        MachineRecord {
            kernel: Some(b"not a snapshot".to_vec()),
            ..good.clone()
        },
        MachineRecord {
            kernel: Some(serde_json::to_vec(&json!({ "t": "Num", "v": 1.0 })).unwrap()),
            ..good.clone()
        },
        MachineRecord {
            state: MachineState::SynchronizedCall.code(),
            ..good.clone()
        },
        MachineRecord {
            state: MachineState::Running.code(),
            ..good.clone()
        },
        MachineRecord {
            state: 42,
            ..good.clone()
        },
    ];

    for record in &corrupt {
        let restored = sibling(&fx, RecordingNetwork::default());
        restored.instance.load(record);
        assert_eq!(restored.instance.state(), MachineState::Stopped, "{:?}", record.state);
        assert_eq!(restored.instance.message(), None);
        assert_eq!(restored.instance.queued_signals(), 0);
        assert_eq!(restored.instance.kernel_memory(), 0);
    }

    // The good record still loads
    let restored = sibling(&fx, RecordingNetwork::default());
    restored.instance.load(&good);
    assert_eq!(restored.instance.state(), MachineState::Suspended);
}

#[test]
fn test_load_replaces_a_running_instance() {
    let fx = fixture(ECHO_KERNEL);
    assert!(fx.instance.start());
    let record = fx.instance.save().unwrap();

    assert!(fx.instance.signal("a", vec![]));
    fx.instance.load(&record);
    assert_eq!(fx.instance.state(), MachineState::Suspended);
    assert_eq!(fx.instance.queued_signals(), 0);
}
