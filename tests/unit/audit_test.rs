//! Tests for audit sink

use nodequeue::core::{build_audit_event, AuditAction, AuditSink, GateId, InMemoryAuditSink, PoolKind};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let gate = GateId::new();

    sink.record(build_audit_event(gate, PoolKind::Nodes, AuditAction::Admit, Some("1/2".to_string())));
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].gate, gate);
    assert_eq!(events[0].pool, PoolKind::Nodes);
    assert_eq!(events[0].action, AuditAction::Admit);
    assert_eq!(events[0].cost.as_deref(), Some("1/2"));
    assert!(events[0].created_at_ms > 0);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);
    let gates = [GateId::new(), GateId::new(), GateId::new()];

    for gate in gates {
        sink.record(build_audit_event(gate, PoolKind::Workers, AuditAction::Queue, None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].gate, gates[1]); // First one popped
    assert_eq!(events[1].gate, gates[2]);
}

#[test]
fn test_clones_share_buffer() {
    let sink = InMemoryAuditSink::new(4);
    let mut writer = sink.clone();
    writer.record(build_audit_event(GateId::new(), PoolKind::Nodes, AuditAction::Release, None));
    assert_eq!(sink.events().len(), 1);
}

#[test]
fn test_action_names() {
    let names: Vec<_> = [AuditAction::Admit, AuditAction::Queue, AuditAction::Wake, AuditAction::Release]
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(names, ["admit", "queue", "wake", "release"]);
}
