//! Tests for EventRegistry

use shadowvm_protocol::EventId;

use crate::ClientError;
use crate::registry::EventRegistry;

#[test]
fn test_ids_start_at_one() {
    let mut registry = EventRegistry::new();
    assert_eq!(registry.insert("a.A.first").unwrap(), EventId(1));
    assert_eq!(registry.insert("a.A.second").unwrap(), EventId(2));
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_insert_is_idempotent() {
    let mut registry = EventRegistry::new();
    let first = registry.insert("demo.Points.pointEvent").unwrap();
    let again = registry.insert("demo.Points.pointEvent").unwrap();
    assert_eq!(first, again);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.insert("demo.Points.other").unwrap(), EventId(2));
}

#[test]
fn test_peek_does_not_reserve() {
    let mut registry = EventRegistry::new();
    assert_eq!(registry.peek("x.y").unwrap(), EventId(1));
    assert_eq!(registry.peek("x.z").unwrap(), EventId(1));
    assert!(registry.is_empty());

    registry.insert("x.z").unwrap();
    assert_eq!(registry.peek("x.z").unwrap(), EventId(1));
    assert_eq!(registry.peek("x.y").unwrap(), EventId(2));
}

#[test]
fn test_contains_id() {
    let mut registry = EventRegistry::new();
    assert!(!registry.contains_id(EventId(1)));
    registry.insert("a.b").unwrap();
    assert!(registry.contains_id(EventId(1)));
    assert!(!registry.contains_id(EventId(0)));
    assert!(!registry.contains_id(EventId(2)));
}

#[test]
fn test_exhaustion() {
    let mut registry = EventRegistry::new();
    for i in 1..=u16::MAX {
        assert_eq!(registry.insert(&format!("a.m{i}")).unwrap(), EventId(i));
    }
    assert!(registry.contains_id(EventId(u16::MAX)));
    assert!(matches!(
        registry.insert("a.overflow"),
        Err(ClientError::EventIdsExhausted)
    ));
    // existing names still resolve
    assert_eq!(registry.insert("a.m1").unwrap(), EventId(1));
}
