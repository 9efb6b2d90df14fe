//! Tests for NetReference bit layout

use crate::net_ref::{MAX_CLASS_ID, MAX_OBJECT_ID, NetReference};

#[test]
fn test_null_reference() {
    assert!(NetReference::NULL.is_null());
    assert_eq!(NetReference::NULL.as_raw(), 0);
    assert_eq!(NetReference::default(), NetReference::NULL);
}

#[test]
fn test_object_fields() {
    let r = NetReference::object(0x12_3456_789a, 0x2b);
    assert_eq!(r.object_id(), 0x12_3456_789a);
    assert_eq!(r.class_id(), 0x2b);
    assert!(!r.is_class_instance());
    assert!(!r.is_special());
    assert!(!r.is_null());
}

#[test]
fn test_class_reference_sets_flag() {
    let r = NetReference::class(5, 9);
    assert!(r.is_class_instance());
    assert_eq!(r.object_id(), 5);
    assert_eq!(r.class_id(), 9);
    assert_eq!(r.as_raw() >> 62, 0b01);
}

#[test]
fn test_special_flag_excluded_from_unique_id() {
    let plain = NetReference::object(77, 3);
    let special = plain.with_special();

    assert!(special.is_special());
    assert_ne!(plain, special);
    assert_eq!(plain.unique_id(), special.unique_id());
    assert_eq!(special.without_special(), plain);
    assert_eq!(special.as_raw() >> 63, 1);
}

#[test]
fn test_fields_are_truncated_to_layout() {
    let r = NetReference::object(u64::MAX, u32::MAX);
    assert_eq!(r.object_id(), MAX_OBJECT_ID);
    assert_eq!(r.class_id(), MAX_CLASS_ID);
    assert!(!r.is_class_instance());
    assert!(!r.is_special());
}

#[test]
fn test_raw_round_trip() {
    let raw = 0xc000_0100_0000_0001;
    let r = NetReference::from_raw(raw);
    assert_eq!(u64::from(r), raw);
    assert_eq!(NetReference::from(raw), r);
    assert!(r.is_special());
    assert!(r.is_class_instance());
    assert_eq!(r.class_id(), 1);
    assert_eq!(r.object_id(), 1);
}

#[test]
fn test_display_is_hex() {
    let r = NetReference::from_raw(0xff);
    assert_eq!(r.to_string(), "0x00000000000000ff");
}
