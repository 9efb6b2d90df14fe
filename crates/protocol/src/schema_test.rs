//! Tests for request tags and argument kinds

use crate::schema::{ArgKind, INLINE_STRING_DATA, INLINE_THREAD_DATA, RequestTag};

// =============================================================================
// RequestTag tests
// =============================================================================

#[test]
fn test_request_tag_roundtrip() {
    for tag in RequestTag::ALL {
        assert_eq!(RequestTag::from_u8(tag.as_u8()), Some(tag));
    }
}

#[test]
fn test_request_tag_wire_values() {
    assert_eq!(RequestTag::Close.as_u8(), 0);
    assert_eq!(RequestTag::Analyze.as_u8(), 1);
    assert_eq!(RequestTag::ObjectFree.as_u8(), 2);
    assert_eq!(RequestTag::NewClass.as_u8(), 3);
    assert_eq!(RequestTag::ClassInfo.as_u8(), 4);
    assert_eq!(RequestTag::StringInfo.as_u8(), 5);
    assert_eq!(RequestTag::RegisterAnalysis.as_u8(), 6);
    assert_eq!(RequestTag::ThreadInfo.as_u8(), 7);
}

#[test]
fn test_request_tag_unassigned_values() {
    assert_eq!(RequestTag::from_u8(8), None);
    assert_eq!(RequestTag::from_u8(100), None);
    assert_eq!(RequestTag::from_u8(255), None);
}

#[test]
fn test_request_tag_display() {
    assert_eq!(RequestTag::Analyze.to_string(), "analyze");
    assert_eq!(RequestTag::RegisterAnalysis.to_string(), "register_analysis");
}

// =============================================================================
// ArgKind tests
// =============================================================================

#[test]
fn test_arg_kind_roundtrip() {
    for value in 1..=9u8 {
        let kind = ArgKind::from_u8(value).unwrap();
        assert_eq!(kind.as_u8(), value);
    }
}

#[test]
fn test_arg_kind_rejects_zero_and_inline_kinds() {
    assert_eq!(ArgKind::from_u8(0), None);
    assert_eq!(ArgKind::from_u8(INLINE_STRING_DATA), None);
    assert_eq!(ArgKind::from_u8(INLINE_THREAD_DATA), None);
}

#[test]
fn test_arg_kind_widths() {
    assert_eq!(ArgKind::Boolean.width(), 1);
    assert_eq!(ArgKind::Byte.width(), 1);
    assert_eq!(ArgKind::Char.width(), 2);
    assert_eq!(ArgKind::Short.width(), 2);
    assert_eq!(ArgKind::Int.width(), 4);
    assert_eq!(ArgKind::Float.width(), 4);
    assert_eq!(ArgKind::Long.width(), 8);
    assert_eq!(ArgKind::Double.width(), 8);
    assert_eq!(ArgKind::Object.width(), 8);
}

#[test]
fn test_arg_kind_display() {
    assert_eq!(ArgKind::Int.to_string(), "int");
    assert_eq!(ArgKind::Object.to_string(), "object");
}
