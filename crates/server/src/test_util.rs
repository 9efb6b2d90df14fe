//! Helpers shared by the unit tests

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use shadowvm_protocol::ArgKind;

use crate::analysis::{AnalysisRegistry, DisplayArgs, MethodSignature, RemoteAnalysis, Value};
use crate::error::AnalysisError;
use crate::shadow::ShadowEntry;

// =============================================================================
// Class files
// =============================================================================

/// Assemble a minimal public class file with private fields and public methods
pub(crate) fn class_file(
    name: &str,
    super_name: Option<&str>,
    interfaces: &[&str],
    fields: &[(&str, &str)],
    methods: &[(&str, &str)],
) -> Vec<u8> {
    let fields: Vec<_> = fields.iter().map(|&(n, d)| (0x0002u16, n, d)).collect();
    let methods: Vec<_> = methods.iter().map(|&(n, d)| (0x0001u16, n, d)).collect();
    class_file_with(0x0021, name, super_name, interfaces, &fields, &methods)
}

/// Assemble a minimal class file with explicit access flags
///
/// Constant pool layout: for every class name a Utf8 followed by a Class
/// entry, then Utf8 entries for member names and descriptors. A Long
/// constant is included to exercise the two-slot rule.
pub(crate) fn class_file_with(
    access_flags: u16,
    name: &str,
    super_name: Option<&str>,
    interfaces: &[&str],
    fields: &[(u16, &str, &str)],
    methods: &[(u16, &str, &str)],
) -> Vec<u8> {
    let mut pool = BytesMut::new();
    let mut count: u16 = 1;

    let this_index = class_entry(&mut pool, &mut count, name);
    let super_index = super_name.map_or(0, |s| class_entry(&mut pool, &mut count, s));
    let interface_indices: Vec<u16> = interfaces
        .iter()
        .map(|i| class_entry(&mut pool, &mut count, i))
        .collect();

    // Long takes two slots
    pool.put_u8(5);
    pool.put_u64(42);
    count += 2;

    let field_indices = members(&mut pool, &mut count, fields);
    let method_indices = members(&mut pool, &mut count, methods);
    let code_attr = utf8(&mut pool, &mut count, "Code");

    let mut out = BytesMut::new();
    out.put_u32(0xCAFE_BABE);
    out.put_u16(0);
    out.put_u16(61);
    out.put_u16(count);
    out.put_slice(&pool);
    out.put_u16(access_flags);
    out.put_u16(this_index);
    out.put_u16(super_index);
    out.put_u16(interface_indices.len() as u16);
    for index in interface_indices {
        out.put_u16(index);
    }

    out.put_u16(field_indices.len() as u16);
    for (access, n, d) in field_indices {
        out.put_u16(access);
        out.put_u16(n);
        out.put_u16(d);
        out.put_u16(0);
    }

    out.put_u16(method_indices.len() as u16);
    for (access, n, d) in method_indices {
        out.put_u16(access);
        out.put_u16(n);
        out.put_u16(d);
        // one opaque attribute, skipped by the reader
        out.put_u16(1);
        out.put_u16(code_attr);
        out.put_u32(3);
        out.put_slice(&[0xb1, 0x00, 0x00]);
    }

    // class attributes
    out.put_u16(0);
    out.to_vec()
}

fn utf8(pool: &mut BytesMut, count: &mut u16, s: &str) -> u16 {
    pool.put_u8(1);
    pool.put_u16(s.len() as u16);
    pool.put_slice(s.as_bytes());
    *count += 1;
    *count - 1
}

fn class_entry(pool: &mut BytesMut, count: &mut u16, class: &str) -> u16 {
    let name_index = utf8(pool, count, class);
    pool.put_u8(7);
    pool.put_u16(name_index);
    *count += 1;
    *count - 1
}

fn members(pool: &mut BytesMut, count: &mut u16, list: &[(u16, &str, &str)]) -> Vec<(u16, u16, u16)> {
    list.iter()
        .map(|&(access, n, d)| (access, utf8(pool, count, n), utf8(pool, count, d)))
        .collect()
}

// =============================================================================
// Recording analysis
// =============================================================================

/// Calls seen by [`Recorder`] instances, as `label:what` strings
pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

/// Analysis that records every hook call
///
/// Methods: `point(int, int)`, `obj(object)`, `fail()` (always errors),
/// `any(...)` and `visit(object)`, which counts visits in the object's
/// state and logs the running count.
pub(crate) struct Recorder {
    label: &'static str,
    log: CallLog,
}

impl RemoteAnalysis for Recorder {
    fn method(&mut self, name: &str) -> Option<MethodSignature> {
        match name {
            "point" => Some(MethodSignature::new(0, [ArgKind::Int, ArgKind::Int])),
            "obj" => Some(MethodSignature::new(1, [ArgKind::Object])),
            "fail" => Some(MethodSignature::new(2, Vec::<ArgKind>::new())),
            "any" => Some(MethodSignature::any(3)),
            "visit" => Some(MethodSignature::new(4, [ArgKind::Object])),
            _ => None,
        }
    }

    fn invoke(&mut self, slot: usize, args: &[Value]) -> Result<(), AnalysisError> {
        if slot == 2 {
            return Err(AnalysisError::failed("boom"));
        }
        if slot == 4 {
            let Some(entry) = args[0].as_object() else {
                return Err(AnalysisError::failed("null visit"));
            };
            let visits = {
                let mut count = entry
                    .state()
                    .get_or_insert_with(|| 0u32)
                    .ok_or_else(|| AnalysisError::failed("foreign state"))?;
                *count += 1;
                *count
            };
            self.log
                .lock()
                .push(format!("{}:visit {} #{}", self.label, entry, visits));
            return Ok(());
        }
        self.log
            .lock()
            .push(format!("{}:{}({})", self.label, slot, DisplayArgs(args)));
        Ok(())
    }

    fn at_exit(&mut self) {
        self.log.lock().push(format!("{}:exit", self.label));
    }

    fn object_free(&mut self, entry: &ShadowEntry) {
        self.log.lock().push(format!("{}:free {}", self.label, entry));
    }
}

/// Registry with `test.First` and `test.Second` recorders sharing one log
pub(crate) fn recording_registry() -> (Arc<AnalysisRegistry>, CallLog) {
    let log = CallLog::default();
    let mut registry = AnalysisRegistry::new();
    for (name, label) in [("test.First", "first"), ("test.Second", "second")] {
        let log = Arc::clone(&log);
        registry.register(name, move || {
            Box::new(Recorder {
                label,
                log: Arc::clone(&log),
            }) as Box<dyn RemoteAnalysis>
        });
    }
    (Arc::new(registry), log)
}

/// Drain the recorded calls
pub(crate) fn take_calls(log: &CallLog) -> Vec<String> {
    std::mem::take(&mut *log.lock())
}
