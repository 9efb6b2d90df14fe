//! Remote analyses
//!
//! Analysis code runs on the server, fed by ANALYZE messages. An analysis
//! is a named [`RemoteAnalysis`] object; clients address its methods as
//! `analysis.method` when they register an event id.
//!
//! # Lifecycle
//!
//! ```text
//! REGISTER_ANALYSIS "pkg.Counter.hit"
//!     → registry.create("pkg.Counter")   (once per session)
//!     → analysis.method("hit")           → MethodSignature
//! ANALYZE event_id args...
//!     → analysis.invoke(slot, &values)
//! OBJECT_FREE refs...
//!     → analysis.object_free(&entry)     (every analysis of the session)
//! session end
//!     → analysis.at_exit()               (once)
//! ```
//!
//! # Adding an Analysis
//!
//! ```ignore
//! struct Points { seen: u64 }
//!
//! impl RemoteAnalysis for Points {
//!     fn method(&mut self, name: &str) -> Option<MethodSignature> {
//!         (name == "point").then(|| MethodSignature::new(0, [ArgKind::Int, ArgKind::Int]))
//!     }
//!
//!     fn invoke(&mut self, _slot: usize, _args: &[Value]) -> Result<(), AnalysisError> {
//!         self.seen += 1;
//!         Ok(())
//!     }
//! }
//!
//! registry.register("demo.Points", || Box::new(Points { seen: 0 }) as Box<dyn RemoteAnalysis>);
//! ```

pub mod builtin;
mod invoker;
mod registry;

pub use invoker::AnalysisInvoker;
pub use registry::{AnalysisFactory, AnalysisRegistry};

use std::fmt;

use shadowvm_protocol::ArgKind;

use crate::error::AnalysisError;
use crate::shadow::{ShadowEntry, split_method_descriptor};


// =============================================================================
// Values
// =============================================================================

/// A fully materialized invocation argument
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Shadow of an object argument, `None` for null
    Object(Option<ShadowEntry>),
}

impl Value {
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Boolean(_) => ArgKind::Boolean,
            Self::Byte(_) => ArgKind::Byte,
            Self::Char(_) => ArgKind::Char,
            Self::Short(_) => ArgKind::Short,
            Self::Int(_) => ArgKind::Int,
            Self::Long(_) => ArgKind::Long,
            Self::Float(_) => ArgKind::Float,
            Self::Double(_) => ArgKind::Double,
            Self::Object(_) => ArgKind::Object,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Boolean(v) => Some(v),
            _ => None,
        }
    }

    /// Integral value widened to `i64` (byte, char, short, int, long)
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(v.into()),
            Self::Char(v) => Some(v.into()),
            Self::Short(v) => Some(v.into()),
            Self::Int(v) => Some(v.into()),
            Self::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Floating point value widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v.into()),
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Shadow entry of a non-null object argument
    pub fn as_object(&self) -> Option<&ShadowEntry> {
        match self {
            Self::Object(entry) => entry.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "{c:?}"),
                None => write!(f, "\\u{v:04x}"),
            },
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Object(Some(entry)) => write!(f, "{entry}"),
            Self::Object(None) => f.write_str("null"),
        }
    }
}

/// Comma separated argument list, for logs
pub struct DisplayArgs<'a>(pub &'a [Value]);

impl fmt::Display for DisplayArgs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Signatures
// =============================================================================

/// Parameter kinds accepted by a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Params {
    /// Exactly these kinds, in order
    Fixed(Vec<ArgKind>),
    /// Any number of arguments of any kind
    Any,
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(kinds) => write_kinds(f, kinds),
            Self::Any => f.write_str("..."),
        }
    }
}

fn write_kinds(f: &mut fmt::Formatter<'_>, kinds: &[ArgKind]) -> fmt::Result {
    for (i, kind) in kinds.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(kind.as_str())?;
    }
    Ok(())
}

/// Argument kinds as a display string, used in mismatch errors
pub(crate) fn kinds_to_string(kinds: &[ArgKind]) -> String {
    Params::Fixed(kinds.to_vec()).to_string()
}

/// Resolved analysis method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Analysis-defined method index, passed back to `invoke`
    pub slot: usize,
    pub params: Params,
}

impl MethodSignature {
    pub fn new(slot: usize, params: impl Into<Vec<ArgKind>>) -> Self {
        Self {
            slot,
            params: Params::Fixed(params.into()),
        }
    }

    /// Signature accepting any arguments
    pub fn any(slot: usize) -> Self {
        Self {
            slot,
            params: Params::Any,
        }
    }

    /// Signature from a JVM method descriptor such as `(IJLjava/lang/String;)V`
    ///
    /// Reference and array parameters map to [`ArgKind::Object`]. Returns
    /// `None` for malformed descriptors.
    pub fn from_descriptor(slot: usize, descriptor: &str) -> Option<Self> {
        let (params, _) = split_method_descriptor(descriptor)?;
        let kinds = params
            .iter()
            .map(|p| descriptor_kind(p))
            .collect::<Option<Vec<_>>>()?;
        Some(Self::new(slot, kinds))
    }

    /// Whether an invocation with these argument kinds may be delivered
    pub fn accepts(&self, kinds: &[ArgKind]) -> bool {
        match &self.params {
            Params::Fixed(expected) => expected.as_slice() == kinds,
            Params::Any => true,
        }
    }
}

fn descriptor_kind(field: &str) -> Option<ArgKind> {
    Some(match field.as_bytes().first()? {
        b'Z' => ArgKind::Boolean,
        b'B' => ArgKind::Byte,
        b'C' => ArgKind::Char,
        b'S' => ArgKind::Short,
        b'I' => ArgKind::Int,
        b'J' => ArgKind::Long,
        b'F' => ArgKind::Float,
        b'D' => ArgKind::Double,
        b'L' | b'[' => ArgKind::Object,
        _ => return None,
    })
}

// =============================================================================
// Analysis trait
// =============================================================================

/// Analysis code executed on behalf of a client
///
/// Each session gets its own instance, so implementations need no
/// synchronization for their own state. Errors returned from `invoke` are
/// logged and counted by the server; they never end the session.
pub trait RemoteAnalysis: Send {
    /// Resolve a method name to its signature
    ///
    /// Called once per REGISTER_ANALYSIS naming the method. `None` makes the
    /// registration fail with an unknown method error.
    fn method(&mut self, name: &str) -> Option<MethodSignature>;

    /// Run the method in `slot` with fully materialized arguments
    fn invoke(&mut self, slot: usize, args: &[Value]) -> Result<(), AnalysisError>;

    /// Called once when the session ends
    fn at_exit(&mut self) {}

    /// Called when the client reports an object as reclaimed
    ///
    /// The entry has already left the shadow table and is dropped once every
    /// analysis has seen it.
    fn object_free(&mut self, _entry: &ShadowEntry) {}
}
