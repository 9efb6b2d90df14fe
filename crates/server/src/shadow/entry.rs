//! Shadow entries handed to analyses

use std::fmt;
use std::sync::Arc;

use shadowvm_protocol::NetReference;

use super::class::ShadowClass;
use super::state::ShadowState;

/// Generic object: identity and class only
#[derive(Debug, Clone)]
pub struct ShadowObject {
    pub net_ref: NetReference,
    pub class: Arc<ShadowClass>,
    pub state: ShadowState,
}

/// String object; the value arrives with STRING_INFO or inline data
#[derive(Debug, Clone)]
pub struct ShadowString {
    pub net_ref: NetReference,
    pub class: Option<Arc<ShadowClass>>,
    pub value: Option<String>,
    pub state: ShadowState,
}

/// Name and daemon flag of a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadData {
    pub name: String,
    pub daemon: bool,
}

/// Thread object; the data arrives with THREAD_INFO or inline data
#[derive(Debug, Clone)]
pub struct ShadowThread {
    pub net_ref: NetReference,
    pub class: Option<Arc<ShadowClass>>,
    pub info: Option<ThreadData>,
    pub state: ShadowState,
}

/// Anything the shadow table can hold for a reference
#[derive(Debug, Clone)]
pub enum ShadowEntry {
    Class(Arc<ShadowClass>),
    String(ShadowString),
    Thread(ShadowThread),
    Object(ShadowObject),
}

impl ShadowEntry {
    /// Entry kind, used in errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Class(_) => "class",
            Self::String(_) => "string",
            Self::Thread(_) => "thread",
            Self::Object(_) => "object",
        }
    }

    /// Reference the entry was created for
    ///
    /// `None` for classes that were registered but never bound.
    pub fn net_ref(&self) -> Option<NetReference> {
        match self {
            Self::Class(class) => class.binding().map(|b| b.class_ref),
            Self::String(s) => Some(s.net_ref),
            Self::Thread(t) => Some(t.net_ref),
            Self::Object(o) => Some(o.net_ref),
        }
    }

    /// Class of the object (the class itself for class entries)
    pub fn class(&self) -> Option<&Arc<ShadowClass>> {
        match self {
            Self::Class(class) => Some(class),
            Self::String(s) => s.class.as_ref(),
            Self::Thread(t) => t.class.as_ref(),
            Self::Object(o) => Some(&o.class),
        }
    }

    /// Analysis state slot, shared by every clone of this entry
    pub fn state(&self) -> &ShadowState {
        match self {
            Self::Class(class) => class.state(),
            Self::String(s) => &s.state,
            Self::Thread(t) => &t.state,
            Self::Object(o) => &o.state,
        }
    }

    pub fn as_class(&self) -> Option<&Arc<ShadowClass>> {
        match self {
            Self::Class(class) => Some(class),
            _ => None,
        }
    }

    /// String value, if this is a string whose value is known
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => s.value.as_deref(),
            _ => None,
        }
    }

    pub fn as_thread(&self) -> Option<&ShadowThread> {
        match self {
            Self::Thread(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for ShadowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(class) => write!(f, "class {}", class.name()),
            Self::String(ShadowString {
                value: Some(value), ..
            }) => write!(f, "{value:?}"),
            Self::String(s) => write!(f, "java/lang/String@{}", s.net_ref.object_id()),
            Self::Thread(ShadowThread {
                info: Some(info), ..
            }) => write!(f, "thread {:?}{}", info.name, if info.daemon { " (daemon)" } else { "" }),
            Self::Thread(t) => write!(f, "thread@{}", t.net_ref.object_id()),
            Self::Object(o) => write!(f, "{}@{}", o.class.name(), o.net_ref.object_id()),
        }
    }
}
