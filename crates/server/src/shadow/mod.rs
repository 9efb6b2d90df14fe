//! Shadow objects
//!
//! The server never sees client objects, only their `NetReference`s and
//! whatever metadata the client chose to send. This module rebuilds enough
//! of the object graph from that metadata for analyses to work with:
//!
//! - [`ShadowClass`] - name, loader, class file outline and class object identity
//! - [`ShadowEntry`] - class, string, thread or generic object
//! - [`ShadowState`] - per-entry slot where analyses keep their own data
//! - [`ShadowTable`] - the per-session store, owned by the session worker

mod class;
pub mod classfile;
mod entry;
mod state;
mod table;

pub use class::{CLASS_CLASS, ClassBinding, OBJECT_CLASS, STRING_CLASS, ShadowClass, THREAD_CLASS};
pub use classfile::{ClassOutline, MemberInfo, split_method_descriptor};
pub use entry::{ShadowEntry, ShadowObject, ShadowString, ShadowThread, ThreadData};
pub use state::ShadowState;
pub use table::ShadowTable;
