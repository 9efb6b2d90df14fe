//! ShadowVM Client Library
//!
//! This crate is linked into the instrumented process. It provides:
//!
//! - [`bypass`] - Per-thread reentrancy guard around the send path
//! - [`ShadowClient`] - Event registration, encoding and the channel writer
//! - [`RefAllocator`] - Client-side `NetReference` assignment
//!
//! # Quick Start
//!
//! ```no_run
//! use shadowvm_client::{ClientConfig, ObjectData, ShadowClient};
//! use shadowvm_protocol::NetReference;
//!
//! let client = ShadowClient::connect("127.0.0.1:11218", ClientConfig::default())?;
//!
//! let string_class = client.load_class("java/lang/String", NetReference::NULL, &[], None)?;
//! let greeting = client.new_object(string_class)?;
//!
//! let id = client.register_method("shadowvm.EventLogger.onGreeting")?;
//! let mut event = client.analysis_start(id)?;
//! event.send_object_plus_data(greeting, ObjectData::String("hello"))?;
//! event.send_int(1);
//! event.analysis_end()?;
//!
//! client.close()?;
//! # Ok::<(), shadowvm_client::ClientError>(())
//! ```
//!
//! # Reentrancy
//!
//! Every send holds the calling thread's bypass flag. Instrumentation must
//! check [`bypass::is_active`] and skip event emission while it is set;
//! otherwise code run by the client itself would produce events.

pub mod bypass;
mod client;
mod error;
mod refs;
mod registry;

pub use bypass::BypassGuard;
pub use client::{ClientConfig, DEFAULT_BUFFER_SIZE, Invocation, ObjectData, ShadowClient};
pub use error::{ClientError, Result};
pub use refs::RefAllocator;
pub use registry::EventRegistry;

// Re-export protocol types
pub use shadowvm_protocol::{EventId, NetReference};

#[cfg(test)]
mod registry_test;
