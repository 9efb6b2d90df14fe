//! ShadowVM Server - Shadow object tables and remote analyses
//!
//! The server side of the event channel. Each accepted connection becomes a
//! session with its own shadow table and analysis instances; sessions share
//! nothing mutable beyond the metric counters.
//!
//! # Architecture
//!
//! ```text
//! TcpListener → Session task → HandlerTable::dispatch(tag)
//!                                  ├─ NEW_CLASS / CLASS_INFO / STRING_INFO / THREAD_INFO → ShadowTable
//!                                  ├─ REGISTER_ANALYSIS → AnalysisInvoker::register
//!                                  ├─ ANALYZE → AnalysisInvoker::invoke → RemoteAnalysis
//!                                  ├─ OBJECT_FREE → ShadowTable::free → RemoteAnalysis::object_free
//!                                  └─ CLOSE
//! ```
//!
//! # Modules
//!
//! - `shadow` - Shadow classes, objects and the per-session table
//! - `analysis` - Analysis trait, registry and per-session invoker
//! - `dispatch` - Tag to handler table
//! - `session` - Per-connection read loop
//! - `server` - TCP accept loop

pub mod analysis;
pub mod dispatch;
mod error;
pub mod handlers;
mod metrics;
mod server;
pub mod session;
pub mod shadow;

pub use analysis::{
    AnalysisFactory, AnalysisInvoker, AnalysisRegistry, MethodSignature, Params, RemoteAnalysis,
    Value,
};
pub use dispatch::{HandlerTable, RequestHandler};
pub use error::{AnalysisError, Result, ServerError, SessionError, ShadowError};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use server::{DEFAULT_BUFFER_SIZE, DEFAULT_SOCKET_BUFFER_SIZE, ServerConfig, ShadowServer};
pub use session::{Session, SessionConfig, SessionEnd, SessionState};
pub use shadow::{ShadowClass, ShadowEntry, ShadowState, ShadowTable};

#[cfg(test)]
mod session_test;
#[cfg(test)]
mod test_util;
