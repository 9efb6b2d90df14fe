//! Built-in analyses
//!
//! - `shadowvm.EventCounter` - counts invocations per method and frees,
//!   reports per session at exit and aggregates into [`EventCounts`]
//! - `shadowvm.EventLogger` - logs every invocation with its resolved
//!   arguments
//!
//! Both accept any method name with any arguments.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::registry::AnalysisRegistry;
use super::{DisplayArgs, MethodSignature, RemoteAnalysis, Value};
use crate::error::AnalysisError;
use crate::shadow::ShadowEntry;

/// Name of the counting analysis
pub const EVENT_COUNTER: &str = "shadowvm.EventCounter";

/// Name of the logging analysis
pub const EVENT_LOGGER: &str = "shadowvm.EventLogger";

/// Register the built-in analyses
///
/// Every `EventCounter` instance created by `registry` reports into `counts`.
pub fn register_builtins(registry: &mut AnalysisRegistry, counts: &EventCounts) {
    let counts = counts.clone();
    registry.register(EVENT_COUNTER, move || {
        Box::new(EventCounter::new(counts.clone())) as Box<dyn RemoteAnalysis>
    });
    registry.register(EVENT_LOGGER, || {
        Box::new(EventLogger::default()) as Box<dyn RemoteAnalysis>
    });
}

/// Totals across all finished sessions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountsSnapshot {
    /// Sessions whose counter reached `at_exit`
    pub sessions: u64,
    /// Invocations per method name
    pub invocations: BTreeMap<String, u64>,
    pub frees: u64,
}

impl CountsSnapshot {
    pub fn total_invocations(&self) -> u64 {
        self.invocations.values().sum()
    }
}

/// Shared sink for `EventCounter` results
#[derive(Debug, Clone, Default)]
pub struct EventCounts {
    inner: Arc<Mutex<CountsSnapshot>>,
}

impl EventCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CountsSnapshot {
        self.inner.lock().clone()
    }

    fn merge(&self, methods: &[String], counts: &[u64], frees: u64) {
        let mut inner = self.inner.lock();
        inner.sessions += 1;
        inner.frees += frees;
        for (method, count) in methods.iter().zip(counts) {
            *inner.invocations.entry(method.clone()).or_default() += count;
        }
    }
}

// =============================================================================
// EventCounter
// =============================================================================

/// Counts invocations per method
#[derive(Debug)]
pub struct EventCounter {
    shared: EventCounts,
    methods: Vec<String>,
    counts: Vec<u64>,
    frees: u64,
    finished: bool,
}

impl EventCounter {
    pub fn new(shared: EventCounts) -> Self {
        Self {
            shared,
            methods: Vec::new(),
            counts: Vec::new(),
            frees: 0,
            finished: false,
        }
    }

    /// Invocations of `method` in this session so far
    pub fn count(&self, method: &str) -> u64 {
        self.methods
            .iter()
            .position(|m| m == method)
            .map_or(0, |slot| self.counts[slot])
    }
}

impl RemoteAnalysis for EventCounter {
    fn method(&mut self, name: &str) -> Option<MethodSignature> {
        let slot = match self.methods.iter().position(|m| m == name) {
            Some(slot) => slot,
            None => {
                self.methods.push(name.to_string());
                self.counts.push(0);
                self.methods.len() - 1
            }
        };
        Some(MethodSignature::any(slot))
    }

    fn invoke(&mut self, slot: usize, _args: &[Value]) -> Result<(), AnalysisError> {
        let count = self
            .counts
            .get_mut(slot)
            .ok_or_else(|| AnalysisError::failed(format!("no method in slot {slot}")))?;
        *count += 1;
        Ok(())
    }

    fn at_exit(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        for (method, count) in self.methods.iter().zip(&self.counts) {
            tracing::info!(analysis = EVENT_COUNTER, method = %method, count, "invocations");
        }
        tracing::info!(analysis = EVENT_COUNTER, frees = self.frees, "objects freed");
        self.shared.merge(&self.methods, &self.counts, self.frees);
    }

    fn object_free(&mut self, _entry: &ShadowEntry) {
        self.frees += 1;
    }
}

// =============================================================================
// EventLogger
// =============================================================================

/// Logs every invocation at info level
#[derive(Debug, Default)]
pub struct EventLogger {
    methods: Vec<String>,
}

impl RemoteAnalysis for EventLogger {
    fn method(&mut self, name: &str) -> Option<MethodSignature> {
        self.methods.push(name.to_string());
        Some(MethodSignature::any(self.methods.len() - 1))
    }

    fn invoke(&mut self, slot: usize, args: &[Value]) -> Result<(), AnalysisError> {
        let method = self
            .methods
            .get(slot)
            .ok_or_else(|| AnalysisError::failed(format!("no method in slot {slot}")))?;
        tracing::info!(method = %method, args = %DisplayArgs(args), "event");
        Ok(())
    }

    fn at_exit(&mut self) {
        tracing::debug!(analysis = EVENT_LOGGER, methods = self.methods.len(), "session finished");
    }

    fn object_free(&mut self, entry: &ShadowEntry) {
        tracing::debug!(object = %entry, "object freed");
    }
}
