//! Per-session analysis invoker
//!
//! Owns the session's analysis instances and the event id bindings made by
//! REGISTER_ANALYSIS. Instances are kept in creation order, which is the
//! order their hooks run in.

use std::collections::HashMap;
use std::sync::Arc;

use shadowvm_protocol::{ArgKind, Argument, EventId, Invocation, SpecialPayload};

use super::registry::AnalysisRegistry;
use super::{MethodSignature, RemoteAnalysis, Value, kinds_to_string};
use crate::error::{Result, SessionError};
use crate::shadow::{ShadowEntry, ShadowTable};

struct Instance {
    name: String,
    analysis: Box<dyn RemoteAnalysis>,
}

struct BoundEvent {
    /// Qualified method name as registered
    method: String,
    instance: usize,
    signature: MethodSignature,
}

/// Routes invocations to analysis instances
pub struct AnalysisInvoker {
    registry: Arc<AnalysisRegistry>,
    instances: Vec<Instance>,
    events: HashMap<EventId, BoundEvent>,
    errors: u64,
    exited: bool,
}

impl AnalysisInvoker {
    pub fn new(registry: Arc<AnalysisRegistry>) -> Self {
        Self {
            registry,
            instances: Vec::new(),
            events: HashMap::new(),
            errors: 0,
            exited: false,
        }
    }

    /// Bind `event_id` to a qualified `analysis.method` name
    ///
    /// The analysis is instantiated on first use. Registering the same
    /// binding again is a no-op.
    pub fn register(&mut self, event_id: EventId, qualified: &str) -> Result<()> {
        if let Some(bound) = self.events.get(&event_id) {
            if bound.method == qualified {
                return Ok(());
            }
            return Err(SessionError::DuplicateEventId {
                event_id,
                existing: bound.method.clone(),
                new: qualified.to_string(),
            });
        }

        let (analysis, method) = qualified
            .rsplit_once('.')
            .filter(|(analysis, method)| !analysis.is_empty() && !method.is_empty())
            .ok_or_else(|| SessionError::InvalidMethodName(qualified.to_string()))?;

        let instance = self.instance(analysis)?;
        let signature = self.instances[instance]
            .analysis
            .method(method)
            .ok_or_else(|| SessionError::UnknownMethod {
                analysis: analysis.to_string(),
                method: method.to_string(),
            })?;

        tracing::debug!(
            event_id = %event_id,
            method = qualified,
            params = %signature.params,
            "analysis method registered"
        );
        self.events.insert(
            event_id,
            BoundEvent {
                method: qualified.to_string(),
                instance,
                signature,
            },
        );
        Ok(())
    }

    /// Index of the session's instance of `name`, creating it if needed
    fn instance(&mut self, name: &str) -> Result<usize> {
        if let Some(index) = self.instances.iter().position(|i| i.name == name) {
            return Ok(index);
        }
        let analysis = self
            .registry
            .create(name)
            .ok_or_else(|| SessionError::UnknownAnalysis(name.to_string()))?;

        tracing::debug!(analysis = name, "analysis instantiated");
        self.instances.push(Instance {
            name: name.to_string(),
            analysis,
        });
        Ok(self.instances.len() - 1)
    }

    /// Deliver one invocation
    ///
    /// Inline payloads are applied to `shadows` first, then argument kinds
    /// are checked and object arguments materialized. The callback runs
    /// exactly once; an error it returns is logged and counted.
    pub fn invoke(&mut self, invocation: &Invocation<'_>, shadows: &mut ShadowTable) -> Result<()> {
        let event_id = invocation.event_id;
        let bound = self
            .events
            .get(&event_id)
            .ok_or(SessionError::UnknownEventId(event_id))?;

        for special in &invocation.specials {
            match special {
                SpecialPayload::String(info) => shadows.register_string(info.net_ref, info.value)?,
                SpecialPayload::Thread(info) => {
                    shadows.register_thread(info.net_ref, info.name, info.daemon)?
                }
            }
        }

        let kinds: Vec<ArgKind> = invocation.args.iter().map(Argument::kind).collect();
        if !bound.signature.accepts(&kinds) {
            return Err(SessionError::ArgumentMismatch {
                event_id,
                expected: bound.signature.params.to_string(),
                found: kinds_to_string(&kinds),
            });
        }

        let mut values = Vec::with_capacity(invocation.args.len());
        for arg in &invocation.args {
            values.push(match *arg {
                Argument::Boolean(v) => Value::Boolean(v),
                Argument::Byte(v) => Value::Byte(v),
                Argument::Char(v) => Value::Char(v),
                Argument::Short(v) => Value::Short(v),
                Argument::Int(v) => Value::Int(v),
                Argument::Long(v) => Value::Long(v),
                Argument::Float(v) => Value::Float(v),
                Argument::Double(v) => Value::Double(v),
                Argument::Object(r) => Value::Object(shadows.materialize(r)?),
            });
        }

        let instance = &mut self.instances[bound.instance];
        if let Err(e) = instance.analysis.invoke(bound.signature.slot, &values) {
            self.errors += 1;
            tracing::warn!(
                event_id = %event_id,
                method = %bound.method,
                error = %e,
                "analysis callback failed"
            );
        }
        Ok(())
    }

    /// Tell every analysis that an object was reclaimed
    pub fn object_free(&mut self, entry: &ShadowEntry) {
        for instance in &mut self.instances {
            instance.analysis.object_free(entry);
        }
    }

    /// Run every analysis's exit hook, once
    pub fn at_exit(&mut self) {
        if self.exited {
            return;
        }
        self.exited = true;
        for instance in &mut self.instances {
            tracing::trace!(analysis = %instance.name, "running exit hook");
            instance.analysis.at_exit();
        }
    }

    /// Qualified method name bound to `event_id`
    pub fn method_name(&self, event_id: EventId) -> Option<&str> {
        self.events.get(&event_id).map(|b| b.method.as_str())
    }

    /// Errors returned by analysis callbacks so far
    #[inline]
    pub fn errors(&self) -> u64 {
        self.errors
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn analysis_count(&self) -> usize {
        self.instances.len()
    }
}

impl std::fmt::Debug for AnalysisInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisInvoker")
            .field("analyses", &self.instances.iter().map(|i| &i.name).collect::<Vec<_>>())
            .field("events", &self.events.len())
            .field("errors", &self.errors)
            .finish()
    }
}
