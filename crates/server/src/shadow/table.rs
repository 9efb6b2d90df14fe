//! Per-session shadow object table
//!
//! Classes are keyed twice: by `(loader, name)` from NEW_CLASS, and by class
//! id once CLASS_INFO binds them to a class object. A bound class whose
//! superclass is not bound yet waits until it is, then gets linked. Every
//! other entry is keyed by object id. Nothing is evicted: entries leave the table only
//! through [`ShadowTable::free`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use shadowvm_protocol::NetReference;

use super::class::{ClassBinding, ShadowClass, THREAD_CLASS};
use super::classfile::ClassOutline;
use super::entry::{ShadowEntry, ShadowObject, ShadowString, ShadowThread, ThreadData};
use super::state::ShadowState;
use crate::error::ShadowError;

type Result<T> = std::result::Result<T, ShadowError>;

/// Shadow state of one session
#[derive(Debug, Default)]
pub struct ShadowTable {
    classes: HashMap<NetReference, HashMap<String, Arc<ShadowClass>>>,
    class_ids: HashMap<u32, Arc<ShadowClass>>,
    /// Bound classes waiting for their superclass, by superclass id
    unlinked: HashMap<u32, Vec<Arc<ShadowClass>>>,
    objects: HashMap<u64, ShadowEntry>,
}

impl ShadowTable {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Classes
    // =========================================================================

    /// Register a loaded class
    ///
    /// Classes load once per loader, so a repeated `(name, loader)` returns
    /// the existing class and ignores `code`. Unreadable bytecode is logged
    /// and the class is kept without an outline.
    pub fn register_class(&mut self, name: &str, loader: NetReference, code: &[u8]) -> Arc<ShadowClass> {
        if let Some(existing) = self.find_class(name, loader) {
            tracing::trace!(class = name, loader = %loader, "class already registered");
            return Arc::clone(existing);
        }

        let outline = if code.is_empty() {
            None
        } else {
            match ClassOutline::parse(code) {
                Ok(outline) => {
                    if outline.name != name {
                        tracing::warn!(
                            class = name,
                            class_file_name = %outline.name,
                            "class file name differs from announced name"
                        );
                    }
                    Some(outline)
                }
                Err(e) => {
                    tracing::warn!(
                        class = name,
                        code_len = code.len(),
                        error = %e,
                        "unreadable class file, keeping class without outline"
                    );
                    None
                }
            }
        };

        self.insert_class(name, loader, outline)
    }

    fn insert_class(&mut self, name: &str, loader: NetReference, outline: Option<ClassOutline>) -> Arc<ShadowClass> {
        let class = Arc::new(ShadowClass::new(name, loader, outline));
        self.classes
            .entry(loader)
            .or_default()
            .insert(name.to_string(), Arc::clone(&class));
        class
    }

    /// Bind a class to its class object reference
    ///
    /// Creates the class without an outline if it was never registered
    /// (array, primitive and generated classes have no class file). Links
    /// the superclass if it is bound, and any bound subclasses that were
    /// waiting for this class.
    pub fn bind_class(
        &mut self,
        class_ref: NetReference,
        name: &str,
        loader: NetReference,
        superclass: Option<NetReference>,
    ) -> Result<Arc<ShadowClass>> {
        let class_id = class_ref.class_id();
        let class = match self.find_class(name, loader) {
            Some(class) => Arc::clone(class),
            None => self.insert_class(name, loader, None),
        };

        if let Some(bound) = self.class_ids.get(&class_id) {
            if Arc::ptr_eq(bound, &class) {
                return Ok(class);
            }
            return Err(ShadowError::ClassConflict {
                class_id,
                existing: bound.name().to_string(),
                new: name.to_string(),
            });
        }

        let binding = ClassBinding {
            class_ref: class_ref.without_special(),
            superclass,
        };
        if !class.bind(binding) {
            let existing_id = class.class_id().unwrap_or_default();
            return Err(ShadowError::ClassConflict {
                class_id,
                existing: format!("{name} (class id {existing_id})"),
                new: name.to_string(),
            });
        }

        self.class_ids.insert(class_id, Arc::clone(&class));

        if let Some(superclass) = superclass {
            let super_id = superclass.class_id();
            match self.class_ids.get(&super_id) {
                Some(parent) => link(&class, parent),
                None => self.unlinked.entry(super_id).or_default().push(Arc::clone(&class)),
            }
        }
        if let Some(waiting) = self.unlinked.remove(&class_id) {
            for child in &waiting {
                link(child, &class);
            }
        }
        Ok(class)
    }

    /// Class registered for `(name, loader)`
    pub fn find_class(&self, name: &str, loader: NetReference) -> Option<&Arc<ShadowClass>> {
        self.classes.get(&loader)?.get(name)
    }

    /// Class bound to `class_id`
    #[inline]
    pub fn class_by_id(&self, class_id: u32) -> Option<&Arc<ShadowClass>> {
        self.class_ids.get(&class_id)
    }

    /// Resolved component class of an array class
    ///
    /// Looked up under the array's loader, then the bootstrap loader.
    pub fn component_type(&self, array: &ShadowClass) -> Option<&Arc<ShadowClass>> {
        let name = array.component_name()?;
        self.find_class(name, array.loader())
            .or_else(|| self.find_class(name, NetReference::NULL))
    }

    // =========================================================================
    // Strings and threads
    // =========================================================================

    fn object_key(net_ref: NetReference, expected: &'static str) -> Result<u64> {
        if net_ref.is_class_instance() {
            return Err(ShadowError::type_mismatch(net_ref, expected, "class"));
        }
        if net_ref.is_null() {
            return Err(ShadowError::NullReference);
        }
        Ok(net_ref.object_id())
    }

    /// Set the value of a string object
    ///
    /// Fills an existing string shell or upgrades a generic object; any other
    /// existing entry is a type mismatch.
    pub fn register_string(&mut self, net_ref: NetReference, value: &str) -> Result<()> {
        let key = Self::object_key(net_ref, "string")?;
        let net_ref = net_ref.without_special();

        match self.objects.entry(key) {
            Entry::Occupied(mut slot) => match slot.get_mut() {
                ShadowEntry::String(s) => s.value = Some(value.to_string()),
                ShadowEntry::Object(o) => {
                    let upgraded = ShadowString {
                        net_ref: o.net_ref,
                        class: Some(Arc::clone(&o.class)),
                        value: Some(value.to_string()),
                        state: o.state.clone(),
                    };
                    slot.insert(ShadowEntry::String(upgraded));
                }
                other => return Err(ShadowError::type_mismatch(net_ref, "string", other.kind())),
            },
            Entry::Vacant(slot) => {
                slot.insert(ShadowEntry::String(ShadowString {
                    net_ref,
                    class: self.class_ids.get(&net_ref.class_id()).cloned(),
                    value: Some(value.to_string()),
                    state: ShadowState::default(),
                }));
            }
        }
        Ok(())
    }

    /// Set the name and daemon flag of a thread object
    pub fn register_thread(&mut self, net_ref: NetReference, name: &str, daemon: bool) -> Result<()> {
        let key = Self::object_key(net_ref, "thread")?;
        let net_ref = net_ref.without_special();
        let info = ThreadData {
            name: name.to_string(),
            daemon,
        };

        match self.objects.entry(key) {
            Entry::Occupied(mut slot) => match slot.get_mut() {
                ShadowEntry::Thread(t) => t.info = Some(info),
                ShadowEntry::Object(o) => {
                    let upgraded = ShadowThread {
                        net_ref: o.net_ref,
                        class: Some(Arc::clone(&o.class)),
                        info: Some(info),
                        state: o.state.clone(),
                    };
                    slot.insert(ShadowEntry::Thread(upgraded));
                }
                other => return Err(ShadowError::type_mismatch(net_ref, "thread", other.kind())),
            },
            Entry::Vacant(slot) => {
                slot.insert(ShadowEntry::Thread(ShadowThread {
                    net_ref,
                    class: self.class_ids.get(&net_ref.class_id()).cloned(),
                    info: Some(info),
                    state: ShadowState::default(),
                }));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Strict lookup
    ///
    /// Class object references resolve through their class id.
    pub fn resolve(&self, net_ref: NetReference) -> Result<ShadowEntry> {
        if net_ref.is_class_instance() {
            return self
                .class_ids
                .get(&net_ref.class_id())
                .map(|class| ShadowEntry::Class(Arc::clone(class)))
                .ok_or(ShadowError::Unresolved(net_ref));
        }
        if net_ref.is_null() {
            return Err(ShadowError::Unresolved(net_ref));
        }
        self.objects
            .get(&net_ref.object_id())
            .cloned()
            .ok_or(ShadowError::Unresolved(net_ref))
    }

    /// Borrowed lookup of a non-class entry
    #[inline]
    pub fn get(&self, net_ref: NetReference) -> Option<&ShadowEntry> {
        self.objects.get(&net_ref.object_id())
    }

    /// Resolve an event argument, creating the entry on first sight
    ///
    /// A first-seen object becomes a string or thread shell if its class is
    /// `java/lang/String` or a subclass of `java/lang/Thread`, and a generic
    /// object otherwise. Its class id must already be bound. Null
    /// references give `None`.
    pub fn materialize(&mut self, net_ref: NetReference) -> Result<Option<ShadowEntry>> {
        if net_ref.is_class_instance() {
            return self.resolve(net_ref).map(Some);
        }
        if net_ref.is_null() {
            return Ok(None);
        }

        let key = net_ref.object_id();
        if let Some(existing) = self.objects.get(&key) {
            return Ok(Some(existing.clone()));
        }

        let class = self
            .class_ids
            .get(&net_ref.class_id())
            .cloned()
            .ok_or(ShadowError::Unresolved(net_ref))?;
        let net_ref = net_ref.without_special();

        let entry = if class.is_string() {
            ShadowEntry::String(ShadowString {
                net_ref,
                class: Some(class),
                value: None,
                state: ShadowState::default(),
            })
        } else if class.is_subclass_of(THREAD_CLASS) {
            ShadowEntry::Thread(ShadowThread {
                net_ref,
                class: Some(class),
                info: None,
                state: ShadowState::default(),
            })
        } else {
            ShadowEntry::Object(ShadowObject {
                net_ref,
                class,
                state: ShadowState::default(),
            })
        };

        self.objects.insert(key, entry.clone());
        Ok(Some(entry))
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove and return an entry
    ///
    /// Freeing a class object drops its class id binding and its
    /// `(name, loader)` key; subclasses keep their link to it. Absent
    /// references are a no-op.
    pub fn free(&mut self, net_ref: NetReference) -> Option<ShadowEntry> {
        if net_ref.is_class_instance() {
            let class = self.class_ids.remove(&net_ref.class_id())?;
            if let Some(by_name) = self.classes.get_mut(&class.loader()) {
                if by_name.get(class.name()).is_some_and(|c| Arc::ptr_eq(c, &class)) {
                    by_name.remove(class.name());
                }
                if by_name.is_empty() {
                    self.classes.remove(&class.loader());
                }
            }
            self.unlinked.retain(|_, waiting| {
                waiting.retain(|c| !Arc::ptr_eq(c, &class));
                !waiting.is_empty()
            });
            return Some(ShadowEntry::Class(class));
        }
        if net_ref.is_null() {
            return None;
        }
        self.objects.remove(&net_ref.object_id())
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// Registered classes, bound or not
    pub fn class_count(&self) -> usize {
        self.classes.values().map(HashMap::len).sum()
    }

    /// Classes bound to a class id
    #[inline]
    pub fn bound_class_count(&self) -> usize {
        self.class_ids.len()
    }

    /// Non-class entries
    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.objects.is_empty()
    }
}

fn link(child: &ShadowClass, parent: &Arc<ShadowClass>) {
    if !child.link_superclass(Arc::clone(parent)) {
        tracing::warn!(
            class = child.name(),
            superclass = parent.name(),
            "superclass link rejected, hierarchy would form a cycle"
        );
    }
}
