//! NetReference allocation
//!
//! Object ids and class ids are handed out from independent counters.
//! Both start at 1 since 0 is reserved (null object, unknown class).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use shadowvm_protocol::{MAX_CLASS_ID, MAX_OBJECT_ID, NetReference};

use crate::error::{ClientError, Result};

/// Lock-free reference allocator
#[derive(Debug)]
pub struct RefAllocator {
    next_object: AtomicU64,
    next_class: AtomicU32,
}

impl Default for RefAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefAllocator {
    pub fn new() -> Self {
        Self {
            next_object: AtomicU64::new(1),
            next_class: AtomicU32::new(1),
        }
    }

    fn object_id(&self) -> Result<u64> {
        let id = self.next_object.fetch_add(1, Ordering::Relaxed);
        if id > MAX_OBJECT_ID {
            return Err(ClientError::ids_exhausted("object"));
        }
        Ok(id)
    }

    /// Allocate a reference to a new class object with a fresh class id
    pub fn class(&self) -> Result<NetReference> {
        let class_id = self.next_class.fetch_add(1, Ordering::Relaxed);
        if class_id > MAX_CLASS_ID {
            return Err(ClientError::ids_exhausted("class"));
        }
        Ok(NetReference::class(self.object_id()?, class_id))
    }

    /// Allocate a reference to a new instance of `class_ref`
    pub fn object(&self, class_ref: NetReference) -> Result<NetReference> {
        if !class_ref.is_class_instance() {
            return Err(ClientError::NotAClassReference(class_ref));
        }
        Ok(NetReference::object(self.object_id()?, class_ref.class_id()))
    }
}
