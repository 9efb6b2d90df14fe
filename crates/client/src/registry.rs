//! Event id assignment
//!
//! Maps qualified analysis method names to small numeric ids. Ids start
//! at 1 and are never reused for the lifetime of the client.

use std::collections::HashMap;

use shadowvm_protocol::EventId;

use crate::error::{ClientError, Result};

/// Name to event id table
#[derive(Debug)]
pub struct EventRegistry {
    ids: HashMap<String, EventId>,
    next: u16,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            ids: HashMap::new(),
            next: 1,
        }
    }

    /// Id previously assigned to `name`
    #[inline]
    pub fn get(&self, name: &str) -> Option<EventId> {
        self.ids.get(name).copied()
    }

    /// Whether `id` has been assigned
    #[inline]
    pub fn contains_id(&self, id: EventId) -> bool {
        id.0 != 0 && (self.next == 0 || id.0 < self.next)
    }

    /// The id `name` would get if registered now
    ///
    /// Does not reserve it; call [`insert`](Self::insert) once the
    /// announcement reached the channel.
    pub fn peek(&self, name: &str) -> Result<EventId> {
        if let Some(id) = self.get(name) {
            return Ok(id);
        }
        if self.next == 0 {
            return Err(ClientError::EventIdsExhausted);
        }
        Ok(EventId(self.next))
    }

    /// Record `name` under the next free id
    pub fn insert(&mut self, name: &str) -> Result<EventId> {
        let id = self.peek(name)?;
        if !self.ids.contains_key(name) {
            self.ids.insert(name.to_string(), id);
            // wraps to 0 after u16::MAX, which marks the space as exhausted
            self.next = self.next.wrapping_add(1);
        }
        Ok(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
