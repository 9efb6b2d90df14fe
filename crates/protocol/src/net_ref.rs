//! Object references as seen from the client process
//!
//! A `NetReference` is an opaque 64-bit identifier assigned by the client.
//! The server never dereferences it; it only uses the packed fields to key
//! its shadow tables.
//!
//! # Layout
//!
//! ```text
//! bit 63     special flag   (sent together with inline payload)
//! bit 62     class flag     (names a class object)
//! bits 40-61 class id       (22 bits, 0 = java/lang/Class or unknown)
//! bits 0-39  object id      (40 bits, 0 = null)
//! ```

use std::fmt;

const OBJECT_ID_SHIFT: u32 = 0;
const OBJECT_ID_BITS: u32 = 40;
const CLASS_ID_SHIFT: u32 = OBJECT_ID_SHIFT + OBJECT_ID_BITS;
const CLASS_ID_BITS: u32 = 22;
const CLASS_FLAG_SHIFT: u32 = CLASS_ID_SHIFT + CLASS_ID_BITS;
const SPECIAL_FLAG_SHIFT: u32 = CLASS_FLAG_SHIFT + 1;

const fn mask(bits: u32, shift: u32) -> u64 {
    ((1u64 << bits) - 1) << shift
}

const OBJECT_ID_MASK: u64 = mask(OBJECT_ID_BITS, OBJECT_ID_SHIFT);
const CLASS_ID_MASK: u64 = mask(CLASS_ID_BITS, CLASS_ID_SHIFT);
const CLASS_FLAG_MASK: u64 = mask(1, CLASS_FLAG_SHIFT);
const SPECIAL_FLAG_MASK: u64 = mask(1, SPECIAL_FLAG_SHIFT);

/// Largest object id that fits the layout
pub const MAX_OBJECT_ID: u64 = OBJECT_ID_MASK;

/// Largest class id that fits the layout
pub const MAX_CLASS_ID: u32 = (1 << CLASS_ID_BITS) - 1;

/// Opaque client-side object identifier
///
/// # Example
///
/// ```
/// use shadowvm_protocol::NetReference;
///
/// let obj = NetReference::object(42, 7);
/// assert_eq!(obj.object_id(), 42);
/// assert_eq!(obj.class_id(), 7);
/// assert!(!obj.is_class_instance());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NetReference(u64);

impl NetReference {
    /// The null reference
    pub const NULL: Self = Self(0);

    /// Wrap a raw wire value
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Build a reference to a plain object of the given class
    ///
    /// Ids wider than their fields are truncated to the layout.
    #[inline]
    pub const fn object(object_id: u64, class_id: u32) -> Self {
        Self(
            (object_id << OBJECT_ID_SHIFT) & OBJECT_ID_MASK
                | ((class_id as u64) << CLASS_ID_SHIFT) & CLASS_ID_MASK,
        )
    }

    /// Build a reference to a class object
    #[inline]
    pub const fn class(object_id: u64, class_id: u32) -> Self {
        Self(Self::object(object_id, class_id).0 | CLASS_FLAG_MASK)
    }

    /// Raw wire value
    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Object id (bits 0-39)
    #[inline]
    pub const fn object_id(self) -> u64 {
        (self.0 & OBJECT_ID_MASK) >> OBJECT_ID_SHIFT
    }

    /// Class id (bits 40-61)
    #[inline]
    pub const fn class_id(self) -> u32 {
        ((self.0 & CLASS_ID_MASK) >> CLASS_ID_SHIFT) as u32
    }

    /// Whether this reference names a class object
    #[inline]
    pub const fn is_class_instance(self) -> bool {
        self.0 & CLASS_FLAG_MASK != 0
    }

    /// Whether this reference was sent with inline payload
    #[inline]
    pub const fn is_special(self) -> bool {
        self.0 & SPECIAL_FLAG_MASK != 0
    }

    /// Whether this is the null reference
    #[inline]
    pub const fn is_null(self) -> bool {
        self.object_id() == 0
    }

    /// Reference identity without the special flag
    #[inline]
    pub const fn unique_id(self) -> u64 {
        self.0 & !SPECIAL_FLAG_MASK
    }

    /// Same reference with the special flag set
    #[inline]
    pub const fn with_special(self) -> Self {
        Self(self.0 | SPECIAL_FLAG_MASK)
    }

    /// Same reference with the special flag cleared
    #[inline]
    pub const fn without_special(self) -> Self {
        Self(self.unique_id())
    }
}

impl fmt::Debug for NetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetReference")
            .field("object_id", &self.object_id())
            .field("class_id", &self.class_id())
            .field("class", &self.is_class_instance())
            .field("special", &self.is_special())
            .finish()
    }
}

impl fmt::Display for NetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl From<u64> for NetReference {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<NetReference> for u64 {
    fn from(net_ref: NetReference) -> Self {
        net_ref.0
    }
}
