//! Shadow classes
//!
//! A class learns its superclass twice: by name from its class file, and as
//! a resolved [`ShadowClass`] once CLASS_INFO has bound both ends. Hierarchy
//! queries follow resolved links and fall back to the class file's super
//! name at the first missing one.

use std::fmt;
use std::ptr;
use std::sync::{Arc, OnceLock};

use shadowvm_protocol::NetReference;

use super::classfile::{ClassOutline, MemberInfo};
use super::entry::ShadowEntry;
use super::state::ShadowState;

/// Internal name of the root class
pub const OBJECT_CLASS: &str = "java/lang/Object";

/// Internal name of the class of class objects
pub const CLASS_CLASS: &str = "java/lang/Class";

/// Internal name of the string class
pub const STRING_CLASS: &str = "java/lang/String";

/// Internal name of the thread class
pub const THREAD_CLASS: &str = "java/lang/Thread";

/// Upper bound on superclass chain walks
pub(crate) const MAX_HIERARCHY_DEPTH: usize = 256;

/// Primitive type names with their descriptor characters
const PRIMITIVES: [(&str, char); 9] = [
    ("boolean", 'Z'),
    ("byte", 'B'),
    ("char", 'C'),
    ("short", 'S'),
    ("int", 'I'),
    ("long", 'J'),
    ("float", 'F'),
    ("double", 'D'),
    ("void", 'V'),
];

/// Identity of a class object, set once by CLASS_INFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassBinding {
    /// Reference to the class object (class flag set)
    pub class_ref: NetReference,
    /// Superclass object, `None` for roots, interfaces and primitives
    pub superclass: Option<NetReference>,
}

/// Server-side stand-in for a loaded class
///
/// Primitive classes are named like `int`, array classes by descriptor
/// like `[I` or `[Lpkg/Foo;`.
#[derive(Debug)]
pub struct ShadowClass {
    name: String,
    loader: NetReference,
    outline: Option<ClassOutline>,
    binding: OnceLock<ClassBinding>,
    superclass: OnceLock<Arc<ShadowClass>>,
    state: ShadowState,
}

impl ShadowClass {
    pub(crate) fn new(name: &str, loader: NetReference, outline: Option<ClassOutline>) -> Self {
        Self {
            name: name.to_string(),
            loader,
            outline,
            binding: OnceLock::new(),
            superclass: OnceLock::new(),
            state: ShadowState::default(),
        }
    }

    /// Internal class name, e.g. `pkg/Foo`
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defining class loader
    #[inline]
    pub fn loader(&self) -> NetReference {
        self.loader
    }

    /// Parsed class file, if bytecode was sent and could be read
    #[inline]
    pub fn outline(&self) -> Option<&ClassOutline> {
        self.outline.as_ref()
    }

    #[inline]
    pub fn binding(&self) -> Option<&ClassBinding> {
        self.binding.get()
    }

    /// Class id, once bound
    #[inline]
    pub fn class_id(&self) -> Option<u32> {
        self.binding().map(|b| b.class_ref.class_id())
    }

    /// Analysis state slot of the class object
    #[inline]
    pub fn state(&self) -> &ShadowState {
        &self.state
    }

    /// Bind the class object identity
    ///
    /// Returns `false` if a binding was already set.
    pub(crate) fn bind(&self, binding: ClassBinding) -> bool {
        self.binding.set(binding).is_ok()
    }

    /// Link the resolved superclass
    ///
    /// Returns `false` if a link is already set or `parent` descends from
    /// this class.
    pub(crate) fn link_superclass(&self, parent: Arc<ShadowClass>) -> bool {
        if parent.ancestors().any(|class| ptr::eq(class, self)) {
            return false;
        }
        self.superclass.set(parent).is_ok()
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Superclass object reference, once bound
    #[inline]
    pub fn superclass_ref(&self) -> Option<NetReference> {
        self.binding().and_then(|b| b.superclass)
    }

    /// Resolved superclass
    ///
    /// Set once both this class and its superclass are bound, in either
    /// order.
    #[inline]
    pub fn superclass(&self) -> Option<&Arc<ShadowClass>> {
        self.superclass.get()
    }

    /// Superclass name, from the resolved link or else the class file
    pub fn superclass_name(&self) -> Option<&str> {
        match self.superclass() {
            Some(parent) => Some(parent.name()),
            None => self.outline()?.super_name.as_deref(),
        }
    }

    /// This class followed by its resolved superclasses
    pub fn ancestors(&self) -> impl Iterator<Item = &ShadowClass> {
        std::iter::successors(Some(self), |&class| class.superclass().map(|parent| &**parent))
            .take(MAX_HIERARCHY_DEPTH)
    }

    /// Whether this class is `ancestor` or inherits from it
    pub fn is_subclass_of(&self, ancestor: &str) -> bool {
        let mut last = self;
        for class in self.ancestors() {
            if class.name() == ancestor {
                return true;
            }
            last = class;
        }
        last.superclass().is_none() && last.superclass_name() == Some(ancestor)
    }

    /// Interfaces declared by this class's class file
    pub fn interfaces(&self) -> &[String] {
        self.outline()
            .map(|o| o.interfaces.as_slice())
            .unwrap_or_default()
    }

    /// Whether this class or a superclass declares `interface`
    ///
    /// Interfaces extended by the declared ones are not followed.
    pub fn implements(&self, interface: &str) -> bool {
        self.ancestors()
            .any(|class| class.interfaces().iter().any(|i| i == interface))
    }

    /// Whether a value of class `other` can be stored as this class
    ///
    /// Types are compared by name. Primitives are assignable only from
    /// themselves, arrays only from arrays of the same type.
    pub fn is_assignable_from(&self, other: &ShadowClass) -> bool {
        if ptr::eq(self, other) {
            return true;
        }
        if self.is_primitive() || other.is_primitive() {
            return self.name == other.name;
        }
        other.is_subclass_of(&self.name) || other.implements(&self.name)
    }

    /// Whether `entry` is an instance of this class
    pub fn is_instance(&self, entry: &ShadowEntry) -> bool {
        match (entry, entry.class()) {
            (ShadowEntry::Class(_), _) => self.name == CLASS_CLASS || self.name == OBJECT_CLASS,
            (_, Some(class)) => self.is_assignable_from(class),
            (ShadowEntry::String(_), None) => self.is_string() || self.name == OBJECT_CLASS,
            (ShadowEntry::Thread(_), None) => self.name == THREAD_CLASS || self.name == OBJECT_CLASS,
            (ShadowEntry::Object(_), None) => false,
        }
    }

    // =========================================================================
    // Kinds
    // =========================================================================

    /// Whether this class is `java/lang/String`
    #[inline]
    pub fn is_string(&self) -> bool {
        self.name == STRING_CLASS
    }

    pub fn is_interface(&self) -> bool {
        self.outline().is_some_and(ClassOutline::is_interface)
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.name.starts_with('[')
    }

    pub fn is_primitive(&self) -> bool {
        PRIMITIVES.iter().any(|(name, _)| *name == self.name)
    }

    /// Array dimensions, 0 for non-array classes
    pub fn dimensions(&self) -> usize {
        self.name.bytes().take_while(|&b| b == b'[').count()
    }

    /// Name of the component class of an array class
    ///
    /// `[[I` gives `[I`, `[I` gives `int`, `[Lpkg/Foo;` gives `pkg/Foo`.
    pub fn component_name(&self) -> Option<&str> {
        let element = self.name.strip_prefix('[')?;
        match element.chars().next()? {
            '[' => Some(element),
            'L' => element.strip_prefix('L')?.strip_suffix(';'),
            code if element.len() == 1 => PRIMITIVES
                .iter()
                .find(|(_, c)| *c == code)
                .map(|(name, _)| *name),
            _ => None,
        }
    }

    // =========================================================================
    // Members
    // =========================================================================

    /// Methods declared by this class, whatever their access
    pub fn declared_methods(&self) -> &[MemberInfo] {
        self.outline()
            .map(|o| o.methods.as_slice())
            .unwrap_or_default()
    }

    /// Fields declared by this class, whatever their access
    pub fn declared_fields(&self) -> &[MemberInfo] {
        self.outline()
            .map(|o| o.fields.as_slice())
            .unwrap_or_default()
    }

    /// Public methods of this class and its resolved superclasses
    ///
    /// An overriding method hides the one it overrides.
    pub fn methods(&self) -> Vec<&MemberInfo> {
        let mut methods: Vec<&MemberInfo> = Vec::new();
        for class in self.ancestors() {
            for method in class.declared_methods().iter().filter(|m| m.is_public()) {
                let overridden = methods
                    .iter()
                    .any(|m| m.name == method.name && m.descriptor == method.descriptor);
                if !overridden {
                    methods.push(method);
                }
            }
        }
        methods
    }

    /// Public fields of this class and its resolved superclasses
    pub fn fields(&self) -> Vec<&MemberInfo> {
        self.ancestors()
            .flat_map(|class| class.declared_fields().iter().filter(|f| f.is_public()))
            .collect()
    }

    /// Public field by name, searching superclasses nearest first
    pub fn field(&self, name: &str) -> Option<&MemberInfo> {
        self.ancestors()
            .flat_map(|class| class.declared_fields())
            .find(|f| f.is_public() && f.name == name)
    }

    /// Method descriptor by name, if the outline is known and unambiguous
    pub fn method_descriptor(&self, name: &str) -> Option<&str> {
        let outline = self.outline()?;
        let mut matches = outline.methods_named(name);
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(&first.descriptor)
    }
}

impl fmt::Display for ShadowClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
