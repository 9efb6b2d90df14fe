//! Request tags and argument kinds
//!
//! These values are used on the wire and must stay in sync between client
//! and server. The tag space is open: tags not listed here can be claimed by
//! additional handlers as long as both sides agree on the assignment.

/// Built-in request type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestTag {
    /// Clean end of session
    Close = 0,
    /// Analysis method invocation
    Analyze = 1,
    /// Batch of objects reclaimed by the client
    ObjectFree = 2,
    /// Class loaded: name, loader, bytecode
    NewClass = 3,
    /// Class object identity: class reference, name, loader, superclass
    ClassInfo = 4,
    /// String literal value
    StringInfo = 5,
    /// Event id to analysis method binding
    RegisterAnalysis = 6,
    /// Thread name and daemon flag
    ThreadInfo = 7,
}

impl RequestTag {
    /// All built-in tags in wire order
    pub const ALL: [Self; 8] = [
        Self::Close,
        Self::Analyze,
        Self::ObjectFree,
        Self::NewClass,
        Self::ClassInfo,
        Self::StringInfo,
        Self::RegisterAnalysis,
        Self::ThreadInfo,
    ];

    /// Parse a built-in tag from its raw byte value
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Close),
            1 => Some(Self::Analyze),
            2 => Some(Self::ObjectFree),
            3 => Some(Self::NewClass),
            4 => Some(Self::ClassInfo),
            5 => Some(Self::StringInfo),
            6 => Some(Self::RegisterAnalysis),
            7 => Some(Self::ThreadInfo),
            _ => None,
        }
    }

    /// Convert to raw byte value
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get the string name of this tag
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Analyze => "analyze",
            Self::ObjectFree => "object_free",
            Self::NewClass => "new_class",
            Self::ClassInfo => "class_info",
            Self::StringInfo => "string_info",
            Self::RegisterAnalysis => "register_analysis",
            Self::ThreadInfo => "thread_info",
        }
    }
}

impl std::fmt::Display for RequestTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a single analysis argument
///
/// The kind byte precedes every argument on the wire, so an invocation can
/// be framed without knowing the target method's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArgKind {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Short = 4,
    Int = 5,
    Long = 6,
    Float = 7,
    Double = 8,
    Object = 9,
}

impl ArgKind {
    /// Parse from raw byte value
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Boolean),
            2 => Some(Self::Byte),
            3 => Some(Self::Char),
            4 => Some(Self::Short),
            5 => Some(Self::Int),
            6 => Some(Self::Long),
            7 => Some(Self::Float),
            8 => Some(Self::Double),
            9 => Some(Self::Object),
            _ => None,
        }
    }

    /// Convert to raw byte value
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Encoded value width in bytes (excluding the kind byte)
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double | Self::Object => 8,
        }
    }

    /// Java type name, used in signatures and log output
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind byte of an inline string payload inside an invocation
pub const INLINE_STRING_DATA: u8 = 16;

/// Kind byte of an inline thread payload inside an invocation
pub const INLINE_THREAD_DATA: u8 = 17;
