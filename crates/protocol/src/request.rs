//! Typed request payloads
//!
//! Each request type knows how to read its payload (the tag has already been
//! consumed by the dispatcher) and how to write itself, tag included. String
//! fields borrow from the read buffer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::decode::WireReader;
use crate::encode::{put_blob, put_bool, put_net_ref, put_str};
use crate::schema::{ArgKind, INLINE_STRING_DATA, INLINE_THREAD_DATA, RequestTag};
use crate::{DEFAULT_MAX_MESSAGE_SIZE, MAX_ARGUMENTS, NetReference, ProtocolError, Result};

// =============================================================================
// Event ids
// =============================================================================

/// Numeric id of a registered analysis method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u16);

impl EventId {
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for EventId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

// =============================================================================
// Close
// =============================================================================

/// Clean end of session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Close;

impl Close {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(RequestTag::Close.as_u8());
    }
}

// =============================================================================
// Class loading
// =============================================================================

/// A class was loaded by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClass<'a> {
    /// Internal class name, e.g. `pkg/Foo`
    pub name: &'a str,
    /// Defining class loader
    pub loader: NetReference,
    /// Class file bytes (may be empty)
    pub code: &'a [u8],
}

impl<'a> NewClass<'a> {
    pub fn decode(reader: &mut WireReader<'a>) -> Result<Self> {
        let name = reader.read_str("class name")?;
        let loader = reader.read_net_ref()?;
        let code = reader.read_blob()?;
        Ok(Self { name, loader, code })
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(RequestTag::NewClass.as_u8());
        put_str(buf, self.name)?;
        put_net_ref(buf, self.loader);
        put_blob(buf, self.code, DEFAULT_MAX_MESSAGE_SIZE)
    }
}

/// Identity of a class object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo<'a> {
    /// Reference to the class object; always has the class flag set
    pub class_ref: NetReference,
    pub name: &'a str,
    pub loader: NetReference,
    /// Superclass object, `None` for roots and interfaces
    pub superclass: Option<NetReference>,
}

impl<'a> ClassInfo<'a> {
    pub fn decode(reader: &mut WireReader<'a>) -> Result<Self> {
        let class_ref = reader.read_net_ref()?;
        let name = reader.read_str("class name")?;
        let loader = reader.read_net_ref()?;
        let superclass = reader.read_net_ref()?;

        if !class_ref.is_class_instance() {
            return Err(ProtocolError::NotAClassReference(class_ref));
        }
        let superclass = if superclass.as_raw() == 0 {
            None
        } else if superclass.is_class_instance() {
            Some(superclass)
        } else {
            return Err(ProtocolError::NotAClassReference(superclass));
        };

        Ok(Self {
            class_ref,
            name,
            loader,
            superclass,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        if !self.class_ref.is_class_instance() {
            return Err(ProtocolError::NotAClassReference(self.class_ref));
        }
        buf.put_u8(RequestTag::ClassInfo.as_u8());
        put_net_ref(buf, self.class_ref);
        put_str(buf, self.name)?;
        put_net_ref(buf, self.loader);
        put_net_ref(buf, self.superclass.unwrap_or(NetReference::NULL));
        Ok(())
    }
}

// =============================================================================
// String and thread data
// =============================================================================

/// Value of a string object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringInfo<'a> {
    pub net_ref: NetReference,
    pub value: &'a str,
}

impl<'a> StringInfo<'a> {
    pub fn decode(reader: &mut WireReader<'a>) -> Result<Self> {
        let net_ref = reader.read_net_ref()?;
        let value = reader.read_str("string value")?;
        Ok(Self { net_ref, value })
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(RequestTag::StringInfo.as_u8());
        self.encode_payload(buf)
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_net_ref(buf, self.net_ref);
        put_str(buf, self.value)
    }
}

/// Name and daemon flag of a thread object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo<'a> {
    pub net_ref: NetReference,
    pub name: &'a str,
    pub daemon: bool,
}

impl<'a> ThreadInfo<'a> {
    pub fn decode(reader: &mut WireReader<'a>) -> Result<Self> {
        let net_ref = reader.read_net_ref()?;
        let name = reader.read_str("thread name")?;
        let daemon = reader.read_bool()?;
        Ok(Self {
            net_ref,
            name,
            daemon,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(RequestTag::ThreadInfo.as_u8());
        self.encode_payload(buf)
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        put_net_ref(buf, self.net_ref);
        put_str(buf, self.name)?;
        put_bool(buf, self.daemon);
        Ok(())
    }
}

// =============================================================================
// Analysis registration and object lifecycle
// =============================================================================

/// Binds an event id to a qualified analysis method name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterAnalysis<'a> {
    pub event_id: EventId,
    /// `analysis.method`, split at the last `.`
    pub method: &'a str,
}

impl<'a> RegisterAnalysis<'a> {
    pub fn decode(reader: &mut WireReader<'a>) -> Result<Self> {
        let event_id = EventId(reader.read_u16()?);
        let method = reader.read_str("analysis method")?;
        Ok(Self { event_id, method })
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(RequestTag::RegisterAnalysis.as_u8());
        buf.put_u16(self.event_id.0);
        put_str(buf, self.method)
    }
}

/// Objects reclaimed on the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFree {
    pub refs: Vec<NetReference>,
}

impl ObjectFree {
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let count = reader.read_u32()? as usize;
        let len = count.saturating_mul(8);
        reader.check_len(len)?;
        if reader.remaining() < len {
            return Err(ProtocolError::incomplete(len - reader.remaining()));
        }

        let mut refs = Vec::with_capacity(count);
        for _ in 0..count {
            refs.push(reader.read_net_ref()?);
        }
        Ok(Self { refs })
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let count = self.refs.len();
        if count > u32::MAX as usize {
            return Err(ProtocolError::message_too_large(count, u32::MAX as usize));
        }
        buf.reserve(5 + count * 8);
        buf.put_u8(RequestTag::ObjectFree.as_u8());
        buf.put_u32(count as u32);
        for net_ref in &self.refs {
            put_net_ref(buf, *net_ref);
        }
        Ok(())
    }
}

// =============================================================================
// Analysis invocation
// =============================================================================

/// A single invocation argument as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(NetReference),
}

impl Argument {
    pub fn kind(&self) -> ArgKind {
        match self {
            Self::Boolean(_) => ArgKind::Boolean,
            Self::Byte(_) => ArgKind::Byte,
            Self::Char(_) => ArgKind::Char,
            Self::Short(_) => ArgKind::Short,
            Self::Int(_) => ArgKind::Int,
            Self::Long(_) => ArgKind::Long,
            Self::Float(_) => ArgKind::Float,
            Self::Double(_) => ArgKind::Double,
            Self::Object(_) => ArgKind::Object,
        }
    }

    /// Read the value of an argument whose kind byte was already consumed
    pub fn read_value(kind: ArgKind, reader: &mut WireReader<'_>) -> Result<Self> {
        Ok(match kind {
            ArgKind::Boolean => Self::Boolean(reader.read_bool()?),
            ArgKind::Byte => Self::Byte(reader.read_i8()?),
            ArgKind::Char => Self::Char(reader.read_u16()?),
            ArgKind::Short => Self::Short(reader.read_i16()?),
            ArgKind::Int => Self::Int(reader.read_i32()?),
            ArgKind::Long => Self::Long(reader.read_i64()?),
            ArgKind::Float => Self::Float(reader.read_f32()?),
            ArgKind::Double => Self::Double(reader.read_f64()?),
            ArgKind::Object => Self::Object(reader.read_net_ref()?),
        })
    }

    /// Write kind byte and value
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.kind().as_u8());
        match *self {
            Self::Boolean(v) => put_bool(buf, v),
            Self::Byte(v) => buf.put_i8(v),
            Self::Char(v) => buf.put_u16(v),
            Self::Short(v) => buf.put_i16(v),
            Self::Int(v) => buf.put_i32(v),
            Self::Long(v) => buf.put_i64(v),
            Self::Float(v) => buf.put_u32(v.to_bits()),
            Self::Double(v) => buf.put_u64(v.to_bits()),
            Self::Object(v) => put_net_ref(buf, v),
        }
    }
}

/// Inline data describing an object argument of the same invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialPayload<'a> {
    String(StringInfo<'a>),
    Thread(ThreadInfo<'a>),
}

impl SpecialPayload<'_> {
    pub fn net_ref(&self) -> NetReference {
        match self {
            Self::String(info) => info.net_ref,
            Self::Thread(info) => info.net_ref,
        }
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::String(info) => {
                buf.put_u8(INLINE_STRING_DATA);
                info.encode_payload(buf)
            }
            Self::Thread(info) => {
                buf.put_u8(INLINE_THREAD_DATA);
                info.encode_payload(buf)
            }
        }
    }
}

/// Decoded analysis invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation<'a> {
    pub event_id: EventId,
    pub args: Vec<Argument>,
    /// Inline payloads in arrival order
    pub specials: Vec<SpecialPayload<'a>>,
}

impl<'a> Invocation<'a> {
    pub fn decode(reader: &mut WireReader<'a>) -> Result<Self> {
        let event_id = EventId(reader.read_u16()?);
        let arg_count = reader.read_u8()? as usize;

        let mut args = Vec::with_capacity(arg_count);
        let mut specials = Vec::new();

        while args.len() < arg_count {
            match reader.read_u8()? {
                INLINE_STRING_DATA => {
                    specials.push(SpecialPayload::String(StringInfo::decode(reader)?));
                }
                INLINE_THREAD_DATA => {
                    specials.push(SpecialPayload::Thread(ThreadInfo::decode(reader)?));
                }
                raw => {
                    let kind = ArgKind::from_u8(raw).ok_or(ProtocolError::UnknownArgKind(raw))?;
                    args.push(Argument::read_value(kind, reader)?);
                }
            }
        }

        Ok(Self {
            event_id,
            args,
            specials,
        })
    }

    /// Encode with all inline payloads ahead of the arguments
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let mut encoder = InvocationEncoder::new(self.event_id);
        for special in &self.specials {
            encoder.push_special(special)?;
        }
        for arg in &self.args {
            encoder.push(*arg);
        }
        buf.extend_from_slice(&encoder.finish()?);
        Ok(())
    }
}

/// Incremental writer for one ANALYZE message
///
/// The argument count is patched in by [`finish`](Self::finish), so the
/// caller does not need to know it up front.
#[derive(Debug)]
pub struct InvocationEncoder {
    buf: BytesMut,
    arg_count: usize,
}

/// Offset of the argument count byte (tag + event id)
const ARG_COUNT_OFFSET: usize = 3;

impl InvocationEncoder {
    pub fn new(event_id: EventId) -> Self {
        Self::with_capacity(event_id, 64)
    }

    pub fn with_capacity(event_id: EventId, capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(capacity.max(ARG_COUNT_OFFSET + 1));
        buf.put_u8(RequestTag::Analyze.as_u8());
        buf.put_u16(event_id.0);
        buf.put_u8(0);
        Self { buf, arg_count: 0 }
    }

    /// Number of arguments written so far
    #[inline]
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    #[inline]
    pub fn push(&mut self, arg: Argument) {
        arg.encode(&mut self.buf);
        self.arg_count += 1;
    }

    pub fn push_special(&mut self, payload: &SpecialPayload<'_>) -> Result<()> {
        let mark = self.buf.len();
        let result = payload.encode(&mut self.buf);
        if result.is_err() {
            self.buf.truncate(mark);
        }
        result
    }

    /// Patch the argument count and return the complete message
    pub fn finish(mut self) -> Result<Bytes> {
        if self.arg_count > MAX_ARGUMENTS {
            return Err(ProtocolError::TooManyArguments {
                count: self.arg_count,
                max: MAX_ARGUMENTS,
            });
        }
        self.buf[ARG_COUNT_OFFSET] = self.arg_count as u8;
        Ok(self.buf.freeze())
    }
}
