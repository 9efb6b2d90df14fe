//! Minimal JVM class file reader
//!
//! Extracts just enough structure to name a class, its supertypes and its
//! members. Attributes are skipped, bytecode is never interpreted.
//!
//! # Layout
//!
//! ```text
//! u4 magic (0xCAFEBABE)
//! u2 minor, u2 major
//! u2 constant_pool_count, cp_info[count - 1]
//! u2 access_flags, u2 this_class, u2 super_class
//! u2 interfaces_count, u2[interfaces_count]
//! u2 fields_count, member_info[fields_count]
//! u2 methods_count, member_info[methods_count]
//! ...
//! ```

use shadowvm_protocol::{ProtocolError, WireReader};
use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;

/// Access flag marking a public class or member
pub const ACC_PUBLIC: u16 = 0x0001;

/// Access flag marking an interface
pub const ACC_INTERFACE: u16 = 0x0200;

/// Class file parse errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("bad magic number: {0:#010x}")]
    BadMagic(u32),

    #[error("class file ends early")]
    Truncated,

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("constant pool index {0} does not name the expected entry")]
    BadConstantIndex(u16),
}

impl From<ProtocolError> for ClassFileError {
    fn from(_: ProtocolError) -> Self {
        Self::Truncated
    }
}

type Result<T> = std::result::Result<T, ClassFileError>;

/// Field or method declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
}

impl MemberInfo {
    #[inline]
    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }
}

/// Structural summary of a class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassOutline {
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name, e.g. `pkg/Foo`
    pub name: String,
    /// `None` only for `java/lang/Object` and module-info
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
}

impl ClassOutline {
    /// Parse the leading structure of a class file
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = WireReader::with_max_len(bytes, bytes.len());

        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let _minor = reader.read_u16()?;
        let major_version = reader.read_u16()?;

        let pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u16()?;
        let name = pool.class_name(reader.read_u16()?)?.to_string();
        let super_index = reader.read_u16()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?.to_string())
        };

        let interface_count = reader.read_u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(reader.read_u16()?)?.to_string());
        }

        let fields = read_members(&mut reader, &pool)?;
        let methods = read_members(&mut reader, &pool)?;

        Ok(Self {
            major_version,
            access_flags,
            name,
            super_name,
            interfaces,
            fields,
            methods,
        })
    }

    #[inline]
    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    /// All overloads of a method
    pub fn methods_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a MemberInfo> + use<'a, 'n> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn find_field(&self, name: &str) -> Option<&MemberInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn read_members(reader: &mut WireReader<'_>, pool: &ConstantPool) -> Result<Vec<MemberInfo>> {
    let count = reader.read_u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u16()?;
        let name = pool.utf8(reader.read_u16()?)?.to_string();
        let descriptor = pool.utf8(reader.read_u16()?)?.to_string();
        skip_attributes(reader)?;
        members.push(MemberInfo {
            access_flags,
            name,
            descriptor,
        });
    }
    Ok(members)
}

fn skip_attributes(reader: &mut WireReader<'_>) -> Result<()> {
    let count = reader.read_u16()?;
    for _ in 0..count {
        let _name = reader.read_u16()?;
        let len = reader.read_u32()? as usize;
        reader.read_bytes(len)?;
    }
    Ok(())
}

// =============================================================================
// Constant pool
// =============================================================================

#[derive(Debug, Clone)]
enum Constant {
    /// Unused slot (index 0, second half of long/double)
    Empty,
    Utf8(String),
    Class(u16),
    Other,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let count = reader.read_u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Empty);

        let mut index = 1u16;
        while index < count {
            let tag = reader.read_u8()?;
            let (entry, slots) = match tag {
                1 => {
                    let len = reader.read_u16()? as usize;
                    let bytes = reader.read_bytes(len)?;
                    // modified UTF-8 only differs for NUL and supplementary characters
                    (Constant::Utf8(String::from_utf8_lossy(bytes).into_owned()), 1)
                }
                7 => (Constant::Class(reader.read_u16()?), 1),
                // String, MethodType, Module, Package
                8 | 16 | 19 | 20 => {
                    reader.read_u16()?;
                    (Constant::Other, 1)
                }
                // Integer, Float, refs, NameAndType, Dynamic, InvokeDynamic
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.read_u32()?;
                    (Constant::Other, 1)
                }
                // Long, Double
                5 | 6 => {
                    reader.read_u64()?;
                    (Constant::Other, 2)
                }
                // MethodHandle
                15 => {
                    reader.read_u8()?;
                    reader.read_u16()?;
                    (Constant::Other, 1)
                }
                _ => return Err(ClassFileError::UnknownConstantTag { tag, index }),
            };
            entries.push(entry);
            if slots == 2 {
                entries.push(Constant::Empty);
            }
            index = index.saturating_add(slots);
        }

        Ok(Self { entries })
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.entries.get(index as usize) {
            Some(Constant::Utf8(s)) => Ok(s),
            _ => Err(ClassFileError::BadConstantIndex(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str> {
        match self.entries.get(index as usize) {
            Some(Constant::Class(name_index)) => self.utf8(*name_index),
            _ => Err(ClassFileError::BadConstantIndex(index)),
        }
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Split a method descriptor into parameter and return descriptors
///
/// `(I[Ljava/lang/String;J)V` gives `["I", "[Ljava/lang/String;", "J"]`
/// and `"V"`. Returns `None` for malformed descriptors.
pub fn split_method_descriptor(descriptor: &str) -> Option<(Vec<&str>, &str)> {
    let rest = descriptor.strip_prefix('(')?;
    let close = rest.find(')')?;
    let (mut params_src, ret) = (&rest[..close], &rest[close + 1..]);

    let mut params = Vec::new();
    while !params_src.is_empty() {
        let len = field_descriptor_len(params_src)?;
        params.push(&params_src[..len]);
        params_src = &params_src[len..];
    }

    if ret != "V" && field_descriptor_len(ret)? != ret.len() {
        return None;
    }
    Some((params, ret))
}

/// Length of the field descriptor at the start of `s`
fn field_descriptor_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let dims = bytes.iter().take_while(|&&b| b == b'[').count();
    match bytes.get(dims)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(dims + 1),
        b'L' => {
            let end = s[dims..].find(';')?;
            Some(dims + end + 1)
        }
        _ => None,
    }
}
