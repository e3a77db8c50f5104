//! Synthesized type descriptors and their binary image format
//!
//! Image layout:
//! - Header: magic (4 bytes) + version (u32) + flags (u32) + crc32 (u32) + checksum (32 bytes SHA-256)
//! - Payload: JSON-encoded `TypeDescriptor`

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

use weave_sdk::{HostClass, HostType};

/// Magic number for type images: "WEAV"
pub const IMAGE_MAGIC: [u8; 4] = *b"WEAV";

/// Current image version
pub const IMAGE_VERSION: u32 = 1;

/// Header size in bytes
pub const HEADER_LEN: usize = 48;

/// Image flags
pub mod flags {
    /// Image describes an adapter type
    pub const ADAPTER: u32 = 1 << 0;
}

/// Image encoding/decoding errors
#[derive(Debug, Error)]
pub enum ImageError {
    /// Image shorter than its header
    #[error("Truncated image: {0} bytes")]
    Truncated(usize),

    /// Invalid magic number
    #[error("Invalid magic number: expected WEAV, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {IMAGE_VERSION})")]
    UnsupportedVersion(u32),

    /// CRC32 mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Computed checksum
        actual: u32,
    },

    /// SHA-256 mismatch
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Stored digest (hex)
        expected: String,
        /// Computed digest (hex)
        actual: String,
    },

    /// Payload did not (de)serialize
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Host type by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    /// No value
    Void,
    /// Boolean
    Boolean,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Double
    Double,
    /// String
    Str,
    /// Any object
    Any,
    /// Host callable
    Callable,
    /// Class by fully qualified name
    Class(String),
}

impl TypeRef {
    /// Describe a host type
    pub fn of(ty: &HostType) -> Self {
        match ty {
            HostType::Void => TypeRef::Void,
            HostType::Boolean => TypeRef::Boolean,
            HostType::Int => TypeRef::Int,
            HostType::Long => TypeRef::Long,
            HostType::Double => TypeRef::Double,
            HostType::Str => TypeRef::Str,
            HostType::Any => TypeRef::Any,
            HostType::Callable => TypeRef::Callable,
            HostType::Object(c) => TypeRef::Class(c.name().to_string()),
        }
    }

    /// Resolve back to a host type, looking classes up with `resolve`
    pub fn resolve(&self, resolve: &dyn Fn(&str) -> Option<Arc<HostClass>>) -> Option<HostType> {
        Some(match self {
            TypeRef::Void => HostType::Void,
            TypeRef::Boolean => HostType::Boolean,
            TypeRef::Int => HostType::Int,
            TypeRef::Long => HostType::Long,
            TypeRef::Double => HostType::Double,
            TypeRef::Str => HostType::Str,
            TypeRef::Any => HostType::Any,
            TypeRef::Callable => HostType::Callable,
            TypeRef::Class(name) => HostType::Object(resolve(name)?),
        })
    }
}

/// What a descriptor defines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptorKind {
    /// Proxy for a dynamic class
    Proxy,
    /// Listener adapter
    Adapter,
}

/// Behavior when the dynamic side does not implement a forwarded method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fallback {
    /// Call the inherited host implementation
    Super,
    /// Fail with an abstract-method error
    Abstract,
}

/// Body of a synthesized method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StubBody {
    /// Forward to the paired dynamic instance
    ForwardToPeer {
        /// What to do when the instance has no implementation
        fallback: Fallback,
    },
    /// Call the callable stored in a field of the object
    InvokeField {
        /// Field holding the callable
        field: String,
    },
}

/// Constructor mirroring one superclass constructor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorStub {
    /// Parameter types
    pub params: Vec<TypeRef>,
    /// Index of the superclass constructor it runs
    pub super_index: usize,
}

/// Synthesized method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodStub {
    /// Method name
    pub name: String,
    /// Parameter types
    pub params: Vec<TypeRef>,
    /// Return type
    pub returns: TypeRef,
    /// Implementation
    pub body: StubBody,
}

/// Synthesized field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStub {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeRef,
}

/// Complete definition of a synthesized type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Unique type name
    pub name: String,
    /// Proxy or adapter
    pub kind: DescriptorKind,
    /// Superclass name (`None` means the root class)
    pub superclass: Option<String>,
    /// Implemented interface names
    pub interfaces: Vec<String>,
    /// Constructors
    pub constructors: Vec<ConstructorStub>,
    /// Methods
    pub methods: Vec<MethodStub>,
    /// Instance fields
    pub fields: Vec<FieldStub>,
    /// Name of the dynamic class (or listener interface) it was made for
    pub origin: String,
    /// Module of the dynamic class
    pub module: Option<String>,
}

impl TypeDescriptor {
    /// Encode into an image
    pub fn encode(&self) -> Result<Vec<u8>, ImageError> {
        let payload = serde_json::to_vec(self)?;
        let flags = match self.kind {
            DescriptorKind::Adapter => flags::ADAPTER,
            DescriptorKind::Proxy => 0,
        };

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&IMAGE_MAGIC);
        out.extend_from_slice(&IMAGE_VERSION.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        out.extend_from_slice(&Sha256::digest(&payload));
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode and verify an image
    pub fn decode(data: &[u8]) -> Result<Self, ImageError> {
        if data.len() < HEADER_LEN {
            return Err(ImageError::Truncated(data.len()));
        }
        let magic = [data[0], data[1], data[2], data[3]];
        if magic != IMAGE_MAGIC {
            return Err(ImageError::InvalidMagic(magic));
        }
        let version = read_u32(data, 4);
        if version != IMAGE_VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let payload = &data[HEADER_LEN..];
        let stored_crc32 = read_u32(data, 12);
        let calculated_crc32 = crc32fast::hash(payload);
        if stored_crc32 != calculated_crc32 {
            return Err(ImageError::ChecksumMismatch {
                expected: stored_crc32,
                actual: calculated_crc32,
            });
        }
        let stored_sha256 = &data[16..HEADER_LEN];
        let calculated_sha256 = Sha256::digest(payload);
        if stored_sha256 != calculated_sha256.as_slice() {
            return Err(ImageError::DigestMismatch {
                expected: hex::encode(stored_sha256),
                actual: hex::encode(calculated_sha256),
            });
        }

        Ok(serde_json::from_slice(payload)?)
    }
}

/// Hex SHA-256 of an image's payload, as stored in its header
pub fn image_digest(data: &[u8]) -> Option<String> {
    data.get(16..HEADER_LEN).map(hex::encode)
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
