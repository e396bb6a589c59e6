//! SDP Data Elements
//!
//! Data elements are the self-describing values every SDP attribute, search
//! pattern and attribute list is built from. Each element starts with a header
//! byte holding a 5-bit type descriptor and a 3-bit size index, optionally
//! followed by a big-endian length field and then the payload.
//!
//! ```text
//!   7       3 2   0
//!  +---------+-----+------------------+-----------------+
//!  |  type   |size | [length 1/2/4 B] | payload ...     |
//!  +---------+-----+------------------+-----------------+
//! ```

use super::{SdpError, uuid::Uuid, uuid::UuidSize};
use alloc::{string::String, vec::Vec};
use core::fmt;

/// Deepest sequence/alternative nesting accepted by the decoder
pub const MAX_NESTING_DEPTH: usize = 32;

/// Data element type descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DataElementType {
    /// Null (nil) value
    Null = 0,
    /// Unsigned integer
    UnsignedInt = 1,
    /// Two's complement signed integer
    SignedInt = 2,
    /// UUID
    Uuid = 3,
    /// Text string
    TextString = 4,
    /// Boolean
    Boolean = 5,
    /// Data element sequence
    Sequence = 6,
    /// Data element alternative
    Alternative = 7,
    /// URL
    Url = 8,
}

/// Data element size index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DataElementSize {
    /// 1 byte (0 bytes for Null)
    Size1 = 0,
    /// 2 bytes
    Size2 = 1,
    /// 4 bytes
    Size4 = 2,
    /// 8 bytes
    Size8 = 3,
    /// 16 bytes
    Size16 = 4,
    /// Additional 8-bit size descriptor follows
    AdditionalU8 = 5,
    /// Additional 16-bit size descriptor follows
    AdditionalU16 = 6,
    /// Additional 32-bit size descriptor follows
    AdditionalU32 = 7,
}

/// SDP Data Element
///
/// Sequences and alternatives own their children outright, so an element is
/// always a plain tree. The size index written on the wire is derived from the
/// variant (and payload length), which keeps type and size consistent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataElement {
    /// Null value
    #[default]
    Null,
    /// Boolean value
    Boolean(bool),
    /// Unsigned 8-bit integer
    UnsignedInt8(u8),
    /// Unsigned 16-bit integer
    UnsignedInt16(u16),
    /// Unsigned 32-bit integer
    UnsignedInt32(u32),
    /// Unsigned 64-bit integer
    UnsignedInt64(u64),
    /// Signed 8-bit integer
    SignedInt8(i8),
    /// Signed 16-bit integer
    SignedInt16(i16),
    /// Signed 32-bit integer
    SignedInt32(i32),
    /// Signed 64-bit integer
    SignedInt64(i64),
    /// UUID, written in its most compact form
    Uuid(Uuid),
    /// Text string (raw bytes, usually UTF-8)
    TextString(Vec<u8>),
    /// URL string
    Url(Vec<u8>),
    /// Ordered sequence of elements
    Sequence(Vec<DataElement>),
    /// Alternative: pick one of the contained elements
    Alternative(Vec<DataElement>),
}

impl DataElementType {
    /// Create from the 5-bit type descriptor
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Null),
            1 => Some(Self::UnsignedInt),
            2 => Some(Self::SignedInt),
            3 => Some(Self::Uuid),
            4 => Some(Self::TextString),
            5 => Some(Self::Boolean),
            6 => Some(Self::Sequence),
            7 => Some(Self::Alternative),
            8 => Some(Self::Url),
            _ => None,
        }
    }
}

impl DataElementSize {
    /// Create from the 3-bit size index
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x07 {
            0 => Self::Size1,
            1 => Self::Size2,
            2 => Self::Size4,
            3 => Self::Size8,
            4 => Self::Size16,
            5 => Self::AdditionalU8,
            6 => Self::AdditionalU16,
            _ => Self::AdditionalU32,
        }
    }

    /// Payload length for fixed size indices, `None` when a length field follows
    #[must_use]
    pub const fn fixed_len(self) -> Option<usize> {
        match self {
            Self::Size1 => Some(1),
            Self::Size2 => Some(2),
            Self::Size4 => Some(4),
            Self::Size8 => Some(8),
            Self::Size16 => Some(16),
            Self::AdditionalU8 | Self::AdditionalU16 | Self::AdditionalU32 => None,
        }
    }

    /// Length of the size descriptor following the header byte
    #[must_use]
    pub const fn length_field_len(self) -> usize {
        match self {
            Self::AdditionalU8 => 1,
            Self::AdditionalU16 => 2,
            Self::AdditionalU32 => 4,
            _ => 0,
        }
    }

    /// Smallest variable-length size index able to describe `len` bytes
    #[must_use]
    pub const fn for_length(len: usize) -> Self {
        if len <= u8::MAX as usize {
            Self::AdditionalU8
        } else if len <= u16::MAX as usize {
            Self::AdditionalU16
        } else {
            Self::AdditionalU32
        }
    }

    const fn from_uuid_size(size: UuidSize) -> Self {
        match size {
            UuidSize::Short16 => Self::Size2,
            UuidSize::Short32 => Self::Size4,
            UuidSize::Full128 => Self::Size16,
        }
    }
}

impl DataElement {
    /// Create a text string element
    #[must_use]
    pub fn text_string(text: &str) -> Self {
        Self::TextString(text.as_bytes().to_vec())
    }

    /// Create a URL element
    #[must_use]
    pub fn url(url: &str) -> Self {
        Self::Url(url.as_bytes().to_vec())
    }

    /// Create an alternative element
    #[must_use]
    pub const fn alternative(choices: Vec<DataElement>) -> Self {
        Self::Alternative(choices)
    }

    /// Replace this element with a new value, fixing type and size together
    pub fn set<T: Into<DataElement>>(&mut self, value: T) {
        *self = value.into();
    }

    /// Get the typed value held by this element
    ///
    /// Returns `None` if the element holds a different type or integer width.
    #[must_use]
    pub fn get<T: FromDataElement>(&self) -> Option<T> {
        T::from_element(self)
    }

    /// Get the data element type
    #[must_use]
    pub const fn data_type(&self) -> DataElementType {
        match self {
            Self::Null => DataElementType::Null,
            Self::Boolean(_) => DataElementType::Boolean,
            Self::UnsignedInt8(_)
            | Self::UnsignedInt16(_)
            | Self::UnsignedInt32(_)
            | Self::UnsignedInt64(_) => DataElementType::UnsignedInt,
            Self::SignedInt8(_)
            | Self::SignedInt16(_)
            | Self::SignedInt32(_)
            | Self::SignedInt64(_) => DataElementType::SignedInt,
            Self::Uuid(_) => DataElementType::Uuid,
            Self::TextString(_) => DataElementType::TextString,
            Self::Url(_) => DataElementType::Url,
            Self::Sequence(_) => DataElementType::Sequence,
            Self::Alternative(_) => DataElementType::Alternative,
        }
    }

    /// Get the size index this element is written with
    #[must_use]
    pub fn size(&self) -> DataElementSize {
        self.size_for(self.payload_len())
    }

    /// Size index for a payload of `payload_len` bytes
    fn size_for(&self, payload_len: usize) -> DataElementSize {
        match self {
            Self::Null | Self::Boolean(_) | Self::UnsignedInt8(_) | Self::SignedInt8(_) => {
                DataElementSize::Size1
            }
            Self::UnsignedInt16(_) | Self::SignedInt16(_) => DataElementSize::Size2,
            Self::UnsignedInt32(_) | Self::SignedInt32(_) => DataElementSize::Size4,
            Self::UnsignedInt64(_) | Self::SignedInt64(_) => DataElementSize::Size8,
            Self::Uuid(uuid) => DataElementSize::from_uuid_size(uuid.compact_size()),
            Self::TextString(_) | Self::Url(_) | Self::Sequence(_) | Self::Alternative(_) => {
                DataElementSize::for_length(payload_len)
            }
        }
    }

    /// Bytes needed to encode this element, including all nested elements
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        let payload_len = self.payload_len();
        1 + self.size_for(payload_len).length_field_len() + payload_len
    }

    fn payload_len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Boolean(_) | Self::UnsignedInt8(_) | Self::SignedInt8(_) => 1,
            Self::UnsignedInt16(_) | Self::SignedInt16(_) => 2,
            Self::UnsignedInt32(_) | Self::SignedInt32(_) => 4,
            Self::UnsignedInt64(_) | Self::SignedInt64(_) => 8,
            Self::Uuid(uuid) => uuid.compact_size().byte_len(),
            Self::TextString(bytes) | Self::Url(bytes) => bytes.len(),
            Self::Sequence(items) | Self::Alternative(items) => {
                items.iter().map(Self::encoded_size).sum()
            }
        }
    }

    /// Elements of a sequence
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[DataElement]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Choices of an alternative
    #[must_use]
    pub fn as_alternative(&self) -> Option<&[DataElement]> {
        match self {
            Self::Alternative(items) => Some(items),
            _ => None,
        }
    }

    /// Element at `index` of a sequence or alternative
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&DataElement> {
        match self {
            Self::Sequence(items) | Self::Alternative(items) => items.get(index),
            _ => None,
        }
    }

    /// Raw bytes of a text string or URL
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::TextString(bytes) | Self::Url(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Text string or URL as UTF-8, if valid
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes()
            .and_then(|bytes| core::str::from_utf8(bytes).ok())
    }

    /// Encode this element into `buffer`
    ///
    /// # Errors
    /// Returns `BufferTooSmall` without touching `buffer` if it is shorter
    /// than [`DataElement::encoded_size`].
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, SdpError> {
        let size = self.encoded_size();
        let Some(target) = buffer.get_mut(..size) else {
            return Err(SdpError::BufferTooSmall);
        };
        let written = self.write(target);
        debug_assert_eq!(written, size);
        Ok(written)
    }

    /// Encode this element into a freshly allocated buffer
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buffer = alloc::vec![0u8; self.encoded_size()];
        let written = self.write(&mut buffer);
        buffer.truncate(written);
        buffer
    }

    /// Append the encoding of this element to `out`
    pub fn append_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.resize(start + self.encoded_size(), 0);
        self.write(&mut out[start..]);
    }

    /// Write into a buffer already known to hold `encoded_size()` bytes
    #[allow(clippy::cast_possible_truncation)]
    fn write(&self, buffer: &mut [u8]) -> usize {
        let payload_len = self.payload_len();
        let size = self.size_for(payload_len);
        buffer[0] = ((self.data_type() as u8) << 3) | size as u8;
        let mut pos = 1;

        match size {
            DataElementSize::AdditionalU8 => {
                buffer[pos] = payload_len as u8;
            }
            DataElementSize::AdditionalU16 => {
                buffer[pos..pos + 2].copy_from_slice(&(payload_len as u16).to_be_bytes());
            }
            DataElementSize::AdditionalU32 => {
                buffer[pos..pos + 4].copy_from_slice(&(payload_len as u32).to_be_bytes());
            }
            _ => {}
        }
        pos += size.length_field_len();

        let payload = &mut buffer[pos..pos + payload_len];
        match self {
            Self::Null => {}
            Self::Boolean(value) => payload[0] = u8::from(*value),
            Self::UnsignedInt8(value) => payload[0] = *value,
            Self::UnsignedInt16(value) => payload.copy_from_slice(&value.to_be_bytes()),
            Self::UnsignedInt32(value) => payload.copy_from_slice(&value.to_be_bytes()),
            Self::UnsignedInt64(value) => payload.copy_from_slice(&value.to_be_bytes()),
            Self::SignedInt8(value) => payload.copy_from_slice(&value.to_be_bytes()),
            Self::SignedInt16(value) => payload.copy_from_slice(&value.to_be_bytes()),
            Self::SignedInt32(value) => payload.copy_from_slice(&value.to_be_bytes()),
            Self::SignedInt64(value) => payload.copy_from_slice(&value.to_be_bytes()),
            Self::Uuid(uuid) => match uuid.compact_size() {
                UuidSize::Short16 => {
                    payload.copy_from_slice(&uuid.as_u16().unwrap_or_default().to_be_bytes());
                }
                UuidSize::Short32 => {
                    payload.copy_from_slice(&uuid.as_u32().unwrap_or_default().to_be_bytes());
                }
                // The in-memory form is little-endian; the wire wants it reversed.
                UuidSize::Full128 => payload.copy_from_slice(&uuid.to_be_bytes()),
            },
            Self::TextString(bytes) | Self::Url(bytes) => payload.copy_from_slice(bytes),
            Self::Sequence(items) | Self::Alternative(items) => {
                let mut offset = 0;
                for item in items {
                    offset += item.write(&mut payload[offset..]);
                }
            }
        }

        pos + payload_len
    }

    /// Decode one element from the start of `data`
    ///
    /// Returns the element and the number of bytes it occupied. On failure no
    /// part of a partially decoded tree is returned.
    ///
    /// # Errors
    /// Returns `PacketMalformed` if the buffer is truncated, the type/size
    /// combination is illegal, or a nested element does not exactly fill its
    /// enclosing sequence.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), SdpError> {
        Self::decode_nested(data, 0)
    }

    fn decode_nested(data: &[u8], depth: usize) -> Result<(Self, usize), SdpError> {
        let (&header, rest) = data.split_first().ok_or(SdpError::PacketMalformed)?;
        let data_type = DataElementType::from_u8(header >> 3).ok_or(SdpError::PacketMalformed)?;
        let size = DataElementSize::from_u8(header);

        let payload_len = match size.fixed_len() {
            // Null is the only type whose one-byte size index carries no payload
            Some(_) if data_type == DataElementType::Null => 0,
            Some(len) => len,
            None => read_length(rest, size)?,
        };
        let start = size.length_field_len();
        let payload = rest
            .get(start..)
            .and_then(|bytes| bytes.get(..payload_len))
            .ok_or(SdpError::PacketMalformed)?;
        let consumed = 1 + start + payload_len;

        let element = match (data_type, size) {
            (DataElementType::Null, DataElementSize::Size1) => Self::Null,
            (DataElementType::Boolean, DataElementSize::Size1) => Self::Boolean(payload[0] != 0),
            (DataElementType::UnsignedInt, DataElementSize::Size1) => Self::UnsignedInt8(payload[0]),
            (DataElementType::UnsignedInt, DataElementSize::Size2) => {
                Self::UnsignedInt16(u16::from_be_bytes(array(payload)?))
            }
            (DataElementType::UnsignedInt, DataElementSize::Size4) => {
                Self::UnsignedInt32(u32::from_be_bytes(array(payload)?))
            }
            (DataElementType::UnsignedInt, DataElementSize::Size8) => {
                Self::UnsignedInt64(u64::from_be_bytes(array(payload)?))
            }
            (DataElementType::SignedInt, DataElementSize::Size1) => {
                Self::SignedInt8(i8::from_be_bytes(array(payload)?))
            }
            (DataElementType::SignedInt, DataElementSize::Size2) => {
                Self::SignedInt16(i16::from_be_bytes(array(payload)?))
            }
            (DataElementType::SignedInt, DataElementSize::Size4) => {
                Self::SignedInt32(i32::from_be_bytes(array(payload)?))
            }
            (DataElementType::SignedInt, DataElementSize::Size8) => {
                Self::SignedInt64(i64::from_be_bytes(array(payload)?))
            }
            (DataElementType::Uuid, DataElementSize::Size2) => {
                Self::Uuid(Uuid::from_u16(u16::from_be_bytes(array(payload)?)))
            }
            (DataElementType::Uuid, DataElementSize::Size4) => {
                Self::Uuid(Uuid::from_u32(u32::from_be_bytes(array(payload)?)))
            }
            (DataElementType::Uuid, DataElementSize::Size16) => {
                Self::Uuid(Uuid::from_be_bytes(array(payload)?))
            }
            (DataElementType::TextString, _) if size.fixed_len().is_none() => {
                Self::TextString(payload.to_vec())
            }
            (DataElementType::Url, _) if size.fixed_len().is_none() => Self::Url(payload.to_vec()),
            (DataElementType::Sequence, _) if size.fixed_len().is_none() => {
                Self::Sequence(decode_children(payload, depth)?)
            }
            (DataElementType::Alternative, _) if size.fixed_len().is_none() => {
                Self::Alternative(decode_children(payload, depth)?)
            }
            _ => return Err(SdpError::PacketMalformed),
        };

        Ok((element, consumed))
    }
}

/// Read a 1/2/4-byte big-endian length field
fn read_length(data: &[u8], size: DataElementSize) -> Result<usize, SdpError> {
    let len = match size {
        DataElementSize::AdditionalU8 => data.first().map(|&len| usize::from(len)),
        DataElementSize::AdditionalU16 => data
            .get(..2)
            .and_then(|bytes| array(bytes).ok())
            .map(|bytes| usize::from(u16::from_be_bytes(bytes))),
        DataElementSize::AdditionalU32 => data
            .get(..4)
            .and_then(|bytes| array(bytes).ok())
            .and_then(|bytes| usize::try_from(u32::from_be_bytes(bytes)).ok()),
        _ => None,
    };
    len.ok_or(SdpError::PacketMalformed)
}

/// Decode children until the aggregate payload is exactly used up
fn decode_children(payload: &[u8], depth: usize) -> Result<Vec<DataElement>, SdpError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(SdpError::PacketMalformed);
    }
    let mut items = Vec::new();
    let mut pos = 0;
    while pos < payload.len() {
        let (item, used) = DataElement::decode_nested(&payload[pos..], depth + 1)?;
        items.push(item);
        pos += used;
    }
    Ok(items)
}

fn array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], SdpError> {
    bytes.try_into().map_err(|_| SdpError::PacketMalformed)
}

/// Types that can be read out of a [`DataElement`]
pub trait FromDataElement: Sized {
    /// Extract the value if `element` holds exactly this type
    fn from_element(element: &DataElement) -> Option<Self>;
}

macro_rules! impl_element_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromDataElement for $ty {
                fn from_element(element: &DataElement) -> Option<Self> {
                    match element {
                        DataElement::$variant(value) => Some(*value),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for DataElement {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_element_value! {
    bool => Boolean,
    u8 => UnsignedInt8,
    u16 => UnsignedInt16,
    u32 => UnsignedInt32,
    u64 => UnsignedInt64,
    i8 => SignedInt8,
    i16 => SignedInt16,
    i32 => SignedInt32,
    i64 => SignedInt64,
    Uuid => Uuid,
}

impl From<&str> for DataElement {
    fn from(text: &str) -> Self {
        Self::text_string(text)
    }
}

impl From<String> for DataElement {
    fn from(text: String) -> Self {
        Self::TextString(text.into_bytes())
    }
}

impl From<Vec<DataElement>> for DataElement {
    fn from(items: Vec<DataElement>) -> Self {
        Self::Sequence(items)
    }
}

impl fmt::Display for DataElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean(value) => write!(f, "Boolean({value})"),
            Self::UnsignedInt8(value) => write!(f, "UnsignedInt:1({value:#x})"),
            Self::UnsignedInt16(value) => write!(f, "UnsignedInt:2({value:#x})"),
            Self::UnsignedInt32(value) => write!(f, "UnsignedInt:4({value:#x})"),
            Self::UnsignedInt64(value) => write!(f, "UnsignedInt:8({value:#x})"),
            Self::SignedInt8(value) => write!(f, "SignedInt:1({value})"),
            Self::SignedInt16(value) => write!(f, "SignedInt:2({value})"),
            Self::SignedInt32(value) => write!(f, "SignedInt:4({value})"),
            Self::SignedInt64(value) => write!(f, "SignedInt:8({value})"),
            Self::Uuid(uuid) => write!(f, "UUID({uuid})"),
            Self::TextString(bytes) => write!(f, "String({})", String::from_utf8_lossy(bytes)),
            Self::Url(bytes) => write!(f, "Url({})", String::from_utf8_lossy(bytes)),
            Self::Sequence(items) | Self::Alternative(items) => {
                let name = if matches!(self, Self::Sequence(_)) {
                    "Sequence"
                } else {
                    "Alternative"
                };
                write!(f, "{name} {{ ")?;
                for item in items {
                    write!(f, "{item} ")?;
                }
                write!(f, "}}")
            }
        }
    }
}
