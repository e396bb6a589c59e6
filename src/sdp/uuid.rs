//! Bluetooth UUIDs
//!
//! UUIDs are kept as 16 bytes in little-endian order. Values derived from the
//! Bluetooth Base UUID can be represented on the wire in their 16-bit or 32-bit
//! short forms.

use core::fmt;

/// Bluetooth Base UUID `00000000-0000-1000-8000-00805F9B34FB`, little-endian
const BASE_UUID: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Offset of the 32-bit short value inside the little-endian representation
const SHORT_VALUE_OFFSET: usize = 12;

/// 128-bit Bluetooth UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uuid {
    value: [u8; 16],
}

/// Smallest wire representation of a UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UuidSize {
    /// 16-bit short form
    Short16,
    /// 32-bit short form
    Short32,
    /// Full 128-bit form
    Full128,
}

impl UuidSize {
    /// Number of bytes this form occupies on the wire
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            Self::Short16 => 2,
            Self::Short32 => 4,
            Self::Full128 => 16,
        }
    }
}

impl Uuid {
    /// Create a UUID from its 16-bit short form
    #[must_use]
    pub const fn from_u16(short: u16) -> Self {
        Self::from_u32(short as u32)
    }

    /// Create a UUID from its 32-bit short form
    #[must_use]
    pub const fn from_u32(short: u32) -> Self {
        let mut value = BASE_UUID;
        let bytes = short.to_le_bytes();
        value[SHORT_VALUE_OFFSET] = bytes[0];
        value[SHORT_VALUE_OFFSET + 1] = bytes[1];
        value[SHORT_VALUE_OFFSET + 2] = bytes[2];
        value[SHORT_VALUE_OFFSET + 3] = bytes[3];
        Self { value }
    }

    /// Create a UUID from its numeric value, e.g. `0x0000110A_0000_1000_8000_00805F9B34FB`
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self {
            value: value.to_le_bytes(),
        }
    }

    /// Create a UUID from bytes in little-endian order
    #[must_use]
    pub const fn from_le_bytes(value: [u8; 16]) -> Self {
        Self { value }
    }

    /// Create a UUID from bytes in big-endian (textual) order
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 16]) -> Self {
        Self::from_u128(u128::from_be_bytes(bytes))
    }

    /// Numeric value of the UUID
    #[must_use]
    pub const fn to_u128(&self) -> u128 {
        u128::from_le_bytes(self.value)
    }

    /// Bytes in little-endian order
    #[must_use]
    pub const fn as_le_bytes(&self) -> &[u8; 16] {
        &self.value
    }

    /// Bytes in big-endian (wire and textual) order
    #[must_use]
    pub const fn to_be_bytes(&self) -> [u8; 16] {
        self.to_u128().to_be_bytes()
    }

    /// Check whether the low 96 bits match the Bluetooth Base UUID
    #[must_use]
    pub fn is_base_derived(&self) -> bool {
        self.value[..SHORT_VALUE_OFFSET] == BASE_UUID[..SHORT_VALUE_OFFSET]
    }

    /// 32-bit short form, if this UUID is derived from the Base UUID
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        if !self.is_base_derived() {
            return None;
        }
        let mut short = [0u8; 4];
        short.copy_from_slice(&self.value[SHORT_VALUE_OFFSET..]);
        Some(u32::from_le_bytes(short))
    }

    /// 16-bit short form, if this UUID has one
    #[must_use]
    pub fn as_u16(&self) -> Option<u16> {
        self.as_u32().and_then(|short| u16::try_from(short).ok())
    }

    /// Smallest wire form able to represent this UUID
    #[must_use]
    pub fn compact_size(&self) -> UuidSize {
        match self.as_u32() {
            Some(short) if short <= u32::from(u16::MAX) => UuidSize::Short16,
            Some(_) => UuidSize::Short32,
            None => UuidSize::Full128,
        }
    }
}

impl From<u16> for Uuid {
    fn from(short: u16) -> Self {
        Self::from_u16(short)
    }
}

impl From<u32> for Uuid {
    fn from(short: u32) -> Self {
        Self::from_u32(short)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_be_bytes();
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0],
            b[1],
            b[2],
            b[3],
            b[4],
            b[5],
            b[6],
            b[7],
            b[8],
            b[9],
            b[10],
            b[11],
            b[12],
            b[13],
            b[14],
            b[15]
        )
    }
}
