//! SDP Attribute Identifiers
//!
//! Attribute IDs, the ordered attribute maps returned for each discovered
//! service, and the attribute ID/range lists carried in attribute requests.

use super::{SdpError, data_element::DataElement};
use alloc::{collections::BTreeMap, vec::Vec};

/// Attribute ID type
pub type AttributeId = u16;

/// Attributes of one service record, ordered by ascending attribute ID
pub type AttributeMap = BTreeMap<AttributeId, DataElement>;

/// Universal SDP Attribute IDs
///
/// These are standardized attribute IDs defined by the Bluetooth SIG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum UniversalAttributeId {
    /// Service Record Handle
    ServiceRecordHandle = 0x0000,
    /// Service Class ID List
    ServiceClassIdList = 0x0001,
    /// Service Record State
    ServiceRecordState = 0x0002,
    /// Service ID
    ServiceId = 0x0003,
    /// Protocol Descriptor List
    ProtocolDescriptorList = 0x0004,
    /// Browse Group List
    BrowseGroupList = 0x0005,
    /// Language Based Attribute ID List
    LanguageBaseAttributeIdList = 0x0006,
    /// Service Info Time To Live
    ServiceInfoTimeToLive = 0x0007,
    /// Service Availability
    ServiceAvailability = 0x0008,
    /// Bluetooth Profile Descriptor List
    BluetoothProfileDescriptorList = 0x0009,
    /// Documentation URL
    DocumentationUrl = 0x000A,
    /// Client Executable URL
    ClientExecutableUrl = 0x000B,
    /// Icon URL
    IconUrl = 0x000C,
    /// Additional Protocol Descriptor Lists
    AdditionalProtocolDescriptorLists = 0x000D,
}

/// Attribute Range, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttributeRange {
    /// Start attribute ID (inclusive)
    pub start: AttributeId,
    /// End attribute ID (inclusive)
    pub end: AttributeId,
}

/// Ordered, non-overlapping list of attribute ID ranges
///
/// Overlapping and adjacent ranges are merged as they are added, so the list
/// is always in its shortest wire form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeIdList {
    ranges: Vec<AttributeRange>,
}

impl UniversalAttributeId {
    /// Convert to u16 value
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Create from u16 value
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Self::ServiceRecordHandle),
            0x0001 => Some(Self::ServiceClassIdList),
            0x0002 => Some(Self::ServiceRecordState),
            0x0003 => Some(Self::ServiceId),
            0x0004 => Some(Self::ProtocolDescriptorList),
            0x0005 => Some(Self::BrowseGroupList),
            0x0006 => Some(Self::LanguageBaseAttributeIdList),
            0x0007 => Some(Self::ServiceInfoTimeToLive),
            0x0008 => Some(Self::ServiceAvailability),
            0x0009 => Some(Self::BluetoothProfileDescriptorList),
            0x000A => Some(Self::DocumentationUrl),
            0x000B => Some(Self::ClientExecutableUrl),
            0x000C => Some(Self::IconUrl),
            0x000D => Some(Self::AdditionalProtocolDescriptorLists),
            _ => None,
        }
    }
}

impl AttributeRange {
    /// Range covering every attribute ID
    pub const ALL: Self = Self::new(0x0000, 0xFFFF);

    /// Create new attribute range
    #[must_use]
    pub const fn new(start: AttributeId, end: AttributeId) -> Self {
        Self { start, end }
    }

    /// Range holding a single attribute ID
    #[must_use]
    pub const fn single(id: AttributeId) -> Self {
        Self::new(id, id)
    }

    /// Check if attribute ID is in range
    #[must_use]
    pub const fn contains(&self, id: AttributeId) -> bool {
        id >= self.start && id <= self.end
    }

    /// Number of attribute IDs covered
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.end.saturating_sub(self.start) as u32 + 1
    }

    /// Encode as a UInt16 (single ID) or UInt32 (`start << 16 | end`) element
    #[must_use]
    pub fn to_data_element(&self) -> DataElement {
        if self.start == self.end {
            DataElement::UnsignedInt16(self.start)
        } else {
            DataElement::UnsignedInt32((u32::from(self.start) << 16) | u32::from(self.end))
        }
    }

    /// Decode from a UInt16 or UInt32 element
    ///
    /// # Errors
    /// Returns `PacketMalformed` for any other element or a reversed range
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_data_element(element: &DataElement) -> Result<Self, SdpError> {
        match *element {
            DataElement::UnsignedInt16(id) => Ok(Self::single(id)),
            DataElement::UnsignedInt32(value) => {
                let range = Self::new((value >> 16) as u16, value as u16);
                if range.start > range.end {
                    return Err(SdpError::PacketMalformed);
                }
                Ok(range)
            }
            _ => Err(SdpError::PacketMalformed),
        }
    }
}

impl AttributeIdList {
    /// Create new empty list
    #[must_use]
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// List covering every attribute ID, 0x0000-0xFFFF
    #[must_use]
    pub fn all() -> Self {
        let mut list = Self::new();
        list.ranges.push(AttributeRange::ALL);
        list
    }

    /// Build a list from individual IDs; no IDs means all attributes
    #[must_use]
    pub fn from_ids<I: IntoIterator<Item = AttributeId>>(ids: I) -> Self {
        let mut list = Self::new();
        for id in ids {
            list.add_id(id);
        }
        if list.is_empty() {
            return Self::all();
        }
        list
    }

    /// Add a single attribute ID
    pub fn add_id(&mut self, id: AttributeId) {
        self.insert(AttributeRange::single(id));
    }

    /// Add an inclusive attribute ID range
    ///
    /// # Errors
    /// Returns `InvalidParameters` if `start` is greater than `end`
    pub fn add_range(&mut self, start: AttributeId, end: AttributeId) -> Result<(), SdpError> {
        if start > end {
            return Err(SdpError::InvalidParameters);
        }
        self.insert(AttributeRange::new(start, end));
        Ok(())
    }

    fn insert(&mut self, range: AttributeRange) {
        let at = self.ranges.partition_point(|existing| existing.start < range.start);
        self.ranges.insert(at, range);

        let mut merged: Vec<AttributeRange> = Vec::with_capacity(self.ranges.len());
        for next in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if u32::from(next.start) <= u32::from(last.end) + 1 => {
                    last.end = last.end.max(next.end);
                }
                _ => merged.push(next),
            }
        }
        self.ranges = merged;
    }

    /// Ranges in ascending order
    #[must_use]
    pub fn ranges(&self) -> &[AttributeRange] {
        &self.ranges
    }

    /// Check if an attribute ID is covered
    #[must_use]
    pub fn contains(&self, id: AttributeId) -> bool {
        self.ranges.iter().any(|range| range.contains(id))
    }

    /// Check if the list holds no ranges
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Encode as a data element sequence for an attribute request
    #[must_use]
    pub fn to_data_element(&self) -> DataElement {
        DataElement::Sequence(
            self.ranges
                .iter()
                .map(AttributeRange::to_data_element)
                .collect(),
        )
    }

    /// Decode the attribute ID list of an attribute request
    ///
    /// # Errors
    /// Returns `PacketMalformed` if the element is not a non-empty sequence of
    /// valid IDs and ranges
    pub fn from_data_element(element: &DataElement) -> Result<Self, SdpError> {
        let items = element.as_sequence().ok_or(SdpError::PacketMalformed)?;
        if items.is_empty() {
            return Err(SdpError::PacketMalformed);
        }
        let mut list = Self::new();
        for item in items {
            list.insert(AttributeRange::from_data_element(item)?);
        }
        Ok(list)
    }
}

/// Decode one attribute list: a sequence of (UInt16 ID, value) pairs
///
/// # Errors
/// Returns `PacketMalformed` if the element is not a sequence of pairs or the
/// attribute IDs are not strictly ascending
pub fn attribute_map_from_element(element: &DataElement) -> Result<AttributeMap, SdpError> {
    let items = element.as_sequence().ok_or(SdpError::PacketMalformed)?;
    if items.len() % 2 != 0 {
        return Err(SdpError::PacketMalformed);
    }

    let mut attributes = AttributeMap::new();
    let mut last_id: Option<AttributeId> = None;
    for pair in items.chunks_exact(2) {
        let id = pair[0].get::<u16>().ok_or(SdpError::PacketMalformed)?;
        if last_id.is_some_and(|last| id <= last) {
            warn!("[SDP ATTR] attribute {:#x} out of order", id);
            return Err(SdpError::PacketMalformed);
        }
        last_id = Some(id);
        attributes.insert(id, pair[1].clone());
    }
    Ok(attributes)
}

/// Encode one attribute list as a sequence of (UInt16 ID, value) pairs
#[must_use]
pub fn attribute_map_to_element(attributes: &AttributeMap) -> DataElement {
    let mut items = Vec::with_capacity(attributes.len() * 2);
    for (&id, value) in attributes {
        items.push(DataElement::UnsignedInt16(id));
        items.push(value.clone());
    }
    DataElement::Sequence(items)
}
