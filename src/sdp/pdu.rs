//! SDP Protocol Data Units
//!
//! This module implements the SDP request and response formats exchanged
//! between SDP clients and servers over L2CAP.
//!
//! Every PDU is a 5-byte header followed by a parameter block. Responses end
//! with a continuation state block (1 length byte + up to 16 bytes) that the
//! client echoes in its next request when a result did not fit in one PDU.

use super::{
    SdpError, SdpErrorCode, SdpPduId, ServiceRecordHandle, TransactionId,
    attribute::{AttributeIdList, AttributeMap, attribute_map_from_element, attribute_map_to_element},
    data_element::DataElement,
    uuid::Uuid,
};
use crate::constants::{
    DEFAULT_MAX_ACCUMULATED_RESPONSE_SIZE, MAX_CONTINUATION_STATE_LENGTH,
    MAX_SEARCH_PATTERN_UUIDS, PDU_HEADER_SIZE, SERVICE_RECORD_HANDLE_SIZE,
};
use alloc::vec::Vec;

/// Opaque continuation token, 0-16 bytes
pub type ContinuationState = heapless::Vec<u8, MAX_CONTINUATION_STATE_LENGTH>;

/// Service search pattern, a set of up to 12 UUIDs
pub type SearchPattern = heapless::Vec<Uuid, MAX_SEARCH_PATTERN_UUIDS>;

/// Smallest attribute byte count a request may ask for
pub const MIN_MAXIMUM_ATTRIBUTE_BYTE_COUNT: u16 = 0x0007;

/// Service search response continuation: index of the next handle (u16)
const SEARCH_CONTINUATION_LENGTH: usize = 2;

/// Attribute response continuation: byte offset into the attribute list (u32)
const ATTRIBUTE_CONTINUATION_LENGTH: usize = 4;

/// SDP PDU Header
///
/// All SDP messages start with this 5-byte header containing the PDU ID,
/// transaction ID, and parameter length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SdpPduHeader {
    /// PDU identifier
    pub pdu_id: SdpPduId,
    /// Transaction identifier
    pub transaction_id: TransactionId,
    /// Length of parameters following the header
    pub parameter_length: u16,
}

/// Outcome of feeding one response PDU into a response accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseStatus {
    /// The response is complete
    Complete,
    /// More data is pending; resend the request with the continuation state
    NeedsMore,
}

/// An SDP request PDU
pub trait Request {
    /// Check that the request parameters are acceptable to send
    fn is_valid(&self) -> bool;

    /// Continuation state sent with the request
    fn continuation_state(&self) -> &[u8];

    /// Replace the continuation state sent with the request
    ///
    /// # Errors
    /// Returns `InvalidContinuationState` if `state` is longer than 16 bytes
    fn set_continuation_state(&mut self, state: &[u8]) -> Result<(), SdpError>;

    /// Build the complete PDU for this request
    ///
    /// # Errors
    /// Returns `InvalidParameters` if the request is not valid or does not fit
    /// a PDU
    fn to_pdu(&self, transaction_id: TransactionId) -> Result<Vec<u8>, SdpError>;
}

/// An SDP response PDU
pub trait Response {
    /// Check whether the full response has been received
    fn is_complete(&self) -> bool;

    /// Continuation state of the last parsed fragment
    fn continuation_state(&self) -> &[u8];

    /// Parse the parameter block of one response PDU
    ///
    /// # Errors
    /// Returns `NotReady` if the response is already complete and
    /// `PacketMalformed` if the parameters do not follow the format.
    fn parse(&mut self, parameters: &[u8]) -> Result<ParseStatus, SdpError>;

    /// Build a response PDU of at most `max_size` bytes
    ///
    /// `request_max` is the maximum record count or attribute byte count the
    /// request asked for. `continuation` is the state the request carried, or
    /// empty for the first PDU.
    ///
    /// # Errors
    /// Returns `InvalidContinuationState` if `continuation` does not address
    /// this result and `BufferTooSmall` if `max_size` leaves no room for data.
    fn to_pdu(
        &self,
        request_max: u16,
        transaction_id: TransactionId,
        max_size: u16,
        continuation: &[u8],
    ) -> Result<Vec<u8>, SdpError>;
}

impl SdpPduHeader {
    /// Create new PDU header
    #[must_use]
    pub const fn new(
        pdu_id: SdpPduId,
        transaction_id: TransactionId,
        parameter_length: u16,
    ) -> Self {
        Self {
            pdu_id,
            transaction_id,
            parameter_length,
        }
    }

    /// Encode header to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; PDU_HEADER_SIZE] {
        let tid = self.transaction_id.to_be_bytes();
        let len = self.parameter_length.to_be_bytes();
        [self.pdu_id as u8, tid[0], tid[1], len[0], len[1]]
    }

    /// Decode header from bytes
    ///
    /// # Errors
    /// Returns error if buffer is too small or contains an unknown PDU ID
    pub fn decode(data: &[u8]) -> Result<Self, SdpError> {
        let header = data.get(..PDU_HEADER_SIZE).ok_or(SdpError::PacketMalformed)?;
        let pdu_id = SdpPduId::from_u8(header[0]).ok_or(SdpError::PacketMalformed)?;

        Ok(Self {
            pdu_id,
            transaction_id: u16::from_be_bytes([header[1], header[2]]),
            parameter_length: u16::from_be_bytes([header[3], header[4]]),
        })
    }

    /// Split a PDU into its header and parameter block
    ///
    /// # Errors
    /// Returns `PacketMalformed` if the declared parameter length differs from
    /// the bytes actually present
    pub fn split(pdu: &[u8]) -> Result<(Self, &[u8]), SdpError> {
        let header = Self::decode(pdu)?;
        let parameters = &pdu[PDU_HEADER_SIZE..];
        if parameters.len() != usize::from(header.parameter_length) {
            return Err(SdpError::PacketMalformed);
        }
        Ok((header, parameters))
    }
}

/// Prepend a header to a parameter block
fn frame(
    pdu_id: SdpPduId,
    transaction_id: TransactionId,
    parameters: &[u8],
) -> Result<Vec<u8>, SdpError> {
    let parameter_length =
        u16::try_from(parameters.len()).map_err(|_| SdpError::InvalidParameters)?;
    let header = SdpPduHeader::new(pdu_id, transaction_id, parameter_length);

    let mut pdu = Vec::with_capacity(PDU_HEADER_SIZE + parameters.len());
    pdu.extend_from_slice(&header.encode());
    pdu.extend_from_slice(parameters);
    Ok(pdu)
}

fn write_continuation(out: &mut Vec<u8>, state: &[u8]) {
    // Callers only hand over ContinuationState contents, at most 16 bytes
    out.push(u8::try_from(state.len()).unwrap_or(0));
    out.extend_from_slice(state);
}

/// Read a continuation block that must end the parameter block exactly
fn read_continuation(data: &[u8]) -> Result<ContinuationState, SdpError> {
    let (&len, state) = data.split_first().ok_or(SdpError::PacketMalformed)?;
    if usize::from(len) > MAX_CONTINUATION_STATE_LENGTH {
        return Err(SdpError::InvalidContinuationState);
    }
    if state.len() != usize::from(len) {
        return Err(SdpError::PacketMalformed);
    }
    ContinuationState::from_slice(state).map_err(|()| SdpError::InvalidContinuationState)
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, SdpError> {
    data.get(at..at + 2)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u16::from_be_bytes)
        .ok_or(SdpError::PacketMalformed)
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, SdpError> {
    data.get(at..at + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or(SdpError::PacketMalformed)
}

fn search_pattern_element(pattern: &SearchPattern) -> DataElement {
    DataElement::Sequence(pattern.iter().copied().map(DataElement::Uuid).collect())
}

/// Decode a search pattern sequence, returning it and the bytes consumed
fn read_search_pattern(data: &[u8]) -> Result<(SearchPattern, usize), SdpError> {
    let (element, used) = DataElement::decode(data)?;
    let items = element.as_sequence().ok_or(SdpError::PacketMalformed)?;
    if items.is_empty() {
        return Err(SdpError::PacketMalformed);
    }

    let mut pattern = SearchPattern::new();
    for item in items {
        let uuid = item.get::<Uuid>().ok_or(SdpError::PacketMalformed)?;
        if !pattern.contains(&uuid) {
            pattern.push(uuid).map_err(|_| SdpError::PacketMalformed)?;
        }
    }
    Ok((pattern, used))
}

fn read_attribute_ids(data: &[u8]) -> Result<(AttributeIdList, usize), SdpError> {
    let (element, used) = DataElement::decode(data)?;
    Ok((AttributeIdList::from_data_element(&element)?, used))
}

fn add_to_pattern(pattern: &mut SearchPattern, uuid: Uuid) -> Result<(), SdpError> {
    if pattern.contains(&uuid) {
        return Ok(());
    }
    pattern.push(uuid).map_err(|_| SdpError::InvalidParameters)
}

/// Service Search Request parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceSearchRequest {
    /// Service search pattern (set of UUIDs)
    pub service_search_pattern: SearchPattern,
    /// Maximum number of service record handles to return
    pub maximum_service_record_count: u16,
    /// Continuation state (for handling large responses)
    pub continuation_state: ContinuationState,
}

impl ServiceSearchRequest {
    /// Create new service search request
    #[must_use]
    pub fn new(maximum_count: u16) -> Self {
        Self {
            maximum_service_record_count: maximum_count,
            ..Self::default()
        }
    }

    /// Add UUID to search pattern, ignoring duplicates
    ///
    /// # Errors
    /// Returns `InvalidParameters` if the pattern already holds 12 UUIDs
    pub fn add_uuid(&mut self, uuid: Uuid) -> Result<(), SdpError> {
        add_to_pattern(&mut self.service_search_pattern, uuid)
    }

    /// Parse request parameters
    ///
    /// # Errors
    /// Returns error if the parameters are malformed
    pub fn parse(parameters: &[u8]) -> Result<Self, SdpError> {
        let (service_search_pattern, mut pos) = read_search_pattern(parameters)?;
        let maximum_service_record_count = read_u16(parameters, pos)?;
        pos += 2;
        let continuation_state = read_continuation(&parameters[pos..])?;

        let request = Self {
            service_search_pattern,
            maximum_service_record_count,
            continuation_state,
        };
        if !request.is_valid() {
            return Err(SdpError::PacketMalformed);
        }
        Ok(request)
    }
}

impl Request for ServiceSearchRequest {
    fn is_valid(&self) -> bool {
        !self.service_search_pattern.is_empty() && self.maximum_service_record_count > 0
    }

    fn continuation_state(&self) -> &[u8] {
        &self.continuation_state
    }

    fn set_continuation_state(&mut self, state: &[u8]) -> Result<(), SdpError> {
        self.continuation_state =
            ContinuationState::from_slice(state).map_err(|()| SdpError::InvalidContinuationState)?;
        Ok(())
    }

    fn to_pdu(&self, transaction_id: TransactionId) -> Result<Vec<u8>, SdpError> {
        if !self.is_valid() {
            return Err(SdpError::InvalidParameters);
        }
        let mut parameters = Vec::new();
        search_pattern_element(&self.service_search_pattern).append_to(&mut parameters);
        parameters.extend_from_slice(&self.maximum_service_record_count.to_be_bytes());
        write_continuation(&mut parameters, &self.continuation_state);
        frame(SdpPduId::ServiceSearchRequest, transaction_id, &parameters)
    }
}

/// Service Search Response parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceSearchResponse {
    /// Total number of matching service records
    pub total_service_record_count: u16,
    /// Service record handles received or to be sent
    pub service_record_handles: Vec<ServiceRecordHandle>,
    /// Continuation state of the last parsed fragment
    pub continuation_state: ContinuationState,
    complete: bool,
    started: bool,
}

impl ServiceSearchResponse {
    /// Create an empty response, ready to parse fragments into
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a complete response holding the given handles
    #[must_use]
    pub fn with_handles(handles: Vec<ServiceRecordHandle>) -> Self {
        Self {
            total_service_record_count: u16::try_from(handles.len()).unwrap_or(u16::MAX),
            service_record_handles: handles,
            complete: true,
            started: true,
            ..Self::default()
        }
    }
}

impl Response for ServiceSearchResponse {
    fn is_complete(&self) -> bool {
        self.complete
    }

    fn continuation_state(&self) -> &[u8] {
        &self.continuation_state
    }

    fn parse(&mut self, parameters: &[u8]) -> Result<ParseStatus, SdpError> {
        if self.complete {
            return Err(SdpError::NotReady);
        }

        let total = read_u16(parameters, 0)?;
        let current = usize::from(read_u16(parameters, 2)?);
        let handles_end = 4 + current * SERVICE_RECORD_HANDLE_SIZE;
        let handle_bytes = parameters
            .get(4..handles_end)
            .ok_or(SdpError::PacketMalformed)?;
        let continuation = read_continuation(&parameters[handles_end..])?;

        // a partial response must make progress
        if current == 0 && !continuation.is_empty() {
            return Err(SdpError::PacketMalformed);
        }
        if self.started && total != self.total_service_record_count {
            return Err(SdpError::PacketMalformed);
        }
        if self.service_record_handles.len() + current > usize::from(total) {
            return Err(SdpError::PacketMalformed);
        }

        self.started = true;
        self.total_service_record_count = total;
        self.service_record_handles.extend(
            handle_bytes
                .chunks_exact(SERVICE_RECORD_HANDLE_SIZE)
                .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
        );

        if continuation.is_empty() {
            if self.service_record_handles.len() != usize::from(total) {
                return Err(SdpError::PacketMalformed);
            }
            self.continuation_state.clear();
            self.complete = true;
            return Ok(ParseStatus::Complete);
        }

        self.continuation_state = continuation;
        Ok(ParseStatus::NeedsMore)
    }

    fn to_pdu(
        &self,
        request_max: u16,
        transaction_id: TransactionId,
        max_size: u16,
        continuation: &[u8],
    ) -> Result<Vec<u8>, SdpError> {
        let total = self.service_record_handles.len().min(usize::from(request_max));
        let start = match continuation.len() {
            0 => 0,
            SEARCH_CONTINUATION_LENGTH => usize::from(read_u16(continuation, 0)?),
            _ => return Err(SdpError::InvalidContinuationState),
        };
        if start > total {
            return Err(SdpError::InvalidContinuationState);
        }

        // header + total count + current count + continuation length byte
        let overhead = PDU_HEADER_SIZE + 4 + 1;
        let available = usize::from(max_size)
            .checked_sub(overhead)
            .ok_or(SdpError::BufferTooSmall)?;
        let remaining = total - start;

        let (count, next) = if remaining * SERVICE_RECORD_HANDLE_SIZE <= available {
            (remaining, None)
        } else {
            let count = available.saturating_sub(SEARCH_CONTINUATION_LENGTH)
                / SERVICE_RECORD_HANDLE_SIZE;
            if count == 0 {
                return Err(SdpError::BufferTooSmall);
            }
            (count, Some(start + count))
        };

        let mut parameters = Vec::with_capacity(usize::from(max_size));
        // Both counts are bounded by request_max, a u16
        parameters.extend_from_slice(&u16::try_from(total).unwrap_or(u16::MAX).to_be_bytes());
        parameters.extend_from_slice(&u16::try_from(count).unwrap_or(u16::MAX).to_be_bytes());
        for handle in &self.service_record_handles[start..start + count] {
            parameters.extend_from_slice(&handle.to_be_bytes());
        }
        match next {
            Some(next) => {
                let state = u16::try_from(next).unwrap_or(u16::MAX).to_be_bytes();
                write_continuation(&mut parameters, &state);
            }
            None => write_continuation(&mut parameters, &[]),
        }

        frame(SdpPduId::ServiceSearchResponse, transaction_id, &parameters)
    }
}

/// Service Attribute Request parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAttributeRequest {
    /// Service record handle
    pub service_record_handle: ServiceRecordHandle,
    /// Maximum number of attribute bytes to return in each response
    pub maximum_attribute_byte_count: u16,
    /// Attribute ID/range list
    pub attribute_ids: AttributeIdList,
    /// Continuation state
    pub continuation_state: ContinuationState,
}

impl ServiceAttributeRequest {
    /// Create new service attribute request
    #[must_use]
    pub fn new(handle: ServiceRecordHandle, max_bytes: u16) -> Self {
        Self {
            service_record_handle: handle,
            maximum_attribute_byte_count: max_bytes,
            attribute_ids: AttributeIdList::new(),
            continuation_state: ContinuationState::new(),
        }
    }

    /// Parse request parameters
    ///
    /// # Errors
    /// Returns error if the parameters are malformed
    pub fn parse(parameters: &[u8]) -> Result<Self, SdpError> {
        let service_record_handle = read_u32(parameters, 0)?;
        let maximum_attribute_byte_count = read_u16(parameters, 4)?;
        let (attribute_ids, used) = read_attribute_ids(parameters.get(6..).unwrap_or_default())?;
        let continuation_state = read_continuation(&parameters[6 + used..])?;

        let request = Self {
            service_record_handle,
            maximum_attribute_byte_count,
            attribute_ids,
            continuation_state,
        };
        if !request.is_valid() {
            return Err(SdpError::PacketMalformed);
        }
        Ok(request)
    }
}

impl Request for ServiceAttributeRequest {
    fn is_valid(&self) -> bool {
        !self.attribute_ids.is_empty()
            && self.maximum_attribute_byte_count >= MIN_MAXIMUM_ATTRIBUTE_BYTE_COUNT
    }

    fn continuation_state(&self) -> &[u8] {
        &self.continuation_state
    }

    fn set_continuation_state(&mut self, state: &[u8]) -> Result<(), SdpError> {
        self.continuation_state =
            ContinuationState::from_slice(state).map_err(|()| SdpError::InvalidContinuationState)?;
        Ok(())
    }

    fn to_pdu(&self, transaction_id: TransactionId) -> Result<Vec<u8>, SdpError> {
        if !self.is_valid() {
            return Err(SdpError::InvalidParameters);
        }
        let mut parameters = Vec::new();
        parameters.extend_from_slice(&self.service_record_handle.to_be_bytes());
        parameters.extend_from_slice(&self.maximum_attribute_byte_count.to_be_bytes());
        self.attribute_ids
            .to_data_element()
            .append_to(&mut parameters);
        write_continuation(&mut parameters, &self.continuation_state);
        frame(SdpPduId::ServiceAttributeRequest, transaction_id, &parameters)
    }
}

/// Service Search Attribute Request parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSearchAttributeRequest {
    /// Service search pattern (set of UUIDs)
    pub service_search_pattern: SearchPattern,
    /// Maximum number of attribute bytes to return in each response
    pub maximum_attribute_byte_count: u16,
    /// Attribute ID/range list
    pub attribute_ids: AttributeIdList,
    /// Continuation state
    pub continuation_state: ContinuationState,
}

impl ServiceSearchAttributeRequest {
    /// Create new service search attribute request
    #[must_use]
    pub fn new(max_bytes: u16) -> Self {
        Self {
            service_search_pattern: SearchPattern::new(),
            maximum_attribute_byte_count: max_bytes,
            attribute_ids: AttributeIdList::new(),
            continuation_state: ContinuationState::new(),
        }
    }

    /// Add UUID to search pattern, ignoring duplicates
    ///
    /// # Errors
    /// Returns `InvalidParameters` if the pattern already holds 12 UUIDs
    pub fn add_uuid(&mut self, uuid: Uuid) -> Result<(), SdpError> {
        add_to_pattern(&mut self.service_search_pattern, uuid)
    }

    /// Parse request parameters
    ///
    /// # Errors
    /// Returns error if the parameters are malformed
    pub fn parse(parameters: &[u8]) -> Result<Self, SdpError> {
        let (service_search_pattern, mut pos) = read_search_pattern(parameters)?;
        let maximum_attribute_byte_count = read_u16(parameters, pos)?;
        pos += 2;
        let (attribute_ids, used) = read_attribute_ids(&parameters[pos..])?;
        pos += used;
        let continuation_state = read_continuation(&parameters[pos..])?;

        let request = Self {
            service_search_pattern,
            maximum_attribute_byte_count,
            attribute_ids,
            continuation_state,
        };
        if !request.is_valid() {
            return Err(SdpError::PacketMalformed);
        }
        Ok(request)
    }
}

impl Request for ServiceSearchAttributeRequest {
    fn is_valid(&self) -> bool {
        !self.service_search_pattern.is_empty()
            && !self.attribute_ids.is_empty()
            && self.maximum_attribute_byte_count >= MIN_MAXIMUM_ATTRIBUTE_BYTE_COUNT
    }

    fn continuation_state(&self) -> &[u8] {
        &self.continuation_state
    }

    fn set_continuation_state(&mut self, state: &[u8]) -> Result<(), SdpError> {
        self.continuation_state =
            ContinuationState::from_slice(state).map_err(|()| SdpError::InvalidContinuationState)?;
        Ok(())
    }

    fn to_pdu(&self, transaction_id: TransactionId) -> Result<Vec<u8>, SdpError> {
        if !self.is_valid() {
            return Err(SdpError::InvalidParameters);
        }
        let mut parameters = Vec::new();
        search_pattern_element(&self.service_search_pattern).append_to(&mut parameters);
        parameters.extend_from_slice(&self.maximum_attribute_byte_count.to_be_bytes());
        self.attribute_ids
            .to_data_element()
            .append_to(&mut parameters);
        write_continuation(&mut parameters, &self.continuation_state);
        frame(
            SdpPduId::ServiceSearchAttributeRequest,
            transaction_id,
            &parameters,
        )
    }
}

/// Reassembly buffer shared by both attribute responses
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeBytes {
    partial: Vec<u8>,
    continuation_state: ContinuationState,
    max_accumulated: usize,
}

impl AttributeBytes {
    const fn new(max_accumulated: usize) -> Self {
        Self {
            partial: Vec::new(),
            continuation_state: ContinuationState::new(),
            max_accumulated,
        }
    }

    /// Append one fragment; returns the full attribute list element once the
    /// last fragment has arrived
    fn accumulate(&mut self, parameters: &[u8]) -> Result<Option<DataElement>, SdpError> {
        let count = usize::from(read_u16(parameters, 0)?);
        let fragment = parameters
            .get(2..2 + count)
            .ok_or(SdpError::PacketMalformed)?;
        let continuation = read_continuation(&parameters[2 + count..])?;

        if count == 0 && !continuation.is_empty() {
            warn!("[SDP PDU] empty attribute fragment with continuation");
            return Err(SdpError::PacketMalformed);
        }
        if self.partial.len() + count > self.max_accumulated {
            warn!(
                "[SDP PDU] attribute list exceeds {} accumulated bytes",
                self.max_accumulated
            );
            return Err(SdpError::PacketMalformed);
        }
        self.partial.extend_from_slice(fragment);

        if !continuation.is_empty() {
            self.continuation_state = continuation;
            return Ok(None);
        }

        self.continuation_state.clear();
        let (element, used) = DataElement::decode(&self.partial)?;
        if used != self.partial.len() {
            return Err(SdpError::PacketMalformed);
        }
        self.partial = Vec::new();
        Ok(Some(element))
    }
}

/// Emit the slice of an encoded attribute list addressed by `continuation`
fn attribute_bytes_pdu(
    pdu_id: SdpPduId,
    list: &[u8],
    request_max: u16,
    transaction_id: TransactionId,
    max_size: u16,
    continuation: &[u8],
) -> Result<Vec<u8>, SdpError> {
    let offset = match continuation.len() {
        0 => 0,
        ATTRIBUTE_CONTINUATION_LENGTH => usize::try_from(read_u32(continuation, 0)?)
            .map_err(|_| SdpError::InvalidContinuationState)?,
        _ => return Err(SdpError::InvalidContinuationState),
    };
    if offset > list.len() {
        return Err(SdpError::InvalidContinuationState);
    }

    // header + attribute list byte count + continuation length byte
    let overhead = PDU_HEADER_SIZE + 2 + 1;
    let available = usize::from(max_size)
        .checked_sub(overhead)
        .ok_or(SdpError::BufferTooSmall)?;
    let remaining = list.len() - offset;

    let (count, next) = if remaining <= available.min(usize::from(request_max)) {
        (remaining, None)
    } else {
        let count = available
            .saturating_sub(ATTRIBUTE_CONTINUATION_LENGTH)
            .min(usize::from(request_max));
        if count == 0 {
            return Err(SdpError::BufferTooSmall);
        }
        (count, Some(offset + count))
    };

    let mut parameters = Vec::with_capacity(usize::from(max_size));
    // count never exceeds request_max, a u16
    parameters.extend_from_slice(&u16::try_from(count).unwrap_or(u16::MAX).to_be_bytes());
    parameters.extend_from_slice(&list[offset..offset + count]);
    match next {
        Some(next) => {
            let state = u32::try_from(next)
                .map_err(|_| SdpError::BufferTooSmall)?
                .to_be_bytes();
            write_continuation(&mut parameters, &state);
        }
        None => write_continuation(&mut parameters, &[]),
    }

    frame(pdu_id, transaction_id, &parameters)
}

/// Service Attribute Response parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAttributeResponse {
    /// Attributes of the service record
    pub attributes: AttributeMap,
    bytes: AttributeBytes,
    complete: bool,
}

impl ServiceAttributeResponse {
    /// Create an empty response, ready to parse fragments into
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_accumulated_size(DEFAULT_MAX_ACCUMULATED_RESPONSE_SIZE)
    }

    /// Create an empty response that rejects attribute lists larger than `max` bytes
    #[must_use]
    pub const fn with_max_accumulated_size(max: usize) -> Self {
        Self {
            attributes: AttributeMap::new(),
            bytes: AttributeBytes::new(max),
            complete: false,
        }
    }

    /// Create a complete response holding the given attributes
    #[must_use]
    pub fn with_attributes(attributes: AttributeMap) -> Self {
        let mut response = Self::new();
        response.attributes = attributes;
        response.complete = true;
        response
    }
}

impl Default for ServiceAttributeResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl Response for ServiceAttributeResponse {
    fn is_complete(&self) -> bool {
        self.complete
    }

    fn continuation_state(&self) -> &[u8] {
        &self.bytes.continuation_state
    }

    fn parse(&mut self, parameters: &[u8]) -> Result<ParseStatus, SdpError> {
        if self.complete {
            return Err(SdpError::NotReady);
        }
        let Some(element) = self.bytes.accumulate(parameters)? else {
            return Ok(ParseStatus::NeedsMore);
        };
        self.attributes = attribute_map_from_element(&element)?;
        self.complete = true;
        Ok(ParseStatus::Complete)
    }

    fn to_pdu(
        &self,
        request_max: u16,
        transaction_id: TransactionId,
        max_size: u16,
        continuation: &[u8],
    ) -> Result<Vec<u8>, SdpError> {
        let list = attribute_map_to_element(&self.attributes).to_vec();
        attribute_bytes_pdu(
            SdpPduId::ServiceAttributeResponse,
            &list,
            request_max,
            transaction_id,
            max_size,
            continuation,
        )
    }
}

/// Service Search Attribute Response parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSearchAttributeResponse {
    /// Attribute lists, one per matching service record
    pub attribute_lists: Vec<AttributeMap>,
    bytes: AttributeBytes,
    complete: bool,
}

impl ServiceSearchAttributeResponse {
    /// Create an empty response, ready to parse fragments into
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_accumulated_size(DEFAULT_MAX_ACCUMULATED_RESPONSE_SIZE)
    }

    /// Create an empty response that rejects attribute lists larger than `max` bytes
    #[must_use]
    pub const fn with_max_accumulated_size(max: usize) -> Self {
        Self {
            attribute_lists: Vec::new(),
            bytes: AttributeBytes::new(max),
            complete: false,
        }
    }

    /// Create a complete response holding the given attribute lists
    #[must_use]
    pub fn with_attribute_lists(attribute_lists: Vec<AttributeMap>) -> Self {
        let mut response = Self::new();
        response.attribute_lists = attribute_lists;
        response.complete = true;
        response
    }

    /// Number of attribute lists received
    #[must_use]
    pub fn num_attribute_lists(&self) -> usize {
        self.attribute_lists.len()
    }
}

impl Default for ServiceSearchAttributeResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl Response for ServiceSearchAttributeResponse {
    fn is_complete(&self) -> bool {
        self.complete
    }

    fn continuation_state(&self) -> &[u8] {
        &self.bytes.continuation_state
    }

    fn parse(&mut self, parameters: &[u8]) -> Result<ParseStatus, SdpError> {
        if self.complete {
            return Err(SdpError::NotReady);
        }
        let Some(element) = self.bytes.accumulate(parameters)? else {
            return Ok(ParseStatus::NeedsMore);
        };
        let lists = element.as_sequence().ok_or(SdpError::PacketMalformed)?;
        self.attribute_lists = lists
            .iter()
            .map(attribute_map_from_element)
            .collect::<Result<_, _>>()?;
        self.complete = true;
        Ok(ParseStatus::Complete)
    }

    fn to_pdu(
        &self,
        request_max: u16,
        transaction_id: TransactionId,
        max_size: u16,
        continuation: &[u8],
    ) -> Result<Vec<u8>, SdpError> {
        let list = DataElement::Sequence(
            self.attribute_lists
                .iter()
                .map(attribute_map_to_element)
                .collect(),
        )
        .to_vec();
        attribute_bytes_pdu(
            SdpPduId::ServiceSearchAttributeResponse,
            &list,
            request_max,
            transaction_id,
            max_size,
            continuation,
        )
    }
}

/// Error Response parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorResponse {
    /// Error code, once parsed or set
    pub error_code: Option<SdpErrorCode>,
}

impl ErrorResponse {
    /// Create new error response
    #[must_use]
    pub const fn new(error_code: SdpErrorCode) -> Self {
        Self {
            error_code: Some(error_code),
        }
    }
}

impl Response for ErrorResponse {
    fn is_complete(&self) -> bool {
        self.error_code.is_some()
    }

    fn continuation_state(&self) -> &[u8] {
        &[]
    }

    fn parse(&mut self, parameters: &[u8]) -> Result<ParseStatus, SdpError> {
        if self.is_complete() {
            return Err(SdpError::NotReady);
        }
        if parameters.len() != 2 {
            return Err(SdpError::PacketMalformed);
        }
        let code = SdpErrorCode::from_u16(read_u16(parameters, 0)?)
            .ok_or(SdpError::PacketMalformed)?;
        self.error_code = Some(code);
        Ok(ParseStatus::Complete)
    }

    fn to_pdu(
        &self,
        _request_max: u16,
        transaction_id: TransactionId,
        _max_size: u16,
        _continuation: &[u8],
    ) -> Result<Vec<u8>, SdpError> {
        let code = self.error_code.ok_or(SdpError::InvalidParameters)?;
        frame(
            SdpPduId::ErrorResponse,
            transaction_id,
            &(code as u16).to_be_bytes(),
        )
    }
}
