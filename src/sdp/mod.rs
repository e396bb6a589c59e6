//! Service Discovery Protocol (SDP) Implementation
//!
//! This module provides the SDP client side: the Data Element codec, PDU
//! framing with continuation state, and a transaction client that searches a
//! remote SDP server for services and their attributes.

/// Service record handle type
pub type ServiceRecordHandle = u32;

/// Transaction ID for SDP requests/responses
pub type TransactionId = u16;

pub mod attribute;
pub mod client;
pub mod data_element;
pub mod pdu;
pub mod sink;
pub mod uuid;

// Re-export commonly used types
pub use attribute::{AttributeId, AttributeIdList, AttributeMap, AttributeRange, UniversalAttributeId};
pub use client::{
    Channel, Client, ClientOptions, Scheduler, SearchCallback, SearchError, TransactionState,
    TransactionTimer,
};
pub use data_element::{DataElement, DataElementSize, DataElementType, FromDataElement};
pub use pdu::{
    ContinuationState, ErrorResponse, ParseStatus, Request, Response, SdpPduHeader,
    ServiceAttributeRequest, ServiceAttributeResponse, ServiceSearchAttributeRequest,
    ServiceSearchAttributeResponse, ServiceSearchRequest, ServiceSearchResponse,
};
pub use sink::{SearchEvent, forward_to};
pub use uuid::{Uuid, UuidSize};

/// SDP Protocol Data Unit IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SdpPduId {
    /// Error Response
    ErrorResponse = 0x01,
    /// Service Search Request
    ServiceSearchRequest = 0x02,
    /// Service Search Response
    ServiceSearchResponse = 0x03,
    /// Service Attribute Request
    ServiceAttributeRequest = 0x04,
    /// Service Attribute Response
    ServiceAttributeResponse = 0x05,
    /// Service Search Attribute Request
    ServiceSearchAttributeRequest = 0x06,
    /// Service Search Attribute Response
    ServiceSearchAttributeResponse = 0x07,
}

impl SdpPduId {
    /// Create from the PDU ID byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::ErrorResponse),
            0x02 => Some(Self::ServiceSearchRequest),
            0x03 => Some(Self::ServiceSearchResponse),
            0x04 => Some(Self::ServiceAttributeRequest),
            0x05 => Some(Self::ServiceAttributeResponse),
            0x06 => Some(Self::ServiceSearchAttributeRequest),
            0x07 => Some(Self::ServiceSearchAttributeResponse),
            _ => None,
        }
    }
}

/// SDP Error Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum SdpErrorCode {
    /// Invalid/unsupported SDP version
    InvalidVersion = 0x0001,
    /// Invalid Service Record Handle
    InvalidServiceRecordHandle = 0x0002,
    /// Invalid request syntax
    InvalidRequestSyntax = 0x0003,
    /// Invalid PDU size
    InvalidPduSize = 0x0004,
    /// Invalid continuation state
    InvalidContinuationState = 0x0005,
    /// Insufficient resources to satisfy request
    InsufficientResources = 0x0006,
}

impl SdpErrorCode {
    /// Create from the wire value
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::InvalidVersion),
            0x0002 => Some(Self::InvalidServiceRecordHandle),
            0x0003 => Some(Self::InvalidRequestSyntax),
            0x0004 => Some(Self::InvalidPduSize),
            0x0005 => Some(Self::InvalidContinuationState),
            0x0006 => Some(Self::InsufficientResources),
            _ => None,
        }
    }
}

/// SDP Error Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdpError {
    /// Buffer too small for operation
    BufferTooSmall,
    /// PDU or data element does not follow the wire format
    PacketMalformed,
    /// Continuation state is too long or does not address the result
    InvalidContinuationState,
    /// Request parameters are out of range
    InvalidParameters,
    /// Response is already complete and cannot take more data
    NotReady,
    /// Protocol error from remote device
    ProtocolError(SdpErrorCode),
}

impl From<SdpErrorCode> for SdpError {
    fn from(code: SdpErrorCode) -> Self {
        Self::ProtocolError(code)
    }
}

impl core::fmt::Display for SdpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::PacketMalformed => write!(f, "packet malformed"),
            Self::InvalidContinuationState => write!(f, "invalid continuation state"),
            Self::InvalidParameters => write!(f, "invalid parameters"),
            Self::NotReady => write!(f, "response already complete"),
            Self::ProtocolError(code) => write!(f, "protocol error {:#06x}", *code as u16),
        }
    }
}

impl core::error::Error for SdpError {}
