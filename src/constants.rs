//! `BondyBird` SDP Constants
//!
//! Protocol limits and default values used throughout the SDP client,
//! the PDU codec and the Data Element codec.

use core::time::Duration;

/// SDP Protocol Service Multiplexer (PSM) for L2CAP
pub const SDP_PSM: u16 = 0x0001;

/// Default L2CAP MTU, the largest SDU a fresh channel carries
pub const DEFAULT_L2CAP_MTU: u16 = 672;

/// SDP PDU header length: PDU ID (1) + Transaction ID (2) + Parameter Length (2)
pub const PDU_HEADER_SIZE: usize = 5;

/// Maximum length of a continuation state token in bytes
pub const MAX_CONTINUATION_STATE_LENGTH: usize = 16;

/// Maximum number of UUIDs in a service search pattern
pub const MAX_SEARCH_PATTERN_UUIDS: usize = 12;

/// Size of a service record handle on the wire
pub const SERVICE_RECORD_HANDLE_SIZE: usize = 4;

/// How long a transaction waits for each response fragment
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on the attribute bytes the peer may send per response
pub const DEFAULT_MAX_ATTRIBUTE_BYTE_COUNT: u16 = 0xFFFF;

/// Default ceiling on bytes accumulated across continuation rounds
pub const DEFAULT_MAX_ACCUMULATED_RESPONSE_SIZE: usize = 0xFFFF;
