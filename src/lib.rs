#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

extern crate alloc;

// must come first so the logging macros are visible to the other modules
mod fmt;

pub mod constants;
pub mod sdp;

pub use sdp::{
    AttributeIdList, AttributeMap, Channel, Client, ClientOptions, DataElement, Scheduler,
    SdpError, SearchError, SearchEvent, TransactionTimer, Uuid, forward_to,
};
