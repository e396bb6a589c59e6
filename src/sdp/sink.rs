//! Async delivery of search results
//!
//! [`forward_to`] turns an `embassy_sync` channel sender into a search
//! callback, so an embassy task can `await` the results of a search while the
//! event loop owning the [`Client`](super::Client) keeps running.
//!
//! ```rust
//! use bondybird_sdp::sdp::{SearchEvent, forward_to};
//! use embassy_sync::{blocking_mutex::raw::NoopRawMutex, channel::Channel};
//!
//! let events: Channel<NoopRawMutex, SearchEvent, 8> = Channel::new();
//! let callback = forward_to(events.sender());
//! # drop(callback);
//! ```

use super::{attribute::AttributeMap, client::SearchError};
use core::ops::ControlFlow;
use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Sender};

/// One item of a search result stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// Attributes of one matching service
    Service(AttributeMap),
    /// End of the results; `SearchError::NotFound` on success
    Done(SearchError),
}

impl SearchEvent {
    /// Check whether this is the last event of a search
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Build a search callback that pushes every result into `sender`
///
/// The channel must have room for every matching service plus the final
/// [`SearchEvent::Done`]. When it is full the search is stopped and no
/// further events are sent.
pub fn forward_to<'a, M: RawMutex, const N: usize>(
    sender: Sender<'a, M, SearchEvent, N>,
) -> impl FnMut(Result<&AttributeMap, SearchError>) -> ControlFlow<()> + 'a {
    move |result: Result<&AttributeMap, SearchError>| {
        let event = match result {
            Ok(attributes) => SearchEvent::Service(attributes.clone()),
            Err(status) => SearchEvent::Done(status),
        };
        if sender.try_send(event).is_err() {
            warn!("[SDP SINK] result channel full, stopping search");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::{
        Channel, Client, Response, Scheduler, SdpError, ServiceSearchAttributeResponse,
        TransactionTimer, data_element::DataElement, uuid::Uuid,
    };
    use crate::constants::DEFAULT_L2CAP_MTU;
    use alloc::{boxed::Box, vec, vec::Vec};
    use core::time::Duration;
    use embassy_futures::block_on;
    use embassy_sync::{
        blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex},
        channel,
    };

    struct Loopback;

    impl Channel for Loopback {
        fn send(&mut self, _pdu: Vec<u8>) -> Result<(), SdpError> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    struct NoTimers;

    impl Scheduler for NoTimers {
        fn schedule(&mut self, _timer: TransactionTimer, _delay: Duration) {}

        fn cancel(&mut self, _timer: TransactionTimer) {}
    }

    fn service(name: &str) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        attributes.insert(0x0100, DataElement::text_string(name));
        attributes
    }

    #[test]
    fn test_forward_events() {
        let events: channel::Channel<NoopRawMutex, SearchEvent, 4> = channel::Channel::new();
        let mut callback = forward_to(events.sender());

        let speaker = service("Speaker");
        assert_eq!(callback(Ok(&speaker)), ControlFlow::Continue(()));
        assert_eq!(callback(Err(SearchError::NotFound)), ControlFlow::Continue(()));

        assert_eq!(block_on(events.receive()), SearchEvent::Service(speaker));
        let done = block_on(events.receive());
        assert!(done.is_done());
        assert_eq!(done, SearchEvent::Done(SearchError::NotFound));
    }

    #[test]
    fn test_full_channel_stops_search() {
        let events: channel::Channel<CriticalSectionRawMutex, SearchEvent, 1> =
            channel::Channel::new();
        let mut callback = forward_to(events.sender());

        assert_eq!(callback(Ok(&service("one"))), ControlFlow::Continue(()));
        assert_eq!(callback(Ok(&service("two"))), ControlFlow::Break(()));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_client_results_awaited() {
        let events: &'static channel::Channel<NoopRawMutex, SearchEvent, 4> =
            Box::leak(Box::new(channel::Channel::new()));
        let mut client = Client::new(Loopback, NoTimers);
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], forward_to(events.sender()))
            .unwrap();

        let services = vec![service("Speaker"), service("Headset")];
        let pdu = ServiceSearchAttributeResponse::with_attribute_lists(services.clone())
            .to_pdu(0xFFFF, tid, DEFAULT_L2CAP_MTU, &[])
            .unwrap();
        client.on_receive(&pdu);

        let received = block_on(async {
            let mut received = Vec::new();
            loop {
                match events.receive().await {
                    SearchEvent::Service(attributes) => received.push(attributes),
                    SearchEvent::Done(status) => return (received, status),
                }
            }
        });
        assert_eq!(received, (services, SearchError::NotFound));
    }
}
