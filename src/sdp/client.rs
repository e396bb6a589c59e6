//! SDP Client Implementation
//!
//! The client issues Service Search Attribute requests, correlates responses by
//! transaction ID, drives continuation round trips until each response is
//! complete and guarantees that every search reaches exactly one terminal
//! callback invocation.
//!
//! The client does no I/O of its own. The owning event loop feeds it inbound
//! PDUs with [`Client::on_receive`], channel closure with [`Client::on_closed`]
//! and expired timers with [`Client::on_timeout`].

use super::{
    SdpError, SdpErrorCode, SdpPduId, TransactionId,
    attribute::{AttributeId, AttributeIdList, AttributeMap},
    pdu::{
        ErrorResponse, ParseStatus, Request, Response, SdpPduHeader,
        ServiceSearchAttributeRequest, ServiceSearchAttributeResponse,
    },
    uuid::Uuid,
};
use crate::constants::{
    DEFAULT_MAX_ACCUMULATED_RESPONSE_SIZE, DEFAULT_MAX_ATTRIBUTE_BYTE_COUNT,
    DEFAULT_TRANSACTION_TIMEOUT,
};
use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};
use core::{ops::ControlFlow, time::Duration};

/// Callback receiving search results
///
/// Invoked once per matching service with `Ok(attributes)`, then once with a
/// terminal `Err`. `Err(SearchError::NotFound)` marks the normal end of the
/// results. Returning `ControlFlow::Break(())` stops delivery early.
pub type SearchCallback = Box<dyn FnMut(Result<&AttributeMap, SearchError>) -> ControlFlow<()>>;

/// Byte-stream channel to the remote SDP server
///
/// Usually an L2CAP channel connected on [`SDP_PSM`](crate::constants::SDP_PSM).
pub trait Channel {
    /// Send one complete PDU
    ///
    /// # Errors
    /// Returns an error if the PDU could not be handed to the transport
    fn send(&mut self, pdu: Vec<u8>) -> Result<(), SdpError>;

    /// Close the channel
    fn close(&mut self);
}

/// Timer service of the event loop owning the client
pub trait Scheduler {
    /// Arm `timer` to expire after `delay`
    fn schedule(&mut self, timer: TransactionTimer, delay: Duration);

    /// Disarm `timer`; a timer that already expired or was never armed is ignored
    fn cancel(&mut self, timer: TransactionTimer);
}

/// Handle of one armed transaction timeout
///
/// The serial changes every time a timeout is armed, so an expiry that raced
/// with a response can never hit a later round trip or a reused ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransactionTimer {
    /// Transaction the timeout belongs to
    pub transaction_id: TransactionId,
    /// Arm serial
    pub serial: u64,
}

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionState {
    /// Created, request not sent yet
    Idle,
    /// Initial request sent, waiting for the first response
    Sent,
    /// Continuation request sent, waiting for the next fragment
    AwaitingMore,
    /// Response complete and delivered
    Complete,
    /// Settled without a complete response
    Canceled,
}

/// Terminal search status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SearchError {
    /// No more matching services
    NotFound,
    /// Response could not be parsed
    PacketMalformed,
    /// No response within the transaction timeout
    TimedOut,
    /// Channel closed or failed to send
    LinkDisconnected,
    /// Search canceled by the caller or no transaction ID free
    Canceled,
    /// Search pattern or attribute IDs cannot form a valid request
    InvalidParameters,
    /// Remote SDP server returned an error response
    Protocol(SdpErrorCode),
}

impl From<SdpError> for SearchError {
    fn from(error: SdpError) -> Self {
        match error {
            SdpError::ProtocolError(code) => Self::Protocol(code),
            SdpError::InvalidParameters => Self::InvalidParameters,
            SdpError::BufferTooSmall
            | SdpError::PacketMalformed
            | SdpError::InvalidContinuationState
            | SdpError::NotReady => Self::PacketMalformed,
        }
    }
}

impl core::fmt::Display for SearchError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no more services"),
            Self::PacketMalformed => write!(f, "malformed response"),
            Self::TimedOut => write!(f, "transaction timed out"),
            Self::LinkDisconnected => write!(f, "link disconnected"),
            Self::Canceled => write!(f, "search canceled"),
            Self::InvalidParameters => write!(f, "invalid search parameters"),
            Self::Protocol(code) => write!(f, "remote error {:#06x}", *code as u16),
        }
    }
}

impl core::error::Error for SearchError {}

/// Options for configuring a [`Client`]
///
/// ```rust
/// use bondybird_sdp::sdp::ClientOptions;
/// use core::time::Duration;
///
/// let options = ClientOptions {
///     transaction_timeout: Duration::from_secs(2),
///     max_attribute_byte_count: 0x0200,
///     ..ClientOptions::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Time allowed for each request/response round trip
    pub transaction_timeout: Duration,
    /// Attribute byte count asked for in each request (at least 7)
    pub max_attribute_byte_count: u16,
    /// Largest attribute list accepted across all fragments of one response
    pub max_accumulated_response_size: usize,
    /// First transaction ID handed out
    pub first_transaction_id: TransactionId,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            max_attribute_byte_count: DEFAULT_MAX_ATTRIBUTE_BYTE_COUNT,
            max_accumulated_response_size: DEFAULT_MAX_ACCUMULATED_RESPONSE_SIZE,
            first_transaction_id: 0,
        }
    }
}

/// One in-flight search
struct Transaction {
    request: ServiceSearchAttributeRequest,
    response: ServiceSearchAttributeResponse,
    /// Taken exactly once, when the transaction settles
    callback: Option<SearchCallback>,
    state: TransactionState,
    timer: TransactionTimer,
    /// Insertion order, used when settling all transactions at once
    order: u64,
}

/// SDP Client
pub struct Client<C: Channel, S: Scheduler> {
    channel: C,
    scheduler: S,
    options: ClientOptions,
    pending: BTreeMap<TransactionId, Transaction>,
    next_transaction_id: TransactionId,
    next_serial: u64,
    closed: bool,
}

impl<C: Channel, S: Scheduler> Client<C, S> {
    /// Create new SDP client with default options
    pub fn new(channel: C, scheduler: S) -> Self {
        Self::with_options(channel, scheduler, ClientOptions::default())
    }

    /// Create new SDP client with the given options
    pub fn with_options(channel: C, scheduler: S, options: ClientOptions) -> Self {
        Self {
            channel,
            scheduler,
            options,
            pending: BTreeMap::new(),
            next_transaction_id: options.first_transaction_id,
            next_serial: 0,
            closed: false,
        }
    }

    /// Client options
    #[must_use]
    pub const fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Channel the client sends on
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutable access to the channel
    pub const fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Scheduler arming the transaction timeouts
    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Mutable access to the scheduler
    pub const fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Number of transactions waiting for a response
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// State of a pending transaction
    #[must_use]
    pub fn transaction_state(&self, transaction_id: TransactionId) -> Option<TransactionState> {
        self.pending.get(&transaction_id).map(|tx| tx.state)
    }

    /// Search the remote server for services and fetch their attributes
    ///
    /// `attribute_ids` selects the attributes to fetch; an empty set fetches
    /// all of them. The callback is invoked once per matching service and then
    /// once with a terminal status, or once with an error status if the search
    /// fails.
    ///
    /// Returns the transaction ID if a request is in flight, or `None` if the
    /// search was settled immediately.
    pub fn search<P, A, F>(
        &mut self,
        pattern: P,
        attribute_ids: A,
        callback: F,
    ) -> Option<TransactionId>
    where
        P: IntoIterator<Item = Uuid>,
        A: IntoIterator<Item = AttributeId>,
        F: FnMut(Result<&AttributeMap, SearchError>) -> ControlFlow<()> + 'static,
    {
        let mut callback: SearchCallback = Box::new(callback);

        if self.closed {
            debug!("[SDP CLIENT] search on closed channel");
            let _ = callback(Err(SearchError::LinkDisconnected));
            return None;
        }

        let mut request = ServiceSearchAttributeRequest::new(self.options.max_attribute_byte_count);
        request.attribute_ids = AttributeIdList::from_ids(attribute_ids);
        for uuid in pattern {
            if request.add_uuid(uuid).is_err() {
                let _ = callback(Err(SearchError::InvalidParameters));
                return None;
            }
        }

        let Some(transaction_id) = self.allocate_transaction_id() else {
            warn!("[SDP CLIENT] no free transaction ID");
            let _ = callback(Err(SearchError::Canceled));
            return None;
        };

        let pdu = match request.to_pdu(transaction_id) {
            Ok(pdu) => pdu,
            Err(error) => {
                let _ = callback(Err(error.into()));
                return None;
            }
        };

        let serial = self.next_serial();
        let timer = TransactionTimer {
            transaction_id,
            serial,
        };
        self.pending.insert(
            transaction_id,
            Transaction {
                request,
                response: ServiceSearchAttributeResponse::with_max_accumulated_size(
                    self.options.max_accumulated_response_size,
                ),
                callback: Some(callback),
                state: TransactionState::Idle,
                timer,
                order: serial,
            },
        );

        if self.channel.send(pdu).is_err() {
            warn!("[SDP CLIENT] failed to send request {}", transaction_id);
            self.settle(transaction_id, SearchError::LinkDisconnected);
            return None;
        }

        self.scheduler
            .schedule(timer, self.options.transaction_timeout);
        if let Some(tx) = self.pending.get_mut(&transaction_id) {
            tx.state = TransactionState::Sent;
        }
        debug!("[SDP CLIENT] transaction {} sent", transaction_id);
        Some(transaction_id)
    }

    /// Cancel a pending search
    ///
    /// The callback receives `SearchError::Canceled`. Unknown IDs are ignored.
    pub fn cancel(&mut self, transaction_id: TransactionId) {
        self.settle(transaction_id, SearchError::Canceled);
    }

    /// Handle one PDU received on the channel
    pub fn on_receive(&mut self, pdu: &[u8]) {
        let Ok(header) = SdpPduHeader::decode(pdu) else {
            // the transaction ID sits at a fixed offset whatever the opcode
            let transaction_id = match pdu.get(1..3) {
                Some(&[high, low]) => u16::from_be_bytes([high, low]),
                _ => {
                    warn!("[SDP CLIENT] dropping undecodable PDU of {} bytes", pdu.len());
                    return;
                }
            };
            if self.pending.contains_key(&transaction_id) {
                warn!("[SDP CLIENT] undecodable PDU for transaction {}", transaction_id);
                self.settle(transaction_id, SearchError::PacketMalformed);
            } else {
                warn!("[SDP CLIENT] dropping undecodable PDU of {} bytes", pdu.len());
            }
            return;
        };
        let transaction_id = header.transaction_id;
        if !self.pending.contains_key(&transaction_id) {
            debug!(
                "[SDP CLIENT] dropping response for unknown transaction {}",
                transaction_id
            );
            return;
        }

        let parameters = match SdpPduHeader::split(pdu) {
            Ok((_, parameters)) => parameters,
            Err(_) => {
                self.settle(transaction_id, SearchError::PacketMalformed);
                return;
            }
        };

        match header.pdu_id {
            SdpPduId::ServiceSearchAttributeResponse => {
                self.handle_fragment(transaction_id, parameters);
            }
            SdpPduId::ErrorResponse => {
                let mut response = ErrorResponse::default();
                let status = match (response.parse(parameters), response.error_code) {
                    (Ok(_), Some(code)) => SearchError::Protocol(code),
                    _ => SearchError::PacketMalformed,
                };
                warn!("[SDP CLIENT] transaction {} failed: {}", transaction_id, status);
                self.settle(transaction_id, status);
            }
            _ => {
                warn!("[SDP CLIENT] unexpected PDU {} for transaction {}", header.pdu_id, transaction_id);
                self.settle(transaction_id, SearchError::PacketMalformed);
            }
        }
    }

    /// Handle closure of the channel
    ///
    /// Every pending search is settled with `LinkDisconnected`, in the order
    /// the searches were issued.
    pub fn on_closed(&mut self) {
        self.closed = true;
        self.settle_all(SearchError::LinkDisconnected);
    }

    /// Handle expiry of a transaction timeout
    ///
    /// Timers of transactions that already settled or re-armed are ignored.
    pub fn on_timeout(&mut self, timer: TransactionTimer) {
        let current = self
            .pending
            .get(&timer.transaction_id)
            .is_some_and(|tx| tx.timer == timer);
        if !current {
            trace!("[SDP CLIENT] stale timer for transaction {}", timer.transaction_id);
            return;
        }
        warn!("[SDP CLIENT] transaction {} timed out", timer.transaction_id);
        self.settle(timer.transaction_id, SearchError::TimedOut);
    }

    fn handle_fragment(&mut self, transaction_id: TransactionId, parameters: &[u8]) {
        let Some(tx) = self.pending.get_mut(&transaction_id) else {
            return;
        };

        match tx.response.parse(parameters) {
            Ok(ParseStatus::Complete) => self.complete(transaction_id),
            Ok(ParseStatus::NeedsMore) => {
                let pdu = tx
                    .request
                    .set_continuation_state(tx.response.continuation_state())
                    .and_then(|()| tx.request.to_pdu(transaction_id));
                let Ok(pdu) = pdu else {
                    self.settle(transaction_id, SearchError::PacketMalformed);
                    return;
                };

                self.scheduler.cancel(tx.timer);
                self.next_serial += 1;
                tx.timer = TransactionTimer {
                    transaction_id,
                    serial: self.next_serial,
                };
                tx.state = TransactionState::AwaitingMore;
                let timer = tx.timer;

                if self.channel.send(pdu).is_err() {
                    self.settle(transaction_id, SearchError::LinkDisconnected);
                    return;
                }
                self.scheduler
                    .schedule(timer, self.options.transaction_timeout);
                trace!("[SDP CLIENT] transaction {} continues", transaction_id);
            }
            Err(error) => {
                warn!(
                    "[SDP CLIENT] transaction {} response rejected: {}",
                    transaction_id, error
                );
                self.settle(transaction_id, SearchError::PacketMalformed);
            }
        }
    }

    /// Deliver a complete response, one attribute list per callback invocation
    fn complete(&mut self, transaction_id: TransactionId) {
        let Some(mut tx) = self.pending.remove(&transaction_id) else {
            return;
        };
        self.scheduler.cancel(tx.timer);
        tx.state = TransactionState::Complete;
        debug!(
            "[SDP CLIENT] transaction {} complete with {} services",
            transaction_id,
            tx.response.num_attribute_lists()
        );

        let Some(mut callback) = tx.callback.take() else {
            return;
        };
        for attributes in &tx.response.attribute_lists {
            if callback(Ok(attributes)).is_break() {
                return;
            }
        }
        let _ = callback(Err(SearchError::NotFound));
    }

    /// Retire a transaction with a terminal error; a no-op if it already settled
    fn settle(&mut self, transaction_id: TransactionId, status: SearchError) {
        let Some(mut tx) = self.pending.remove(&transaction_id) else {
            return;
        };
        self.scheduler.cancel(tx.timer);
        tx.state = TransactionState::Canceled;
        if let Some(mut callback) = tx.callback.take() {
            let _ = callback(Err(status));
        }
    }

    fn settle_all(&mut self, status: SearchError) {
        let mut order: Vec<(u64, TransactionId)> = self
            .pending
            .iter()
            .map(|(&transaction_id, tx)| (tx.order, transaction_id))
            .collect();
        order.sort_unstable();
        for (_, transaction_id) in order {
            self.settle(transaction_id, status);
        }
    }

    /// Next free transaction ID, skipping IDs still in use
    fn allocate_transaction_id(&mut self) -> Option<TransactionId> {
        if self.pending.len() > usize::from(TransactionId::MAX) {
            return None;
        }
        loop {
            let transaction_id = self.next_transaction_id;
            self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
            if !self.pending.contains_key(&transaction_id) {
                return Some(transaction_id);
            }
        }
    }

    fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }
}

impl<C: Channel, S: Scheduler> Drop for Client<C, S> {
    fn drop(&mut self) {
        self.settle_all(SearchError::LinkDisconnected);
        if !self.closed {
            self.channel.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_L2CAP_MTU;
    use crate::sdp::data_element::DataElement;
    use alloc::{rc::Rc, vec};
    use core::cell::RefCell;

    #[derive(Default)]
    struct FakeChannel {
        sent: Vec<Vec<u8>>,
        fail: bool,
    }

    impl Channel for FakeChannel {
        fn send(&mut self, pdu: Vec<u8>) -> Result<(), SdpError> {
            if self.fail {
                return Err(SdpError::InvalidParameters);
            }
            self.sent.push(pdu);
            Ok(())
        }

        fn close(&mut self) {}
    }

    /// Virtual clock scheduler
    #[derive(Default)]
    struct FakeScheduler {
        now: Duration,
        timers: Vec<(Duration, TransactionTimer)>,
    }

    impl FakeScheduler {
        fn advance(&mut self, by: Duration) -> Vec<TransactionTimer> {
            self.now += by;
            let now = self.now;
            let mut expired: Vec<_> = self
                .timers
                .iter()
                .filter(|(deadline, _)| *deadline <= now)
                .copied()
                .collect();
            self.timers.retain(|(deadline, _)| *deadline > now);
            expired.sort();
            expired.into_iter().map(|(_, timer)| timer).collect()
        }
    }

    impl Scheduler for FakeScheduler {
        fn schedule(&mut self, timer: TransactionTimer, delay: Duration) {
            self.timers.push((self.now + delay, timer));
        }

        fn cancel(&mut self, timer: TransactionTimer) {
            self.timers.retain(|(_, armed)| *armed != timer);
        }
    }

    type Outcomes = Rc<RefCell<Vec<Result<AttributeMap, SearchError>>>>;

    fn recorder(
        outcomes: &Outcomes,
    ) -> impl FnMut(Result<&AttributeMap, SearchError>) -> ControlFlow<()> + 'static {
        let outcomes = Rc::clone(outcomes);
        move |result: Result<&AttributeMap, SearchError>| {
            outcomes.borrow_mut().push(result.cloned());
            ControlFlow::Continue(())
        }
    }

    fn client() -> Client<FakeChannel, FakeScheduler> {
        Client::new(FakeChannel::default(), FakeScheduler::default())
    }

    fn service(handle: u32, name: &str) -> AttributeMap {
        let mut attributes = AttributeMap::new();
        attributes.insert(0x0000, DataElement::UnsignedInt32(handle));
        attributes.insert(
            0x0001,
            DataElement::Sequence(vec![DataElement::Uuid(Uuid::from_u16(0x110B))]),
        );
        attributes.insert(0x0100, DataElement::text_string(name));
        attributes
    }

    fn response_pdu(
        lists: &[AttributeMap],
        transaction_id: TransactionId,
        max_size: u16,
        continuation: &[u8],
    ) -> Vec<u8> {
        ServiceSearchAttributeResponse::with_attribute_lists(lists.to_vec())
            .to_pdu(0xFFFF, transaction_id, max_size, continuation)
            .unwrap()
    }

    fn last_request(client: &Client<FakeChannel, FakeScheduler>) -> ServiceSearchAttributeRequest {
        let pdu = client.channel().sent.last().unwrap();
        let (header, parameters) = SdpPduHeader::split(pdu).unwrap();
        assert_eq!(header.pdu_id, SdpPduId::ServiceSearchAttributeRequest);
        ServiceSearchAttributeRequest::parse(parameters).unwrap()
    }

    #[test]
    fn test_search_sends_request() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [0x0001, 0x0000], recorder(&outcomes))
            .unwrap();

        assert_eq!(client.transaction_state(tid), Some(TransactionState::Sent));
        assert_eq!(client.channel().sent.len(), 1);
        assert_eq!(client.scheduler().timers.len(), 1);

        let request = last_request(&client);
        assert_eq!(request.service_search_pattern.as_slice(), &[Uuid::from_u16(0x110B)]);
        assert_eq!(request.maximum_attribute_byte_count, 0xFFFF);
        assert!(request.attribute_ids.contains(0x0000));
        assert!(request.attribute_ids.contains(0x0001));
        assert!(!request.attribute_ids.contains(0x0002));
        assert!(request.continuation_state.is_empty());
        assert!(outcomes.borrow().is_empty());
    }

    #[test]
    fn test_empty_attribute_ids_request_all() {
        let outcomes = Outcomes::default();
        let mut client = client();
        client.search([Uuid::from_u16(0x1101)], [], recorder(&outcomes));

        let request = last_request(&client);
        assert_eq!(request.attribute_ids, AttributeIdList::all());
    }

    #[test]
    fn test_close_delivers_single_disconnect() {
        let outcomes = Outcomes::default();
        let mut client = client();
        client.search([Uuid::from_u16(0x110B)], [], recorder(&outcomes));

        client.on_closed();
        client.on_closed();
        for timer in client.scheduler_mut().advance(Duration::from_secs(60)) {
            client.on_timeout(timer);
        }

        assert_eq!(*outcomes.borrow(), [Err(SearchError::LinkDisconnected)]);
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn test_close_settles_in_insertion_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let options = ClientOptions {
            first_transaction_id: 0xFFFF,
            ..ClientOptions::default()
        };
        let mut client = Client::with_options(FakeChannel::default(), FakeScheduler::default(), options);

        for name in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            client.search(
                [Uuid::from_u16(0x110B)],
                [],
                move |result: Result<&AttributeMap, SearchError>| {
                    assert_eq!(result, Err(SearchError::LinkDisconnected));
                    order.borrow_mut().push(name);
                    ControlFlow::Continue(())
                },
            );
        }
        client.on_closed();

        // IDs 0xFFFF, 0x0000, 0x0001: key order differs from insertion order
        assert_eq!(*order.borrow(), ["first", "second", "third"]);
    }

    #[test]
    fn test_transaction_ids_distinct_across_wrap() {
        let outcomes = Outcomes::default();
        let options = ClientOptions {
            first_transaction_id: 0xFFFE,
            ..ClientOptions::default()
        };
        let mut client = Client::with_options(FakeChannel::default(), FakeScheduler::default(), options);

        let ids: Vec<_> = (0..3)
            .map(|_| {
                client
                    .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
                    .unwrap()
            })
            .collect();

        assert_eq!(ids, [0xFFFE, 0xFFFF, 0x0000]);
        assert_eq!(client.pending_count(), 3);
    }

    #[test]
    fn test_transaction_ids_skip_ids_in_use() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let first = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();
        assert_eq!(first, 0);

        client.next_transaction_id = first;
        let second = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();
        assert_eq!(second, 1);
    }

    #[test]
    fn test_timeout_after_configured_duration() {
        let outcomes = Outcomes::default();
        let options = ClientOptions {
            transaction_timeout: Duration::from_millis(500),
            ..ClientOptions::default()
        };
        let mut client = Client::with_options(FakeChannel::default(), FakeScheduler::default(), options);
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        assert!(client.scheduler_mut().advance(Duration::from_millis(499)).is_empty());
        assert!(outcomes.borrow().is_empty());

        let expired = client.scheduler_mut().advance(Duration::from_millis(1));
        assert_eq!(expired.len(), 1);
        client.on_timeout(expired[0]);

        assert_eq!(*outcomes.borrow(), [Err(SearchError::TimedOut)]);
        assert_eq!(client.transaction_state(tid), None);

        // a late response for the retired ID is dropped
        client.on_receive(&response_pdu(&[service(1, "late")], tid, DEFAULT_L2CAP_MTU, &[]));
        assert_eq!(outcomes.borrow().len(), 1);
    }

    #[test]
    fn test_delivers_each_service_then_not_found() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        let services = [service(0x10001, "Speaker"), service(0x10002, "Headset")];
        client.on_receive(&response_pdu(&services, tid, DEFAULT_L2CAP_MTU, &[]));

        assert_eq!(
            *outcomes.borrow(),
            [
                Ok(services[0].clone()),
                Ok(services[1].clone()),
                Err(SearchError::NotFound)
            ]
        );
        assert_eq!(client.pending_count(), 0);
        assert!(client.scheduler().timers.is_empty());
    }

    #[test]
    fn test_no_services_found() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        client.on_receive(&response_pdu(&[], tid, DEFAULT_L2CAP_MTU, &[]));
        assert_eq!(*outcomes.borrow(), [Err(SearchError::NotFound)]);
    }

    #[test]
    fn test_callback_break_stops_delivery() {
        let calls = Rc::new(RefCell::new(0));
        let mut client = client();
        let counter = Rc::clone(&calls);
        let tid = client
            .search(
                [Uuid::from_u16(0x110B)],
                [],
                move |_: Result<&AttributeMap, SearchError>| {
                    *counter.borrow_mut() += 1;
                    ControlFlow::Break(())
                },
            )
            .unwrap();

        client.on_receive(&response_pdu(
            &[service(1, "one"), service(2, "two")],
            tid,
            DEFAULT_L2CAP_MTU,
            &[],
        ));
        assert_eq!(*calls.borrow(), 1);
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn test_continuation_round_trips() {
        let outcomes = Outcomes::default();
        let options = ClientOptions {
            transaction_timeout: Duration::from_secs(1),
            ..ClientOptions::default()
        };
        let mut client = Client::with_options(FakeChannel::default(), FakeScheduler::default(), options);
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        let services = [
            service(0x10001, "Speaker"),
            service(0x10002, "Headset"),
            service(0x10003, "Car kit"),
        ];
        let mut continuation = Vec::new();
        let mut rounds = 0;
        while outcomes.borrow().is_empty() {
            rounds += 1;
            // each fragment arrives just before the round trip timeout
            assert!(client.scheduler_mut().advance(Duration::from_millis(900)).is_empty());
            client.on_receive(&response_pdu(&services, tid, 32, &continuation));
            if outcomes.borrow().is_empty() {
                assert_eq!(client.transaction_state(tid), Some(TransactionState::AwaitingMore));
                let request = last_request(&client);
                assert!(!request.continuation_state.is_empty());
                continuation = request.continuation_state.to_vec();
            }
        }

        assert!(rounds > 2);
        assert_eq!(client.channel().sent.len(), rounds);
        assert_eq!(outcomes.borrow().len(), 4);
        assert_eq!(outcomes.borrow()[2], Ok(services[2].clone()));
        assert_eq!(outcomes.borrow()[3], Err(SearchError::NotFound));
        assert!(client.scheduler().timers.is_empty());
    }

    #[test]
    fn test_stale_timer_after_rearm_is_ignored() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();
        let first_timer = client.scheduler().timers[0].1;

        client.on_receive(&response_pdu(&[service(1, "Speaker")], tid, 24, &[]));
        assert_eq!(client.transaction_state(tid), Some(TransactionState::AwaitingMore));

        client.on_timeout(first_timer);
        assert!(outcomes.borrow().is_empty());
        assert_eq!(client.transaction_state(tid), Some(TransactionState::AwaitingMore));
    }

    #[test]
    fn test_malformed_response_settles_transaction() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let first = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();
        let other_outcomes = Outcomes::default();
        let second = client
            .search([Uuid::from_u16(0x110A)], [], recorder(&other_outcomes))
            .unwrap();

        // attribute IDs out of order
        let list = DataElement::Sequence(vec![DataElement::Sequence(vec![
            DataElement::UnsignedInt16(0x0001),
            DataElement::Boolean(true),
            DataElement::UnsignedInt16(0x0000),
            DataElement::Boolean(false),
        ])])
        .to_vec();
        let mut parameters = u16::try_from(list.len()).unwrap().to_be_bytes().to_vec();
        parameters.extend_from_slice(&list);
        parameters.push(0x00);
        let mut pdu = SdpPduHeader::new(
            SdpPduId::ServiceSearchAttributeResponse,
            first,
            u16::try_from(parameters.len()).unwrap(),
        )
        .encode()
        .to_vec();
        pdu.extend_from_slice(&parameters);

        client.on_receive(&pdu);
        assert_eq!(*outcomes.borrow(), [Err(SearchError::PacketMalformed)]);
        assert_eq!(client.transaction_state(first), None);
        assert_eq!(client.transaction_state(second), Some(TransactionState::Sent));
        assert!(other_outcomes.borrow().is_empty());
    }

    #[test]
    fn test_length_mismatch_is_malformed() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        let mut pdu = response_pdu(&[service(1, "x")], tid, DEFAULT_L2CAP_MTU, &[]);
        pdu.push(0x00);
        client.on_receive(&pdu);
        assert_eq!(*outcomes.borrow(), [Err(SearchError::PacketMalformed)]);
    }

    #[test]
    fn test_unknown_transaction_is_dropped() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        client.on_receive(&response_pdu(&[service(1, "x")], tid.wrapping_add(7), DEFAULT_L2CAP_MTU, &[]));
        client.on_receive(&[0x07, 0x00]);

        assert!(outcomes.borrow().is_empty());
        assert_eq!(client.transaction_state(tid), Some(TransactionState::Sent));
    }

    #[test]
    fn test_unknown_opcode_for_live_transaction_is_malformed() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();
        let [high, low] = tid.to_be_bytes();

        // 0x09 is not an SDP opcode
        client.on_receive(&[0x09, high.wrapping_add(1), low, 0x00, 0x00]);
        assert!(outcomes.borrow().is_empty());

        client.on_receive(&[0x09, high, low, 0x00, 0x00]);
        assert_eq!(*outcomes.borrow(), [Err(SearchError::PacketMalformed)]);
        assert_eq!(client.pending_count(), 0);
        assert!(client.scheduler().timers.is_empty());
    }

    #[test]
    fn test_empty_continuation_fragment_is_malformed() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        let parameters = [0x00, 0x00, 0x04, 0, 0, 0, 0];
        let mut pdu = SdpPduHeader::new(
            SdpPduId::ServiceSearchAttributeResponse,
            tid,
            u16::try_from(parameters.len()).unwrap(),
        )
        .encode()
        .to_vec();
        pdu.extend_from_slice(&parameters);

        client.on_receive(&pdu);
        assert_eq!(*outcomes.borrow(), [Err(SearchError::PacketMalformed)]);
        assert_eq!(client.channel().sent.len(), 1);
        assert_eq!(client.transaction_state(tid), None);
    }

    #[test]
    fn test_error_response_settles_with_code() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        let pdu = ErrorResponse::new(SdpErrorCode::InsufficientResources)
            .to_pdu(0, tid, 0, &[])
            .unwrap();
        client.on_receive(&pdu);

        assert_eq!(
            *outcomes.borrow(),
            [Err(SearchError::Protocol(SdpErrorCode::InsufficientResources))]
        );
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn test_unexpected_pdu_kind_is_malformed() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        let pdu = crate::sdp::ServiceSearchResponse::with_handles(vec![1])
            .to_pdu(10, tid, DEFAULT_L2CAP_MTU, &[])
            .unwrap();
        client.on_receive(&pdu);
        assert_eq!(*outcomes.borrow(), [Err(SearchError::PacketMalformed)]);
    }

    #[test]
    fn test_send_failure_settles_immediately() {
        let outcomes = Outcomes::default();
        let mut client = client();
        client.channel_mut().fail = true;

        let tid = client.search([Uuid::from_u16(0x110B)], [], recorder(&outcomes));
        assert_eq!(tid, None);
        assert_eq!(*outcomes.borrow(), [Err(SearchError::LinkDisconnected)]);
        assert_eq!(client.pending_count(), 0);
        assert!(client.scheduler().timers.is_empty());
    }

    #[test]
    fn test_continuation_send_failure() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        client.channel_mut().fail = true;
        client.on_receive(&response_pdu(&[service(1, "Speaker")], tid, 24, &[]));
        assert_eq!(*outcomes.borrow(), [Err(SearchError::LinkDisconnected)]);
        assert!(client.scheduler().timers.is_empty());
    }

    #[test]
    fn test_search_after_close() {
        let outcomes = Outcomes::default();
        let mut client = client();
        client.on_closed();

        assert_eq!(client.search([Uuid::from_u16(0x110B)], [], recorder(&outcomes)), None);
        assert_eq!(*outcomes.borrow(), [Err(SearchError::LinkDisconnected)]);
        assert!(client.channel().sent.is_empty());
    }

    #[test]
    fn test_invalid_search_parameters() {
        let outcomes = Outcomes::default();
        let mut client = client();

        assert_eq!(client.search([], [], recorder(&outcomes)), None);
        let too_many = (0..13u16).map(Uuid::from_u16);
        assert_eq!(client.search(too_many, [], recorder(&outcomes)), None);

        assert_eq!(
            *outcomes.borrow(),
            [
                Err(SearchError::InvalidParameters),
                Err(SearchError::InvalidParameters)
            ]
        );
        assert!(client.channel().sent.is_empty());
    }

    #[test]
    fn test_cancel() {
        let outcomes = Outcomes::default();
        let mut client = client();
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        client.cancel(tid);
        client.cancel(tid);
        assert_eq!(*outcomes.borrow(), [Err(SearchError::Canceled)]);
        assert!(client.scheduler().timers.is_empty());
    }

    #[test]
    fn test_drop_disconnects_pending() {
        let outcomes = Outcomes::default();
        let mut client = client();
        client.search([Uuid::from_u16(0x110B)], [], recorder(&outcomes));
        client.search([Uuid::from_u16(0x110A)], [], recorder(&outcomes));

        drop(client);
        assert_eq!(
            *outcomes.borrow(),
            [
                Err(SearchError::LinkDisconnected),
                Err(SearchError::LinkDisconnected)
            ]
        );
    }

    #[test]
    fn test_accumulated_size_ceiling() {
        let outcomes = Outcomes::default();
        let options = ClientOptions {
            max_accumulated_response_size: 32,
            ..ClientOptions::default()
        };
        let mut client = Client::with_options(FakeChannel::default(), FakeScheduler::default(), options);
        let tid = client
            .search([Uuid::from_u16(0x110B)], [], recorder(&outcomes))
            .unwrap();

        let services = [service(1, "Speaker"), service(2, "Headset")];
        let mut continuation = Vec::new();
        while outcomes.borrow().is_empty() {
            client.on_receive(&response_pdu(&services, tid, 24, &continuation));
            if outcomes.borrow().is_empty() {
                continuation = last_request(&client).continuation_state.to_vec();
            }
        }
        assert_eq!(*outcomes.borrow(), [Err(SearchError::PacketMalformed)]);
    }

    #[test]
    fn test_search_error_from_sdp_error() {
        assert_eq!(SearchError::from(SdpError::NotReady), SearchError::PacketMalformed);
        assert_eq!(
            SearchError::from(SdpError::ProtocolError(SdpErrorCode::InvalidVersion)),
            SearchError::Protocol(SdpErrorCode::InvalidVersion)
        );
    }
}
