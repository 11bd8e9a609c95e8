//! Messenger façade
//!
//! Owns the tracker registry, the outgoing window, the pending and inbound
//! message queues, and a boxed transport. One logical thread of control per
//! instance: operations are not safe to call concurrently on the same
//! messenger, but independent messengers are fully independent.
//!
//! Transport events arrive on an mpsc channel and are applied to the
//! delivery records before any caller-visible read, so a caller never
//! observes a half-applied disposition. `send` and `recv` are the only
//! suspending operations.

use std::collections::VecDeque;
use std::time::Duration;

use smallvec::{smallvec, SmallVec};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::MessengerConfig;
use crate::delivery::{DeliveryFlags, DeliveryInfo, Disposition};
use crate::errors::{MessengerError, Result};
use crate::message::Message;
use crate::tracker::{Direction, Tracker, TrackerRegistry};
use crate::transport::{EventReceiver, Transport, TransportEvent};
use crate::window::Window;

// ----------------------------------------------------------------------------
// Operation Results
// ----------------------------------------------------------------------------

/// Progress report from one `send` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// Messages handed to the transport by this call
    pub sent: usize,
    /// Messages still queued, waiting for window capacity
    pub pending: usize,
}

impl SendOutcome {
    /// Whether the pending queue was fully drained
    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }
}

/// Settlement scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    /// Settle exactly the given tracker
    Current,
    /// Settle the given tracker and every older un-settled tracker in the
    /// same direction (bulk acknowledgement)
    Cumulative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Started,
    Stopped,
}

// ----------------------------------------------------------------------------
// Messenger
// ----------------------------------------------------------------------------

/// Reliable message sender with per-delivery tracking and a sliding send
/// window
pub struct Messenger {
    config: MessengerConfig,
    state: Lifecycle,
    transport: Box<dyn Transport>,
    events: Option<EventReceiver>,
    registry: TrackerRegistry,
    window: Window,
    pending: VecDeque<(Tracker, Message)>,
    inbound: VecDeque<(Tracker, Message)>,
    last_outgoing: Option<Tracker>,
    last_incoming: Option<Tracker>,
    last_error: Option<MessengerError>,
    shutdown: bool,
}

impl Messenger {
    /// Create a messenger with default configuration over the given
    /// transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_config(MessengerConfig::default(), transport)
    }

    /// Create a messenger with custom configuration
    pub fn with_config(config: MessengerConfig, transport: Box<dyn Transport>) -> Self {
        let window = Window::new(config.window);
        Self {
            config,
            state: Lifecycle::Created,
            transport,
            events: None,
            registry: TrackerRegistry::new(),
            window,
            pending: VecDeque::new(),
            inbound: VecDeque::new(),
            last_outgoing: None,
            last_incoming: None,
            last_error: None,
            shutdown: false,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Initialize the transport and internal queues. Idempotent while
    /// started; re-arms the messenger after `stop`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state == Lifecycle::Started {
            self.last_error = None;
            return Ok(());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        match self.transport.open(tx).await {
            Ok(()) => {
                self.events = Some(rx);
                self.window = Window::new(self.config.window);
                self.shutdown = false;
                self.state = Lifecycle::Started;
                self.last_error = None;
                debug!(window = self.config.window, "messenger started");
                Ok(())
            }
            Err(err) => self.fail(err),
        }
    }

    /// Drain in-flight sends best-effort and release transport resources.
    /// Subsequent operations fail with `NotStarted` until `start` is called
    /// again.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == Lifecycle::Started {
            // best-effort flush; a full window is not an error here
            let _ = self.send(Some(Duration::ZERO)).await;
            if let Err(err) = self.transport.close().await {
                warn!(%err, "transport close failed during stop");
            }
            self.events = None;
            self.registry.clear();
            self.pending.clear();
            self.inbound.clear();
            self.window = Window::new(self.config.window);
            self.shutdown = false;
            debug!("messenger stopped");
        }
        self.state = Lifecycle::Stopped;
        self.last_error = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Enqueue a message and allocate its outgoing tracker. No window slot
    /// is claimed here; the slot is reserved at actual send time.
    pub fn put(&mut self, message: Message) -> Result<Tracker> {
        let result = self.put_inner(message);
        self.record(result)
    }

    fn put_inner(&mut self, message: Message) -> Result<Tracker> {
        self.ensure_started()?;
        if message.address().is_empty() {
            return Err(MessengerError::invalid_message(
                "message has no destination address",
            ));
        }
        self.pump_events()?;
        let tracker = self.registry.allocate(Direction::Outgoing);
        trace!(%tracker, address = message.address(), "message enqueued");
        self.pending.push_back((tracker, message));
        self.last_outgoing = Some(tracker);
        Ok(tracker)
    }

    /// Drain the pending queue in FIFO order, up to the window limit.
    ///
    /// Timeout: `None` blocks indefinitely, `Some(Duration::ZERO)` returns
    /// immediately with partial progress, `Some(d)` waits up to `d` for
    /// settlements to free window capacity. A full window that outlasts the
    /// timeout records [`MessengerError::WouldBlock`] and returns the
    /// partial outcome; an orderly transport shutdown also yields partial
    /// progress. Fatal transport failures are errors.
    pub async fn send(&mut self, timeout: Option<Duration>) -> Result<SendOutcome> {
        if let Err(err) = self.ensure_started() {
            return self.fail(err);
        }
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut sent = 0usize;
        loop {
            if let Err(err) = self.pump_events() {
                return self.fail(err);
            }
            if let Err(err) = self.drain_queue(&mut sent).await {
                return self.fail(err);
            }
            if self.pending.is_empty() {
                self.last_error = None;
                return Ok(SendOutcome { sent, pending: 0 });
            }
            if self.shutdown {
                // interrupted: report what went out instead of discarding it
                self.last_error = None;
                return Ok(SendOutcome {
                    sent,
                    pending: self.pending.len(),
                });
            }
            let expired = match deadline {
                Some(deadline) => deadline <= Instant::now(),
                None => false,
            };
            if expired {
                self.last_error = Some(MessengerError::WouldBlock);
                return Ok(SendOutcome {
                    sent,
                    pending: self.pending.len(),
                });
            }
            match self.wait_for_event(deadline).await {
                Ok(_) => continue,
                Err(err) => return self.fail(err),
            }
        }
    }

    async fn drain_queue(&mut self, sent: &mut usize) -> Result<()> {
        while !self.pending.is_empty() {
            if !self.window.reserve() {
                break;
            }
            let Some((tracker, message)) = self.pending.pop_front() else {
                self.window.release()?;
                break;
            };
            match self
                .transport
                .dispatch(tracker, message.address(), message.body())
                .await
            {
                Ok(()) => {
                    if let Some(delivery) = self.registry.lookup_mut(tracker) {
                        delivery.mark_dispatched();
                    }
                    *sent += 1;
                    trace!(%tracker, in_flight = self.window.in_flight(), "message dispatched");
                }
                Err(err) => {
                    self.window.release()?;
                    self.pending.push_front((tracker, message));
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Receiving
    // ------------------------------------------------------------------

    /// Wait for inbound messages from the transport.
    ///
    /// Queues messages as they arrive and returns the queued count. With a
    /// non-zero `limit` the call returns as soon as that many messages are
    /// queued; `limit` 0 accepts whatever is available. A timeout with an
    /// empty queue records [`MessengerError::WouldBlock`].
    pub async fn recv(&mut self, limit: usize, timeout: Option<Duration>) -> Result<usize> {
        if let Err(err) = self.ensure_started() {
            return self.fail(err);
        }
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if let Err(err) = self.pump_events() {
                return self.fail(err);
            }
            let queued = self.inbound.len();
            if (limit > 0 && queued >= limit) || self.shutdown {
                self.last_error = None;
                return Ok(queued);
            }
            let expired = match deadline {
                Some(deadline) => deadline <= Instant::now(),
                None => false,
            };
            if expired {
                if queued == 0 {
                    self.last_error = Some(MessengerError::WouldBlock);
                } else {
                    self.last_error = None;
                }
                return Ok(queued);
            }
            if limit == 0 && queued > 0 {
                self.last_error = None;
                return Ok(queued);
            }
            match self.wait_for_event(deadline).await {
                Ok(_) => continue,
                Err(err) => return self.fail(err),
            }
        }
    }

    /// Pop the next received message and its incoming tracker
    pub fn get(&mut self) -> Result<Option<(Tracker, Message)>> {
        let result = self.get_inner();
        self.record(result)
    }

    fn get_inner(&mut self) -> Result<Option<(Tracker, Message)>> {
        self.ensure_started()?;
        self.pump_events()?;
        match self.inbound.pop_front() {
            Some((tracker, message)) => {
                self.last_incoming = Some(tracker);
                Ok(Some((tracker, message)))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Status and Settlement
    // ------------------------------------------------------------------

    /// Read-only delivery snapshot, or None for an unknown or evicted
    /// tracker ("no delivery information" — a distinct outcome, not an
    /// error). Observing a snapshot clears the delivery's `updated` flag.
    pub fn status(&mut self, tracker: Tracker) -> Result<Option<DeliveryInfo>> {
        let result = self.status_inner(tracker);
        self.record(result)
    }

    fn status_inner(&mut self, tracker: Tracker) -> Result<Option<DeliveryInfo>> {
        self.ensure_started()?;
        self.pump_events()?;
        Ok(self.registry.lookup_mut(tracker).map(|d| d.snapshot()))
    }

    /// Settle one delivery, or — with [`SettleMode::Cumulative`] — the
    /// delivery and every older un-settled one in the same direction.
    /// Returns the number of deliveries newly settled.
    ///
    /// A delivery without a terminal local disposition is implicitly
    /// accepted first; settling an un-sent pending message cancels it.
    /// Settlement is irreversible and frees the window slot of each
    /// dispatched outgoing delivery exactly once.
    pub fn settle(&mut self, tracker: Tracker, mode: SettleMode) -> Result<usize> {
        let result = self.settle_inner(tracker, mode);
        self.record(result)
    }

    fn settle_inner(&mut self, tracker: Tracker, mode: SettleMode) -> Result<usize> {
        self.ensure_started()?;
        self.pump_events()?;
        if self.registry.lookup(tracker).is_none() {
            return Err(MessengerError::UnknownTracker { tracker });
        }
        let sequences: SmallVec<[u64; 8]> = match mode {
            SettleMode::Current => smallvec![tracker.sequence()],
            SettleMode::Cumulative => self.registry.unsettled_sequences_up_to(tracker),
        };
        let mut settled = 0;
        for sequence in sequences {
            if self.settle_delivery(Tracker::new(tracker.direction(), sequence))? {
                settled += 1;
            }
        }
        Ok(settled)
    }

    /// Settle a single delivery; Ok(true) when it was newly settled,
    /// Ok(false) for the no-op on an already settled one.
    fn settle_delivery(&mut self, tracker: Tracker) -> Result<bool> {
        let held_slot = {
            let delivery = self
                .registry
                .lookup_mut(tracker)
                .ok_or(MessengerError::UnknownTracker { tracker })?;
            if delivery.is_settled() {
                return Ok(false);
            }
            if !delivery.local().is_terminal() {
                delivery.dispose_local(Disposition::Accepted)?;
            }
            delivery.settle()?;
            delivery.is_dispatched() && tracker.direction() == Direction::Outgoing
        };
        if held_slot {
            self.window.release()?;
        } else if tracker.direction() == Direction::Outgoing {
            // settled before it ever went out: cancel the queued send
            self.pending.retain(|(pending, _)| *pending != tracker);
        }
        debug!(%tracker, in_flight = self.window.in_flight(), "delivery settled");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Tracker of the most recent `put`
    pub fn outgoing_tracker(&self) -> Option<Tracker> {
        self.last_outgoing
    }

    /// Tracker of the most recent `get`
    pub fn incoming_tracker(&self) -> Option<Tracker> {
        self.last_incoming
    }

    /// Most recent error recorded by any operation on this messenger;
    /// cleared on successful operations
    pub fn last_error(&self) -> Option<&MessengerError> {
        self.last_error.as_ref()
    }

    /// Messages enqueued but not yet handed to the transport
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Received messages waiting for `get`
    pub fn incoming_count(&self) -> usize {
        self.inbound.len()
    }

    /// Adjust the outgoing window capacity. Shrinking below the in-flight
    /// count blocks new sends until settlements catch up.
    pub fn set_window(&mut self, capacity: usize) {
        self.config.window = capacity;
        self.window.set_capacity(capacity);
    }

    // ------------------------------------------------------------------
    // Event Pump
    // ------------------------------------------------------------------

    /// Apply every transport event already queued, without waiting
    fn pump_events(&mut self) -> Result<()> {
        loop {
            let event = match self.events.as_mut() {
                Some(rx) => match rx.try_recv() {
                    Ok(event) => Some(event),
                    Err(mpsc::error::TryRecvError::Empty) => None,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        self.shutdown = true;
                        None
                    }
                },
                None => None,
            };
            match event {
                Some(event) => self.apply_event(event)?,
                None => return Ok(()),
            }
        }
    }

    /// Wait for one transport event, up to the deadline. Ok(true) when an
    /// event was applied, Ok(false) on timeout or channel shutdown.
    async fn wait_for_event(&mut self, deadline: Option<Instant>) -> Result<bool> {
        let event = {
            let rx = match self.events.as_mut() {
                Some(rx) => rx,
                None => return Ok(false),
            };
            match deadline {
                None => rx.recv().await,
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        return Ok(false);
                    }
                    match tokio::time::timeout(deadline - now, rx.recv()).await {
                        Ok(event) => event,
                        Err(_) => return Ok(false),
                    }
                }
            }
        };
        match event {
            Some(event) => {
                self.apply_event(event)?;
                Ok(true)
            }
            None => {
                self.shutdown = true;
                Ok(false)
            }
        }
    }

    fn apply_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Progress { tracker, flags } => {
                match self.registry.lookup_mut(tracker) {
                    Some(delivery) => delivery.apply_progress(flags),
                    // late callback for an evicted delivery
                    None => trace!(%tracker, "progress for unknown tracker"),
                }
            }
            TransportEvent::Disposition { tracker, state } => {
                let observed = match self.registry.lookup_mut(tracker) {
                    Some(delivery) => match delivery.observe_remote(state) {
                        Ok(()) => true,
                        Err(err) => {
                            warn!(%tracker, %err, "ignoring out-of-order remote disposition");
                            false
                        }
                    },
                    None => {
                        trace!(%tracker, "disposition for unknown tracker");
                        false
                    }
                };
                if observed && state.is_terminal() && self.config.auto_settle {
                    self.settle_delivery(tracker)?;
                }
            }
            TransportEvent::Writable => {
                // no state to update; arrival alone wakes a blocked send
            }
            TransportEvent::Inbound { message } => {
                let tracker = self.registry.allocate(Direction::Incoming);
                if let Some(delivery) = self.registry.lookup_mut(tracker) {
                    delivery.apply_progress(DeliveryFlags {
                        readable: true,
                        ..Default::default()
                    });
                }
                trace!(%tracker, address = message.address(), "inbound message queued");
                self.inbound.push_back((tracker, message));
            }
            TransportEvent::Closed { error } => {
                self.shutdown = true;
                match error {
                    None => debug!("transport closed"),
                    Some(reason) => return Err(MessengerError::transport(reason)),
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Error Bookkeeping
    // ------------------------------------------------------------------

    fn ensure_started(&self) -> Result<()> {
        if self.state == Lifecycle::Started {
            Ok(())
        } else {
            Err(MessengerError::NotStarted)
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(err) => self.last_error = Some(err.clone()),
        }
        result
    }

    fn fail<T>(&mut self, err: MessengerError) -> Result<T> {
        self.last_error = Some(err.clone());
        Err(err)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
