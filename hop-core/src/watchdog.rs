//! Watchdog: the discovery/transmission state machine.
//!
//! Radio time is shared between two jobs that cannot overlap: profiling newly visible
//! devices (discovery) and swapping queued packets with devices we already know
//! (transmission). The platform reports peer lists and connection events; the watchdog
//! decides where to connect next and runs exactly one exchange per connection.
//!
//! All state-machine state is owned by the event-processing context. Caller-facing
//! operations go through a [`WatchdogHandle`], which shares only the router, the inbound
//! queues and the listener lists behind a single mutex.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::identity::{Identifier, Identity, IdentityStore, StoreError};
use crate::link::{ConnectionInfo, Link, LinkError};
use crate::packet::Packet;
use crate::router::{QueuedPacket, Router, DEFAULT_TTL};
use crate::wire::{Wire, WireError};

/// Default upper bound on a single discovery or transmission exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries when the platform reports it is busy dropping a group.
pub const DEFAULT_DROP_RETRY_LIMIT: u32 = 8;

/// Default pause between group drop retries.
pub const DEFAULT_DROP_RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Time-to-live for every packet queued by this device.
    pub ttl: Duration,
    pub exchange_timeout: Duration,
    pub drop_retry_limit: u32,
    pub drop_retry_backoff: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            drop_retry_limit: DEFAULT_DROP_RETRY_LIMIT,
            drop_retry_backoff: DEFAULT_DROP_RETRY_BACKOFF,
        }
    }
}

impl WatchdogConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn with_drop_retries(mut self, limit: u32, backoff: Duration) -> Self {
        self.drop_retry_limit = limit;
        self.drop_retry_backoff = backoff;
        self
    }
}

/// What the radio is currently being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Profiling a device we have no identifier for yet.
    Discovery,
    /// Exchanging queued packets with a known device.
    Transmission,
    /// Idle; waiting for an external event to restart the cycle.
    Docked,
}

/// Input to the state machine. All but [`Event::Wake`] come from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Link-layer addresses of every currently visible device.
    PeersChanged(Vec<String>),
    /// A group formed; exactly one channel can be opened for it.
    ConnectionEstablished(ConnectionInfo),
    /// This device's own link-layer address.
    LocalAddressChanged(String),
    /// A device at this address asked to connect to us.
    Invited(String),
    /// Outbound traffic was queued; restart the cycle if docked.
    Wake,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("missing required element: {0}")]
    Protocol(&'static str),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("wire error: {0}")]
    Wire(WireError),
    #[error("exchange timed out after {0:?}")]
    Timeout(Duration),
    #[error("link error: {0}")]
    Link(LinkError),
    #[error("link operation unsupported by the platform")]
    Unsupported,
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("cannot start without an identity: {0}")]
    NoIdentity(#[from] StoreError),
}

impl WatchdogError {
    /// Fatal errors stop the service; the rest only abort the current exchange.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WatchdogError::Unsupported
                | WatchdogError::InvariantViolation(_)
                | WatchdogError::NoIdentity(_)
        )
    }
}

impl From<WireError> for WatchdogError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Io(io) => WatchdogError::Transport(io),
            other => WatchdogError::Wire(other),
        }
    }
}

impl From<LinkError> for WatchdogError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Unsupported => WatchdogError::Unsupported,
            other => WatchdogError::Link(other),
        }
    }
}

/// State shared between the event-processing context and callers.
#[derive(Default)]
struct Shared {
    router: Router,
    inbound: HashMap<Identifier, VecDeque<Packet>>,
    listeners: HashMap<Identifier, Vec<mpsc::UnboundedSender<Identifier>>>,
    discovery_watchers: Vec<mpsc::UnboundedSender<HashSet<Identifier>>>,
}

impl Shared {
    /// Queue a packet addressed to us. Listeners for its source fire when the queue
    /// goes from empty to non-empty.
    fn deliver(&mut self, packet: Packet) {
        let source = packet.source();
        let queue = self.inbound.entry(source).or_default();
        let was_empty = queue.is_empty();
        queue.push_back(packet);
        if was_empty {
            if let Some(listeners) = self.listeners.get_mut(&source) {
                listeners.retain(|tx| tx.send(source).is_ok());
            }
        }
    }

    fn finish_discovery(&mut self) -> HashSet<Identifier> {
        let reachable = self.router.reachable_peers().clone();
        self.discovery_watchers
            .retain(|tx| tx.send(reachable.clone()).is_ok());
        reachable
    }
}

/// Caller-facing side of a watchdog. Cheap to clone; safe to use from any task.
#[derive(Clone)]
pub struct WatchdogHandle {
    id: Identifier,
    ttl: Duration,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<Event>,
}

impl WatchdogHandle {
    /// This device's identifier.
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Queue `payload` for `target`. Payloads travel unencrypted; encrypt before sending.
    /// Returns how many peer queues the message entered (0 if nobody is reachable).
    pub fn send(&self, payload: impl Into<Vec<u8>>, target: Identifier) -> usize {
        let packet = Packet::new(self.id, vec![self.id], target, payload.into());
        let queued = self.shared.lock().router.forward(packet, self.ttl);
        if queued == 0 {
            debug!(destination = ?target, "message not queued, no reachable peer");
        }
        // The event loop may already be gone during shutdown.
        let _ = self.events.send(Event::Wake);
        queued
    }

    /// Pop the oldest payload received from `source`.
    pub fn try_receive(&self, source: &Identifier) -> Option<Vec<u8>> {
        let mut shared = self.shared.lock();
        shared
            .inbound
            .get_mut(source)?
            .pop_front()
            .map(Packet::into_payload)
    }

    /// Notifications carrying `source` whenever messages from it become available.
    pub fn listen(&self, source: Identifier) -> mpsc::UnboundedReceiver<Identifier> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared
            .lock()
            .listeners
            .entry(source)
            .or_default()
            .push(tx);
        rx
    }

    /// The reachable set, delivered at the end of every discovery phase.
    pub fn watch_discovery(&self) -> mpsc::UnboundedReceiver<HashSet<Identifier>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().discovery_watchers.push(tx);
        rx
    }

    pub fn reachable_peers(&self) -> HashSet<Identifier> {
        self.shared.lock().router.reachable_peers().clone()
    }

    pub fn queued_for(&self, peer: &Identifier) -> usize {
        self.shared.lock().router.queued_for(peer)
    }

    /// Number of received messages from `source` not yet picked up.
    pub fn pending_from(&self, source: &Identifier) -> usize {
        self.shared.lock().inbound.get(source).map_or(0, VecDeque::len)
    }
}

/// The state machine itself, generic over the platform link.
pub struct Watchdog<L: Link> {
    identity: Identity,
    link: L,
    config: WatchdogConfig,
    shared: Arc<Mutex<Shared>>,
    phase: Phase,
    discovery_queue: VecDeque<String>,
    address_to_id: HashMap<String, Identifier>,
    id_to_address: HashMap<Identifier, String>,
    local_address: String,
    /// Address of the connection currently requested from the platform.
    connecting: Option<String>,
    /// Packets handed to a peer in the current transmission, restored if it fails.
    in_flight: Option<(Identifier, Vec<QueuedPacket>)>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<L: Link> Watchdog<L> {
    pub fn new(identity: Identity, link: L, config: WatchdogConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            identity,
            link,
            config,
            shared: Arc::new(Mutex::new(Shared::default())),
            phase: Phase::Docked,
            discovery_queue: VecDeque::new(),
            address_to_id: HashMap::new(),
            id_to_address: HashMap::new(),
            local_address: String::new(),
            connecting: None,
            in_flight: None,
            events_tx,
            events_rx,
        }
    }

    pub fn handle(&self) -> WatchdogHandle {
        WatchdogHandle {
            id: self.identity.id(),
            ttl: self.config.ttl,
            shared: self.shared.clone(),
            events: self.events_tx.clone(),
        }
    }

    /// Sender the platform uses to feed events into [`Watchdog::run`].
    pub fn events(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn id(&self) -> Identifier {
        self.identity.id()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    pub fn address_of(&self, id: &Identifier) -> Option<&str> {
        self.id_to_address.get(id).map(String::as_str)
    }

    pub fn id_at(&self, address: &str) -> Option<Identifier> {
        self.address_to_id.get(address).copied()
    }

    /// Addresses still waiting to be profiled.
    pub fn discovery_backlog(&self) -> usize {
        self.discovery_queue.len()
    }

    /// Process events until `shutdown` fires or a fatal error occurs.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<(), WatchdogError> {
        info!(id = ?self.identity.id(), name = self.identity.name(), "watchdog started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = self.events_rx.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self.handle_event(event).await {
                        error!(error = %e, "watchdog stopping");
                        return Err(e);
                    }
                }
            }
        }
        info!("watchdog stopped");
        Ok(())
    }

    /// Handle every event already queued on the internal channel (wakes from handles,
    /// events posted through [`Watchdog::events`]). Returns how many were handled.
    pub async fn process_pending(&mut self) -> Result<usize, WatchdogError> {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Apply one event. Only fatal errors are returned; failed exchanges fall back to docked.
    pub async fn handle_event(&mut self, event: Event) -> Result<(), WatchdogError> {
        match event {
            Event::PeersChanged(peers) => self.on_peers_changed(peers).await,
            Event::ConnectionEstablished(info) => self.on_connection_established(info).await,
            Event::LocalAddressChanged(address) => {
                debug!(address = %address, "local address changed");
                self.local_address = address;
                Ok(())
            }
            Event::Invited(address) => self.on_invited(address).await,
            Event::Wake => self.on_wake().await,
        }
    }

    async fn on_peers_changed(&mut self, peers: Vec<String>) -> Result<(), WatchdogError> {
        for address in &peers {
            if self.address_to_id.contains_key(address)
                || self.discovery_queue.contains(address)
                || self.connecting.as_ref() == Some(address)
            {
                continue;
            }
            debug!(address = %address, "queueing peer for discovery");
            self.discovery_queue.push_back(address.clone());
        }

        let visible: HashSet<Identifier> = peers
            .iter()
            .filter_map(|address| self.address_to_id.get(address).copied())
            .collect();
        self.shared.lock().router.retain(&visible);

        if self.phase != Phase::Docked {
            return Ok(());
        }
        if let Some(next) = self.discovery_queue.pop_front() {
            self.set_phase(Phase::Discovery);
            return self.connect_to(&next).await;
        }
        // Traffic left over from an aborted exchange is retried on every scan result.
        let targeted = self.shared.lock().router.targeted_reachable_peers();
        self.start_transmission(targeted).await?;
        Ok(())
    }

    async fn on_connection_established(
        &mut self,
        info: ConnectionInfo,
    ) -> Result<(), WatchdogError> {
        if info.group_owner.is_none() {
            debug!("connection event without a group owner, ignoring");
            return Ok(());
        }
        let phase = self.phase;
        if phase == Phase::Docked {
            return Err(WatchdogError::InvariantViolation(
                "connection established while docked".into(),
            ));
        }

        let limit = self.config.exchange_timeout;
        let outcome = match tokio::time::timeout(limit, self.exchange(phase, &info)).await {
            Ok(result) => result,
            Err(_) => Err(WatchdogError::Timeout(limit)),
        };
        let requested = self.connecting.take();
        let in_flight = self.in_flight.take();
        match outcome {
            Ok(peer) => {
                // The platform may hand us a different peer than the one asked for.
                if let Some(address) = requested {
                    if phase == Phase::Discovery && !self.address_to_id.contains_key(&address) {
                        debug!(address = %address, "requested peer not reached, queued again");
                        self.discovery_queue.push_front(address);
                    }
                }
                self.advance(phase, peer).await
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(phase = ?phase, error = %e, "exchange aborted");
                if let Some((peer, batch)) = in_flight {
                    self.shared.lock().router.restore(peer, batch);
                }
                self.dock_and_rescan().await
            }
        }
    }

    async fn on_invited(&mut self, address: String) -> Result<(), WatchdogError> {
        if self.phase != Phase::Docked {
            debug!(address = %address, phase = ?self.phase, "busy, ignoring invitation");
            return Ok(());
        }
        self.discovery_queue.retain(|queued| *queued != address);
        let next = if self.address_to_id.contains_key(&address) {
            Phase::Transmission
        } else {
            Phase::Discovery
        };
        self.set_phase(next);
        self.connect_to(&address).await
    }

    async fn on_wake(&mut self) -> Result<(), WatchdogError> {
        if self.phase != Phase::Docked {
            return Ok(());
        }
        let targeted = self.shared.lock().router.targeted_reachable_peers();
        if self.start_transmission(targeted).await? {
            return Ok(());
        }
        if let Some(next) = self.discovery_queue.pop_front() {
            self.set_phase(Phase::Discovery);
            return self.connect_to(&next).await;
        }
        Ok(())
    }

    /// Run the exchange for `phase` over the channel the platform just formed.
    async fn exchange(
        &mut self,
        phase: Phase,
        info: &ConnectionInfo,
    ) -> Result<Identifier, WatchdogError> {
        let channel = self.link.open_channel(info).await?;
        let mut wire = Wire::new(channel);
        let (peer, address) =
            handshake(&mut wire, self.identity.id(), &self.local_address).await?;
        match phase {
            Phase::Discovery => self.record_peer(peer, address),
            Phase::Transmission => self.transmit(&mut wire, peer).await?,
            Phase::Docked => {
                return Err(WatchdogError::InvariantViolation(
                    "exchange started while docked".into(),
                ))
            }
        }
        Ok(peer)
    }

    fn record_peer(&mut self, peer: Identifier, address: String) {
        if address.is_empty() {
            warn!(peer = ?peer, "peer did not report its address");
        }
        info!(peer = ?peer, address = %address, "discovered peer");
        if let Some(previous) = self.id_to_address.insert(peer, address.clone()) {
            if previous != address {
                self.address_to_id.remove(&previous);
            }
        }
        self.address_to_id.insert(address, peer);
        self.shared.lock().router.register(peer);
    }

    /// Send everything queued for `peer` (tagged with its identifier), then take what it sends.
    /// The outbound batch stays in flight until the peer's batch has been read in full.
    async fn transmit<S>(
        &mut self,
        wire: &mut Wire<S>,
        peer: Identifier,
    ) -> Result<(), WatchdogError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let outbound = self.shared.lock().router.checkout(&peer);
        self.in_flight = Some((peer, outbound.clone()));
        let count = i32::try_from(outbound.len())
            .map_err(|_| WatchdogError::Wire(WireError::TooLarge(outbound.len())))?;
        wire.send_int(count).await?;
        for queued in &outbound {
            wire.send_packet(&queued.packet().tag(peer)).await?;
        }
        wire.flush().await?;

        let inbound = wire
            .recv_int()
            .await?
            .ok_or(WatchdogError::Protocol("packet count"))?;
        if inbound < 0 {
            return Err(WatchdogError::Protocol("non-negative packet count"));
        }
        for _ in 0..inbound {
            let packet = wire
                .recv_packet()
                .await?
                .ok_or(WatchdogError::Protocol("packet"))?;
            self.on_packet_received(packet);
        }
        self.in_flight = None;
        info!(
            peer = ?peer,
            sent = outbound.len(),
            received = inbound,
            "transmission complete"
        );
        Ok(())
    }

    /// Keep packets addressed to us; put everything else back into the router.
    fn on_packet_received(&self, packet: Packet) {
        let mut shared = self.shared.lock();
        if packet.target() == self.identity.id() {
            debug!(source = ?packet.source(), "message delivered");
            shared.deliver(packet);
        } else {
            let queued = shared.router.forward(packet, self.config.ttl);
            debug!(queued, "relaying packet");
        }
    }

    /// Decide where to go after a successful exchange in `finished`.
    async fn advance(&mut self, finished: Phase, peer: Identifier) -> Result<(), WatchdogError> {
        debug!(peer = ?peer, phase = ?finished, "exchange complete");
        match finished {
            Phase::Discovery => {
                if let Some(next) = self.discovery_queue.pop_front() {
                    return self.connect_to(&next).await;
                }
                let (reachable, targeted) = {
                    let mut shared = self.shared.lock();
                    let reachable = shared.finish_discovery();
                    (reachable, shared.router.targeted_reachable_peers())
                };
                info!(reachable = reachable.len(), "discovery finished");
                if !self.start_transmission(targeted).await? {
                    self.set_phase(Phase::Docked);
                }
                Ok(())
            }
            Phase::Transmission => {
                let targeted = self.shared.lock().router.targeted_reachable_peers();
                if self.start_transmission(targeted).await? {
                    return Ok(());
                }
                if let Some(next) = self.discovery_queue.pop_front() {
                    self.set_phase(Phase::Discovery);
                    return self.connect_to(&next).await;
                }
                self.dock_and_rescan().await
            }
            Phase::Docked => Err(WatchdogError::InvariantViolation(
                "advancing from docked".into(),
            )),
        }
    }

    /// Connect to one of `targeted` in transmission phase. Returns false if there is none.
    async fn start_transmission(
        &mut self,
        targeted: HashSet<Identifier>,
    ) -> Result<bool, WatchdogError> {
        let Some(next) = targeted.into_iter().next() else {
            return Ok(false);
        };
        let address = self.id_to_address.get(&next).cloned().ok_or_else(|| {
            WatchdogError::InvariantViolation(format!(
                "targeting peer {next:?} with no known address"
            ))
        })?;
        self.set_phase(Phase::Transmission);
        self.connect_to(&address).await?;
        Ok(true)
    }

    /// Drop whatever group is open, then ask the platform to connect to `address`.
    async fn connect_to(&mut self, address: &str) -> Result<(), WatchdogError> {
        self.drop_group().await?;
        debug!(address, phase = ?self.phase, "connecting");
        match self.link.connect(address).await {
            Ok(()) => {
                self.connecting = Some(address.to_owned());
                Ok(())
            }
            Err(LinkError::Unsupported) => Err(WatchdogError::Unsupported),
            Err(e) => {
                warn!(address, error = %e, "connect request failed");
                self.dock_and_rescan().await
            }
        }
    }

    async fn drop_group(&mut self) -> Result<(), WatchdogError> {
        let mut attempts = 0;
        loop {
            match self.link.remove_group().await {
                Ok(()) => return Ok(()),
                Err(LinkError::Busy) if attempts < self.config.drop_retry_limit => {
                    attempts += 1;
                    debug!(attempts, "platform busy dropping group, retrying");
                    tokio::time::sleep(self.config.drop_retry_backoff).await;
                }
                Err(LinkError::Unsupported) => return Err(WatchdogError::Unsupported),
                Err(e) => {
                    warn!(error = %e, "could not drop current group, connecting anyway");
                    return Ok(());
                }
            }
        }
    }

    async fn dock_and_rescan(&mut self) -> Result<(), WatchdogError> {
        self.set_phase(Phase::Docked);
        self.connecting = None;
        match self.link.discover_peers().await {
            Ok(()) => Ok(()),
            Err(LinkError::Unsupported) => Err(WatchdogError::Unsupported),
            Err(e) => {
                warn!(error = %e, "peer scan request failed");
                Ok(())
            }
        }
    }

    fn set_phase(&mut self, next: Phase) {
        if self.phase != next {
            info!(from = ?self.phase, to = ?next, "phase transition");
        }
        self.phase = next;
    }
}

impl<L> Watchdog<L>
where
    L: Link + 'static,
    L::Channel: 'static,
{
    /// Load the identity, build the state machine and spawn its event loop.
    /// Must be called from within a tokio runtime.
    pub fn start<S>(store: &S, link: L, config: WatchdogConfig) -> Result<Service, WatchdogError>
    where
        S: IdentityStore + ?Sized,
    {
        let identity = store.load()?;
        let watchdog = Watchdog::new(identity, link, config);
        let handle = watchdog.handle();
        let events = watchdog.events();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(watchdog.run(shutdown_rx));
        Ok(Service {
            handle,
            events,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// Both sides send magic, identifier and address, then read the other's.
async fn handshake<S>(
    wire: &mut Wire<S>,
    own: Identifier,
    own_address: &str,
) -> Result<(Identifier, String), WatchdogError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    wire.send_magic().await?;
    wire.send_id(&own).await?;
    wire.send_string(own_address).await?;
    wire.flush().await?;

    wire.recv_magic()
        .await?
        .ok_or(WatchdogError::Protocol("magic"))?;
    let peer = wire
        .recv_id()
        .await?
        .ok_or(WatchdogError::Protocol("identifier"))?;
    let address = wire
        .recv_string()
        .await?
        .ok_or(WatchdogError::Protocol("address"))?;
    if peer == own {
        return Err(WatchdogError::Protocol("distinct peer identifier"));
    }
    Ok((peer, address))
}

/// A running watchdog. Dropping it without [`Service::stop`] also ends the event loop.
pub struct Service {
    handle: WatchdogHandle,
    events: mpsc::UnboundedSender<Event>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), WatchdogError>>,
}

impl Service {
    pub fn handle(&self) -> &WatchdogHandle {
        &self.handle
    }

    /// Sender for platform events.
    pub fn events(&self) -> mpsc::UnboundedSender<Event> {
        self.events.clone()
    }

    /// Stop the event loop and wait for it. Returns the fatal error if the loop died of one.
    pub async fn stop(mut self) -> Result<(), WatchdogError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(WatchdogError::InvariantViolation(format!(
                "event loop panicked: {e}"
            ))),
        }
    }
}
