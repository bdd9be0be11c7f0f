//! Store-and-forward router: per-peer packet queues with dedup, TTL expiry and flood forwarding.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::identity::Identifier;
use crate::packet::Packet;

/// How long a packet may wait in a queue by default (2 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_millis(120_000);

/// A packet waiting in a queue, stamped with the monotonic time it was queued.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    packet: Packet,
    ttl: Duration,
    queued_at: Instant,
}

impl QueuedPacket {
    pub fn wrap(packet: Packet, ttl: Duration) -> Self {
        Self::wrap_at(packet, ttl, Instant::now())
    }

    pub fn wrap_at(packet: Packet, ttl: Duration, queued_at: Instant) -> Self {
        Self {
            packet,
            ttl,
            queued_at,
        }
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn into_packet(self) -> Packet {
        self.packet
    }

    /// Expired once strictly more than `ttl` has elapsed since it was queued.
    pub fn expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.queued_at) > self.ttl
    }
}

/// FIFO of packets for one destination peer, plus a catalogue for exact-duplicate rejection.
#[derive(Debug, Default)]
pub struct PacketQueue {
    queue: VecDeque<QueuedPacket>,
    catalogue: HashSet<Packet>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `packet` unless a structurally equal packet is already queued.
    /// Returns true if queued.
    pub fn enqueue_if_new(&mut self, packet: Packet, ttl: Duration) -> bool {
        if self.catalogue.contains(&packet) {
            return false;
        }
        self.catalogue.insert(packet.clone());
        self.queue.push_back(QueuedPacket::wrap(packet, ttl));
        true
    }

    /// Pop until a packet that has not expired at `now` is found. Expired packets are discarded.
    pub fn take(&mut self, now: Instant) -> Option<Packet> {
        self.take_queued(now).map(QueuedPacket::into_packet)
    }

    /// Like [`PacketQueue::take`], but keeps the queue time so the packet can be restored.
    pub fn take_queued(&mut self, now: Instant) -> Option<QueuedPacket> {
        while let Some(queued) = self.queue.pop_front() {
            self.catalogue.remove(&queued.packet);
            if !queued.expired_at(now) {
                return Some(queued);
            }
            debug!(destination = ?queued.packet.target(), "dropping expired packet");
        }
        None
    }

    /// Put previously taken packets back at the front, in their original order.
    /// Packets that expired meanwhile or were queued again are dropped. Returns how many went back.
    pub fn restore_front(&mut self, batch: Vec<QueuedPacket>, now: Instant) -> usize {
        let mut restored = 0;
        for queued in batch.into_iter().rev() {
            if queued.expired_at(now) || !self.catalogue.insert(queued.packet.clone()) {
                continue;
            }
            self.queue.push_front(queued);
            restored += 1;
        }
        restored
    }

    pub fn has_next(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Per-destination queues and the currently known neighbourhood.
#[derive(Debug, Default)]
pub struct Router {
    queues: HashMap<Identifier, PacketQueue>,
    reachable: HashSet<Identifier>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as reachable. Returns true if it was not already.
    pub fn register(&mut self, id: Identifier) -> bool {
        self.reachable.insert(id)
    }

    /// Keep only the reachable peers also present in `keep`. Queues are left alone.
    pub fn retain(&mut self, keep: &HashSet<Identifier>) {
        self.reachable.retain(|id| keep.contains(id));
    }

    /// Peers `packet` should be queued for: the target alone if it is reachable, otherwise every
    /// reachable peer. Peers already in the packet's route are excluded either way.
    pub fn forward_set(&self, packet: &Packet) -> HashSet<Identifier> {
        let visited: HashSet<&Identifier> = packet.route().iter().collect();
        let candidates: HashSet<Identifier> = if self.reachable.contains(&packet.target()) {
            std::iter::once(packet.target()).collect()
        } else {
            self.reachable.clone()
        };
        candidates
            .into_iter()
            .filter(|id| !visited.contains(id))
            .collect()
    }

    /// Queue `packet` for every peer in its forward set. Returns how many queues accepted it.
    pub fn forward(&mut self, packet: Packet, ttl: Duration) -> usize {
        let targets = self.forward_set(&packet);
        if targets.is_empty() {
            debug!(destination = ?packet.target(), "no peer to forward packet to");
            return 0;
        }
        let mut queued = 0;
        for peer in targets {
            let queue = self.queues.entry(peer).or_default();
            if queue.enqueue_if_new(packet.clone(), ttl) {
                queued += 1;
            } else {
                trace!(peer = ?peer, "duplicate packet already queued");
            }
        }
        queued
    }

    /// Next packet for `peer` that has not expired. Expired packets on the way are discarded.
    pub fn next_for_peer(&mut self, peer: &Identifier) -> Option<Packet> {
        self.queues.get_mut(peer)?.take(Instant::now())
    }

    /// Every non-expired packet queued for `peer`, in queue order.
    pub fn drain_for_peer(&mut self, peer: &Identifier) -> Vec<Packet> {
        self.checkout(peer)
            .into_iter()
            .map(QueuedPacket::into_packet)
            .collect()
    }

    /// Take every non-expired packet queued for `peer`, keeping queue times so that a
    /// failed hand-over can be undone with [`Router::restore`].
    pub fn checkout(&mut self, peer: &Identifier) -> Vec<QueuedPacket> {
        let Some(queue) = self.queues.get_mut(peer) else {
            return Vec::new();
        };
        let now = Instant::now();
        let mut out = Vec::with_capacity(queue.len());
        while let Some(queued) = queue.take_queued(now) {
            out.push(queued);
        }
        out
    }

    /// Return packets from [`Router::checkout`] to the front of `peer`'s queue.
    pub fn restore(&mut self, peer: Identifier, batch: Vec<QueuedPacket>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let restored = self
            .queues
            .entry(peer)
            .or_default()
            .restore_front(batch, Instant::now());
        debug!(peer = ?peer, restored, "restored packets after failed hand-over");
        restored
    }

    /// Reachable peers that have something queued.
    pub fn targeted_reachable_peers(&self) -> HashSet<Identifier> {
        self.queues
            .iter()
            .filter(|(id, queue)| queue.has_next() && self.reachable.contains(*id))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn reachable_peers(&self) -> &HashSet<Identifier> {
        &self.reachable
    }

    pub fn is_reachable(&self, id: &Identifier) -> bool {
        self.reachable.contains(id)
    }

    /// Number of packets currently queued for `peer`, expired ones included.
    pub fn queued_for(&self, peer: &Identifier) -> usize {
        self.queues.get(peer).map_or(0, PacketQueue::len)
    }
}
