//! In-process radio mesh: named nodes, symmetric links, and a pump that plays the platform.
//!
//! The pump replays what a radio stack would report. It answers scan requests with the
//! current neighbour list, turns a connect request to a docked neighbour into an invitation,
//! and forms a group when two nodes ask for each other. When every request waits on a busy
//! node, one busy target accepts. Both sides of a group run their connection events
//! concurrently over an in-memory duplex channel.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr};

use hop_core::{
    ConnectionInfo, Event, Identifier, Identity, Phase, Watchdog, WatchdogConfig, WatchdogError,
    WatchdogHandle,
};
use tokio::io::duplex;
use tracing::{debug, info};

use crate::link::SimLink;

/// Buffer of each in-memory channel. Large enough that neither side blocks while both write.
const CHANNEL_CAPACITY: usize = 1024 * 1024;

/// Address every simulated group owner reports.
const OWNER_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("node {0} already exists")]
    DuplicateNode(String),
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("a node cannot link to itself: {0}")]
    SelfLink(String),
    #[error("node {name} stopped: {source}")]
    Node {
        name: String,
        #[source]
        source: WatchdogError,
    },
}

/// One simulated device.
pub struct SimNode {
    address: String,
    watchdog: Watchdog<SimLink>,
    link: SimLink,
}

impl SimNode {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn watchdog(&self) -> &Watchdog<SimLink> {
        &self.watchdog
    }

    pub fn link(&self) -> &SimLink {
        &self.link
    }
}

/// What one call to [`Mesh::run_until_idle`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub rounds: usize,
    /// Groups formed between two nodes.
    pub exchanges: usize,
    pub invitations: usize,
    /// Connect requests to unreachable addresses the platform gave up on.
    pub aborted: usize,
    /// False if the round limit was hit before the mesh went quiet.
    pub settled: bool,
}

pub struct Mesh {
    config: WatchdogConfig,
    nodes: BTreeMap<String, SimNode>,
    by_address: HashMap<String, String>,
    links: BTreeSet<(String, String)>,
}

impl Mesh {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            nodes: BTreeMap::new(),
            by_address: HashMap::new(),
            links: BTreeSet::new(),
        }
    }

    /// Add a node with a fresh identity. `display_name` goes into its profile.
    pub async fn add_node(
        &mut self,
        name: &str,
        display_name: &str,
    ) -> Result<Identifier, MeshError> {
        if self.nodes.contains_key(name) {
            return Err(MeshError::DuplicateNode(name.to_owned()));
        }
        let index = self.by_address.len() + 1;
        let address = format!("02:00:00:00:{:02x}:{:02x}", index >> 8, index & 0xff);
        let link = SimLink::new();
        let mut watchdog = Watchdog::new(
            Identity::generate(display_name),
            link.clone(),
            self.config.clone(),
        );
        watchdog
            .handle_event(Event::LocalAddressChanged(address.clone()))
            .await
            .map_err(|source| node_error(name, source))?;
        let id = watchdog.id();
        debug!(node = name, address = %address, "node added");

        self.by_address.insert(address.clone(), name.to_owned());
        self.nodes.insert(
            name.to_owned(),
            SimNode {
                address,
                watchdog,
                link,
            },
        );
        Ok(id)
    }

    /// Make `a` and `b` visible to each other. Takes effect at the next announce or scan.
    pub fn connect(&mut self, a: &str, b: &str) -> Result<(), MeshError> {
        let key = self.link_key(a, b)?;
        self.links.insert(key);
        Ok(())
    }

    pub fn disconnect(&mut self, a: &str, b: &str) -> Result<(), MeshError> {
        let key = self.link_key(a, b)?;
        self.links.remove(&key);
        Ok(())
    }

    fn link_key(&self, a: &str, b: &str) -> Result<(String, String), MeshError> {
        for name in [a, b] {
            if !self.nodes.contains_key(name) {
                return Err(MeshError::UnknownNode(name.to_owned()));
            }
        }
        if a == b {
            return Err(MeshError::SelfLink(a.to_owned()));
        }
        Ok(if a < b {
            (a.to_owned(), b.to_owned())
        } else {
            (b.to_owned(), a.to_owned())
        })
    }

    pub fn node(&self, name: &str) -> Option<&SimNode> {
        self.nodes.get(name)
    }

    pub fn handle(&self, name: &str) -> Result<WatchdogHandle, MeshError> {
        self.nodes
            .get(name)
            .map(|node| node.watchdog.handle())
            .ok_or_else(|| MeshError::UnknownNode(name.to_owned()))
    }

    pub fn id(&self, name: &str) -> Result<Identifier, MeshError> {
        self.nodes
            .get(name)
            .map(|node| node.watchdog.id())
            .ok_or_else(|| MeshError::UnknownNode(name.to_owned()))
    }

    pub fn phase(&self, name: &str) -> Option<Phase> {
        self.nodes.get(name).map(|node| node.watchdog.phase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Addresses of every node linked to `name`.
    pub fn neighbour_addresses(&self, name: &str) -> Vec<String> {
        self.links
            .iter()
            .filter_map(|(a, b)| {
                if a == name {
                    Some(b)
                } else if b == name {
                    Some(a)
                } else {
                    None
                }
            })
            .filter_map(|other| self.nodes.get(other))
            .map(|node| node.address.clone())
            .collect()
    }

    fn are_linked(&self, a: &str, b: &str) -> bool {
        match self.link_key(a, b) {
            Ok(key) => self.links.contains(&key),
            Err(_) => false,
        }
    }

    /// Queue `text` at `from` for the node named `to`. Returns the number of peer queues entered.
    pub fn send(&self, from: &str, to: &str, text: impl Into<Vec<u8>>) -> Result<usize, MeshError> {
        let target = self.id(to)?;
        Ok(self.handle(from)?.send(text, target))
    }

    /// Pop the oldest message `at` received from `from`.
    pub fn receive(&self, at: &str, from: &str) -> Result<Option<Vec<u8>>, MeshError> {
        let source = self.id(from)?;
        Ok(self.handle(at)?.try_receive(&source))
    }

    /// Deliver every node its current neighbour list.
    pub async fn announce(&mut self) -> Result<(), MeshError> {
        let names: Vec<String> = self.nodes.keys().cloned().collect();
        for name in names {
            self.deliver_peer_list(&name).await?;
        }
        Ok(())
    }

    async fn deliver_peer_list(&mut self, name: &str) -> Result<(), MeshError> {
        let peers = self.neighbour_addresses(name);
        self.deliver(name, Event::PeersChanged(peers)).await
    }

    async fn deliver(&mut self, name: &str, event: Event) -> Result<(), MeshError> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| MeshError::UnknownNode(name.to_owned()))?;
        node.watchdog
            .handle_event(event)
            .await
            .map_err(|source| node_error(name, source))
    }

    /// Pump platform events until nothing changes or `max_rounds` is reached.
    pub async fn run_until_idle(&mut self, max_rounds: usize) -> Result<RunStats, MeshError> {
        let mut stats = RunStats::default();
        while stats.rounds < max_rounds {
            stats.rounds += 1;
            if !self.round(&mut stats).await? {
                stats.settled = true;
                break;
            }
        }
        info!(
            rounds = stats.rounds,
            exchanges = stats.exchanges,
            invitations = stats.invitations,
            aborted = stats.aborted,
            settled = stats.settled,
            "mesh run finished"
        );
        Ok(stats)
    }

    /// One pass over every node. Returns whether anything happened.
    async fn round(&mut self, stats: &mut RunStats) -> Result<bool, MeshError> {
        let names: Vec<String> = self.nodes.keys().cloned().collect();
        let mut progress = false;

        for name in &names {
            let Some(node) = self.nodes.get_mut(name) else {
                continue;
            };
            let handled = node
                .watchdog
                .process_pending()
                .await
                .map_err(|source| node_error(name, source))?;
            progress |= handled > 0;
        }

        for name in &names {
            let scan = self
                .nodes
                .get(name)
                .is_some_and(|node| node.link.take_scan_request());
            if scan {
                self.deliver_peer_list(name).await?;
                progress = true;
            }
        }

        let mut waiting = Vec::new();
        for name in &names {
            let Some(address) = self.nodes.get(name).and_then(|node| node.link.requested()) else {
                continue;
            };
            let target = self
                .by_address
                .get(&address)
                .filter(|target| self.are_linked(name, target))
                .cloned();
            let Some(target) = target else {
                debug!(node = %name, address = %address, "connect to unreachable address failed");
                self.abort_request(name).await?;
                stats.aborted += 1;
                progress = true;
                continue;
            };

            let Some(peer) = self.nodes.get(&target) else {
                continue;
            };
            let own_address = self.nodes.get(name).map(|node| node.address.clone());
            if peer.link.requested() == own_address && own_address.is_some() {
                self.pair(name, &target).await?;
                stats.exchanges += 1;
                progress = true;
            } else if peer.watchdog.phase() == Phase::Docked {
                peer.link.cancel_request();
                if let Some(own_address) = own_address {
                    self.deliver(&target, Event::Invited(own_address)).await?;
                    stats.invitations += 1;
                    progress = true;
                }
            } else {
                waiting.push((name.clone(), target));
            }
        }

        // Every request waits on a busy node, so the requests form a cycle. The platform
        // lets one busy target accept, preferring a pair already in the same phase.
        if !progress {
            if let Some((name, target)) = self.cycle_breaker(&waiting) {
                debug!(node = %name, target = %target, "busy target accepts waiting request");
                self.pair(&name, &target).await?;
                stats.exchanges += 1;
                progress = true;
            }
        }
        Ok(progress)
    }

    fn cycle_breaker(&self, waiting: &[(String, String)]) -> Option<(String, String)> {
        waiting
            .iter()
            .find(|(name, target)| self.phase(name) == self.phase(target))
            .or_else(|| waiting.first())
            .cloned()
    }

    /// Form a group between `a` (owner) and `b` (client) and run both exchanges.
    async fn pair(&mut self, a: &str, b: &str) -> Result<(), MeshError> {
        let mut first = self
            .nodes
            .remove(a)
            .ok_or_else(|| MeshError::UnknownNode(a.to_owned()))?;
        let Some(mut second) = self.nodes.remove(b) else {
            self.nodes.insert(a.to_owned(), first);
            return Err(MeshError::UnknownNode(b.to_owned()));
        };
        debug!(owner = a, client = b, "group formed");

        let (ours, theirs) = duplex(CHANNEL_CAPACITY);
        first.link.attach(ours);
        second.link.attach(theirs);
        let (owner_result, client_result) = tokio::join!(
            first.watchdog.handle_event(Event::ConnectionEstablished(ConnectionInfo::owner(
                OWNER_ADDRESS
            ))),
            second.watchdog.handle_event(Event::ConnectionEstablished(ConnectionInfo::client(
                OWNER_ADDRESS
            ))),
        );
        self.nodes.insert(a.to_owned(), first);
        self.nodes.insert(b.to_owned(), second);

        owner_result.map_err(|source| node_error(a, source))?;
        client_result.map_err(|source| node_error(b, source))
    }

    /// Report a connection that never got a usable channel.
    async fn abort_request(&mut self, name: &str) -> Result<(), MeshError> {
        let Some(node) = self.nodes.get(name) else {
            return Err(MeshError::UnknownNode(name.to_owned()));
        };
        node.link.cancel_request();
        if node.watchdog.phase() == Phase::Docked {
            return Ok(());
        }
        self.deliver(name, Event::ConnectionEstablished(ConnectionInfo::client(OWNER_ADDRESS)))
            .await
    }
}

fn node_error(name: &str, source: WatchdogError) -> MeshError {
    MeshError::Node {
        name: name.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_and_unknown_nodes_are_rejected() {
        let mut mesh = Mesh::new(WatchdogConfig::default());
        mesh.add_node("a", "Alice").await.unwrap();
        assert!(matches!(
            mesh.add_node("a", "Again").await,
            Err(MeshError::DuplicateNode(_))
        ));
        assert!(matches!(mesh.connect("a", "zz"), Err(MeshError::UnknownNode(_))));
        assert!(matches!(mesh.connect("a", "a"), Err(MeshError::SelfLink(_))));
    }

    #[tokio::test]
    async fn neighbours_are_symmetric() {
        let mut mesh = Mesh::new(WatchdogConfig::default());
        mesh.add_node("a", "A").await.unwrap();
        mesh.add_node("b", "B").await.unwrap();
        mesh.add_node("c", "C").await.unwrap();
        mesh.connect("b", "a").unwrap();

        let a = mesh.node("a").unwrap().address().to_owned();
        let b = mesh.node("b").unwrap().address().to_owned();
        assert_eq!(mesh.neighbour_addresses("a"), vec![b]);
        assert_eq!(mesh.neighbour_addresses("b"), vec![a]);
        assert!(mesh.neighbour_addresses("c").is_empty());

        mesh.disconnect("a", "b").unwrap();
        assert!(mesh.neighbour_addresses("a").is_empty());
    }

    #[tokio::test]
    async fn nodes_know_their_address() {
        let mut mesh = Mesh::new(WatchdogConfig::default());
        mesh.add_node("a", "A").await.unwrap();
        let node = mesh.node("a").unwrap();
        assert_eq!(node.watchdog().local_address(), node.address());
        assert_eq!(node.watchdog().identity().name(), "A");
    }

    #[tokio::test]
    async fn idle_mesh_settles_immediately() {
        let mut mesh = Mesh::new(WatchdogConfig::default());
        mesh.add_node("a", "A").await.unwrap();
        let stats = mesh.run_until_idle(10).await.unwrap();
        assert!(stats.settled);
        assert_eq!(stats.rounds, 1);
        assert_eq!(stats.exchanges, 0);
    }
}
