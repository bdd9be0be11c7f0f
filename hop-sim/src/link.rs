//! Simulated platform link: records what the watchdog asks for and hands out the
//! in-memory channel the mesh attaches when a pairing happens.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use hop_core::{ConnectionInfo, Link, LinkError};
use parking_lot::Mutex;
use tokio::io::DuplexStream;

#[derive(Default)]
struct LinkState {
    requested: Option<String>,
    channel: Option<DuplexStream>,
    scan_requested: bool,
    busy_removals: u32,
    removals: u32,
    connects: u32,
}

/// One node's radio. Clones share state, so the mesh keeps a clone next to the watchdog.
#[derive(Clone, Default)]
pub struct SimLink {
    state: Arc<Mutex<LinkState>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the outstanding connect request, if any.
    pub fn requested(&self) -> Option<String> {
        self.state.lock().requested.clone()
    }

    /// Hand the node its end of a freshly formed channel. Clears the outstanding request.
    pub fn attach(&self, channel: DuplexStream) {
        let mut state = self.state.lock();
        state.requested = None;
        state.channel = Some(channel);
    }

    /// Drop the outstanding request without forming a group.
    pub fn cancel_request(&self) {
        self.state.lock().requested = None;
    }

    /// True once per scan the node asked for.
    pub fn take_scan_request(&self) -> bool {
        std::mem::take(&mut self.state.lock().scan_requested)
    }

    /// Make the next `n` group removals report that the radio is busy.
    pub fn set_busy(&self, n: u32) {
        self.state.lock().busy_removals = n;
    }

    pub fn removals(&self) -> u32 {
        self.state.lock().removals
    }

    pub fn connects(&self) -> u32 {
        self.state.lock().connects
    }
}

#[async_trait]
impl Link for SimLink {
    type Channel = DuplexStream;

    async fn remove_group(&self) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.removals += 1;
        if state.busy_removals > 0 {
            state.busy_removals -= 1;
            return Err(LinkError::Busy);
        }
        state.channel = None;
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.connects += 1;
        state.requested = Some(address.to_owned());
        Ok(())
    }

    async fn open_channel(&self, _info: &ConnectionInfo) -> io::Result<DuplexStream> {
        self.state
            .lock()
            .channel
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no group formed"))
    }

    async fn discover_peers(&self) -> Result<(), LinkError> {
        self.state.lock().scan_requested = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn connect_records_request_and_attach_clears_it() {
        let link = SimLink::new();
        link.connect("02:00:00:00:00:01").await.unwrap();
        assert_eq!(link.requested().as_deref(), Some("02:00:00:00:00:01"));

        let (ours, _theirs) = tokio::io::duplex(1024);
        link.attach(ours);
        assert_eq!(link.requested(), None);
        let info = ConnectionInfo::client(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(link.open_channel(&info).await.is_ok());
        assert!(link.open_channel(&info).await.is_err());
    }

    #[tokio::test]
    async fn busy_removals_count_down() {
        let link = SimLink::new();
        link.set_busy(1);
        assert_eq!(link.remove_group().await, Err(LinkError::Busy));
        assert_eq!(link.remove_group().await, Ok(()));
        assert_eq!(link.removals(), 2);
    }

    #[tokio::test]
    async fn scan_request_is_taken_once() {
        let link = SimLink::new();
        assert!(!link.take_scan_request());
        link.discover_peers().await.unwrap();
        assert!(link.take_scan_request());
        assert!(!link.take_scan_request());
    }
}
