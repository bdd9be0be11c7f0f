//! Delay-tolerant store-and-forward relay for small messages over a local radio mesh.
//! The host supplies a [`Link`] and reports platform events; the [`Watchdog`] does the rest.

pub mod identity;
pub mod link;
pub mod packet;
pub mod router;
pub mod watchdog;
pub mod wire;

pub use identity::{
    Identifier, IdentifierError, Identity, IdentityStore, MemoryIdentityStore, Profile, StoreError,
};
pub use link::{ConnectionInfo, Link, LinkError, TcpChannels};
pub use packet::{Packet, PacketError};
pub use router::{Router, DEFAULT_TTL};
pub use watchdog::{Event, Phase, Service, Watchdog, WatchdogConfig, WatchdogError, WatchdogHandle};
pub use wire::{Wire, WireError, DEFAULT_PORT, MAGIC};
