//! Simulated radio mesh for the hop relay: a platform link over in-memory pipes,
//! a pump that plays the radio stack, and a TOML-configured scenario runner.

pub mod config;
pub mod link;
pub mod mesh;
pub mod scenario;

pub use config::Config;
pub use link::SimLink;
pub use mesh::{Mesh, MeshError, RunStats, SimNode};
pub use scenario::{Delivery, Scenario, ScenarioReport};
