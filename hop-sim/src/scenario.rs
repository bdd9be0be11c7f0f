//! Run a configured mesh: discovery first, then the configured messages.

use tracing::{info, warn};

use crate::config::Config;
use crate::mesh::{Mesh, MeshError, RunStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: String,
    pub to: String,
    pub text: String,
    /// Number of peer queues the message entered at the sender.
    pub queued: usize,
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub discovery: RunStats,
    pub delivery: RunStats,
    pub deliveries: Vec<Delivery>,
}

impl ScenarioReport {
    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.delivered).count()
    }

    pub fn all_delivered(&self) -> bool {
        self.deliveries.iter().all(|d| d.delivered)
    }
}

pub struct Scenario {
    config: Config,
}

impl Scenario {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build the mesh described by the config.
    pub async fn build(&self) -> Result<Mesh, MeshError> {
        let mut mesh = Mesh::new(self.config.watchdog());
        for node in &self.config.nodes {
            let display = node.display_name.as_deref().unwrap_or(&node.name);
            mesh.add_node(&node.name, display).await?;
        }
        for [a, b] in &self.config.links {
            mesh.connect(a, b)?;
        }
        Ok(mesh)
    }

    pub async fn run(&self) -> Result<ScenarioReport, MeshError> {
        let mut mesh = self.build().await?;
        mesh.announce().await?;
        let discovery = mesh.run_until_idle(self.config.max_rounds).await?;
        if !discovery.settled {
            warn!(rounds = discovery.rounds, "discovery did not settle");
        }

        let mut deliveries = Vec::with_capacity(self.config.messages.len());
        for m in &self.config.messages {
            let queued = mesh.send(&m.from, &m.to, m.text.as_bytes())?;
            deliveries.push(Delivery {
                from: m.from.clone(),
                to: m.to.clone(),
                text: m.text.clone(),
                queued,
                delivered: false,
            });
        }
        let delivery = mesh.run_until_idle(self.config.max_rounds).await?;

        for d in &mut deliveries {
            d.delivered = mesh
                .receive(&d.to, &d.from)?
                .is_some_and(|payload| payload == d.text.as_bytes());
            info!(from = %d.from, to = %d.to, delivered = d.delivered, "message outcome");
        }
        Ok(ScenarioReport {
            discovery,
            delivery,
            deliveries,
        })
    }
}
