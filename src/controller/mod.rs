pub mod poller;

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::waterscope::{MeterSource, WaterscopeClient};

pub use poller::{HealthState, HealthStatus, MeterPoller, PollError, PollSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub account: String,
    pub poller: Arc<MeterPoller>,
}

impl AppState {
    pub fn new(cfg: Config) -> Result<Self> {
        let client = WaterscopeClient::new(cfg.waterscope.clone())?;
        Ok(Self::with_source(cfg, Arc::new(client)))
    }

    /// State around any [`MeterSource`]; lets tests swap the portal out.
    pub fn with_source(cfg: Config, source: Arc<dyn MeterSource>) -> Self {
        let poller = Arc::new(MeterPoller::new(source, &cfg.poller));
        Self {
            account: cfg.waterscope.account().to_string(),
            cfg,
            poller,
        }
    }
}

pub fn spawn_poller(state: &AppState) -> JoinHandle<()> {
    let poller = state.poller.clone();
    let every = state.cfg.poller.interval_seconds;
    info!(interval_seconds = every, "starting meter poller");
    tokio::spawn(poller.run(every))
}
