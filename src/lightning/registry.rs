use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::NodeConfig;
use crate::lightning::lnd::NodeAdapter;

/// Names of the currently reachable nodes.
///
/// Readers take a whole snapshot; a sweep builds the next set off to the side and swaps it in,
/// so a reader never sees a half-refreshed set.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    live: RwLock<Arc<BTreeSet<String>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<BTreeSet<String>> {
        self.live.read().expect("registry lock poisoned").clone()
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.snapshot().contains(name)
    }

    pub fn publish(&self, live: BTreeSet<String>) {
        *self.live.write().expect("registry lock poisoned") = Arc::new(live);
    }

    /// Connects to every configured node and calls `GetInfo`; publishes the names that answered.
    pub async fn sweep(
        &self,
        nodes: &BTreeMap<String, NodeConfig>,
        timeout: Duration,
    ) -> Arc<BTreeSet<String>> {
        let mut live = BTreeSet::new();
        for (name, cfg) in nodes {
            let probe = async {
                let adapter = NodeAdapter::connect(cfg, timeout).await?;
                adapter.get_info().await
            };
            match probe.await {
                Ok(info) => {
                    tracing::debug!(node = %name, block_height = info.block_height, "node alive");
                    live.insert(name.clone());
                }
                Err(e) => tracing::warn!(node = %name, error = %e, "node is not alive"),
            }
        }

        tracing::info!(live = live.len(), configured = nodes.len(), "node health sweep done");
        self.publish(live);
        self.snapshot()
    }
}
