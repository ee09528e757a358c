//! Registry of connectors keyed by model name.

use std::collections::HashMap;
use std::sync::Arc;

use fedq_planner::{CapabilitiesFinder, SourceCapabilities};
use parking_lot::RwLock;
use tracing::debug;

use crate::connector::Connector;
use crate::error::{ExecError, Result};

#[derive(Default)]
pub struct DataManager {
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl DataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `model` to `connector`, replacing any earlier binding.
    pub fn register(&self, model: &str, connector: Arc<dyn Connector>) {
        debug!(model, connector = connector.name(), "connector registered");
        self.connectors
            .write()
            .insert(model.to_ascii_lowercase(), connector);
    }

    pub fn connector(&self, model: &str) -> Result<Arc<dyn Connector>> {
        self.connectors
            .read()
            .get(&model.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ExecError::source_failure(model, "no connector registered"))
    }

    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connectors.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl CapabilitiesFinder for DataManager {
    /// Models without a connector can take no push-down at all.
    fn find_capabilities(&self, model: &str) -> SourceCapabilities {
        self.connectors
            .read()
            .get(&model.to_ascii_lowercase())
            .map(|c| c.capabilities())
            .unwrap_or_else(SourceCapabilities::none)
    }
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("models", &self.models())
            .finish()
    }
}
