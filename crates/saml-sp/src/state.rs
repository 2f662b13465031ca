use crate::config::SamlConfig;
use crate::engine::{ProtocolEngine, SamaelEngine};
use crate::session::SessionStore;
use std::sync::Arc;

/// Shared state behind the middleware: the immutable configuration, the
/// per-browser session store and the protocol engine.
pub struct SamlState {
    pub config: Arc<SamlConfig>,
    pub sessions: SessionStore,
    pub engine: Arc<dyn ProtocolEngine>,
}

impl SamlState {
    pub fn new(config: SamlConfig) -> Self {
        let config = Arc::new(config);
        Self {
            engine: Arc::new(SamaelEngine::new(config.clone())),
            sessions: SessionStore::new(),
            config,
        }
    }

    /// Substitutes the protocol engine, mainly for tests.
    pub fn with_engine(config: SamlConfig, engine: Arc<dyn ProtocolEngine>) -> Self {
        Self {
            config: Arc::new(config),
            sessions: SessionStore::new(),
            engine,
        }
    }
}
