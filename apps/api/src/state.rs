use std::sync::Arc;

use crate::config::Config;
use crate::session::SessionStore;
use crate::wine::PageTextExtractor;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    /// Pluggable page text extractor. Default: PdfTextExtractor.
    pub extractor: Arc<dyn PageTextExtractor>,
}

impl AppState {
    pub fn new(config: Config, extractor: Arc<dyn PageTextExtractor>) -> Self {
        Self {
            sessions: SessionStore::new(config.session_ttl),
            config,
            extractor,
        }
    }
}
