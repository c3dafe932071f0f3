//! Shared state for webhook handlers

use crate::relay::Relay;
use std::sync::Arc;

/// State handed to every route handler
#[derive(Clone)]
pub struct AppState {
    /// The relay pipeline
    pub relay: Arc<Relay>,
}

impl AppState {
    /// Wrap the relay for handler injection
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }
}
