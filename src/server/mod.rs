pub mod handlers;
pub mod io;
pub mod listener;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use crate::config::Config;
use crate::payload::PayloadStore;

/// Shared application state injected into all handlers via axum's State extractor.
///
/// Everything in here is read-only after boot, so handlers never lock.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PayloadStore>,
    pub config: Arc<Config>,
}
