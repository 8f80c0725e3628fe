//! HTTP API
//!
//! The transport adapter posts normalized inbound events here, and the
//! monitoring dashboard reads its JSON from here. No HTML is served;
//! the dashboard front-end lives elsewhere.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::config::ChannelPolicyStore;
use crate::ingest::EventRouter;
use crate::store::Store;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub router: EventRouter,
    pub store: Store,
    pub channels: Arc<ChannelPolicyStore>,
}

impl AppState {
    pub fn new(router: EventRouter, store: Store, channels: Arc<ChannelPolicyStore>) -> Self {
        Self {
            router,
            store,
            channels,
        }
    }
}
