pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod maintenance;
pub mod media;
pub mod web;

pub mod state {
    use crate::{
        config::ConfigManager,
        media::{MediaEvent, MediaManager},
    };
    use std::sync::Arc;
    use tokio::sync::broadcast;

    #[derive(Clone)]
    pub struct AppState {
        pub config: Arc<ConfigManager>,
        pub media_manager: Arc<MediaManager>,
        /// Scan requests, consumed by `media::manager::spawn_event_listener`
        pub media_events: broadcast::Sender<MediaEvent>,
    }
}
