use std::sync::Arc;

use crate::archiver::Submitter;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub submitter: Submitter,
}

impl AppState {
    pub fn new(config: Config, submitter: Submitter) -> Self {
        Self {
            config: Arc::new(config),
            submitter,
        }
    }

    pub fn max_body_bytes(&self) -> u64 {
        self.config.server.max_body_bytes.as_u64()
    }
}
