//! Application state shared across handlers

use std::sync::Arc;

use crate::serving::{PredictionService, RequestLogger};

pub struct AppState {
    pub service: Arc<PredictionService>,
    /// Absent when request logging is switched off
    pub logger: Option<RequestLogger>,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>, logger: Option<RequestLogger>) -> Self {
        Self { service, logger }
    }
}
