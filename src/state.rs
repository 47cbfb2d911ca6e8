use std::sync::Arc;

use crate::services::intake::IntakeUploader;

#[derive(Clone)]
pub struct AppState {
    pub uploader: Arc<IntakeUploader>,
}

impl AppState {
    pub fn new(uploader: IntakeUploader) -> Self {
        Self {
            uploader: Arc::new(uploader),
        }
    }
}
