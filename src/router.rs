use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::handlers::storable::{create_handler, get_handler, list_handler, update_data_handler};
use crate::service::StorableService;

#[derive(Clone)]
pub struct EdaPartsState {
    pub service: Arc<StorableService>,
    /// Where multipart uploads are spooled before the store worker takes them.
    pub upload_dir: PathBuf,
}

impl EdaPartsState {
    pub fn new(service: StorableService, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            service: Arc::new(service),
            upload_dir: upload_dir.into(),
        }
    }
}

pub fn edaparts_router(state: EdaPartsState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/{kind}", post(create_handler).get(list_handler))
        .route("/{kind}/{id}", get(get_handler))
        .route("/{kind}/{id}/data", put(update_data_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
