use std::sync::Arc;

use gallery_core::{GalleryAdminView, GalleryService, ImageHost};
use tokio::sync::Mutex;

/// One admin session per process: admin actions queue on `admin`, while the
/// public listing goes straight to `service`.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: GalleryService,
    pub(crate) admin: Arc<Mutex<GalleryAdminView>>,
}

impl AppState {
    pub(crate) fn new(service: GalleryService, image_host: Arc<dyn ImageHost>) -> Self {
        let admin = GalleryAdminView::new(service.clone(), image_host);
        Self {
            service,
            admin: Arc::new(Mutex::new(admin)),
        }
    }
}
