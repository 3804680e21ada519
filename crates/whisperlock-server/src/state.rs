use std::sync::Arc;
use tokio::sync::Mutex;

use crate::keys::PushKeys;
use crate::push::PushSender;
use crate::store::ServerStore;

/// State shared across handlers. The store mutex serialises every
/// read-modify-write of the JSON collections.
pub struct AppState {
    pub store: Mutex<ServerStore>,
    pub keys: Arc<PushKeys>,
    pub push: Arc<dyn PushSender>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: ServerStore, keys: Arc<PushKeys>, push: Arc<dyn PushSender>) -> SharedState {
        Arc::new(Self {
            store: Mutex::new(store),
            keys,
            push,
        })
    }
}
