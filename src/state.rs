use std::sync::Arc;

use crate::registry::ModelRegistry;

/// Shared handles for request handlers. The registry is populated once at
/// startup and never mutated afterwards, so it is shared without a lock.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
}
