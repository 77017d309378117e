use std::sync::Arc;

use crate::rag::RagEngine;

/// Estado compartido por los handlers. El motor se construye una vez en el
/// arranque y se comparte por referencia contada.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RagEngine>,
}

impl AppState {
    pub fn new(engine: RagEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
