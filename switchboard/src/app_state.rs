//! Injected shared state for the HTTP layer
//!
//! Holds the store actor reference and the processor. Everything here is
//! per-instance, so independent engines can coexist in one process.

use ractor::ActorRef;
use std::sync::Arc;

use crate::actors::task_store::TaskStoreMsg;
use crate::processor::TaskProcessor;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: ActorRef<TaskStoreMsg>,
    processor: TaskProcessor,
}

impl AppState {
    pub fn new(store: ActorRef<TaskStoreMsg>, processor: TaskProcessor) -> Self {
        Self {
            inner: Arc::new(AppStateInner { store, processor }),
        }
    }

    pub fn store(&self) -> &ActorRef<TaskStoreMsg> {
        &self.inner.store
    }

    pub fn processor(&self) -> &TaskProcessor {
        &self.inner.processor
    }
}
