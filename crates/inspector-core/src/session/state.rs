use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::description::{ExecutionContextSelector, ExecutionContextSelectorSet};

/// Per-session state that outlives any single runtime agent, so a new agent
/// for a new execution context can pick up where the last one left off.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub is_runtime_domain_enabled: bool,
    /// Bindings the frontend asked for, keyed by binding name.
    pub subscribed_bindings: HashMap<String, ExecutionContextSelectorSet>,
}

impl SessionState {
    pub fn subscribe_binding(&mut self, name: &str, selector: ExecutionContextSelector) {
        self.subscribed_bindings
            .entry(name.to_string())
            .or_default()
            .insert(selector);
    }

    pub fn unsubscribe_binding(&mut self, name: &str) -> bool {
        self.subscribed_bindings.remove(name).is_some()
    }
}

/// Session state shared between a session and its agents. Only ever locked
/// on the control domain.
#[derive(Debug, Clone, Default)]
pub struct SharedSessionState {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedSessionState {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }
}
