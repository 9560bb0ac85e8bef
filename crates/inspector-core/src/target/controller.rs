use std::sync::Weak;

use tracing::debug;

use super::RuntimeTarget;

/// The narrow slice of a [`RuntimeTarget`] handed to its trusted owners and
/// to the agents it creates.
#[derive(Clone)]
pub struct RuntimeTargetController {
    target: Weak<RuntimeTarget>,
}

impl RuntimeTargetController {
    pub(crate) fn new(target: Weak<RuntimeTarget>) -> Self {
        Self { target }
    }

    /// Exposes `binding_name` as a global function in the target's script
    /// runtime. Failures inside the runtime are swallowed.
    pub fn install_binding_handler(&self, binding_name: &str) {
        match self.target.upgrade() {
            Some(target) => target.install_binding_handler(binding_name),
            None => debug!(
                binding = binding_name,
                "Runtime target gone, ignoring binding installation"
            ),
        }
    }
}
