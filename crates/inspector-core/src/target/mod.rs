mod controller;
mod runtime_target;
mod weak_list;

pub use controller::RuntimeTargetController;
pub use runtime_target::{INVALID_BINDING_ARGUMENTS, RuntimeTarget, RuntimeTargetDelegate};
