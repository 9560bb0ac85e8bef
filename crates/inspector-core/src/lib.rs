//! Bridge between a live script execution context and the debugging
//! sessions attached to it.

pub mod agent;
pub mod cdp;
pub mod config;
pub mod description;
pub mod error;
pub mod executor;
pub mod script;
pub mod session;
pub mod target;
pub mod test_utils;

pub use agent::{RuntimeAgent, RuntimeAgentDelegate};
pub use description::{ExecutionContextDescription, ExecutionContextSelector};
pub use error::{Error, Result};
pub use executor::{RuntimeExecutor, VoidExecutor};
pub use session::{InspectorSession, SessionState, SharedSessionState};
pub use target::{RuntimeTarget, RuntimeTargetController, RuntimeTargetDelegate};
