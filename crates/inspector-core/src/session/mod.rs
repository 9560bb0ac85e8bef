mod inspector_session;
mod state;

pub use inspector_session::InspectorSession;
pub use state::{SessionState, SharedSessionState};
