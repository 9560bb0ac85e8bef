use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::cdp::{ErrorCode, FrontendChannel, Request, json_error, json_notification};
use crate::description::{ExecutionContextDescription, ExecutionContextSelector};
use crate::session::SharedSessionState;
use crate::target::RuntimeTargetController;

/// Engine-specific half of a runtime agent, produced by the target's
/// delegate for each new session.
pub trait RuntimeAgentDelegate: Send + Sync {
    /// Returns true if the request was fully handled (and answered).
    fn handle_request(&self, _request: &Request) -> bool {
        false
    }
}

/// One attached debugging session's view of a runtime target.
///
/// Owned by the session. The target only keeps a weak registration so it
/// can deliver notifications, and every method here runs on the control
/// domain.
pub struct RuntimeAgent {
    frontend_channel: FrontendChannel,
    target_controller: RuntimeTargetController,
    execution_context_description: ExecutionContextDescription,
    session_state: SharedSessionState,
    delegate: Box<dyn RuntimeAgentDelegate>,
}

impl RuntimeAgent {
    pub fn new(
        frontend_channel: FrontendChannel,
        target_controller: RuntimeTargetController,
        execution_context_description: ExecutionContextDescription,
        session_state: SharedSessionState,
        delegate: Box<dyn RuntimeAgentDelegate>,
    ) -> Self {
        let agent = Self {
            frontend_channel,
            target_controller,
            execution_context_description,
            session_state,
            delegate,
        };
        agent.restore_session_state();
        agent
    }

    pub fn execution_context_description(&self) -> &ExecutionContextDescription {
        &self.execution_context_description
    }

    /// Handles the Runtime domain requests this agent cares about. Returns
    /// false when the request still needs a response from the session.
    pub fn handle_request(&self, request: &Request) -> bool {
        if self.delegate.handle_request(request) {
            return true;
        }

        match request.method.as_str() {
            "Runtime.enable" => {
                self.session_state.lock().is_runtime_domain_enabled = true;
                self.notify_execution_context_created();
                false
            }
            "Runtime.disable" => {
                self.session_state.lock().is_runtime_domain_enabled = false;
                false
            }
            "Runtime.addBinding" => self.add_binding(request),
            "Runtime.removeBinding" => match binding_name_param(request) {
                Ok(name) => {
                    // The global stays installed; only this session stops listening.
                    self.session_state.lock().unsubscribe_binding(name);
                    false
                }
                Err(message) => {
                    self.send_invalid_params(request.id, &message);
                    true
                }
            },
            _ => false,
        }
    }

    /// Delivers a script-side binding call to the frontend if this session
    /// subscribed to the binding for this execution context.
    pub fn notify_binding_called(&self, binding_name: &str, payload: &str) {
        let subscribed = self
            .session_state
            .lock()
            .subscribed_bindings
            .get(binding_name)
            .is_some_and(|selectors| selectors.matches_any(&self.execution_context_description));

        if !subscribed {
            trace!(binding = binding_name, "Session not subscribed to binding");
            return;
        }

        self.frontend_channel.send(json_notification(
            "Runtime.bindingCalled",
            json!({
                "executionContextId": self.execution_context_description.id,
                "name": binding_name,
                "payload": payload,
            }),
        ));
    }

    fn add_binding(&self, request: &Request) -> bool {
        let (name, selector) = match parse_add_binding(request) {
            Ok(parsed) => parsed,
            Err(message) => {
                self.send_invalid_params(request.id, &message);
                return true;
            }
        };

        if selector.matches(&self.execution_context_description) {
            self.target_controller.install_binding_handler(name);
        }
        self.session_state.lock().subscribe_binding(name, selector);
        false
    }

    fn restore_session_state(&self) {
        let state = self.session_state.snapshot();
        for (name, selectors) in &state.subscribed_bindings {
            if selectors.matches_any(&self.execution_context_description) {
                debug!(binding = %name, "Reinstalling binding for new runtime agent");
                self.target_controller.install_binding_handler(name);
            }
        }
        if state.is_runtime_domain_enabled {
            self.notify_execution_context_created();
        }
    }

    fn notify_execution_context_created(&self) {
        self.frontend_channel.send(json_notification(
            "Runtime.executionContextCreated",
            json!({ "context": self.execution_context_description.to_protocol_json() }),
        ));
    }

    fn send_invalid_params(&self, id: i64, message: &str) {
        self.frontend_channel
            .send(json_error(Some(id), ErrorCode::InvalidParams, message));
    }
}

pub(crate) fn binding_name_param(request: &Request) -> Result<&str, String> {
    request
        .param("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "name must be a string".to_string())
}

/// Parses `Runtime.addBinding` params into a binding name and the contexts
/// it applies to.
pub(crate) fn parse_add_binding(
    request: &Request,
) -> Result<(&str, ExecutionContextSelector), String> {
    let name = binding_name_param(request)?;
    let selector = match (
        request.param("executionContextId"),
        request.param("executionContextName"),
    ) {
        (Some(_), Some(_)) => {
            return Err(
                "executionContextName is mutually exclusive with executionContextId".to_string(),
            );
        }
        (Some(id), None) => id
            .as_i64()
            .and_then(|id| i32::try_from(id).ok())
            .map(ExecutionContextSelector::ById)
            .ok_or_else(|| "executionContextId must be an integer".to_string())?,
        (None, Some(context_name)) => context_name
            .as_str()
            .map(|n| ExecutionContextSelector::ByName(n.to_string()))
            .ok_or_else(|| "executionContextName must be a string".to_string())?,
        (None, None) => ExecutionContextSelector::All,
    };
    Ok((name, selector))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_binding(params: Value) -> Request {
        Request::new(1, "Runtime.addBinding", params)
    }

    #[test]
    fn add_binding_defaults_to_all_contexts() {
        let request = add_binding(json!({"name": "cb"}));
        assert_eq!(
            parse_add_binding(&request).unwrap(),
            ("cb", ExecutionContextSelector::All)
        );
    }

    #[test]
    fn add_binding_accepts_one_selector() {
        let request = add_binding(json!({"name": "cb", "executionContextId": 4}));
        assert_eq!(
            parse_add_binding(&request).unwrap().1,
            ExecutionContextSelector::ById(4)
        );

        let request = add_binding(json!({"name": "cb", "executionContextName": "main"}));
        assert_eq!(
            parse_add_binding(&request).unwrap().1,
            ExecutionContextSelector::ByName("main".to_string())
        );
    }

    #[test]
    fn add_binding_rejects_bad_params() {
        let both = add_binding(json!({
            "name": "cb",
            "executionContextId": 1,
            "executionContextName": "main",
        }));
        assert!(parse_add_binding(&both).unwrap_err().contains("mutually exclusive"));

        assert!(parse_add_binding(&add_binding(json!({}))).is_err());
        assert!(parse_add_binding(&add_binding(json!({"name": 5}))).is_err());
        assert!(
            parse_add_binding(&add_binding(
                json!({"name": "cb", "executionContextId": "one"})
            ))
            .is_err()
        );
    }
}
