use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::agent::{RuntimeAgent, binding_name_param, parse_add_binding};
use crate::cdp::{ErrorCode, FrontendChannel, Request, json_error, json_result};
use crate::session::SharedSessionState;
use crate::target::RuntimeTarget;

/// Methods whose side effects the agent applies but whose response the
/// session owes the frontend.
const ACKNOWLEDGED_METHODS: &[&str] = &[
    "Runtime.enable",
    "Runtime.disable",
    "Runtime.addBinding",
    "Runtime.removeBinding",
];

/// One frontend connection.
///
/// Owns its runtime agent and therefore decides when that agent goes away.
/// Lives on the control domain.
pub struct InspectorSession {
    frontend_channel: FrontendChannel,
    session_state: SharedSessionState,
    runtime_agent: Option<Arc<RuntimeAgent>>,
}

impl InspectorSession {
    pub fn new(frontend_channel: FrontendChannel) -> Self {
        Self {
            frontend_channel,
            session_state: SharedSessionState::default(),
            runtime_agent: None,
        }
    }

    pub fn session_state(&self) -> &SharedSessionState {
        &self.session_state
    }

    pub fn is_attached(&self) -> bool {
        self.runtime_agent.is_some()
    }

    /// Attaches to `target`, replacing any previously attached agent.
    pub fn attach_runtime(&mut self, target: &RuntimeTarget) {
        let agent =
            target.create_agent(self.frontend_channel.clone(), self.session_state.clone());
        if self.runtime_agent.replace(agent).is_some() {
            debug!("Replaced previously attached runtime agent");
        }
    }

    /// Drops the runtime agent. Must happen before the target is dropped.
    pub fn detach_runtime(&mut self) -> bool {
        self.runtime_agent.take().is_some()
    }

    pub fn dispatch(&self, message: &str) {
        let request = match Request::parse(message) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "Rejecting malformed protocol message");
                self.frontend_channel
                    .send(json_error(None, error.code(), error.to_string()));
                return;
            }
        };

        match &self.runtime_agent {
            Some(agent) => {
                if agent.handle_request(&request) {
                    return;
                }
            }
            None => {
                if let Err(message) = self.apply_detached(&request) {
                    self.frontend_channel.send(json_error(
                        Some(request.id),
                        ErrorCode::InvalidParams,
                        message,
                    ));
                    return;
                }
            }
        }

        if ACKNOWLEDGED_METHODS.contains(&request.method.as_str()) {
            self.frontend_channel
                .send(json_result(request.id, json!({})));
        } else {
            self.frontend_channel.send(json_error(
                Some(request.id),
                ErrorCode::MethodNotFound,
                format!("{} not implemented yet", request.method),
            ));
        }
    }

    /// Records Runtime domain state while no runtime is attached so the next
    /// agent starts from it.
    fn apply_detached(&self, request: &Request) -> Result<(), String> {
        match request.method.as_str() {
            "Runtime.enable" => self.session_state.lock().is_runtime_domain_enabled = true,
            "Runtime.disable" => self.session_state.lock().is_runtime_domain_enabled = false,
            "Runtime.addBinding" => {
                let (name, selector) = parse_add_binding(request)?;
                self.session_state.lock().subscribe_binding(name, selector);
            }
            "Runtime.removeBinding" => {
                let name = binding_name_param(request)?;
                self.session_state.lock().unsubscribe_binding(name);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::description::ExecutionContextDescription;
    use crate::script::ScriptValue;
    use crate::test_utils::{
        ManualDomains, NoopTargetDelegate, RecordingChannel, RecordingTargetDelegate,
    };

    fn create_target(domains: &ManualDomains) -> Arc<RuntimeTarget> {
        RuntimeTarget::create(
            ExecutionContextDescription::new(1, "script", "main"),
            Arc::new(NoopTargetDelegate),
            domains.runtime_executor(),
            domains.void_executor(),
        )
    }

    fn responses(frontend: &RecordingChannel) -> Vec<Value> {
        frontend
            .json_messages()
            .into_iter()
            .filter(|message| message.get("id").is_some())
            .collect()
    }

    #[test]
    fn acknowledges_runtime_requests_and_rejects_unknown() {
        let domains = ManualDomains::new();
        let target = create_target(&domains);
        let frontend = RecordingChannel::new();
        let mut session = InspectorSession::new(frontend.channel());
        session.attach_runtime(&target);

        session.dispatch(r#"{"id":1,"method":"Runtime.enable"}"#);
        session.dispatch(r#"{"id":2,"method":"Debugger.pause"}"#);

        let responses = responses(&frontend);
        assert_eq!(responses[0], json!({"id": 1, "result": {}}));
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["error"]["code"], -32601);
        assert_eq!(
            frontend.notifications("Runtime.executionContextCreated").len(),
            1
        );
        session.detach_runtime();
    }

    #[test]
    fn malformed_message_gets_parse_error() {
        let frontend = RecordingChannel::new();
        let session = InspectorSession::new(frontend.channel());

        session.dispatch("{not json");

        let messages = frontend.json_messages();
        assert_eq!(messages[0]["id"], Value::Null);
        assert_eq!(messages[0]["error"]["code"], -32700);
    }

    #[test]
    fn end_to_end_binding_through_session() {
        let mut domains = ManualDomains::new();
        let target = create_target(&domains);
        let frontend = RecordingChannel::new();
        let mut session = InspectorSession::new(frontend.channel());
        session.attach_runtime(&target);

        session.dispatch(
            r#"{"id":1,"method":"Runtime.addBinding","params":{"name":"sendMessage"}}"#,
        );
        domains.run_until_idle();
        domains.call("sendMessage", &["hello".into()]).unwrap();
        domains.run_until_idle();

        assert_eq!(
            frontend.notifications("Runtime.bindingCalled"),
            vec![json!({"executionContextId": 1, "name": "sendMessage", "payload": "hello"})]
        );

        assert!(session.detach_runtime());
        assert!(!session.detach_runtime());
        assert_eq!(target.agent_count(), 0);
    }

    #[test]
    fn subscriptions_made_while_detached_apply_on_attach() {
        let mut domains = ManualDomains::new();
        let target = create_target(&domains);
        let frontend = RecordingChannel::new();
        let mut session = InspectorSession::new(frontend.channel());

        session.dispatch(r#"{"id":1,"method":"Runtime.enable"}"#);
        session.dispatch(r#"{"id":2,"method":"Runtime.addBinding","params":{"name":"cb"}}"#);
        assert!(!session.is_attached());
        assert_eq!(responses(&frontend).len(), 2);

        session.attach_runtime(&target);
        domains.run_until_idle();
        assert_eq!(domains.call("cb", &["x".into()]), Ok(ScriptValue::Undefined));
        domains.run_until_idle();

        assert_eq!(
            frontend.notifications("Runtime.executionContextCreated").len(),
            1
        );
        assert_eq!(frontend.notifications("Runtime.bindingCalled").len(), 1);
        session.detach_runtime();
    }

    #[test]
    fn remove_binding_without_name_is_rejected_attached_or_not() {
        let domains = ManualDomains::new();
        let target = create_target(&domains);
        let frontend = RecordingChannel::new();
        let mut session = InspectorSession::new(frontend.channel());

        session.dispatch(r#"{"id":1,"method":"Runtime.removeBinding","params":{}}"#);
        session.attach_runtime(&target);
        session.dispatch(r#"{"id":2,"method":"Runtime.removeBinding","params":{"name":3}}"#);

        let responses = responses(&frontend);
        assert_eq!(responses.len(), 2);
        for (response, id) in responses.iter().zip([1, 2]) {
            assert_eq!(response["id"], id);
            assert_eq!(response["error"]["code"], -32602);
            assert_eq!(response["error"]["message"], "name must be a string");
        }
        session.detach_runtime();
    }

    #[test]
    fn reattaching_replaces_agent() {
        let domains = ManualDomains::new();
        let target = create_target(&domains);
        let mut session = InspectorSession::new(RecordingChannel::new().channel());

        session.attach_runtime(&target);
        session.attach_runtime(&target);
        assert_eq!(target.agent_count(), 1);
        session.detach_runtime();
    }

    #[test]
    fn delegate_handled_requests_skip_session_response() {
        let domains = ManualDomains::new();
        let target = RuntimeTarget::create(
            ExecutionContextDescription::new(1, "script", "main"),
            Arc::new(RecordingTargetDelegate::handling(&["Runtime.evaluate"])),
            domains.runtime_executor(),
            domains.void_executor(),
        );
        let frontend = RecordingChannel::new();
        let mut session = InspectorSession::new(frontend.channel());
        session.attach_runtime(&target);

        session.dispatch(r#"{"id":9,"method":"Runtime.evaluate","params":{"expression":"1"}}"#);

        assert_eq!(
            responses(&frontend),
            vec![json!({"id": 9, "result": {"handledBy": "delegate"}})]
        );
        session.detach_runtime();
    }
}
