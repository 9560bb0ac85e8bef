use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, trace, warn};

use inspector_core::cdp::{FrontendChannel, Request};
use inspector_core::executor::{DomainHandle, JobQueue};
use inspector_core::script::{ScriptRuntime, ScriptValue};
use inspector_core::{
    ExecutionContextDescription, InspectorSession, RuntimeAgentDelegate, RuntimeExecutor,
    RuntimeTarget, RuntimeTargetDelegate, SharedSessionState,
};

/// A line of host input that is addressed to the host rather than the
/// session.
#[derive(Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HostCommand {
    Call {
        call: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Session {
        session: SessionCommand,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionCommand {
    Attach,
    Detach,
}

impl HostCommand {
    /// Returns None for lines that should go to the session as protocol
    /// messages.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }
}

/// Converts JSON call arguments into script values. Fails on the first
/// argument that has no script counterpart.
pub fn script_args(args: &[Value]) -> Result<Vec<ScriptValue>, usize> {
    args.iter()
        .enumerate()
        .map(|(index, arg)| ScriptValue::from_json(arg).ok_or(index))
        .collect()
}

/// Everything the host touches from the control domain, which here is the
/// task driving [`Host::pump`].
///
/// Fields drop in declaration order, so the session (and its agent) always
/// goes before the target.
pub struct Host {
    session: InspectorSession,
    js_executor: RuntimeExecutor,
    target: Arc<RuntimeTarget>,
}

impl Host {
    pub fn new(
        target: Arc<RuntimeTarget>,
        session: InspectorSession,
        js_executor: RuntimeExecutor,
    ) -> Self {
        Self {
            session,
            js_executor,
            target,
        }
    }

    /// Feeds input lines to the host while running control jobs, until the
    /// input ends or fails.
    pub async fn pump<R>(
        &mut self,
        input: R,
        control_queue: &mut JobQueue<()>,
    ) -> inspector_core::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        loop {
            tokio::select! {
                Some(job) = control_queue.recv() => job(&mut ()),
                line = lines.next_line() => match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => self.handle_line(&line),
                    None => return Ok(()),
                },
            }
        }
    }

    /// Lets pending script work and the control jobs it queued finish, then
    /// detaches the session. The target itself goes when the host is dropped.
    pub async fn shutdown(
        &mut self,
        script: &DomainHandle<Box<dyn ScriptRuntime>>,
        control_queue: &mut JobQueue<()>,
    ) -> inspector_core::Result<()> {
        script.flush().await?;
        let ran = control_queue.run_pending(&mut ());
        debug!(jobs = ran, "Drained control domain");

        self.session.detach_runtime();
        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) {
        match HostCommand::parse(line) {
            Some(HostCommand::Call { call, args }) => self.call(call, &args),
            Some(HostCommand::Session {
                session: SessionCommand::Attach,
            }) => {
                self.session.attach_runtime(&self.target);
                info!("Attached runtime agent");
            }
            Some(HostCommand::Session {
                session: SessionCommand::Detach,
            }) => {
                if self.session.detach_runtime() {
                    info!("Detached runtime agent");
                } else {
                    debug!("No runtime agent to detach");
                }
            }
            None => self.session.dispatch(line),
        }
    }

    fn call(&self, name: String, args: &[Value]) {
        let args = match script_args(args) {
            Ok(args) => args,
            Err(index) => {
                warn!(function = %name, index, "Call argument is not a script scalar");
                return;
            }
        };

        self.js_executor.execute(move |runtime| {
            if let Err(error) = runtime.call_global(&name, &args) {
                warn!(function = %name, %error, "Script call threw");
            }
        });
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if self.session.detach_runtime() {
            debug!("Detached runtime agent while dropping host");
        }
    }
}

/// The stdio host has no engine of its own to answer requests with.
pub struct StdioTargetDelegate;

impl RuntimeTargetDelegate for StdioTargetDelegate {
    fn create_agent_delegate(
        &self,
        _channel: FrontendChannel,
        _session_state: SharedSessionState,
        execution_context_description: &ExecutionContextDescription,
    ) -> Box<dyn RuntimeAgentDelegate> {
        Box::new(StdioAgentDelegate {
            execution_context_id: execution_context_description.id,
        })
    }
}

struct StdioAgentDelegate {
    execution_context_id: i32,
}

impl RuntimeAgentDelegate for StdioAgentDelegate {
    fn handle_request(&self, request: &Request) -> bool {
        trace!(
            execution_context_id = self.execution_context_id,
            method = %request.method,
            "Passing request to runtime agent"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use inspector_core::Error;
    use inspector_core::executor::{JobSender, job_queue, spawn_script_domain};
    use inspector_core::script::InMemoryScriptRuntime;
    use inspector_core::test_utils::RecordingChannel;
    use inspector_core::{ExecutionContextDescription, VoidExecutor};
    use serde_json::json;

    use super::*;

    struct Harness {
        host: Host,
        script: DomainHandle<Box<dyn ScriptRuntime>>,
        control_queue: JobQueue<()>,
        _control_sender: JobSender<()>,
        frontend: RecordingChannel,
    }

    /// A host that owns the only handle on its target, with its session
    /// attached, like the one `inspector` builds at startup.
    fn attached_host() -> Harness {
        let script = spawn_script_domain(InMemoryScriptRuntime::new());
        let (control_sender, control_queue) = job_queue::<()>();
        let target = RuntimeTarget::create(
            ExecutionContextDescription::new(1, "script", "main"),
            Arc::new(StdioTargetDelegate),
            script.runtime_executor(),
            VoidExecutor::from(control_sender.clone()),
        );
        let frontend = RecordingChannel::new();
        let mut session = InspectorSession::new(frontend.channel());
        session.attach_runtime(&target);

        Harness {
            host: Host::new(target, session, script.runtime_executor()),
            script,
            control_queue,
            _control_sender: control_sender,
            frontend,
        }
    }

    #[tokio::test]
    async fn unreadable_input_is_an_error_and_host_still_drops_cleanly() {
        let Harness {
            mut host,
            mut control_queue,
            frontend,
            ..
        } = attached_host();
        let input: &[u8] = b"{\"id\":1,\"method\":\"Runtime.enable\"}\n\xff\xfe\n";

        let result = host.pump(input, &mut control_queue).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(frontend.json_messages().last(), Some(&json!({"id": 1, "result": {}})));
        drop(host);
    }

    #[tokio::test]
    async fn shutdown_delivers_calls_made_before_end_of_input() {
        let Harness {
            mut host,
            script,
            mut control_queue,
            frontend,
            ..
        } = attached_host();
        let input: &[u8] = concat!(
            r#"{"id":1,"method":"Runtime.addBinding","params":{"name":"sendMessage"}}"#,
            "\n\n",
            r#"{"call":"sendMessage","args":["bye"]}"#,
            "\n",
        )
        .as_bytes();

        host.pump(input, &mut control_queue).await.unwrap();
        host.shutdown(&script, &mut control_queue).await.unwrap();

        assert!(!host.session.is_attached());
        assert_eq!(
            frontend.notifications("Runtime.bindingCalled"),
            vec![json!({"executionContextId": 1, "name": "sendMessage", "payload": "bye"})]
        );
        drop(host);
    }

    #[test]
    fn parses_host_commands() {
        assert_eq!(
            HostCommand::parse(r#"{"call":"sendMessage","args":["hi"]}"#),
            Some(HostCommand::Call {
                call: "sendMessage".to_string(),
                args: vec![json!("hi")],
            })
        );
        assert_eq!(
            HostCommand::parse(r#"{"call":"ping"}"#),
            Some(HostCommand::Call {
                call: "ping".to_string(),
                args: Vec::new(),
            })
        );
        assert_eq!(
            HostCommand::parse(r#"{"session":"detach"}"#),
            Some(HostCommand::Session {
                session: SessionCommand::Detach,
            })
        );
    }

    #[test]
    fn protocol_messages_are_not_host_commands() {
        assert_eq!(
            HostCommand::parse(r#"{"id":1,"method":"Runtime.enable"}"#),
            None
        );
        assert_eq!(HostCommand::parse(r#"{"session":"pause"}"#), None);
        assert_eq!(HostCommand::parse("not json"), None);
    }

    #[test]
    fn converts_call_arguments() {
        assert_eq!(
            script_args(&[json!("a"), json!(1.5), json!(null), json!(true)]),
            Ok(vec![
                ScriptValue::from("a"),
                ScriptValue::Number(1.5),
                ScriptValue::Null,
                ScriptValue::Bool(true),
            ])
        );
        assert_eq!(script_args(&[json!("a"), json!({"k": 1})]), Err(1));
    }
}
