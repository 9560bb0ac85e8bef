//! Test utilities for inspector-core
//!
//! This module provides helpers for testing that need to be accessible
//! across crate boundaries.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::agent::RuntimeAgentDelegate;
use crate::cdp::{FrontendChannel, Request};
use crate::description::ExecutionContextDescription;
use crate::executor::{JobQueue, RuntimeExecutor, VoidExecutor, job_queue};
use crate::script::{InMemoryScriptRuntime, ScriptError, ScriptRuntime, ScriptValue};
use crate::session::SharedSessionState;
use crate::target::RuntimeTargetDelegate;

/// Captures every message sent through a frontend channel.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self) -> FrontendChannel {
        let messages = self.messages.clone();
        FrontendChannel::new(move |message| {
            messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message);
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn json_messages(&self) -> Vec<Value> {
        self.messages()
            .iter()
            .filter_map(|message| serde_json::from_str(message).ok())
            .collect()
    }

    /// Params of every notification with the given method, in order.
    pub fn notifications(&self, method: &str) -> Vec<Value> {
        self.json_messages()
            .into_iter()
            .filter(|message| message["method"] == method)
            .map(|mut message| message["params"].take())
            .collect()
    }
}

pub struct NoopAgentDelegate;

impl RuntimeAgentDelegate for NoopAgentDelegate {}

pub struct NoopTargetDelegate;

impl RuntimeTargetDelegate for NoopTargetDelegate {
    fn create_agent_delegate(
        &self,
        _channel: FrontendChannel,
        _session_state: SharedSessionState,
        _execution_context_description: &ExecutionContextDescription,
    ) -> Box<dyn RuntimeAgentDelegate> {
        Box::new(NoopAgentDelegate)
    }
}

/// Records which contexts agent delegates were created for, and hands out
/// agent delegates that claim the listed methods.
#[derive(Default)]
pub struct RecordingTargetDelegate {
    created: Mutex<Vec<ExecutionContextDescription>>,
    handled_methods: Vec<String>,
}

impl RecordingTargetDelegate {
    pub fn handling(methods: &[&str]) -> Self {
        Self {
            created: Mutex::default(),
            handled_methods: methods.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn created(&self) -> Vec<ExecutionContextDescription> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RuntimeTargetDelegate for RecordingTargetDelegate {
    fn create_agent_delegate(
        &self,
        channel: FrontendChannel,
        _session_state: SharedSessionState,
        execution_context_description: &ExecutionContextDescription,
    ) -> Box<dyn RuntimeAgentDelegate> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(execution_context_description.clone());
        Box::new(ClaimingAgentDelegate {
            channel,
            handled_methods: self.handled_methods.clone(),
        })
    }
}

struct ClaimingAgentDelegate {
    channel: FrontendChannel,
    handled_methods: Vec<String>,
}

impl RuntimeAgentDelegate for ClaimingAgentDelegate {
    fn handle_request(&self, request: &Request) -> bool {
        if !self.handled_methods.contains(&request.method) {
            return false;
        }
        self.channel.send(crate::cdp::json_result(
            request.id,
            serde_json::json!({ "handledBy": "delegate" }),
        ));
        true
    }
}

/// Both execution domains as queues the test thread drains by hand, so the
/// order in which cross-domain jobs run is fully under the test's control.
pub struct ManualDomains {
    pub runtime: InMemoryScriptRuntime,
    script_queue: JobQueue<InMemoryScriptRuntime>,
    control_queue: JobQueue<()>,
    runtime_executor: RuntimeExecutor,
    void_executor: VoidExecutor,
}

impl Default for ManualDomains {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualDomains {
    pub fn new() -> Self {
        let (script_sender, script_queue) = job_queue::<InMemoryScriptRuntime>();
        let (control_sender, control_queue) = job_queue::<()>();
        let runtime_executor = RuntimeExecutor::new(move |job| {
            script_sender.submit(move |runtime: &mut InMemoryScriptRuntime| job(runtime));
        });

        Self {
            runtime: InMemoryScriptRuntime::new(),
            script_queue,
            control_queue,
            runtime_executor,
            void_executor: VoidExecutor::from(control_sender),
        }
    }

    pub fn runtime_executor(&self) -> RuntimeExecutor {
        self.runtime_executor.clone()
    }

    pub fn void_executor(&self) -> VoidExecutor {
        self.void_executor.clone()
    }

    pub fn run_script(&mut self) -> usize {
        self.script_queue.run_pending(&mut self.runtime)
    }

    pub fn run_control(&mut self) -> usize {
        self.control_queue.run_pending(&mut ())
    }

    /// Alternates between the domains until neither has work left.
    pub fn run_until_idle(&mut self) {
        while self.run_script() + self.run_control() > 0 {}
    }

    /// Calls a global from "script", i.e. on the test thread acting as the
    /// script-execution domain.
    pub fn call(&mut self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
        self.runtime.call_global(name, args)
    }
}
