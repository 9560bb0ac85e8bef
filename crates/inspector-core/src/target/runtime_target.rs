use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use super::controller::RuntimeTargetController;
use super::weak_list::WeakList;
use crate::agent::{RuntimeAgent, RuntimeAgentDelegate};
use crate::cdp::FrontendChannel;
use crate::description::ExecutionContextDescription;
use crate::executor::{RuntimeExecutor, VoidExecutor};
use crate::script::{HostFunction, ScriptError, ScriptValue};
use crate::session::SharedSessionState;

pub const INVALID_BINDING_ARGUMENTS: &str = "Invalid arguments: should be exactly one string.";

/// Host capability that supplies the engine-specific half of each agent.
/// Called on the control domain; must not block.
pub trait RuntimeTargetDelegate: Send + Sync {
    fn create_agent_delegate(
        &self,
        channel: FrontendChannel,
        session_state: SharedSessionState,
        execution_context_description: &ExecutionContextDescription,
    ) -> Box<dyn RuntimeAgentDelegate>;
}

/// Runs closures on the control domain against the target, if the target
/// still exists by the time they run.
#[derive(Clone)]
struct TargetExecutor {
    target: Weak<RuntimeTarget>,
    executor: VoidExecutor,
}

impl TargetExecutor {
    fn execute(&self, f: impl FnOnce(&RuntimeTarget) + Send + 'static) {
        let target = self.target.clone();
        self.executor.execute(move || match target.upgrade() {
            Some(target) => f(&target),
            None => trace!("Runtime target dropped before control job ran"),
        });
    }
}

/// The debugger's handle on one live script execution context.
///
/// State is split between two domains and never shared across them: the
/// script global namespace is only touched through `js_executor`, and the
/// agent registry only on the control domain behind `self_executor`.
pub struct RuntimeTarget {
    execution_context_description: ExecutionContextDescription,
    delegate: Arc<dyn RuntimeTargetDelegate>,
    js_executor: RuntimeExecutor,
    self_executor: TargetExecutor,
    controller: RuntimeTargetController,
    agents: Mutex<WeakList<RuntimeAgent>>,
}

impl RuntimeTarget {
    /// Creates a target for one execution context.
    ///
    /// The target's own executor needs a weak handle to the target, which
    /// only exists once the shared allocation does. It is bound while that
    /// allocation is completed and cannot be upgraded until this returns, so
    /// no scheduled job can observe a partially built target.
    pub fn create(
        execution_context_description: ExecutionContextDescription,
        delegate: Arc<dyn RuntimeTargetDelegate>,
        js_executor: RuntimeExecutor,
        self_executor: VoidExecutor,
    ) -> Arc<Self> {
        let target = Arc::new_cyclic(|this: &Weak<Self>| Self {
            execution_context_description,
            delegate,
            js_executor,
            self_executor: TargetExecutor {
                target: this.clone(),
                executor: self_executor,
            },
            controller: RuntimeTargetController::new(this.clone()),
            agents: Mutex::new(WeakList::default()),
        });
        debug!(
            execution_context_id = target.execution_context_description.id,
            name = %target.execution_context_description.name,
            "Created runtime target"
        );
        target
    }

    pub fn description(&self) -> &ExecutionContextDescription {
        &self.execution_context_description
    }

    pub fn controller(&self) -> RuntimeTargetController {
        self.controller.clone()
    }

    /// Creates an agent for a newly attached session. Control domain only.
    ///
    /// The caller owns the returned agent and must drop it before the
    /// target is dropped. Dropping it is what unregisters it.
    pub fn create_agent(
        &self,
        channel: FrontendChannel,
        session_state: SharedSessionState,
    ) -> Arc<RuntimeAgent> {
        let agent_delegate = self.delegate.create_agent_delegate(
            channel.clone(),
            session_state.clone(),
            &self.execution_context_description,
        );
        let agent = Arc::new(RuntimeAgent::new(
            channel,
            self.controller.clone(),
            self.execution_context_description.clone(),
            session_state,
            agent_delegate,
        ));
        self.agents().insert(&agent);
        debug!(
            execution_context_id = self.execution_context_description.id,
            "Registered runtime agent"
        );
        agent
    }

    /// Number of live agent registrations. Control domain only.
    pub fn agent_count(&self) -> usize {
        self.agents().len()
    }

    pub(crate) fn install_binding_handler(&self, binding_name: &str) {
        let binding_name = binding_name.to_string();
        let self_executor = self.self_executor.clone();

        self.js_executor.execute(move |runtime| {
            let function = binding_function(binding_name.clone(), self_executor);
            if let Err(error) = runtime.set_global_function(&binding_name, 1, function) {
                // Runtime.addBinding swallows exceptions thrown while the
                // binding is being set up.
                debug!(binding = %binding_name, %error, "Failed to install binding");
            }
        });
    }

    fn notify_binding_called(&self, binding_name: &str, payload: &str) {
        let agents = self.agents().live();
        trace!(
            binding = binding_name,
            agents = agents.len(),
            "Dispatching binding call"
        );
        for agent in agents {
            agent.notify_binding_called(binding_name, payload);
        }
    }

    fn agents(&self) -> MutexGuard<'_, WeakList<RuntimeAgent>> {
        self.agents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The function script code sees. Runs on the script-execution domain and
/// hands valid calls over to the control domain.
fn binding_function(binding_name: String, self_executor: TargetExecutor) -> HostFunction {
    Arc::new(
        move |args: &[ScriptValue]| -> Result<ScriptValue, ScriptError> {
            let [ScriptValue::String(payload)] = args else {
                return Err(ScriptError::new(INVALID_BINDING_ARGUMENTS));
            };

            let binding_name = binding_name.clone();
            let payload = payload.clone();
            self_executor.execute(move |target| {
                target.notify_binding_called(&binding_name, &payload);
            });

            Ok(ScriptValue::Undefined)
        },
    )
}

impl Drop for RuntimeTarget {
    fn drop(&mut self) {
        // Agents are owned by sessions, but they hold a controller that must
        // stay meaningful for as long as they live.
        let attached = self
            .agents
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        // A second panic while unwinding would abort and hide the first one.
        if attached > 0 && std::thread::panicking() {
            debug!(attached, "Runtime target dropped during unwind with agents attached");
            return;
        }
        assert!(
            attached == 0,
            "RuntimeAgent objects must be destroyed before their RuntimeTarget \
             ({attached} still attached). Did the session detach its runtime agent?"
        );
        debug!(
            execution_context_id = self.execution_context_description.id,
            "Dropped runtime target"
        );
    }
}
