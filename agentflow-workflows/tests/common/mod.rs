//! Shared test harness: scripted mock LLM and orchestrator wiring.

use agentflow_config::Settings;
use agentflow_events::ProgressEmitter;
use agentflow_providers::{
    ChatProvider, ChatRequest, ChatResponse, ChunkObserver, ProviderError, ProviderFactory,
    ProviderPool,
};
use agentflow_state::MemoryCheckpointer;
use agentflow_workflows::AgentOrchestrator;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Workflow steps the mock can distinguish, keyed off the task description
/// embedded in the user prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    BusinessAnalyst,
    Architecture,
    Implementation,
    QaTesting,
    Infrastructure,
    Documentation,
    BugAnalysis,
    BugFix,
    Regression,
    ReleaseNotes,
}

pub const FEATURE_STEPS: [Step; 6] = [
    Step::BusinessAnalyst,
    Step::Architecture,
    Step::Implementation,
    Step::QaTesting,
    Step::Infrastructure,
    Step::Documentation,
];

fn step_for_request(request: &ChatRequest) -> Step {
    let user = request.user_content().unwrap_or_default();
    if user.contains("Analyze requirements and create user stories") {
        Step::BusinessAnalyst
    } else if user.contains("Design system architecture") {
        Step::Architecture
    } else if user.contains("Implement the feature") {
        Step::Implementation
    } else if user.contains("Create comprehensive tests") {
        Step::QaTesting
    } else if user.contains("infrastructure and deployment configuration") {
        Step::Infrastructure
    } else if user.contains("Create comprehensive documentation") {
        Step::Documentation
    } else if user.contains("Analyze and reproduce the bug") {
        Step::BugAnalysis
    } else if user.contains("Fix the bug") {
        Step::BugFix
    } else if user.contains("Run regression tests") {
        Step::Regression
    } else if user.contains("Update release notes") {
        Step::ReleaseNotes
    } else {
        panic!("mock could not classify request: {user:.200}");
    }
}

/// Scripted behavior for one step.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Respond with a single file of the given name, body "ok".
    File(&'static str),
    /// Fail with a connection error on every call.
    TransportError,
    /// Report a context-overflow on the first call, then respond with the
    /// file on subsequent calls.
    OverflowThenFile { limit: u32, name: &'static str },
    /// Never respond (cancellation tests).
    Hang,
}

fn file_response(name: &str) -> String {
    format!("File: `{name}`\n```\nok\n```\n")
}

/// Deterministic mock of the chat endpoint.
pub struct MockLlm {
    behaviors: Mutex<HashMap<Step, Behavior>>,
    calls: Mutex<HashMap<Step, u32>>,
}

impl MockLlm {
    /// Every step answers with `<step>_output.md`.
    pub fn all_ok() -> Arc<Self> {
        let mut behaviors = HashMap::new();
        behaviors.insert(Step::BusinessAnalyst, Behavior::File("business_analyst_output.md"));
        behaviors.insert(Step::Architecture, Behavior::File("architecture_output.md"));
        behaviors.insert(Step::Implementation, Behavior::File("implementation_output.md"));
        behaviors.insert(Step::QaTesting, Behavior::File("qa_engineer_output.md"));
        behaviors.insert(Step::Infrastructure, Behavior::File("devops_engineer_output.md"));
        behaviors.insert(Step::Documentation, Behavior::File("technical_writer_output.md"));
        behaviors.insert(Step::BugAnalysis, Behavior::File("bug_analysis_output.md"));
        behaviors.insert(Step::BugFix, Behavior::File("bug_fix_output.md"));
        behaviors.insert(Step::Regression, Behavior::File("regression_output.md"));
        behaviors.insert(Step::ReleaseNotes, Behavior::File("release_notes_output.md"));
        Arc::new(Self {
            behaviors: Mutex::new(behaviors),
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn set(&self, step: Step, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(step, behavior);
    }

    pub fn fail_everything(&self) {
        let mut behaviors = self.behaviors.lock().unwrap();
        for behavior in behaviors.values_mut() {
            *behavior = Behavior::TransportError;
        }
    }

    /// Number of calls the mock has served for a step.
    pub fn calls(&self, step: Step) -> u32 {
        *self.calls.lock().unwrap().get(&step).unwrap_or(&0)
    }

    pub fn factory(self: &Arc<Self>) -> ProviderFactory {
        let mock = self.clone();
        Arc::new(move |_endpoint| Ok(mock.clone() as Arc<dyn ChatProvider>))
    }
}

#[async_trait]
impl ChatProvider for MockLlm {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let step = step_for_request(request);
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(step).or_insert(0);
            *count += 1;
            *count
        };
        let behavior = *self
            .behaviors
            .lock()
            .unwrap()
            .get(&step)
            .unwrap_or(&Behavior::TransportError);

        match behavior {
            Behavior::File(name) => Ok(ChatResponse {
                content: file_response(name),
            }),
            Behavior::TransportError => Err(ProviderError::transport("connection refused")),
            Behavior::OverflowThenFile { limit, name } => {
                if call == 1 {
                    Err(ProviderError::ContextOverflow {
                        limit_tokens: limit,
                        prompt_tokens: Some(limit + 380),
                    })
                } else {
                    Ok(ChatResponse {
                        content: file_response(name),
                    })
                }
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::transport("unreachable"))
            }
        }
    }

    async fn complete_streaming(
        &self,
        request: &ChatRequest,
        observer: Option<ChunkObserver>,
    ) -> Result<ChatResponse, ProviderError> {
        let response = self.complete(request).await?;
        if let Some(observer) = observer {
            observer(&response.content);
        }
        Ok(response)
    }

    fn endpoint(&self) -> &str {
        "mock"
    }
}

/// Everything an orchestrator test needs.
pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub llm: Arc<MockLlm>,
    pub checkpointer: Arc<MemoryCheckpointer>,
    pub orchestrator: AgentOrchestrator,
}

pub fn harness() -> TestHarness {
    harness_with(|_| {})
}

pub fn harness_with(tune: impl FnOnce(&mut Settings)) -> TestHarness {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::builder()
        .workspace(dir.path())
        .llm_stream_responses(false)
        .retry_delays(0.001, 0.01)
        .build()
        .unwrap();
    tune(&mut settings);
    settings.validate().unwrap();

    let llm = MockLlm::all_ok();
    let pool = Arc::new(ProviderPool::with_factory(llm.factory()));
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let orchestrator = AgentOrchestrator::new(
        settings,
        pool,
        checkpointer.clone(),
        ProgressEmitter::new(),
    );
    TestHarness {
        dir,
        llm,
        checkpointer,
        orchestrator,
    }
}
