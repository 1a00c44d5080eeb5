//! ABOUTME: Role-parameterized task execution against the LLM
//! ABOUTME: Composes retry, circuit breaker, prompt budgeting, extraction, and file writes

use crate::prompts::{build_user_prompt, system_prompt};
use crate::writer::WorkspaceWriter;
use agentflow_core::{AgentFlowError, AgentRole, NodeResult, Task};
use agentflow_providers::{
    ChatProvider, ChatRequest, ChunkObserver, ProviderEndpoint, ProviderError, ProviderPool,
};
use agentflow_utils::circuit_breaker::{BreakerError, CircuitBreaker};
use agentflow_utils::extract::extract;
use agentflow_utils::prompt_budget::fit;
use agentflow_utils::retry::{retry, RetryError, RetryPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tokens reserved for the completion when truncating after a
/// context-overflow rejection.
const RESERVED_COMPLETION_TOKENS: usize = 1024;
/// Per-file content budget in the relevant-files section.
const MULTI_FILE_LIMIT: usize = 1000;
/// Budget when only a single file is attached.
const SINGLE_FILE_LIMIT: usize = 1500;

/// Per-runtime configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub endpoint: ProviderEndpoint,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub retry: RetryPolicy,
    /// Languages advertised in the developer system prompt.
    pub languages: Vec<String>,
}

/// One agent: a role bound to the shared provider pool, an endpoint-level
/// circuit breaker, and the workspace writer.
pub struct AgentRuntime {
    role: AgentRole,
    config: AgentConfig,
    system_prompt: String,
    pool: Arc<ProviderPool>,
    breaker: Arc<CircuitBreaker>,
    writer: WorkspaceWriter,
    chunk_observer: Option<ChunkObserver>,
}

impl AgentRuntime {
    pub fn new(
        role: AgentRole,
        config: AgentConfig,
        pool: Arc<ProviderPool>,
        breaker: Arc<CircuitBreaker>,
        writer: WorkspaceWriter,
    ) -> Self {
        let system_prompt = system_prompt(role, &config.languages);
        Self {
            role,
            config,
            system_prompt,
            pool,
            breaker,
            writer,
            chunk_observer: None,
        }
    }

    /// Observe streamed chunks (ignored for non-streaming configs).
    pub fn with_chunk_observer(mut self, observer: ChunkObserver) -> Self {
        self.chunk_observer = Some(observer);
        self
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Execute one task end to end.
    ///
    /// Never panics or propagates an error: any failure becomes a
    /// `NodeResult` with failed status for the orchestrator to record.
    pub async fn run(&self, task: &Task, cancel: &CancellationToken) -> NodeResult {
        info!(role = %self.role, task_id = %task.task_id, "starting task");

        let user_prompt = self.assemble_user_prompt(task).await;

        let content = match self.invoke_llm(&user_prompt, cancel).await {
            Ok(content) => content,
            Err(e) => {
                warn!(role = %self.role, task_id = %task.task_id, error = %e, "task failed");
                return NodeResult::failed(self.role, task.task_id.clone(), e.to_string());
            }
        };

        let extraction = extract(&content);
        if extraction.is_empty() && !content.trim().is_empty() {
            let preview: String = content.chars().take(200).collect();
            warn!(
                role = %self.role,
                task_id = %task.task_id,
                preview,
                "no files extracted from non-empty response"
            );
        }

        let files_created = match self
            .writer
            .write_files(&task.task_id, self.role, &extraction)
            .await
        {
            Ok(files) => files,
            Err(e) => {
                warn!(role = %self.role, error = %e, "failed to persist extracted files");
                Vec::new()
            }
        };

        info!(
            role = %self.role,
            task_id = %task.task_id,
            files = files_created.len(),
            "task completed"
        );

        NodeResult::completed(self.role, task.task_id.clone())
            .with_summary(format!(
                "{} completed: {} file(s) generated",
                self.role,
                files_created.len()
            ))
            .with_files(files_created)
            .with_raw_output(content)
    }

    /// Build the user prompt, appending the relevant-files section when the
    /// task names input files.
    async fn assemble_user_prompt(&self, task: &Task) -> String {
        let mut prompt = build_user_prompt(task);

        let files = task.input_files();
        if files.is_empty() {
            return prompt;
        }

        let per_file_limit = if files.len() > 1 {
            MULTI_FILE_LIMIT
        } else {
            SINGLE_FILE_LIMIT
        };

        let mut section = String::from("\n\nRelevant Files:\n");
        let mut any = false;
        for path in &files {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    let total = content.chars().count();
                    let mut shown: String = content.chars().take(per_file_limit).collect();
                    if total > per_file_limit {
                        shown.push_str(&format!(
                            "\n... [truncated {} chars]",
                            total - per_file_limit
                        ));
                    }
                    section.push_str(&format!("\n--- {path} ---\n{shown}\n"));
                    any = true;
                }
                Err(e) => {
                    warn!(path, error = %e, "could not read input file");
                }
            }
        }
        if any {
            prompt.push_str(&section);
        }
        prompt
    }

    /// Call the LLM with resilience, recovering once from a context-size
    /// rejection by truncating the prompts.
    async fn invoke_llm(
        &self,
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentFlowError> {
        match self.call_with_resilience(&self.system_prompt, user_prompt, cancel).await {
            Ok(content) => Ok(content),
            Err(AgentFlowError::ContextOverflow { limit_tokens, .. }) => {
                warn!(
                    role = %self.role,
                    limit_tokens,
                    "context size exceeded, attempting to truncate and retry"
                );
                let fitted = fit(
                    &self.system_prompt,
                    user_prompt,
                    limit_tokens as usize,
                    RESERVED_COMPLETION_TOKENS,
                );
                if !fitted.truncated {
                    // The prompts already fit the reported window; nothing
                    // left to cut, so the failure stands.
                    return Err(AgentFlowError::ContextOverflow {
                        limit_tokens,
                        prompt_tokens: None,
                    });
                }
                info!(role = %self.role, "retrying with truncated prompts");
                match self
                    .call_with_resilience(&fitted.system, &fitted.user, cancel)
                    .await
                {
                    Err(AgentFlowError::ContextOverflow { limit_tokens, .. }) => {
                        Err(AgentFlowError::provider(format!(
                            "context size error persisted after truncation (server limit: {limit_tokens} tokens)"
                        )))
                    }
                    other => other,
                }
            }
            Err(e) => Err(e),
        }
    }

    /// One logical LLM call: retry wrapping a breaker-protected request,
    /// cancellable at every suspension point.
    async fn call_with_resilience(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentFlowError> {
        if cancel.is_cancelled() {
            return Err(AgentFlowError::Cancelled);
        }

        let provider = self.pool.get(&self.config.endpoint).map_err(|e| {
            AgentFlowError::Provider {
                message: e.to_string(),
                source: Some(Box::new(e)),
            }
        })?;

        let request = ChatRequest::new(self.config.model.clone(), system, user)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_stream(self.config.stream);

        let retry_future = retry(&self.config.retry, |attempt| {
            let provider: Arc<dyn ChatProvider> = provider.clone();
            let request = request.clone();
            let observer = self.chunk_observer.clone();
            async move {
                debug!(attempt, stream = request.stream, "calling chat endpoint");
                let call = async {
                    if request.stream {
                        provider.complete_streaming(&request, observer).await
                    } else {
                        provider.complete(&request).await
                    }
                };
                let outcome = self.breaker.call(call).await;
                match &outcome {
                    Ok(_) => self.pool.record(&self.config.endpoint, true),
                    Err(BreakerError::Inner(_)) => {
                        self.pool.record(&self.config.endpoint, false)
                    }
                    // An open circuit never reached the endpoint.
                    Err(BreakerError::Open) => {}
                }
                outcome
            }
        });

        // Dropping the retry future aborts any in-flight request.
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentFlowError::Cancelled),
            outcome = retry_future => outcome,
        };

        match outcome {
            Ok(response) => Ok(response.content),
            Err(e) => Err(self.map_retry_error(e)),
        }
    }

    fn map_retry_error(
        &self,
        error: RetryError<BreakerError<ProviderError>>,
    ) -> AgentFlowError {
        match error {
            RetryError::Aborted(BreakerError::Open) => AgentFlowError::CircuitOpen {
                endpoint: self.config.endpoint.base_url.clone(),
            },
            RetryError::Aborted(BreakerError::Inner(ProviderError::ContextOverflow {
                limit_tokens,
                prompt_tokens,
            })) => AgentFlowError::ContextOverflow {
                limit_tokens,
                prompt_tokens,
            },
            RetryError::Aborted(BreakerError::Inner(e)) => AgentFlowError::Provider {
                message: e.to_string(),
                source: Some(Box::new(e)),
            },
            RetryError::Exhausted { attempts, last } => AgentFlowError::RetryExhausted {
                attempts,
                message: last.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_providers::{ChatResponse, ProviderFactory};
    use agentflow_utils::circuit_breaker::CircuitBreakerConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Scripted provider: programmable per-call behavior.
    struct ScriptedProvider {
        calls: AtomicU32,
        script: Box<dyn Fn(u32, &ChatRequest) -> Result<String, ProviderError> + Send + Sync>,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(call, request).map(|content| ChatResponse { content })
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
            "scripted"
        }
    }

    fn scripted_pool(
        script: impl Fn(u32, &ChatRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> (Arc<ProviderPool>, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicU32::new(0),
            script: Box::new(script),
        });
        let for_factory = provider.clone();
        let factory: ProviderFactory = Arc::new(move |_| {
            Ok(for_factory.clone() as Arc<dyn ChatProvider>)
        });
        (Arc::new(ProviderPool::with_factory(factory)), provider)
    }

    fn runtime(pool: Arc<ProviderPool>, workspace: &std::path::Path) -> AgentRuntime {
        let config = AgentConfig {
            endpoint: ProviderEndpoint::new(
                "http://127.0.0.1:8080/v1",
                "not-needed",
                Duration::from_secs(300),
            ),
            model: "devstral".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            stream: false,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                exponential_base: 2.0,
                jitter: false,
            },
            languages: vec!["python".to_string()],
        };
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        AgentRuntime::new(
            AgentRole::Developer,
            config,
            pool,
            breaker,
            WorkspaceWriter::new(workspace),
        )
    }

    #[tokio::test]
    async fn test_run_extracts_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, _) = scripted_pool(|_, _| {
            Ok("File: `app.py`\n```python\nprint(\"hello\")\n```\n".to_string())
        });
        let runtime = runtime(pool, dir.path());
        let task = Task::new("dev", "implement hello");

        let result = runtime.run(&task, &CancellationToken::new()).await;
        assert_eq!(result.status, agentflow_core::NodeStatus::Completed);
        assert_eq!(result.files_created.len(), 1);
        assert!(result.files_created[0].ends_with("app.py"));
        assert!(result.raw_output.is_some());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, provider) = scripted_pool(|call, _| {
            if call == 0 {
                Err(ProviderError::transport("connection reset"))
            } else {
                Ok("File: `ok.py`\n```python\nx = 1\n```\n".to_string())
            }
        });
        let runtime = runtime(pool, dir.path());
        let task = Task::new("dev", "retry me");

        let result = runtime.run(&task, &CancellationToken::new()).await;
        assert_eq!(result.status, agentflow_core::NodeStatus::Completed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_node() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, provider) = scripted_pool(|_, _| {
            Err(ProviderError::transport("connection refused"))
        });
        let runtime = runtime(pool, dir.path());
        let task = Task::new("dev", "always down");

        let result = runtime.run(&task, &CancellationToken::new()).await;
        assert_eq!(result.status, agentflow_core::NodeStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("3 attempts"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_context_overflow_truncates_and_retries_once() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, provider) = scripted_pool(|call, request| {
            if call == 0 {
                Err(ProviderError::ContextOverflow {
                    limit_tokens: 2048,
                    prompt_tokens: Some(9000),
                })
            } else {
                // The retried prompts must actually have been truncated.
                let user = request.user_content().unwrap_or_default();
                assert!(user.contains("[User prompt truncated to fit context...]"));
                Ok("File: `fixed.py`\n```python\ny = 2\n```\n".to_string())
            }
        });
        let runtime = runtime(pool, dir.path());
        // A requirement large enough that truncation has something to cut.
        let task = Task::new("dev", "implement")
            .with_context_value("requirement", json!("r".repeat(20_000)));

        let result = runtime.run(&task, &CancellationToken::new()).await;
        assert_eq!(result.status, agentflow_core::NodeStatus::Completed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_context_overflow_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, provider) = scripted_pool(|_, _| {
            Err(ProviderError::ContextOverflow {
                limit_tokens: 2048,
                prompt_tokens: None,
            })
        });
        let runtime = runtime(pool, dir.path());
        let task = Task::new("dev", "implement")
            .with_context_value("requirement", json!("r".repeat(20_000)));

        let result = runtime.run(&task, &CancellationToken::new()).await;
        assert_eq!(result.status, agentflow_core::NodeStatus::Failed);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("persisted after truncation"));
        // One original call plus exactly one truncated retry.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, provider) = scripted_pool(|_, _| Ok("unused".to_string()));
        let runtime = runtime(pool, dir.path());
        let task = Task::new("dev", "cancelled before start");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = runtime.run(&task, &cancel).await;
        assert_eq!(result.status, agentflow_core::NodeStatus::Failed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_streaming_observer_sees_full_content() {
        let dir = tempfile::tempdir().unwrap();
        let (pool, _) = scripted_pool(|_, _| {
            Ok("File: `s.py`\n```python\nz = 3\n```\n".to_string())
        });
        let seen = Arc::new(chunk_log::Collected::default());
        let seen_by_observer = seen.clone();

        let config_pool = pool.clone();
        let mut runtime = runtime(config_pool, dir.path());
        runtime.config.stream = true;
        let runtime = runtime.with_chunk_observer(Arc::new(move |chunk: &str| {
            seen_by_observer.push(chunk);
        }));

        let task = Task::new("dev", "stream it");
        let result = runtime.run(&task, &CancellationToken::new()).await;
        assert_eq!(result.status, agentflow_core::NodeStatus::Completed);
        assert_eq!(seen.join(), result.raw_output.unwrap());
    }

    /// Collects observed chunks for assertions.
    mod chunk_log {
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct Collected(Mutex<Vec<String>>);

        impl Collected {
            pub fn push(&self, chunk: &str) {
                self.0.lock().unwrap().push(chunk.to_string());
            }

            pub fn join(&self) -> String {
                self.0.lock().unwrap().join("")
            }
        }
    }
}
