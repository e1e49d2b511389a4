//! Chat orchestration: prompt assembly and the bounded tool-call loop.
//!
//! The loop is a small state machine driven by the completion API's replies:
//!
//! ```text
//! AwaitingModel --tool calls--> ExecutingTools --> AwaitingModel
//! AwaitingModel --text--------> Done
//! any state --deadline--------> AbortedTimeout
//! AwaitingModel --cap reached-> AbortedMaxIterations
//! ```
//!
//! Every await runs under the request deadline, so a slow upstream call is
//! dropped (cancelled) when the budget runs out.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::llm::{ChatMessage, CompletionBackend, ToolCall};
use crate::metrics::UPSTREAM_FAILURES;
use crate::models::{ChatRequest, ChatResponse};
use crate::prompt::{build_messages, estimate_tokens};
use crate::tools::{TOOL_SPECS, ToolDispatch};
use crate::usage::{UsageRecord, UsageTracker};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_iterations: usize,
    pub time_budget: Duration,
    pub max_output_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            time_budget: Duration::from_secs(20),
            max_output_tokens: 600,
        }
    }
}

#[derive(Debug)]
enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
    AbortedTimeout,
    AbortedMaxIterations,
}

pub struct Orchestrator {
    backend: Arc<dyn CompletionBackend>,
    tools: Arc<dyn ToolDispatch>,
    usage: Arc<UsageTracker>,
    system_prompt: String,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        tools: Arc<dyn ToolDispatch>,
        usage: Arc<UsageTracker>,
        system_prompt: String,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            tools,
            usage,
            system_prompt,
            config,
        }
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Answers one admitted request and logs a [`UsageRecord`] for it.
    pub async fn chat(&self, client: &str, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        let messages = build_messages(
            &self.system_prompt,
            &request.conversation_context,
            &request.message,
        );
        let answer = self.run_loop(messages).await?;

        let tokens_used = estimate_tokens(
            &request.message,
            &request.conversation_context,
            self.config.max_output_tokens,
        );
        let now = Utc::now();
        self.usage.record(UsageRecord {
            client_identifier: client.to_string(),
            timestamp: now,
            estimated_tokens: tokens_used,
        });
        info!(client, tokens_used, "chat completed");

        Ok(ChatResponse {
            response: answer,
            timestamp: now,
            tokens_used,
            model: self.backend.model().to_string(),
        })
    }

    async fn run_loop(&self, mut messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let deadline = Instant::now() + self.config.time_budget;
        let mut iterations = 0;
        // last non-empty assistant text, returned if the loop is cut short
        let mut partial: Option<String> = None;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel if iterations >= self.config.max_iterations => {
                    LoopState::AbortedMaxIterations
                }
                LoopState::AwaitingModel => {
                    iterations += 1;
                    debug!(iteration = iterations, "awaiting model");
                    let call = self.backend.complete(&messages, TOOL_SPECS.as_slice());
                    let outcome = timeout_at(deadline, call).await;
                    match outcome {
                        Err(_) => LoopState::AbortedTimeout,
                        Ok(reply) => {
                            let reply = reply?;
                            let text = reply.content.as_deref().map(str::trim).unwrap_or_default();
                            if !text.is_empty() {
                                partial = Some(text.to_string());
                            }

                            if reply.tool_calls.is_empty() {
                                LoopState::Done(text.to_string())
                            } else {
                                let calls = reply.tool_calls.clone();
                                messages.push(reply);
                                LoopState::ExecutingTools(calls)
                            }
                        }
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    let mut next = LoopState::AwaitingModel;
                    for call in &calls {
                        debug!(tool = %call.function.name, "executing tool");
                        let run = self.tools.execute(&call.function.name, &call.function.arguments);
                        let outcome = timeout_at(deadline, run).await;
                        match outcome {
                            Ok(result) => messages.push(ChatMessage::tool_result(call, result)),
                            Err(_) => {
                                next = LoopState::AbortedTimeout;
                                break;
                            }
                        }
                    }
                    next
                }
                LoopState::Done(answer) => return Ok(answer),
                LoopState::AbortedTimeout => {
                    warn!(iterations, "tool loop hit the time budget");
                    return partial.ok_or_else(|| {
                        fail(format!(
                            "Request timed out after {}s",
                            self.config.time_budget.as_secs()
                        ))
                    });
                }
                LoopState::AbortedMaxIterations => {
                    warn!(iterations, "tool loop hit the iteration cap");
                    return partial.ok_or_else(|| fail("Tool loop did not converge".to_string()));
                }
            };
        }
    }
}

fn fail(message: String) -> ApiError {
    UPSTREAM_FAILURES.inc();
    error!(error = %message, "chat aborted without an answer");
    ApiError::Upstream(message)
}
