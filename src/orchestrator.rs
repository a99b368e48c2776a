//! Conversation orchestrator: drives one chat turn through an explicit
//! finite-state machine.
//!
//! The FSM makes the turn contract mechanical: the generic retry fires
//! exactly once, the identity retry is scoped to account-not-found
//! failures, and the assignment repair round runs at most once. Each
//! state has one transition method; `run_turn` loops until `Respond`.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::connections::{self, ConnectionSnapshot, ConnectionStatus};
use crate::intent::{self, CourseMap, Intent};
use crate::model::{
    CompletionRequest, ContentBlock, ModelClient, ModelMessage, ModelResponse, ToolDefinition,
};
use crate::policy;
use crate::provider::{
    execute_tool_calls, is_missing_account_error, CapabilityProvider,
};

/// How the tool catalog is assembled for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolRouting {
    /// Union of the bundles of every connected service.
    #[default]
    Capability,
    /// Single service chosen by the intent router.
    Intent,
}

/// Tunables threaded in from config.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model_name: String,
    pub max_tokens: u32,
    pub followup_max_tokens: u32,
    pub default_user_id: String,
    pub timezone: Tz,
    pub routing: ToolRouting,
}

/// One incoming chat turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub user_message: String,
    pub conversation_history: Vec<ModelMessage>,
}

/// The finished turn handed back to the gateway.
#[derive(Debug)]
pub struct TurnOutcome {
    pub result: ModelResponse,
    pub tool_results: Vec<ModelMessage>,
    pub connection_status: ConnectionStatus,
    pub no_data: bool,
}

/// FSM states. `Respond` is terminal and carries the reply.
enum TurnState {
    FirstCall,
    RetryCall,
    ExecuteTools,
    FollowupCall,
    Respond(ModelResponse),
}

/// Mutable per-turn state accumulated across transitions.
struct TurnContext {
    user_id: String,
    system: String,
    /// History + the new user message (+ any context note / nudge).
    transcript: Vec<ModelMessage>,
    tools: Vec<ToolDefinition>,
    intent: Intent,
    snapshot: ConnectionSnapshot,
    response: Option<ModelResponse>,
    tool_results: Vec<ModelMessage>,
    retried: bool,
    repair_used: bool,
    no_data: bool,
}

impl TurnContext {
    /// The latest model response. First_call runs before every state
    /// that reads this, so the slot is always populated.
    fn response(&self) -> &ModelResponse {
        self.response
            .as_ref()
            .expect("response set by the first-call state")
    }
}

pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    provider: Arc<dyn CapabilityProvider>,
    courses: CourseMap,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        provider: Arc<dyn CapabilityProvider>,
        courses: CourseMap,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            model,
            provider,
            courses,
            settings,
        }
    }

    /// Run one turn to completion.
    pub async fn run_turn(&self, request: &ChatRequest) -> anyhow::Result<TurnOutcome> {
        let user_id = request
            .user_id
            .clone()
            .unwrap_or_else(|| self.settings.default_user_id.clone());

        let snapshot = self.resolve_connections(&user_id).await?;
        let intent = intent::classify(&request.user_message, &self.courses);
        debug!(
            user = %user_id,
            service = ?intent.service,
            assignment = intent.is_assignment_question,
            course = ?intent.course,
            "turn classified"
        );

        let tools = match self.settings.routing {
            ToolRouting::Capability => {
                catalog::load_tools(
                    self.provider.as_ref(),
                    &user_id,
                    &self.settings.default_user_id,
                    &snapshot,
                )
                .await
            }
            ToolRouting::Intent => {
                catalog::load_tools_routed(
                    self.provider.as_ref(),
                    &user_id,
                    &self.settings.default_user_id,
                    &snapshot,
                    intent.service,
                    &request.user_message,
                )
                .await
            }
        };

        let now = Utc::now().with_timezone(&self.settings.timezone);
        let system = policy::system_prompt(
            &now.format("%B %-d, %Y").to_string(),
            self.settings.timezone.name(),
        );

        let mut transcript = request.conversation_history.clone();
        transcript.push(ModelMessage::user(request.user_message.clone()));
        if let Some(note) =
            intent::followup_note(&request.conversation_history, &request.user_message)
        {
            debug!("attaching follow-up context note");
            transcript.push(ModelMessage::user(note));
        }

        let mut ctx = TurnContext {
            user_id,
            system,
            transcript,
            tools,
            intent,
            snapshot,
            response: None,
            tool_results: Vec::new(),
            retried: false,
            repair_used: false,
            no_data: false,
        };

        let mut state = TurnState::FirstCall;
        loop {
            state = match state {
                TurnState::FirstCall => self.first_call(&mut ctx).await?,
                TurnState::RetryCall => self.retry_call(&mut ctx).await?,
                TurnState::ExecuteTools => self.execute_tools(&mut ctx).await?,
                TurnState::FollowupCall => self.followup_call(&mut ctx).await?,
                TurnState::Respond(result) => {
                    return Ok(TurnOutcome {
                        result,
                        tool_results: ctx.tool_results,
                        connection_status: ctx.snapshot.status,
                        no_data: ctx.no_data,
                    });
                }
            };
        }
    }

    /// List connections and resolve the snapshot. A listing failure
    /// carrying the missing-account signature degrades to an empty
    /// snapshot; any other failure is fatal for the turn.
    async fn resolve_connections(&self, user_id: &str) -> anyhow::Result<ConnectionSnapshot> {
        let items = match self.provider.list_connections().await {
            Ok(items) => items,
            Err(e) if is_missing_account_error(&e) => {
                info!("provider reports no connected accounts");
                Vec::new()
            }
            Err(e) => return Err(e.context("failed to list connected accounts")),
        };
        let snapshot = connections::resolve(&items, user_id);
        debug!(
            total = snapshot.total_listed,
            connected = snapshot.connected().len(),
            matched_exactly = snapshot.matched_exactly,
            "connections resolved"
        );
        Ok(snapshot)
    }

    fn completion(&self, ctx: &TurnContext, with_tools: bool, max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model_name.clone(),
            system: Some(ctx.system.clone()),
            messages: ctx.transcript.clone(),
            tools: if with_tools { ctx.tools.clone() } else { Vec::new() },
            max_tokens,
        }
    }

    /// FIRST_CALL: one completion over the transcript, tools attached
    /// only when the catalog produced any.
    async fn first_call(&self, ctx: &mut TurnContext) -> anyhow::Result<TurnState> {
        let request = self.completion(ctx, true, self.settings.max_tokens);
        let response = self.model.complete(&request).await?;
        debug!(
            has_tool_use = response.has_tool_use(),
            stop_reason = ?response.stop_reason,
            "first response received"
        );

        let needs_retry = !ctx.tools.is_empty()
            && (!response.has_tool_use() || policy::is_trivial(response.first_text()));
        ctx.response = Some(response);

        if needs_retry {
            Ok(TurnState::RetryCall)
        } else {
            Ok(TurnState::ExecuteTools)
        }
    }

    /// RETRY_CALL: the single generic retry. Appends the nudge and
    /// repeats the tool-bearing completion.
    async fn retry_call(&self, ctx: &mut TurnContext) -> anyhow::Result<TurnState> {
        // One retry only; the FSM never routes back here.
        debug_assert!(!ctx.retried);
        ctx.retried = true;
        warn!("first response unusable, forcing one retry");

        ctx.transcript.push(ModelMessage::user(policy::RETRY_NUDGE));
        let request = self.completion(ctx, true, self.settings.max_tokens);
        let response = self.model.complete(&request).await?;
        debug!(has_tool_use = response.has_tool_use(), "retry response received");
        ctx.response = Some(response);
        Ok(TurnState::ExecuteTools)
    }

    /// EXECUTE_TOOLS: run the tool_use blocks, or fall through to a
    /// deterministic fallback / no-data round when there is nothing to
    /// run.
    async fn execute_tools(&self, ctx: &mut TurnContext) -> anyhow::Result<TurnState> {
        if ctx.tools.is_empty() {
            return Ok(TurnState::Respond(self.disconnected_fallback(ctx)));
        }
        if !ctx.response().has_tool_use() {
            return self.degraded(ctx);
        }

        let results = self
            .execute_with_identity_retry(&ctx.user_id, ctx.response())
            .await;
        ctx.tool_results = results;
        if ctx.tool_results.is_empty() {
            return self.degraded(ctx);
        }
        Ok(TurnState::FollowupCall)
    }

    /// FOLLOWUP_CALL: the formatting round over executed tool results,
    /// preceded by at most one assignment repair round. Also hosts the
    /// no-data round for assignment turns that produced nothing.
    async fn followup_call(&self, ctx: &mut TurnContext) -> anyhow::Result<TurnState> {
        if ctx.no_data {
            ctx.transcript.push(ModelMessage::user(
                "No assignment data could be loaded for this request. Tell the user \
                 plainly that you could not find their assignments right now. Do not \
                 invent any assignment, due date, or course detail.",
            ));
            let request = self.completion(ctx, false, self.settings.followup_max_tokens);
            let response = self.model.complete(&request).await?;
            return Ok(TurnState::Respond(response));
        }

        if self.needs_assignment_repair(ctx) {
            self.repair_assignments(ctx).await;
        }

        let mut messages = ctx.transcript.clone();
        messages.push(ModelMessage::assistant_blocks(
            ctx.response().content.clone(),
        ));
        messages.extend(ctx.tool_results.iter().cloned());

        let request = CompletionRequest {
            model: self.settings.model_name.clone(),
            system: Some(ctx.system.clone()),
            messages,
            tools: Vec::new(),
            max_tokens: self.settings.followup_max_tokens,
        };
        let response = self.model.complete(&request).await?;
        debug!("follow-up response received");
        Ok(TurnState::Respond(response))
    }

    /// An assignment question that fetched a course list but no
    /// assignment data gets one forced fetch for the detected course.
    fn needs_assignment_repair(&self, ctx: &TurnContext) -> bool {
        ctx.intent.is_assignment_question
            && !ctx.repair_used
            && ctx.intent.course.is_some()
            && ctx
                .response()
                .tool_uses()
                .any(|(_, name, _)| name.contains("LIST_COURSES"))
            && !policy::has_assignment_markers(&ctx.tool_results)
    }

    async fn repair_assignments(&self, ctx: &mut TurnContext) {
        ctx.repair_used = true;
        let course = match &ctx.intent.course {
            Some(c) => c.clone(),
            None => return,
        };
        info!(course_id = course.course_id, "forcing assignment fetch round");

        let args = json!({ "course_id": course.course_id });
        let fetched = match self
            .provider
            .execute_tool(&ctx.user_id, "CANVAS_GET_ALL_ASSIGNMENTS", &args)
            .await
        {
            Ok(v) => v,
            Err(e) if is_missing_account_error(&e)
                && ctx.user_id != self.settings.default_user_id =>
            {
                warn!(error = %e, "assignment fetch retrying with default identity");
                match self
                    .provider
                    .execute_tool(&self.settings.default_user_id, "CANVAS_GET_ALL_ASSIGNMENTS", &args)
                    .await
                {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "assignment repair failed, continuing without");
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "assignment repair failed, continuing without");
                return;
            }
        };

        // Synthesized tool exchange so the formatting round sees the
        // assignments alongside the course list.
        let call_id = "forced_assignment_fetch";
        ctx.tool_results.push(ModelMessage::assistant_blocks(vec![
            ContentBlock::ToolUse {
                id: call_id.to_string(),
                name: "CANVAS_GET_ALL_ASSIGNMENTS".to_string(),
                input: args,
            },
        ]));
        ctx.tool_results
            .push(ModelMessage::user_blocks(vec![ContentBlock::ToolResult {
                tool_use_id: call_id.to_string(),
                content: fetched,
            }]));
    }

    /// Run every tool_use block, retrying once under the default
    /// identity when the provider reports no connected account and the
    /// identities actually differ. Failures degrade to zero results.
    async fn execute_with_identity_retry(
        &self,
        user_id: &str,
        response: &ModelResponse,
    ) -> Vec<ModelMessage> {
        match execute_tool_calls(self.provider.as_ref(), user_id, response).await {
            Ok(results) => results,
            Err(e)
                if is_missing_account_error(&e)
                    && user_id != self.settings.default_user_id =>
            {
                warn!(error = %e, "tool execution retrying with default identity");
                match execute_tool_calls(
                    self.provider.as_ref(),
                    &self.settings.default_user_id,
                    response,
                )
                .await
                {
                    Ok(results) => results,
                    Err(e) => {
                        warn!(error = %e, "tool execution failed with default identity");
                        Vec::new()
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "tool execution failed");
                Vec::new()
            }
        }
    }

    /// Tools were offered but nothing executed. Assignment questions get
    /// the no-data round; everything else gets the generic retry
    /// suggestion.
    fn degraded(&self, ctx: &mut TurnContext) -> anyhow::Result<TurnState> {
        if ctx.intent.is_assignment_question {
            ctx.no_data = true;
            return Ok(TurnState::FollowupCall);
        }
        Ok(TurnState::Respond(ModelResponse::from_text(
            "Hmm, I could not load that right now. Try reconnecting your account, \
             then ask me again.",
        )))
    }

    /// Deterministic reply when no tools could be offered at all.
    fn disconnected_fallback(&self, ctx: &TurnContext) -> ModelResponse {
        let missing = ctx.snapshot.disconnected();
        if missing.is_empty() {
            return ModelResponse::from_text(
                "I could not load your data right now. Try reconnecting your account \
                 and ask me again.",
            );
        }
        let lines: Vec<String> = missing
            .iter()
            .map(|s| format!("\u{2022} {} not connected", s.display_name()))
            .collect();
        ModelResponse::from_text(format!(
            "Looks like I need access first:\n{}\n\nTap the matching Connect button \
             above, then ask me again.",
            lines.join("\n")
        ))
    }
}
