//! 运行主循环
//!
//! 每轮：Plan（planner，仅供参考）→ Act（actor，可多次 ToolDispatch）→ Critique（critic，可选）。
//! 每轮开始前按优先级检查终止条件：取消 → 超时 → token 预算 → 轮数上限。
//! 模型调用与取消信号、剩余时间赛跑；工具失败不终止运行，而是作为 Tool 消息交还给 actor。
//! run() 对普通运行结果永不返回错误，一律折叠为 RunResult。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;

use crate::config::EngineSection;
use crate::core::{
    EngineError, RunPhase, RunRequest, RunResult, RunStateMachine, RunStatus, RunUsage,
};
use crate::engine::critic::parse_verdict;
use crate::engine::prompt;
use crate::llm::{ModelRegistry, ModelResponse, ModelRole};
use crate::memory::{Message, SessionMemory, TokenEstimator};
use crate::observability::{event_types, EventDraft, ObservabilityEmitter, Severity, TraceContext};
use crate::tools::{ToolCall, ToolCallRecord, ToolExecutor, ToolResult};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful assistant that solves the user's request step by step. \
To call a tool, reply with JSON {\"name\": \"<tool>\", \"arguments\": {...}}. \
When you have the answer, reply with plain text.";

const REASON_CANCELLED: &str = "cancelled";
const REASON_TIMEOUT: &str = "timeout";
const REASON_TOKEN_BUDGET: &str = "token_budget";
const REASON_MAX_TURNS: &str = "max_turns";

/// 引擎配置（不含单次运行参数；max_turns / timeout 只用于构造默认 RunRequest）
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_turns: u32,
    pub timeout: Duration,
    /// 累计估算 token 超过该值时以 BUDGET_EXCEEDED 结束
    pub token_budget: Option<u64>,
    pub memory_max_tokens: usize,
    /// 单轮内 actor 因工具调用被重新调用的次数上限
    pub max_tool_rounds_per_turn: u32,
    /// 结束时额外调用一次 actor 获取面向用户的最终回答
    pub final_answer_call: bool,
    pub system_prompt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            timeout: Duration::from_secs(120),
            token_budget: None,
            memory_max_tokens: 4000,
            max_tool_rounds_per_turn: 16,
            final_answer_call: false,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_config(section: &EngineSection) -> Self {
        let system_prompt = if section.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT.to_string()
        } else {
            section.system_prompt.clone()
        };
        Self {
            max_turns: section.max_turns,
            timeout: Duration::from_millis(section.timeout_ms),
            token_budget: section.token_budget,
            memory_max_tokens: section.memory_max_tokens,
            max_tool_rounds_per_turn: section.max_tool_rounds_per_turn,
            final_answer_call: section.final_answer_call,
            system_prompt,
        }
    }

    /// 以配置的默认轮数与超时构造请求
    pub fn request(&self, input: impl Into<String>) -> RunRequest {
        RunRequest::new(input)
            .with_max_turns(self.max_turns)
            .with_timeout(self.timeout)
    }
}

/// run_with_log 的完整产出：结果 + 起止时间 + 工具调用日志
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub result: RunResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// 运行的终止结论；内部以 Err(Outcome) 短路
#[derive(Debug)]
struct Outcome {
    status: RunStatus,
    output: String,
    reason: Option<String>,
}

impl Outcome {
    fn success(output: String) -> Self {
        Self {
            status: RunStatus::Success,
            output,
            reason: None,
        }
    }

    fn halted(status: RunStatus, reason: &str) -> Self {
        Self {
            status,
            output: String::new(),
            reason: Some(reason.to_string()),
        }
    }
}

impl From<EngineError> for Outcome {
    fn from(e: EngineError) -> Self {
        Self {
            status: RunStatus::Failed,
            output: String::new(),
            reason: Some(e.reason()),
        }
    }
}

/// 单次运行的可变状态，只在该运行的任务内使用
struct RunCtx<'r> {
    request: &'r RunRequest,
    started: Instant,
    machine: RunStateMachine,
    memory: SessionMemory,
    usage: RunUsage,
    turns: u32,
    root: TraceContext,
    /// 当前轮的 span（轮之外为 root）
    span: TraceContext,
    last_output: String,
}

impl RunCtx<'_> {
    fn run_id(&self) -> &str {
        self.request.run_id()
    }

    fn remaining(&self) -> Duration {
        self.request.timeout().saturating_sub(self.started.elapsed())
    }

    fn timed_out(&self) -> bool {
        self.started.elapsed() >= self.request.timeout()
    }
}

pub struct RunEngine {
    models: ModelRegistry,
    executor: Arc<ToolExecutor>,
    emitter: Arc<ObservabilityEmitter>,
    config: EngineConfig,
    tool_catalog: String,
}

impl RunEngine {
    /// planner 与 actor 必须已注册；critic 可选
    pub fn new(
        models: ModelRegistry,
        executor: Arc<ToolExecutor>,
        emitter: Arc<ObservabilityEmitter>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        models.require(ModelRole::Planner)?;
        models.require(ModelRole::Actor)?;
        let tool_catalog = if executor.registry().is_empty() {
            String::new()
        } else {
            executor.registry().to_catalog_json()
        };
        Ok(Self {
            models,
            executor,
            emitter,
            config,
            tool_catalog,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub fn emitter(&self) -> &Arc<ObservabilityEmitter> {
        &self.emitter
    }

    pub async fn run(&self, request: &RunRequest) -> RunResult {
        self.run_with_log(request).await.result
    }

    pub async fn run_with_log(&self, request: &RunRequest) -> RunReport {
        let started_at = Utc::now();
        let run_id = request.run_id();
        self.executor
            .begin_run(run_id, request.policy_overrides().cloned());

        let root = TraceContext::root();
        let mut ctx = RunCtx {
            request,
            started: Instant::now(),
            machine: RunStateMachine::new(),
            memory: SessionMemory::new(self.config.memory_max_tokens),
            usage: RunUsage::default(),
            turns: 0,
            span: root.clone(),
            root,
            last_output: String::new(),
        };

        tracing::info!(run_id, max_turns = request.max_turns(), "run started");
        self.emitter.emit(
            EventDraft::new(run_id, event_types::RUN_STARTED)
                .trace(&ctx.root)
                .attr("input", request.input())
                .attr("max_turns", request.max_turns())
                .attr("timeout_ms", request.timeout().as_millis() as u64)
                .attr("scopes", json!(request.scopes())),
        );

        let outcome = self.drive(&mut ctx).await.unwrap_or_else(|halt| halt);
        let outcome = self.final_answer(&mut ctx, outcome).await;
        let result = self.finish(&mut ctx, outcome);
        let tool_calls = self.executor.finish_run(run_id);

        RunReport {
            result,
            started_at,
            finished_at: Utc::now(),
            tool_calls,
        }
    }

    async fn drive(&self, ctx: &mut RunCtx<'_>) -> Result<Outcome, Outcome> {
        let request = ctx.request;
        ctx.memory.push(Message::user(request.input()));

        loop {
            self.check_limits(ctx)?;
            ctx.turns += 1;
            ctx.span = ctx.root.child();
            self.transition(ctx, RunPhase::Plan)?;
            self.emitter.emit(
                EventDraft::new(request.run_id(), event_types::TURN_STARTED)
                    .trace(&ctx.span)
                    .attr("turn", ctx.turns),
            );

            let plan_messages =
                prompt::planner_messages(&self.config.system_prompt, &ctx.memory.messages());
            let plan = self
                .call_model(ctx, ModelRole::Planner, plan_messages)
                .await?;

            self.transition(ctx, RunPhase::Act)?;
            let answer = self.act(ctx, &plan.text).await?;
            ctx.last_output = answer.clone();

            if !self.models.has_critic() {
                self.finish_turn(ctx, None);
                return Ok(Outcome::success(answer));
            }

            self.transition(ctx, RunPhase::Critique)?;
            let critic_messages = prompt::critic_messages(request.input(), &answer);
            let response = self
                .call_model(ctx, ModelRole::Critic, critic_messages)
                .await?;
            let verdict = parse_verdict(&response.text);
            self.emitter.emit(
                EventDraft::new(request.run_id(), event_types::CRITIC_VERDICT)
                    .trace(&ctx.span)
                    .attr("turn", ctx.turns)
                    .attr("approved", verdict.approved)
                    .attr("parsed", verdict.parsed)
                    .attr("reason", verdict.reason.clone()),
            );
            self.finish_turn(ctx, Some(verdict.approved));

            if verdict.approved {
                return Ok(Outcome::success(answer));
            }
            ctx.memory
                .push(Message::user(format!("Critic feedback: {}", verdict.reason)));
        }
    }

    /// actor 阶段：有工具调用就派发并重新调用 actor，直到回复不再携带工具调用
    async fn act(&self, ctx: &mut RunCtx<'_>, plan: &str) -> Result<String, Outcome> {
        let mut rounds = 0u32;
        loop {
            let messages = prompt::actor_messages(
                &self.config.system_prompt,
                &self.tool_catalog,
                plan,
                &ctx.memory.messages(),
            );
            let response = self.call_model(ctx, ModelRole::Actor, messages).await?;
            if !response.text.trim().is_empty() {
                ctx.memory.push(Message::assistant(response.text.clone()));
            }
            if response.tool_calls.is_empty() {
                return Ok(response.text);
            }
            if rounds >= self.config.max_tool_rounds_per_turn {
                tracing::warn!(
                    run_id = ctx.run_id(),
                    rounds,
                    "tool round cap reached, moving on with last actor text"
                );
                return Ok(response.text);
            }
            rounds += 1;

            self.transition(ctx, RunPhase::ToolDispatch)?;
            for call in response.tool_calls {
                self.check_interrupt(ctx)?;
                self.dispatch(ctx, call).await;
            }
            self.check_interrupt(ctx)?;
            self.transition(ctx, RunPhase::Act)?;
        }
    }

    /// 派发单个工具调用：绑定 run_id 与请求授予的 scopes，等待时间不超过剩余运行时间
    async fn dispatch(&self, ctx: &mut RunCtx<'_>, call: ToolCall) -> ToolResult {
        let request = ctx.request;
        let wait = call
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.executor.policy().default_timeout)
            .min(ctx.remaining())
            .max(Duration::from_millis(1));
        let call = ToolCall {
            run_id: request.run_id().to_string(),
            scopes: request.scopes().to_vec(),
            timeout_ms: Some(wait.as_millis() as u64),
            ..call
        };

        let result = self.executor.execute_traced(&call, Some(&ctx.span)).await;
        ctx.usage.tool_calls += 1;
        if !result.is_success() {
            ctx.usage.tool_failures += 1;
        }
        ctx.memory
            .push(Message::tool(call.name.as_str(), result.to_observation()));
        result
    }

    /// 调用模型，与取消信号和剩余运行时间赛跑
    async fn call_model(
        &self,
        ctx: &mut RunCtx<'_>,
        role: ModelRole,
        messages: Vec<Message>,
    ) -> Result<ModelResponse, Outcome> {
        let request = ctx.request;
        let provider = self.models.require(role)?;
        let span = ctx.span.child();
        self.emitter.emit(
            EventDraft::new(request.run_id(), event_types::MODEL_CALL_STARTED)
                .trace(&span)
                .attr("role", role.as_str())
                .attr("provider", provider.name())
                .attr("messages", messages.len()),
        );

        let start = Instant::now();
        let remaining = ctx.remaining();
        let outcome = tokio::select! {
            biased;
            _ = request.cancel_token().cancelled() => {
                Err(Outcome::halted(RunStatus::Cancelled, REASON_CANCELLED))
            }
            generated = timeout(remaining, provider.generate(&messages, role)) => match generated {
                Err(_) => Err(Outcome::halted(RunStatus::Timeout, REASON_TIMEOUT)),
                Ok(Err(e)) => Err(Outcome::from(EngineError::Model {
                    role,
                    message: e.to_string(),
                })),
                Ok(Ok(response)) => Ok(response),
            },
        };
        ctx.usage.model_calls += 1;

        let mut finished = EventDraft::new(request.run_id(), event_types::MODEL_CALL_FINISHED)
            .trace(&span)
            .attr("role", role.as_str())
            .attr("duration_ms", start.elapsed().as_millis() as u64);
        match &outcome {
            Ok(response) => {
                let tokens = TokenEstimator::estimate(&response.text) as u64;
                ctx.usage.tokens += tokens;
                finished = finished
                    .attr("tokens", tokens)
                    .attr("tool_calls", response.tool_calls.len())
                    .attr("text", response.text.clone());
            }
            Err(halt) => {
                tracing::warn!(run_id = request.run_id(), role = role.as_str(), reason = ?halt.reason, "model call halted");
                finished = finished
                    .severity(Severity::Warn)
                    .attr("status", halt.status.as_str())
                    .attr("reason", halt.reason.clone());
            }
        }
        self.emitter.emit(finished);
        outcome
    }

    /// 每轮开始前的终止检查，按优先级：取消 → 超时 → token 预算 → 轮数上限
    fn check_limits(&self, ctx: &RunCtx<'_>) -> Result<(), Outcome> {
        self.check_interrupt(ctx)?;
        if let Some(budget) = self.config.token_budget {
            if ctx.usage.tokens > budget {
                return Err(Outcome::halted(RunStatus::BudgetExceeded, REASON_TOKEN_BUDGET));
            }
        }
        if ctx.turns >= ctx.request.max_turns() {
            return Err(Outcome {
                status: RunStatus::Failed,
                output: ctx.last_output.clone(),
                reason: Some(REASON_MAX_TURNS.to_string()),
            });
        }
        Ok(())
    }

    fn check_interrupt(&self, ctx: &RunCtx<'_>) -> Result<(), Outcome> {
        if ctx.request.cancel_token().is_cancelled() {
            return Err(Outcome::halted(RunStatus::Cancelled, REASON_CANCELLED));
        }
        if ctx.timed_out() {
            return Err(Outcome::halted(RunStatus::Timeout, REASON_TIMEOUT));
        }
        Ok(())
    }

    /// 成功或轮数耗尽时可选地再调用一次 actor 取最终回答；失败时保留原输出
    async fn final_answer(&self, ctx: &mut RunCtx<'_>, outcome: Outcome) -> Outcome {
        let eligible = outcome.status == RunStatus::Success
            || outcome.reason.as_deref() == Some(REASON_MAX_TURNS);
        if !self.config.final_answer_call || !eligible {
            return outcome;
        }
        let messages =
            prompt::final_answer_messages(&self.config.system_prompt, &ctx.memory.messages());
        match self.call_model(ctx, ModelRole::Actor, messages).await {
            Ok(response) if !response.text.trim().is_empty() => Outcome {
                output: response.text,
                ..outcome
            },
            Ok(_) => outcome,
            Err(halt) => {
                tracing::warn!(run_id = ctx.run_id(), reason = ?halt.reason, "final answer call failed, keeping last output");
                outcome
            }
        }
    }

    fn transition(&self, ctx: &mut RunCtx<'_>, to: RunPhase) -> Result<(), EngineError> {
        let from = ctx.machine.transition(to)?;
        self.emitter.emit(
            EventDraft::new(ctx.run_id(), event_types::RUN_STATE_CHANGED)
                .trace(&ctx.span)
                .attr("from", from.as_str())
                .attr("to", to.as_str())
                .attr("turn", ctx.turns),
        );
        Ok(())
    }

    fn finish_turn(&self, ctx: &RunCtx<'_>, approved: Option<bool>) {
        self.emitter.emit(
            EventDraft::new(ctx.run_id(), event_types::TURN_FINISHED)
                .trace(&ctx.span)
                .attr("turn", ctx.turns)
                .attr("approved", approved),
        );
    }

    fn finish(&self, ctx: &mut RunCtx<'_>, outcome: Outcome) -> RunResult {
        ctx.span = ctx.root.clone();
        if let Err(e) = self.transition(ctx, outcome.status.phase()) {
            tracing::warn!(run_id = ctx.run_id(), error = %e, "terminal transition rejected");
        }
        let output = if outcome.output.is_empty() {
            ctx.last_output.clone()
        } else {
            outcome.output
        };
        let result = RunResult {
            run_id: ctx.run_id().to_string(),
            status: outcome.status,
            output,
            turns: ctx.turns,
            reason: outcome.reason,
            usage: ctx.usage.clone(),
        };

        self.emitter.emit(
            EventDraft::new(ctx.run_id(), event_types::RUN_FINISHED)
                .trace(&ctx.root)
                .attr("status", result.status.as_str())
                .attr("turns", result.turns)
                .attr("reason", result.reason.clone())
                .attr("output", result.output.clone())
                .attr("usage", json!(result.usage)),
        );
        tracing::info!(
            run_id = ctx.run_id(),
            status = result.status.as_str(),
            turns = result.turns,
            "run finished"
        );
        result
    }
}
