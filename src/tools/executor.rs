//! 工具执行器
//!
//! 所有 ToolCall 到达工具后端的唯一入口。按顺序执行策略流水线，遇到第一个违规即短路：
//!
//! 1. 查找工具（未注册 → PolicyViolation）
//! 2. 白名单 / 黑名单
//! 3. scopes 必须覆盖契约要求
//! 4. 只读模式拒绝 WRITE 工具（以及 CallKey 幂等缺少 key）
//! 5. 路径参数必须落在契约声明的前缀之下
//! 6. 输入 schema 校验（INVALID_INPUT，不是异常）
//! 7. 每次运行的调用预算（超出 → BudgetExceeded，不转发给后端）
//! 8. 带超时执行（超时 → TIMEOUT；后端错误 → FAILURE + 后端错误类别）
//! 9. 输出 schema 校验（ToolResultInvalid）
//! 10. 始终发出 tool.call.started / tool.call.finished 事件对，并记入该运行的调用日志；
//!     emitter 的脱敏开启或契约涉及敏感数据时，参数 / 输出记为 `<redacted>`
//!
//! 超时语义：超时后执行器丢弃后端 future，异步后端在下一个 await 点即被取消；
//! 后端若把工作交给 spawn_blocking 或独立任务，那部分工作不会被中断。
//!
//! 预算计数、幂等缓存、运行级策略覆盖与调用日志都按 run_id 隔离，finish_run 时清除。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::observability::{
    event_types, EventDraft, ObservabilityEmitter, Severity, TraceContext, REDACTED,
};
use crate::tools::schema::validate;
use crate::tools::{
    Idempotency, PathSandbox, PolicyOverrides, RiskLevel, ToolCall, ToolCallRecord, ToolContract,
    ToolErrorKind, ToolPolicy, ToolProvider, ToolRegistry, ToolResult,
};

/// 幂等缓存条目：成功结果 + 该调用写入的路径
struct CachedCall {
    result: ToolResult,
    paths: Vec<PathBuf>,
}

/// 单次运行在执行器内的账本
#[derive(Default)]
struct RunLedger {
    overrides: Option<PolicyOverrides>,
    executed: usize,
    /// (工具名, 幂等 key) → 成功结果
    idempotent: HashMap<(String, String), CachedCall>,
    log: Vec<ToolCallRecord>,
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    policy: ToolPolicy,
    sandbox: PathSandbox,
    emitter: Arc<ObservabilityEmitter>,
    runs: Mutex<HashMap<String, RunLedger>>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: ToolPolicy,
        emitter: Arc<ObservabilityEmitter>,
    ) -> Self {
        let sandbox = PathSandbox::new(&policy.workspace_root);
        Self {
            registry,
            policy,
            sandbox,
            emitter,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &ToolPolicy {
        &self.policy
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<String, RunLedger>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 为 run_id 建立新账本（覆盖同名旧账本）并安装运行级策略覆盖
    pub fn begin_run(&self, run_id: &str, overrides: Option<PolicyOverrides>) {
        self.runs().insert(
            run_id.to_string(),
            RunLedger {
                overrides,
                ..RunLedger::default()
            },
        );
    }

    /// 退役 run_id：清除预算计数、幂等缓存与覆盖项，返回该运行的调用日志
    pub fn finish_run(&self, run_id: &str) -> Vec<ToolCallRecord> {
        self.runs()
            .remove(run_id)
            .map(|ledger| ledger.log)
            .unwrap_or_default()
    }

    /// 该运行已转发给后端的调用数
    pub fn calls_executed(&self, run_id: &str) -> usize {
        self.runs().get(run_id).map(|l| l.executed).unwrap_or(0)
    }

    /// 该运行到目前为止的调用日志（不移除）
    pub fn call_log(&self, run_id: &str) -> Vec<ToolCallRecord> {
        self.runs()
            .get(run_id)
            .map(|l| l.log.clone())
            .unwrap_or_default()
    }

    /// 叠加运行级覆盖后的有效策略
    pub fn effective_policy(&self, run_id: &str) -> ToolPolicy {
        let runs = self.runs();
        let overrides = runs.get(run_id).and_then(|l| l.overrides.as_ref());
        self.policy.with_overrides(overrides)
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        self.execute_traced(call, None).await
    }

    /// 执行一次调用；parent 为调用方的追踪上下文，工具调用使用其子 span
    pub async fn execute_traced(&self, call: &ToolCall, parent: Option<&TraceContext>) -> ToolResult {
        let span = parent.map(TraceContext::child).unwrap_or_else(TraceContext::root);
        // 观测层全局脱敏开启时，工具参数 / 输出整体替换
        let redact = self.emitter.redactor().is_enabled()
            || self
                .registry
                .contract(&call.name)
                .is_some_and(ToolContract::handles_sensitive_data);

        self.emitter.emit(
            EventDraft::new(&call.run_id, event_types::TOOL_CALL_STARTED)
                .trace(&span)
                .attr("tool", call.name.clone())
                .attr("arguments", self.payload(&call.arguments, redact))
                .attr("scopes", json!(call.scopes)),
        );

        let start = Instant::now();
        let result = self.run_pipeline(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut finished = EventDraft::new(&call.run_id, event_types::TOOL_CALL_FINISHED)
            .trace(&span)
            .attr("tool", call.name.clone())
            .attr("status", result.status.as_str())
            .attr("output", self.payload(&result.output, redact))
            .attr("duration_ms", duration_ms);
        if let Some(ref err) = result.error {
            finished = finished
                .severity(Severity::Warn)
                .attr("error_kind", err.kind.as_str())
                .attr("error_message", err.message.clone())
                .attr("error_source", err.source.clone());
        }
        self.emitter.emit(finished);

        tracing::info!(
            run_id = %call.run_id,
            tool = %call.name,
            status = result.status.as_str(),
            duration_ms,
            "tool call"
        );
        self.record(call, &result, redact);
        result
    }

    async fn run_pipeline(&self, call: &ToolCall) -> ToolResult {
        let Some((provider, contract)) = self.registry.lookup(&call.name) else {
            return ToolResult::policy_violation(format!("unknown tool '{}'", call.name));
        };
        let policy = self.effective_policy(&call.run_id);

        if let Err(reason) = policy.check_allowed(&call.name) {
            return ToolResult::policy_violation(reason);
        }

        let missing: Vec<&str> = contract
            .required_scopes()
            .iter()
            .filter(|s| !call.scopes.contains(s))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return ToolResult::policy_violation(format!(
                "tool '{}' requires scopes: {}",
                call.name,
                missing.join(", ")
            ));
        }

        if policy.read_only && contract.risk() == RiskLevel::Write {
            return ToolResult::policy_violation(format!(
                "executor is read-only; '{}' is a WRITE tool",
                call.name
            ));
        }
        if matches!(contract.idempotency(), Some(Idempotency::CallKey))
            && call.idempotency_key.is_none()
        {
            return ToolResult::policy_violation(format!(
                "tool '{}' requires an idempotency key",
                call.name
            ));
        }

        if let Err(reason) = self
            .sandbox
            .check_arguments(&call.arguments, contract.permitted_paths())
        {
            return ToolResult::policy_violation(reason);
        }

        if let Err(errors) = validate(contract.input_schema(), &call.arguments) {
            return ToolResult::invalid_input(errors.join("; "));
        }

        let idempotency_key = contract.idempotency_key(call);
        if let Some(ref key) = idempotency_key {
            if let Some(cached) = self.cached(&call.run_id, &call.name, key) {
                tracing::debug!(run_id = %call.run_id, tool = %call.name, "idempotent replay");
                return cached;
            }
        }

        if let Err(exhausted) = self.consume_budget(&call.run_id, policy.max_tool_calls) {
            return exhausted;
        }

        let deadline = call
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(policy.default_timeout);
        let result = self.dispatch(provider.as_ref(), contract, call, deadline).await;

        if result.is_success() {
            self.remember(call, contract, idempotency_key, &result);
        }
        result
    }

    /// 成功的 WRITE 调用使写过同一路径的缓存条目失效，再缓存本次结果
    fn remember(
        &self,
        call: &ToolCall,
        contract: &ToolContract,
        idempotency_key: Option<String>,
        result: &ToolResult,
    ) {
        let paths = if contract.risk() == RiskLevel::Write {
            self.sandbox.resolved_paths(&call.arguments)
        } else {
            Vec::new()
        };
        let mut runs = self.runs();
        let ledger = runs.entry(call.run_id.clone()).or_default();
        if !paths.is_empty() {
            ledger
                .idempotent
                .retain(|_, cached| !cached.paths.iter().any(|p| paths.contains(p)));
        }
        if let Some(key) = idempotency_key {
            ledger.idempotent.insert(
                (call.name.clone(), key),
                CachedCall {
                    result: result.clone(),
                    paths,
                },
            );
        }
    }

    async fn dispatch(
        &self,
        provider: &dyn ToolProvider,
        contract: &ToolContract,
        call: &ToolCall,
        deadline: Duration,
    ) -> ToolResult {
        match timeout(deadline, provider.execute(&call.name, &call.arguments)).await {
            Err(_) => ToolResult::timeout(format!(
                "tool '{}' exceeded {}ms",
                call.name,
                deadline.as_millis()
            )),
            Ok(Err(e)) => ToolResult::failure(ToolErrorKind::Provider(e.kind), e.message, "provider"),
            Ok(Ok(output)) => match contract.output_schema() {
                Some(schema) => match validate(schema, &output) {
                    Ok(()) => ToolResult::success(output),
                    Err(errors) => ToolResult::failure(
                        ToolErrorKind::ToolResultInvalid,
                        errors.join("; "),
                        "schema",
                    ),
                },
                None => ToolResult::success(output),
            },
        }
    }

    fn cached(&self, run_id: &str, tool: &str, key: &str) -> Option<ToolResult> {
        self.runs()
            .get(run_id)?
            .idempotent
            .get(&(tool.to_string(), key.to_string()))
            .map(|cached| cached.result.clone())
    }

    /// 预算检查并计数；耗尽时返回 BudgetExceeded 结果
    fn consume_budget(&self, run_id: &str, max_tool_calls: Option<usize>) -> Result<(), ToolResult> {
        let mut runs = self.runs();
        let ledger = runs.entry(run_id.to_string()).or_default();
        if let Some(max) = max_tool_calls {
            if ledger.executed >= max {
                return Err(ToolResult::failure(
                    ToolErrorKind::BudgetExceeded,
                    format!("tool call budget of {max} exhausted for run"),
                    "budget",
                ));
            }
        }
        ledger.executed += 1;
        Ok(())
    }

    fn payload(&self, value: &Value, redact: bool) -> Value {
        if redact {
            return Value::String(REDACTED.to_string());
        }
        let mut v = value.clone();
        self.emitter.redactor().redact_value(&mut v);
        v
    }

    fn record(&self, call: &ToolCall, result: &ToolResult, redact: bool) {
        let arguments = self.payload(&call.arguments, redact);
        let output = self.payload(&result.output, redact);
        let mut runs = self.runs();
        let ledger = runs.entry(call.run_id.clone()).or_default();
        let seq = ledger.log.len() as u64 + 1;
        ledger.log.push(ToolCallRecord {
            seq,
            run_id: call.run_id.clone(),
            tool: call.name.clone(),
            arguments,
            status: result.status,
            output,
            error: result.error.clone(),
        });
    }
}
