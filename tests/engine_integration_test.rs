//! 运行引擎集成测试：终止条件、工具失败回灌、scopes / 策略覆盖、事件流

mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use hive::core::{RunRequest, RunStatus};
    use hive::engine::EngineConfig;
    use hive::llm::{EchoModel, ModelError, ModelRegistry, ModelResponse, ModelRole, ScriptedModel};
    use hive::memory::Role;
    use hive::tools::{PolicyOverrides, ToolCall, ToolPolicy, ToolStatus};

    use super::common::{event_types, harness, LOOKUP_SCOPE};

    fn without_critic(model: &Arc<ScriptedModel>) -> ModelRegistry {
        ModelRegistry::new()
            .with(ModelRole::Planner, model.clone())
            .with(ModelRole::Actor, model.clone())
    }

    fn tool_then(text: &str, call: ToolCall) -> ModelResponse {
        ModelResponse::text(text).with_tool_call(call)
    }

    #[tokio::test]
    async fn test_critic_rejecting_every_turn_hits_max_turns() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("try again"))
                .fallback(ModelRole::Actor, ModelResponse::text("draft answer"))
                .fallback(ModelRole::Critic, ModelResponse::text("NO | not good enough")),
        );
        let h = harness(
            ModelRegistry::single(model.clone()),
            ToolPolicy::default(),
            EngineConfig::default(),
        );

        let request = RunRequest::new("question").with_max_turns(3);
        let result = h.engine.run(&request).await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.reason.as_deref(), Some("max_turns"));
        assert_eq!(result.turns, 3);
        assert_eq!(result.output, "draft answer");
        assert_eq!(model.calls(ModelRole::Critic), 3);

        // 第二轮起 actor 能看到 critic 的反馈
        let second_actor_call = &model.seen(ModelRole::Actor)[1];
        assert!(second_actor_call
            .iter()
            .any(|m| m.role == Role::User && m.content.contains("not good enough")));
    }

    #[tokio::test]
    async fn test_critic_approves_on_second_turn() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .respond(ModelRole::Actor, ModelResponse::text("first try"))
                .respond(ModelRole::Actor, ModelResponse::text("second try"))
                .respond(ModelRole::Critic, ModelResponse::text("NO | missing detail"))
                .respond(ModelRole::Critic, ModelResponse::text("YES | complete")),
        );
        let h = harness(
            ModelRegistry::single(model.clone()),
            ToolPolicy::default(),
            EngineConfig::default(),
        );

        let result = h.engine.run(&RunRequest::new("question")).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.output, "second try");
        assert_eq!(result.turns, 2);
        assert!(result.reason.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .fallback(ModelRole::Actor, ModelResponse::text("answer")),
        );
        let h = harness(without_critic(&model), ToolPolicy::default(), EngineConfig::default());

        let token = CancellationToken::new();
        token.cancel();
        let request = RunRequest::new("question").with_cancel_token(token);
        let result = h.engine.run(&request).await;

        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.turns, 0);
        assert_eq!(model.calls(ModelRole::Planner), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_model_call() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .fallback(ModelRole::Actor, ModelResponse::text("answer"))
                .with_delay(Duration::from_millis(500)),
        );
        let h = harness(without_critic(&model), ToolPolicy::default(), EngineConfig::default());

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let request = RunRequest::new("question").with_cancel_token(token);
        let result = h.engine.run(&request).await;

        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.reason.as_deref(), Some("cancelled"));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .fallback(ModelRole::Actor, ModelResponse::text("answer"))
                .with_delay(Duration::from_millis(300)),
        );
        let h = harness(without_critic(&model), ToolPolicy::default(), EngineConfig::default());

        let request = RunRequest::new("question").with_timeout(Duration::from_millis(40));
        let result = h.engine.run(&request).await;

        assert_eq!(result.status, RunStatus::Timeout);
        assert_eq!(result.reason.as_deref(), Some("timeout"));
        assert_eq!(result.turns, 1);
    }

    #[tokio::test]
    async fn test_token_budget_exceeded() {
        let long_answer = "word ".repeat(40);
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .fallback(ModelRole::Actor, ModelResponse::text(long_answer.clone()))
                .fallback(ModelRole::Critic, ModelResponse::text("NO | again")),
        );
        let config = EngineConfig {
            token_budget: Some(10),
            ..EngineConfig::default()
        };
        let h = harness(ModelRegistry::single(model.clone()), ToolPolicy::default(), config);

        let result = h.engine.run(&RunRequest::new("question")).await;

        assert_eq!(result.status, RunStatus::BudgetExceeded);
        assert_eq!(result.reason.as_deref(), Some("token_budget"));
        assert_eq!(result.turns, 1);
        assert!(result.usage.tokens > 10);
    }

    #[tokio::test]
    async fn test_model_error_fails_run() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .fail(ModelRole::Actor, ModelError::Api("quota exhausted".into())),
        );
        let h = harness(without_critic(&model), ToolPolicy::default(), EngineConfig::default());

        let result = h.engine.run(&RunRequest::new("question")).await;

        assert_eq!(result.status, RunStatus::Failed);
        let reason = result.reason.unwrap_or_default();
        assert!(reason.starts_with("model_error:"), "reason: {reason}");
        assert!(reason.contains("quota exhausted"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_fed_back_to_actor() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .respond(ModelRole::Actor, tool_then("", ToolCall::new("flaky", json!({}))))
                .respond(ModelRole::Actor, ModelResponse::text("recovered without the backend"))
                .fallback(ModelRole::Critic, ModelResponse::text("YES | fine")),
        );
        let h = harness(
            ModelRegistry::single(model.clone()),
            ToolPolicy::default(),
            EngineConfig::default(),
        );

        let report = h.engine.run_with_log(&RunRequest::new("question")).await;
        let result = &report.result;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.output, "recovered without the backend");
        assert_eq!(result.usage.tool_calls, 1);
        assert_eq!(result.usage.tool_failures, 1);
        assert_eq!(h.tools.calls(), 1);

        let retry = &model.seen(ModelRole::Actor)[1];
        let observation = retry
            .iter()
            .find(|m| m.role == Role::Tool)
            .expect("tool observation in context");
        assert!(observation.content.contains("Unavailable"));

        assert_eq!(report.tool_calls.len(), 1);
        assert_eq!(report.tool_calls[0].status, ToolStatus::Failure);
        assert_eq!(report.tool_calls[0].run_id, result.run_id);
    }

    #[tokio::test]
    async fn test_scopes_come_from_request() {
        let script = || {
            Arc::new(
                ScriptedModel::new()
                    .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                    .respond(
                        ModelRole::Actor,
                        // 模型自称拥有 scope 也无效
                        tool_then(
                            "",
                            ToolCall::new("lookup", json!({"key": "a"})).with_scopes([LOOKUP_SCOPE]),
                        ),
                    )
                    .respond(ModelRole::Actor, ModelResponse::text("done")),
            )
        };

        let model = script();
        let h = harness(without_critic(&model), ToolPolicy::default(), EngineConfig::default());
        let denied = h.engine.run_with_log(&RunRequest::new("q")).await;
        assert_eq!(denied.tool_calls[0].status, ToolStatus::Failure);
        assert_eq!(
            denied.tool_calls[0].error.as_ref().map(|e| e.kind.as_str()),
            Some("PolicyViolation")
        );
        assert_eq!(h.tools.calls(), 0);

        let model = script();
        let h = harness(without_critic(&model), ToolPolicy::default(), EngineConfig::default());
        let granted = h
            .engine
            .run_with_log(&RunRequest::new("q").with_scopes([LOOKUP_SCOPE]))
            .await;
        assert_eq!(granted.tool_calls[0].status, ToolStatus::Success);
        assert_eq!(granted.tool_calls[0].output, json!({"value": "value-of-a"}));
    }

    #[tokio::test]
    async fn test_policy_overrides_apply_to_one_run_only() {
        let echo = || tool_then("", ToolCall::new("echo", json!({"text": "hi"})));
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .respond(ModelRole::Actor, echo())
                .respond(ModelRole::Actor, ModelResponse::text("first"))
                .respond(ModelRole::Actor, echo())
                .respond(ModelRole::Actor, ModelResponse::text("second")),
        );
        let h = harness(without_critic(&model), ToolPolicy::default(), EngineConfig::default());

        let blocked = RunRequest::new("q").with_policy_overrides(PolicyOverrides {
            blocklist: Some(vec!["echo".to_string()]),
            ..PolicyOverrides::default()
        });
        let first = h.engine.run_with_log(&blocked).await;
        assert_eq!(first.tool_calls[0].status, ToolStatus::Failure);
        assert_eq!(first.result.status, RunStatus::Success);

        let second = h.engine.run_with_log(&RunRequest::new("q")).await;
        assert_eq!(second.tool_calls[0].status, ToolStatus::Success);
        assert_eq!(second.tool_calls[0].output, json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn test_max_tool_calls_override() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .respond(
                    ModelRole::Actor,
                    ModelResponse::text("").with_tool_calls(vec![
                        ToolCall::new("echo", json!({"text": "one"})),
                        ToolCall::new("echo", json!({"text": "two"})),
                    ]),
                )
                .respond(ModelRole::Actor, ModelResponse::text("done")),
        );
        let h = harness(without_critic(&model), ToolPolicy::default(), EngineConfig::default());

        let request = RunRequest::new("q").with_policy_overrides(PolicyOverrides {
            max_tool_calls: Some(1),
            ..PolicyOverrides::default()
        });
        let report = h.engine.run_with_log(&request).await;

        assert_eq!(report.tool_calls.len(), 2);
        assert_eq!(report.tool_calls[0].status, ToolStatus::Success);
        assert_eq!(
            report.tool_calls[1].error.as_ref().map(|e| e.kind.as_str()),
            Some("BudgetExceeded")
        );
        assert_eq!(report.result.usage.tool_failures, 1);
    }

    #[tokio::test]
    async fn test_tool_round_cap_moves_on() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .fallback(
                    ModelRole::Actor,
                    tool_then("still working", ToolCall::new("echo", json!({"text": "again"}))),
                ),
        );
        let config = EngineConfig {
            max_tool_rounds_per_turn: 2,
            ..EngineConfig::default()
        };
        let h = harness(without_critic(&model), ToolPolicy::default(), config);

        let result = h.engine.run(&RunRequest::new("q")).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.output, "still working");
        assert_eq!(result.usage.tool_calls, 2);
        assert_eq!(model.calls(ModelRole::Actor), 3);
    }

    #[tokio::test]
    async fn test_final_answer_call_replaces_output() {
        let model = Arc::new(
            ScriptedModel::new()
                .fallback(ModelRole::Planner, ModelResponse::text("plan"))
                .respond(ModelRole::Actor, ModelResponse::text("rough draft"))
                .respond(ModelRole::Actor, ModelResponse::text("polished answer")),
        );
        let config = EngineConfig {
            final_answer_call: true,
            ..EngineConfig::default()
        };
        let h = harness(without_critic(&model), ToolPolicy::default(), config);

        let result = h.engine.run(&RunRequest::new("q")).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.output, "polished answer");
        assert_eq!(model.calls(ModelRole::Actor), 2);
    }

    #[tokio::test]
    async fn test_event_stream_shape() {
        let h = harness(
            ModelRegistry::single(Arc::new(EchoModel)),
            ToolPolicy::default(),
            EngineConfig::default(),
        );
        let request = RunRequest::new("hello there");
        let result = h.engine.run(&request).await;
        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.output, "Echo from Mock: hello there");

        let events = h.events.events_for(request.run_id());
        let types = event_types(&events);
        assert_eq!(types.first().map(String::as_str), Some("run.started"));
        assert_eq!(types.last().map(String::as_str), Some("run.finished"));
        assert_eq!(types.iter().filter(|t| *t == "tool.call.started").count(), 1);
        assert_eq!(types.iter().filter(|t| *t == "tool.call.finished").count(), 1);
        assert!(types.iter().any(|t| t == "critic.verdict"));

        // 同一运行共享 trace_id；除 run 级事件外都挂在某个父 span 下
        let trace_id = &events[0]["trace"]["trace_id"];
        assert!(events.iter().all(|e| &e["trace"]["trace_id"] == trace_id));
        let turn_span = events
            .iter()
            .find(|e| e["event_type"] == "turn.started")
            .map(|e| e["trace"]["span_id"].clone())
            .expect("turn.started");
        let tool_started = events
            .iter()
            .find(|e| e["event_type"] == "tool.call.started")
            .expect("tool.call.started");
        assert_eq!(tool_started["trace"]["parent_span_id"], turn_span);

        let finished = events.last().expect("run.finished");
        assert_eq!(finished["attributes"]["status"], "SUCCESS");
    }
}
