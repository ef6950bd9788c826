//! USC 主循环集成测试：用脚本化的 reasoner / judge / reflection 驱动完整运行

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use react_usc::config::{AgentConfig, RetryConfig, SelectionStrategy};
    use react_usc::core::{AgentError, CapabilityError};
    use react_usc::llm::{ScriptedLlmClient, TokenCount};
    use react_usc::react::{
        ArbitrationCapability, ArbitrationRequest, LlmJudge, LlmReasoner, ProposalRequest,
        ReasoningCapability, ReflectionCapability, ReflectionRequest, UscAgent, UscEvent,
    };
    use react_usc::tools::{
        ApiClientTool, CalculatorTool, SimpleSearchTool, Tool, ToolRegistry, ToolSchema, ValueKind,
    };

    // ---------- 脚本化能力 ----------

    struct FnReasoner<F>(F);

    #[async_trait]
    impl<F> ReasoningCapability for FnReasoner<F>
    where
        F: Fn(&ProposalRequest) -> Result<Value, CapabilityError> + Send + Sync,
    {
        async fn propose(&self, request: &ProposalRequest) -> Result<Value, CapabilityError> {
            (self.0)(request)
        }
    }

    /// 非强制调用先消费 overrides，其后原样选中第 0 个候选；强制收尾返回 forced_reply
    struct EchoJudge {
        overrides: Mutex<VecDeque<Value>>,
        forced_reply: Value,
        calls: Mutex<Vec<bool>>,
    }

    impl EchoJudge {
        fn new() -> Arc<Self> {
            Self::with(vec![], json!({"decision_type": "FINAL", "final_answer": "forced answer", "justification": "budget"}))
        }

        fn with(overrides: Vec<Value>, forced_reply: Value) -> Arc<Self> {
            Arc::new(Self {
                overrides: Mutex::new(overrides.into()),
                forced_reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<bool> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArbitrationCapability for EchoJudge {
        async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<Value, CapabilityError> {
            self.calls.lock().unwrap().push(request.forced);
            if request.forced {
                return Ok(self.forced_reply.clone());
            }
            if let Some(v) = self.overrides.lock().unwrap().pop_front() {
                return Ok(v);
            }
            let first = request
                .candidates
                .get(0)
                .ok_or_else(|| CapabilityError::Failed("no candidates".to_string()))?;
            let mut v = serde_json::to_value(first).unwrap();
            v["selected_index"] = json!(0);
            v["justification"] = json!("first candidate is sound");
            Ok(v)
        }
    }

    struct ScriptedReflector {
        replies: Mutex<VecDeque<Value>>,
        repeat: Option<Value>,
        calls: Mutex<usize>,
    }

    impl ScriptedReflector {
        fn new(replies: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                repeat: None,
                calls: Mutex::new(0),
            })
        }

        fn always(reply: Value) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::new()),
                repeat: Some(reply),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ReflectionCapability for ScriptedReflector {
        async fn reflect(&self, _request: &ReflectionRequest) -> Result<Value, CapabilityError> {
            *self.calls.lock().unwrap() += 1;
            let next = self.replies.lock().unwrap().pop_front();
            Ok(next
                .or_else(|| self.repeat.clone())
                .unwrap_or(json!({"outcome": "ABORT", "explanation": "script ended"})))
        }
    }

    /// 缺少 user_id 时报错的用户服务（user_id 在 schema 中可选，由工具自身报错）
    struct UserServiceTool;

    #[async_trait]
    impl Tool for UserServiceTool {
        fn name(&self) -> &str {
            "user_service"
        }

        fn description(&self) -> &str {
            "Fetch a user record"
        }

        fn input_schema(&self) -> ToolSchema {
            ToolSchema::new().optional("user_id", ValueKind::String, "User id")
        }

        async fn execute(&self, args: &Map<String, Value>) -> Result<Value, String> {
            match args.get("user_id").and_then(|v| v.as_str()) {
                Some(id) => Ok(json!({"id": id, "name": "Alice"})),
                None => Err("Missing required parameter 'user_id'".to_string()),
            }
        }
    }

    // ---------- 辅助 ----------

    fn registry() -> Arc<ToolRegistry> {
        let mut r = ToolRegistry::new();
        r.register(CalculatorTool);
        r.register(SimpleSearchTool::new());
        r.register(ApiClientTool::new());
        r.register(UserServiceTool);
        Arc::new(r)
    }

    fn config(k_paths: usize, max_steps: usize) -> AgentConfig {
        AgentConfig {
            k_paths,
            max_steps,
            timeout_seconds: 5.0,
            retry: RetryConfig {
                enabled: true,
                max_retries: 3,
                backoff_seconds: 0.0,
            },
            ..AgentConfig::default()
        }
    }

    fn tool_call(tool: &str, args: Value) -> Value {
        json!({
            "decision_type": "TOOL_CALL",
            "tool_name": tool,
            "tool_args": args,
            "brief_rationale": format!("use {}", tool)
        })
    }

    fn final_answer(answer: &str) -> Value {
        json!({"decision_type": "FINAL", "final_answer": answer, "brief_rationale": "enough info"})
    }

    fn first_step(request: &ProposalRequest) -> bool {
        request.state_summary.starts_with("step: 1/")
    }

    /// 第一步调用给定工具，之后给出 FINAL
    fn tool_then_final(
        tool: &'static str,
        args: Value,
        answer: &'static str,
    ) -> Arc<dyn ReasoningCapability> {
        Arc::new(FnReasoner(move |req: &ProposalRequest| {
            if first_step(req) {
                Ok(tool_call(tool, args.clone()))
            } else {
                Ok(final_answer(answer))
            }
        }))
    }

    fn agent(
        config: AgentConfig,
        reasoner: Arc<dyn ReasoningCapability>,
        judge: Arc<EchoJudge>,
        reflector: Arc<ScriptedReflector>,
    ) -> UscAgent {
        UscAgent::new(config, registry(), reasoner, judge, 5)
            .unwrap()
            .with_reflection(reflector)
    }

    // ---------- 场景 ----------

    #[tokio::test]
    async fn test_math_task_runs_tool_then_finishes() {
        let judge = EchoJudge::new();
        let agent = agent(
            config(4, 6),
            tool_then_final("calculator", json!({"expression": "2+2*10"}), "22"),
            judge.clone(),
            ScriptedReflector::new(vec![]),
        );

        let outcome = agent.run("What is 2+2*10?").await.unwrap();
        assert_eq!(outcome.final_answer, "22");
        assert_eq!(outcome.steps, 2);
        assert!(!outcome.forced);
        assert_eq!(outcome.selected_index, Some(0));
        assert_eq!(outcome.observations.len(), 1);
        assert_eq!(outcome.observations[0].text, "calculator => 22");
        assert!(outcome.observations[0].success);
        assert_eq!(judge.calls(), vec![false, false]);
    }

    #[tokio::test]
    async fn test_retry_fix_produces_single_success_observation() {
        let reflector = ScriptedReflector::new(vec![json!({
            "outcome": "RETRY_FIX",
            "fixed_args": {"user_id": "42"},
            "explanation": "user_id was missing"
        })]);
        let agent = agent(
            config(2, 6),
            tool_then_final("user_service", json!({}), "Alice"),
            EchoJudge::new(),
            reflector.clone(),
        );

        let outcome = agent.run("Who is user 42?").await.unwrap();
        assert_eq!(outcome.final_answer, "Alice");
        assert_eq!(outcome.observations.len(), 1);
        let obs = &outcome.observations[0];
        assert!(obs.success);
        assert_eq!(obs.retries, 1);
        assert!(obs.text.starts_with("user_service => "));
        assert!(obs.text.contains("\"id\":\"42\""));
        assert_eq!(*reflector.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_and_loop_continues() {
        let reflector = ScriptedReflector::new(vec![json!({
            "verdict": "abort",
            "abort_suggestion": "missing delete permission"
        })]);
        let agent = agent(
            config(2, 6),
            tool_then_final(
                "api_client",
                json!({"endpoint": "/api/v1/admin/system", "method": "DELETE"}),
                "Deletion is not permitted.",
            ),
            EchoJudge::new(),
            reflector,
        );

        let outcome = agent.run("Delete the system database.").await.unwrap();
        assert_eq!(outcome.final_answer, "Deletion is not permitted.");
        assert_eq!(outcome.observations.len(), 1);
        let obs = &outcome.observations[0];
        assert!(!obs.success);
        assert_eq!(obs.retries, 0);
        assert!(obs.text.starts_with("api_client => reflection_abort: missing delete permission"));
        assert!(obs.text.contains("403 Forbidden"));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_records_one_error() {
        let mut cfg = config(1, 6);
        cfg.retry.max_retries = 2;
        let reflector = ScriptedReflector::always(json!({"outcome": "RETRY_WAIT", "explanation": "maybe transient"}));
        let agent = agent(
            cfg,
            tool_then_final("calculator", json!({"expression": "1/0"}), "undefined"),
            EchoJudge::new(),
            reflector.clone(),
        );

        let outcome = agent.run("What is 1/0?").await.unwrap();
        assert_eq!(outcome.observations.len(), 1);
        let obs = &outcome.observations[0];
        assert!(!obs.success);
        assert_eq!(obs.retries, 2);
        assert!(obs.text.starts_with("calculator => retries_exhausted after 2:"));
        assert_eq!(*reflector.calls.lock().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_waits_with_backoff() {
        let mut cfg = config(1, 6);
        cfg.retry.backoff_seconds = 1.0;
        let reflector = ScriptedReflector::always(json!({"outcome": "WAIT", "explanation": "503"}));
        let agent = agent(
            cfg,
            tool_then_final(
                "api_client",
                json!({"endpoint": "/api/v1/sync/data", "method": "POST"}),
                "synced",
            ),
            EchoJudge::new(),
            reflector,
        );

        let start = tokio::time::Instant::now();
        let outcome = agent.run("Sync data.").await.unwrap();
        let elapsed = start.elapsed();
        let obs = &outcome.observations[0];
        assert!(obs.success);
        assert_eq!(obs.retries, 2);
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_step_budget_forces_single_final() {
        let reasoner: Arc<dyn ReasoningCapability> = Arc::new(FnReasoner(|_: &ProposalRequest| {
            Ok(tool_call("calculator", json!({"expression": "1+1"})))
        }));
        let judge = EchoJudge::new();
        let agent = agent(config(2, 2), reasoner, judge.clone(), ScriptedReflector::new(vec![]));

        let outcome = agent.run("Keep computing forever").await.unwrap();
        assert!(outcome.forced);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.observations.len(), 2);
        assert_eq!(outcome.final_answer, "forced answer");
        assert_eq!(outcome.selected_index, None);
        assert_eq!(judge.calls(), vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_forced_tool_call_becomes_best_effort_final() {
        let reasoner: Arc<dyn ReasoningCapability> = Arc::new(FnReasoner(|_: &ProposalRequest| {
            Ok(tool_call("calculator", json!({"expression": "3*3"})))
        }));
        let judge = EchoJudge::with(
            vec![],
            tool_call("calculator", json!({"expression": "3*3"})),
        );
        let agent = agent(config(1, 1), reasoner, judge, ScriptedReflector::new(vec![]));

        let outcome = agent.run("Compute").await.unwrap();
        assert!(outcome.forced);
        assert_eq!(outcome.observations.len(), 1);
        assert!(outcome.final_answer.contains("could not fully resolve"));
        assert!(outcome.final_answer.contains("calculator => 9"));
    }

    #[tokio::test]
    async fn test_empty_candidate_set_skips_judge() {
        let reasoner: Arc<dyn ReasoningCapability> =
            Arc::new(FnReasoner(|_: &ProposalRequest| Ok(json!("I am not sure what to do"))));
        let judge = EchoJudge::new();
        let agent = agent(config(3, 6), reasoner, judge.clone(), ScriptedReflector::new(vec![]));

        let outcome = agent.run("Anything").await.unwrap();
        assert!(judge.calls().is_empty());
        assert!(outcome.observations.is_empty());
        assert_eq!(outcome.steps, 1);
        assert!(!outcome.forced);
        assert!(outcome.final_answer.contains("could not fully resolve"));
        assert!(outcome.justification.contains("no valid candidates"));
    }

    #[tokio::test]
    async fn test_rejected_synthesis_falls_back_to_candidate() {
        let mut cfg = config(2, 6);
        cfg.selection_strategy = SelectionStrategy::SynthesizeOne;
        cfg.allow_tool_synthesis = false;
        let judge = EchoJudge::with(
            vec![json!({
                "decision_type": "TOOL_CALL",
                "tool_name": "simple_search",
                "tool_args": {"query": "arithmetic"},
                "justification": "search is better"
            })],
            json!({}),
        );
        let agent = agent(
            cfg,
            tool_then_final("calculator", json!({"expression": "6*7"}), "42"),
            judge,
            ScriptedReflector::new(vec![]),
        );

        let outcome = agent.run("What is 6*7?").await.unwrap();
        assert_eq!(outcome.observations.len(), 1);
        assert_eq!(outcome.observations[0].tool, "calculator");
        assert_eq!(outcome.observations[0].text, "calculator => 42");
        // 第二步 synthesize_one 原样回显候选，下标依然被清空
        assert_eq!(outcome.selected_index, None);
        assert_eq!(outcome.final_answer, "42");
    }

    #[tokio::test]
    async fn test_unreachable_reasoners_are_fatal() {
        let reasoner: Arc<dyn ReasoningCapability> = Arc::new(FnReasoner(|_: &ProposalRequest| {
            Err(CapabilityError::Unreachable("connection refused".to_string()))
        }));
        let agent = agent(config(3, 6), reasoner, EchoJudge::new(), ScriptedReflector::new(vec![]));
        let err = agent.run("Anything").await.unwrap_err();
        assert!(matches!(err, AgentError::CapabilityUnavailable(_)));
    }

    #[tokio::test]
    async fn test_failures_recorded_directly_without_reflection() {
        let mut cfg = config(1, 6);
        cfg.retry.enabled = false;
        let reflector = ScriptedReflector::new(vec![]);
        let agent = agent(
            cfg,
            tool_then_final("user_service", json!({}), "unknown"),
            EchoJudge::new(),
            reflector.clone(),
        );

        let outcome = agent.run("Who?").await.unwrap();
        assert_eq!(
            outcome.observations[0].text,
            "user_service => tool_exception: Missing required parameter 'user_id'"
        );
        assert_eq!(*reflector.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_trace_events_follow_the_loop() {
        let agent = agent(
            config(2, 6),
            tool_then_final("calculator", json!({"expression": "2+2*10"}), "22"),
            EchoJudge::new(),
            ScriptedReflector::new(vec![]),
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        agent.run_with_events("What is 2+2*10?", Some(&tx)).await.unwrap();
        drop(tx);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            let kind = match event {
                UscEvent::StepUpdate { .. } => continue,
                UscEvent::Candidates { .. } => "candidates",
                UscEvent::JudgeDecision { .. } => "judge",
                UscEvent::ToolCall { .. } => "tool_call",
                UscEvent::Retry { .. } => "retry",
                UscEvent::Observation { .. } => "observation",
                UscEvent::TokenUsage { .. } => "tokens",
                UscEvent::Final { .. } => "final",
            };
            kinds.push(kind);
        }
        assert_eq!(
            kinds,
            vec![
                "candidates",
                "judge",
                "tool_call",
                "observation",
                "candidates",
                "judge",
                "tokens",
                "final"
            ]
        );
    }

    #[tokio::test]
    async fn test_token_usage_is_reported_per_run() {
        let call = json!({
            "decision_type": "TOOL_CALL",
            "tool_name": "calculator",
            "tool_args": {"expression": "2+2*10"},
            "brief_rationale": "compute it"
        });
        let done = json!({"decision_type": "FINAL", "final_answer": "22", "brief_rationale": "done"});
        let reasoner_llm = Arc::new(
            ScriptedLlmClient::new([call.to_string(), call.to_string(), done.to_string()])
                .with_usage_per_call(100, 10),
        );
        let pick_call = json!({
            "decision_type": "TOOL_CALL",
            "tool_name": "calculator",
            "tool_args": {"expression": "2+2*10"},
            "selected_index": 0,
            "justification": "both agree"
        });
        let pick_done = json!({
            "decision_type": "FINAL",
            "final_answer": "22",
            "selected_index": 0,
            "justification": "answer is known"
        });
        let judge_llm = Arc::new(
            ScriptedLlmClient::new([pick_call.to_string(), pick_done.to_string()])
                .with_usage_per_call(200, 5),
        );
        let agent = UscAgent::new(
            config(2, 6),
            registry(),
            Arc::new(LlmReasoner::new(reasoner_llm)),
            Arc::new(LlmJudge::new(judge_llm)),
            5,
        )
        .unwrap()
        .with_reflection(ScriptedReflector::new(vec![]));

        let outcome = agent.run("What is 2+2*10?").await.unwrap();
        assert_eq!(outcome.final_answer, "22");
        // 两步各 2 次 reasoner 调用 + 1 次 judge 调用
        assert_eq!(outcome.token_usage, TokenCount::new(800, 50));

        // 第二次运行只统计本次增量（脚本重复最后一条：直接 FINAL）
        let second = agent.run("What is 2+2*10?").await.unwrap();
        assert_eq!(second.steps, 1);
        assert_eq!(second.token_usage, TokenCount::new(400, 25));
        assert_eq!(agent.token_usage().total_tokens, 850 + 425);
    }
}
