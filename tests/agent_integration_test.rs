//! Agent 端到端集成测试（Mock LLM + 内存 / SQLite 会话存储）

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use minagent::llm::{MockLlmClient, ModelTurn};
    use minagent::reasoning::TRUNCATION_WARNING;
    use minagent::session::{InMemoryBackend, SessionStore, SqliteBackend, StoreBackend};
    use minagent::tools::{CalculateTool, EchoTool, Tool};
    use minagent::{Agent, AgentError};
    use serde_json::{json, Map, Value};

    fn calc_call(id: &str, expression: &str) -> ModelTurn {
        ModelTurn::tool_call("", id, "calculate", json!({ "expression": expression }))
    }

    #[tokio::test]
    async fn test_two_plus_two_end_to_end() {
        let llm = Arc::new(MockLlmClient::scripted([
            calc_call("c1", "2+2").with_reasoning("I should use the calculator."),
            ModelTurn::text("2+2 equals 4."),
        ]));
        let agent = Agent::builder()
            .with_llm(llm.clone())
            .with_tool(CalculateTool)
            .with_session_backend(Arc::new(InMemoryBackend::new()))
            .build()
            .await
            .unwrap();

        let (response, trace) = agent.run("What is 2+2?", Some("math-1")).await.unwrap();
        assert_eq!(response, "2+2 equals 4.");
        assert_eq!(trace.total_steps, 1);
        assert_eq!(trace.steps[0].thinking, "I should use the calculator.");
        let invocation = &trace.steps[0].tools[0];
        assert_eq!(invocation.name, "calculate");
        assert_eq!(invocation.result, json!({"expression": "2+2", "result": 4}));
        assert!(trace.is_complete());
        assert!(!trace.step_limit_reached);

        let saved = agent.get_reasoning("math-1").await.unwrap().unwrap();
        assert_eq!(saved, trace);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_step_limit_returns_partial_answer() {
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::tool_call("Working on it.", "c1", "calculate", json!({"expression": "1+1"})),
            calc_call("c2", "2+2"),
        ]));
        let agent = Agent::builder()
            .with_llm(llm.clone())
            .with_tool(CalculateTool)
            .with_max_steps(1)
            .build()
            .await
            .unwrap();

        let (response, trace) = agent.run("Add some numbers", None).await.unwrap();
        assert_eq!(response, "Working on it.");
        assert!(trace.step_limit_reached);
        assert_eq!(trace.total_steps, 1);
        // 预算耗尽后不再调用模型
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_history_has_one_trace_per_run_most_recent_first() {
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::text("first"),
            ModelTurn::text("second"),
            ModelTurn::text("third"),
        ]));
        let agent = Agent::builder()
            .with_llm(llm)
            .with_session_backend(Arc::new(InMemoryBackend::new()))
            .build()
            .await
            .unwrap();

        for query in ["q1", "q2", "q3"] {
            agent.run(query, Some("hist")).await.unwrap();
        }

        let history = agent.get_reasoning_history("hist").await.unwrap();
        let queries: Vec<_> = history.iter().map(|t| t.query.as_str()).collect();
        assert_eq!(queries, vec!["q3", "q2", "q1"]);
        assert_eq!(history[0].final_response, "third");
        assert!(agent.get_reasoning_history("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::text("a"),
            ModelTurn::text("b"),
        ]));
        let agent = Agent::builder()
            .with_llm(llm.clone())
            .with_session_backend(Arc::new(InMemoryBackend::new()))
            .build()
            .await
            .unwrap();

        agent.run("hello from alice", Some("alice")).await.unwrap();
        agent.run("hello from bob", Some("bob")).await.unwrap();

        let requests = llm.requests();
        assert_eq!(requests[1].messages.len(), 1);
        assert_eq!(requests[1].messages[0].text(), "hello from bob");
    }

    #[tokio::test]
    async fn test_oversized_trace_is_truncated_and_flagged() {
        let big = "x".repeat(5000);
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::tool_call("", "c1", "echo", json!({ "text": big })),
            ModelTurn::text("done"),
        ]));
        let agent = Agent::builder()
            .with_llm(llm)
            .with_tool(EchoTool)
            .with_max_reasoning_bytes(2048)
            .with_session_backend(Arc::new(InMemoryBackend::new()))
            .build()
            .await
            .unwrap();

        let (response, trace) = agent.run("echo something big", Some("big")).await.unwrap();
        assert!(response.starts_with("done"));
        assert!(response.ends_with(TRUNCATION_WARNING));
        assert!(trace.exceeded_size_limit);
        assert_eq!(trace.steps[0].tools[0].result, json!({"truncated": true}));

        let saved = agent.get_reasoning("big").await.unwrap().unwrap();
        assert!(saved.exceeded_size_limit);
        assert_eq!(saved.final_response, response);
    }

    #[tokio::test]
    async fn test_long_answer_is_returned_in_full() {
        let answer = "The answer is 42. ".repeat(170);
        assert!(answer.len() > 3000);
        let llm = Arc::new(MockLlmClient::scripted([ModelTurn::text(answer.clone())]));
        let agent = Agent::builder()
            .with_llm(llm)
            .with_max_reasoning_bytes(2000)
            .build()
            .await
            .unwrap();

        let (response, trace) = agent.run("Tell me everything", None).await.unwrap();
        // 轨迹放不下时只打标记，回答本身不被裁剪
        assert!(response.starts_with(&answer));
        assert!(response.ends_with(TRUNCATION_WARNING));
        assert_eq!(response.len(), answer.len() + "\n\n".len() + TRUNCATION_WARNING.len());
        assert!(trace.exceeded_size_limit);
        assert_eq!(trace.final_response, response);
    }

    #[tokio::test]
    async fn test_long_answer_with_store_is_returned_in_full() {
        let answer = "y".repeat(3000);
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::text(answer.clone()),
            ModelTurn::text("short"),
        ]));
        let agent = Agent::builder()
            .with_llm(llm.clone())
            .with_max_reasoning_bytes(2000)
            .with_session_backend(Arc::new(InMemoryBackend::new()))
            .build()
            .await
            .unwrap();

        let (response, trace) = agent.run("Say a lot", Some("long")).await.unwrap();
        assert!(response.starts_with(&answer));
        assert!(response.ends_with(TRUNCATION_WARNING));
        assert!(trace.exceeded_size_limit);
        // 放不下的轨迹不落盘，但消息快照照常写入，下一轮能看到完整回答
        assert!(agent.get_reasoning("long").await.unwrap().is_none());
        agent.run("And now?", Some("long")).await.unwrap();
        let requests = llm.requests();
        assert_eq!(requests[1].messages[1].text(), answer);
    }

    #[tokio::test]
    async fn test_backend_item_limit_triggers_truncation() {
        // 长思考只进入推理轨迹，不进入消息快照
        let llm = Arc::new(MockLlmClient::scripted([
            calc_call("c1", "5-3").with_reasoning("t".repeat(15_000)),
            ModelTurn::text("2"),
        ]));
        let agent = Agent::builder()
            .with_llm(llm)
            .with_tool(CalculateTool)
            .with_session_backend(Arc::new(InMemoryBackend::with_max_item_bytes(10_000)))
            .build()
            .await
            .unwrap();

        let (response, trace) = agent.run("What is 5-3?", Some("limited")).await.unwrap();
        assert!(trace.exceeded_size_limit);
        assert!(response.ends_with(TRUNCATION_WARNING));
        assert!(trace.steps[0].thinking.chars().count() < 300);
        // 工具载荷不受影响：只裁剪到足够写入为止
        assert_eq!(trace.steps[0].tools[0].result, json!({"expression": "5-3", "result": 2}));

        let saved = agent.get_reasoning("limited").await.unwrap().unwrap();
        assert_eq!(saved, trace);
    }

    #[tokio::test]
    async fn test_oversized_messages_surface_store_error() {
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::tool_call("", "c1", "echo", json!({ "text": "z".repeat(12_000) })),
            ModelTurn::text("ok"),
        ]));
        let agent = Agent::builder()
            .with_llm(llm)
            .with_tool(EchoTool)
            .with_session_backend(Arc::new(InMemoryBackend::with_max_item_bytes(20_000)))
            .build()
            .await
            .unwrap();
        let err = agent.run("go", Some("limited")).await.unwrap_err();
        assert!(matches!(err, AgentError::Store(_)));
    }

    #[tokio::test]
    async fn test_sqlite_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sessions.db");
        let table = "minimalagent-session-table";

        {
            let llm = Arc::new(MockLlmClient::scripted([
                calc_call("c1", "3*3"),
                ModelTurn::text("9"),
                ModelTurn::text("Still 9."),
            ]));
            let agent = Agent::builder()
                .with_llm(llm)
                .with_tool(CalculateTool)
                .with_session_backend(Arc::new(SqliteBackend::open(&db_path, table).unwrap()))
                .build()
                .await
                .unwrap();
            agent.run("What is 3*3?", Some("sq")).await.unwrap();
            agent.run("Are you sure?", Some("sq")).await.unwrap();
        }

        let llm = Arc::new(MockLlmClient::scripted([ModelTurn::text("Yes.")]));
        let agent = Agent::builder()
            .with_llm(llm.clone())
            .with_tool(CalculateTool)
            .with_session_backend(Arc::new(SqliteBackend::open(&db_path, table).unwrap()))
            .build()
            .await
            .unwrap();

        let history = agent.get_reasoning_history("sq").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "Are you sure?");
        assert_eq!(history[1].steps[0].tools[0].name, "calculate");

        agent.run("Really?", Some("sq")).await.unwrap();
        // 第一次 run 4 条 + 第二次 run 2 条 + 本次用户消息
        assert_eq!(llm.requests()[0].messages.len(), 7);
    }

    /// 在工具执行期间读取同一会话的最新推理快照
    struct SnapshotReader {
        store: SessionStore,
    }

    #[async_trait]
    impl Tool for SnapshotReader {
        fn name(&self) -> &str {
            "read_snapshot"
        }

        fn description(&self) -> &str {
            "Report the latest saved reasoning snapshot"
        }

        async fn execute(&self, _args: Map<String, Value>) -> Result<Value, String> {
            let trace = self
                .store
                .load_latest_reasoning("live")
                .await
                .map_err(|e| e.to_string())?;
            Ok(match trace {
                Some(t) => json!({ "steps": t.total_steps, "complete": t.is_complete() }),
                None => json!(null),
            })
        }
    }

    #[tokio::test]
    async fn test_real_time_snapshots_visible_during_run() {
        let backend: Arc<dyn StoreBackend> = Arc::new(InMemoryBackend::new());
        let reader = SnapshotReader {
            store: SessionStore::open(backend.clone(), 3600).await.unwrap(),
        };
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::tool_call("", "c1", "read_snapshot", json!({})),
            ModelTurn::tool_call("", "c2", "read_snapshot", json!({})),
            ModelTurn::text("finished"),
        ]));
        let agent = Agent::builder()
            .with_llm(llm)
            .with_tool(reader)
            .with_session_backend(backend)
            .with_real_time_reasoning(true)
            .build()
            .await
            .unwrap();

        let (_, trace) = agent.run("watch yourself", Some("live")).await.unwrap();
        // 第一步执行时尚无快照；第二步执行时能看到第一步结束后写入的中间快照
        assert_eq!(trace.steps[0].tools[0].result, json!(null));
        assert_eq!(
            trace.steps[1].tools[0].result,
            json!({"steps": 1, "complete": false})
        );

        let latest = agent.get_reasoning("live").await.unwrap().unwrap();
        assert!(latest.is_complete());
        assert_eq!(latest.total_steps, 2);
        // 中间快照不计入历史
        assert_eq!(agent.get_reasoning_history("live").await.unwrap().len(), 1);
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[tokio::test]
    async fn test_concurrent_runs_on_one_session() {
        assert_send_sync::<Agent>();
        let llm = Arc::new(MockLlmClient::scripted([
            ModelTurn::text("first"),
            ModelTurn::text("second"),
        ]));
        let agent = Arc::new(
            Agent::builder()
                .with_llm(llm.clone())
                .with_session_backend(Arc::new(InMemoryBackend::new()))
                .build()
                .await
                .unwrap(),
        );

        let handles: Vec<_> = ["q1", "q2"]
            .into_iter()
            .map(|query| {
                let agent = agent.clone();
                tokio::spawn(async move { agent.run(query, Some("shared")).await })
            })
            .collect();
        let mut responses = Vec::new();
        for handle in handles {
            let (response, _) = handle.await.unwrap().unwrap();
            responses.push(response);
        }
        responses.sort();
        assert_eq!(responses, vec!["first", "second"]);
        assert_eq!(llm.call_count(), 2);

        // 两次运行的轨迹都落盘，互不覆盖
        let history = agent.get_reasoning_history("shared").await.unwrap();
        assert_eq!(history.len(), 2);
        let mut queries: Vec<_> = history.iter().map(|t| t.query.as_str()).collect();
        queries.sort();
        assert_eq!(queries, vec!["q1", "q2"]);
    }

    #[tokio::test]
    async fn test_default_mock_echo_round_trip() {
        let agent = Agent::builder()
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_tool(EchoTool)
            .build()
            .await
            .unwrap();
        let (response, trace) = agent.run("ping", None).await.unwrap();
        assert_eq!(response, "Echo from Mock: ping");
        assert_eq!(trace.steps[0].tools[0].name, "echo");
    }
}
