//! The turn controller: one user message in, one reply out.
//!
//! A turn is a small state machine:
//!
//! ```text
//! Drafting(first) ──no tool calls──▶ Done
//!        │
//!   tool calls
//!        ▼
//! ToolExecuting ──▶ Drafting(second) ──▶ Done
//! ```
//!
//! The user message is appended to the model input and persisted only on
//! the first drafting visit. The second visit always follows a tool result,
//! so the tool gate disables tools for it and any tool calls the model
//! still returns are dropped.

use std::sync::Arc;
use threadline_core::error::{Error, ProviderError};
use threadline_core::message::{Message, MessageToolCall, SessionId};
use threadline_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use threadline_core::session::SessionStore;
use threadline_core::tool::{ToolCall, ToolRegistry};
use tracing::{debug, info, warn};

use crate::gate::ToolGate;
use crate::trimmer::trim_history;

/// Model parameters and limits shared by every turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: String,
    /// Token budget for system prompt plus history.
    pub history_budget: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    First,
    Second,
}

#[derive(Debug)]
pub enum TurnState {
    Drafting { visit: Visit },
    ToolExecuting { calls: Vec<MessageToolCall> },
    Done { reply: String },
}

/// What a completed turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    /// Prompt tokens summed over the turn's model calls, if reported.
    pub tokens_input: Option<u32>,
    pub tokens_output: Option<u32>,
    pub model_calls: u32,
    pub tool_phases: u32,
}

/// Per-turn scratch state carried between transitions.
struct TurnContext<'a> {
    session_id: &'a SessionId,
    user_text: &'a str,
    usage: Option<Usage>,
    model_calls: u32,
    tool_phases: u32,
}

impl TurnContext<'_> {
    fn record_usage(&mut self, usage: Option<Usage>) {
        let Some(u) = usage else { return };
        let total = self.usage.get_or_insert_with(Usage::default);
        total.prompt_tokens += u.prompt_tokens;
        total.completion_tokens += u.completion_tokens;
        total.total_tokens += u.total_tokens;
    }
}

/// Runs turns against one session store.
pub struct TurnController {
    provider: Arc<dyn Provider>,
    store: Arc<dyn SessionStore>,
    tools: Arc<ToolRegistry>,
    tool_definitions: Vec<ToolDefinition>,
    gate: ToolGate,
    settings: TurnSettings,
}

impl TurnController {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn SessionStore>,
        tools: Arc<ToolRegistry>,
        gate: ToolGate,
        settings: TurnSettings,
    ) -> Self {
        let tool_definitions = tools.definitions();
        Self {
            provider,
            store,
            tools,
            tool_definitions,
            gate,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one turn to completion.
    ///
    /// The session lock is held for the whole turn. A model failure ends
    /// the turn with an error; messages already persisted by this turn
    /// stay in place.
    pub async fn run(&self, session_id: &SessionId, user_text: &str) -> Result<TurnOutcome, Error> {
        let _guard = self.store.lock_session(session_id).await;

        info!(
            session_id = %session_id,
            mode = %self.store.mode(),
            "Turn started"
        );

        let mut ctx = TurnContext {
            session_id,
            user_text,
            usage: None,
            model_calls: 0,
            tool_phases: 0,
        };

        let mut state = TurnState::Drafting { visit: Visit::First };
        loop {
            state = match state {
                TurnState::Drafting { visit } => self.draft(&mut ctx, visit).await?,
                TurnState::ToolExecuting { calls } => self.execute_tools(&mut ctx, calls).await?,
                TurnState::Done { reply } => {
                    info!(
                        session_id = %session_id,
                        model_calls = ctx.model_calls,
                        tool_phases = ctx.tool_phases,
                        "Turn finished"
                    );
                    return Ok(TurnOutcome {
                        reply,
                        tokens_input: ctx.usage.map(|u| u.prompt_tokens),
                        tokens_output: ctx.usage.map(|u| u.completion_tokens),
                        model_calls: ctx.model_calls,
                        tool_phases: ctx.tool_phases,
                    });
                }
            };
        }
    }

    /// The DRAFTING state: build input, call the model, route.
    async fn draft(&self, ctx: &mut TurnContext<'_>, visit: Visit) -> Result<TurnState, Error> {
        let history = self.store.get_history(ctx.session_id).await?;

        let mut input = Vec::with_capacity(history.len() + 2);
        input.push(Message::system(&self.settings.system_prompt));
        input.extend(history);
        let mut input = trim_history(&input, self.settings.history_budget, |m| {
            self.provider.count_tokens(m)
        })
        .map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let user_message = (visit == Visit::First).then(|| Message::user(ctx.user_text));
        if let Some(user) = &user_message {
            input.push(user.clone());
        }

        // Gate on what directly precedes this call, not on stored history:
        // a turn that failed after its tool step leaves a trailing tool result.
        let preceded_by_tool_result = input.last().is_some_and(Message::is_tool_result);
        let tools_enabled = self.gate.allows(ctx.user_text, preceded_by_tool_result);

        debug!(
            session_id = %ctx.session_id,
            ?visit,
            tools_enabled,
            input_messages = input.len(),
            "Calling model"
        );

        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages: input,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools_enabled,
            tools: if tools_enabled {
                self.tool_definitions.clone()
            } else {
                Vec::new()
            },
        };

        let response = self.provider.complete(request).await.inspect_err(|e| {
            warn!(session_id = %ctx.session_id, error = %e, "Model call failed");
        })?;
        ctx.model_calls += 1;
        ctx.record_usage(response.usage);

        let mut reply = response.message;
        let mut persist: Vec<Message> = user_message.into_iter().collect();

        if reply.requests_tools() && tools_enabled {
            let calls = reply.tool_calls.clone();
            persist.push(reply);
            self.store.append(ctx.session_id, persist).await?;
            return Ok(TurnState::ToolExecuting { calls });
        }

        if reply.requests_tools() {
            warn!(
                session_id = %ctx.session_id,
                requested = reply.tool_calls.len(),
                "Model requested tools while tools were disabled; ignoring"
            );
            reply.tool_calls.clear();
        }

        if reply.content.trim().is_empty() {
            return Err(ProviderError::MalformedResponse("model returned an empty reply".into()).into());
        }

        let text = reply.content.clone();
        persist.push(reply);
        self.store.append(ctx.session_id, persist).await?;
        Ok(TurnState::Done { reply: text })
    }

    /// The TOOL_EXECUTING state: run each requested call in order.
    async fn execute_tools(
        &self,
        ctx: &mut TurnContext<'_>,
        calls: Vec<MessageToolCall>,
    ) -> Result<TurnState, Error> {
        ctx.tool_phases += 1;

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            let invocation = ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.parsed_arguments(),
            };
            debug!(session_id = %ctx.session_id, tool = %call.name, "Executing tool");
            let result = self.tools.invoke(&invocation).await;
            results.push(Message::tool_result(&call.id, &call.name, result.output));
        }

        self.store.append(ctx.session_id, results).await?;
        Ok(TurnState::Drafting { visit: Visit::Second })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use threadline_core::error::ToolError;
    use threadline_core::message::Role;
    use threadline_core::provider::ProviderResponse;
    use threadline_core::tool::{Tool, ToolResult};
    use threadline_memory::InMemoryStore;

    /// Returns scripted responses in order and records every request.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("ScriptedProvider ran out of responses")
        }
    }

    /// Replies with the last user message it was given.
    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let last_user = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(text_response(&format!("echo: {last_user}")))
        }
    }

    struct StubWeather {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Tool for StubWeather {
        fn name(&self) -> &str {
            "get_weather"
        }
        fn description(&self) -> &str {
            "weather"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "get_weather".into(),
                    reason: "network error: connection refused".into(),
                });
            }
            Ok(ToolResult::structured(serde_json::json!({
                "city": arguments["city"],
                "temperature_c": 18
            })))
        }
    }

    fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        }
    }

    fn tool_response(name: &str, args: serde_json::Value, text: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::tool_request(
                text,
                vec![MessageToolCall {
                    id: "call_1".into(),
                    name: name.into(),
                    arguments: args.to_string(),
                }],
            ),
            usage: Some(Usage {
                prompt_tokens: 20,
                completion_tokens: 8,
                total_tokens: 28,
            }),
            model: "mock-model".into(),
        }
    }

    fn settings() -> TurnSettings {
        TurnSettings {
            model: "mock-model".into(),
            temperature: 0.2,
            max_tokens: None,
            system_prompt: "You are a helpful and concise assistant.".into(),
            history_budget: 1200,
        }
    }

    struct Harness {
        controller: TurnController,
        store: Arc<InMemoryStore>,
        weather: Arc<StubWeather>,
    }

    struct SharedTool(Arc<StubWeather>);

    #[async_trait]
    impl Tool for SharedTool {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn description(&self) -> &str {
            self.0.description()
        }
        fn parameters_schema(&self) -> serde_json::Value {
            self.0.parameters_schema()
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            self.0.execute(arguments).await
        }
    }

    fn harness(provider: Arc<dyn Provider>, tool_fails: bool) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let weather = Arc::new(StubWeather {
            calls: AtomicUsize::new(0),
            fail: tool_fails,
        });
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SharedTool(weather.clone())));

        let controller = TurnController::new(
            provider,
            store.clone(),
            Arc::new(registry),
            ToolGate::new(["/weather", "/wiki", "/upper"]),
            settings(),
        );
        Harness {
            controller,
            store,
            weather,
        }
    }

    fn sid(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[tokio::test]
    async fn plain_message_persists_user_and_reply() {
        let h = harness(Arc::new(EchoProvider), false);
        let outcome = h.controller.run(&sid("s1"), "Hello").await.unwrap();

        assert_eq!(outcome.reply, "echo: Hello");
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.tool_phases, 0);

        let history = h.store.get_history(&sid("s1")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Hello");
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn plain_message_is_sent_without_tools() {
        let provider = ScriptedProvider::new(vec![Ok(text_response("Hi!"))]);
        let h = harness(provider.clone(), false);
        h.controller.run(&sid("s1"), "Hello").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].tools_enabled);
        assert!(requests[0].advertised_tools().is_empty());
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages.last().unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn weather_turn_persists_four_messages_in_order() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("get_weather", serde_json::json!({"city": "Paris"}), "")),
            Ok(text_response("It is 18°C in Paris.")),
        ]);
        let h = harness(provider.clone(), false);
        let outcome = h.controller.run(&sid("w"), "/weather Paris").await.unwrap();

        assert_eq!(outcome.reply, "It is 18°C in Paris.");
        assert_eq!(outcome.model_calls, 2);
        assert_eq!(outcome.tool_phases, 1);
        assert_eq!(h.weather.calls.load(Ordering::SeqCst), 1);

        let history = h.store.get_history(&sid("w")).await.unwrap();
        let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert!(history[1].requests_tools());
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(history[2].tool_name.as_deref(), Some("get_weather"));
        assert!(history[2].content.contains("Paris"));
        assert!(!history[3].requests_tools());

        let requests = provider.requests();
        assert!(requests[0].tools_enabled);
        assert_eq!(requests[0].advertised_tools().len(), 1);
        assert!(!requests[1].tools_enabled);
        assert!(requests[1].advertised_tools().is_empty());
        assert!(requests[1].messages.last().unwrap().is_tool_result());
    }

    #[tokio::test]
    async fn user_message_is_persisted_and_sent_once() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("get_weather", serde_json::json!({"city": "Oslo"}), "")),
            Ok(text_response("Cold.")),
        ]);
        let h = harness(provider.clone(), false);
        h.controller.run(&sid("once"), "/weather Oslo").await.unwrap();

        let history = h.store.get_history(&sid("once")).await.unwrap();
        let user_count = history.iter().filter(|m| m.role == Role::User).count();
        assert_eq!(user_count, 1);

        let second = &provider.requests()[1];
        let sent = second
            .messages
            .iter()
            .filter(|m| m.role == Role::User && m.content == "/weather Oslo")
            .count();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn tool_failure_becomes_result_and_turn_completes() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("get_weather", serde_json::json!({"city": "Paris"}), "")),
            Ok(text_response("Sorry, the weather service is unreachable.")),
        ]);
        let h = harness(provider, true);
        let outcome = h.controller.run(&sid("f"), "/weather Paris").await.unwrap();

        assert_eq!(outcome.reply, "Sorry, the weather service is unreachable.");
        let history = h.store.get_history(&sid("f")).await.unwrap();
        assert_eq!(history.len(), 4);
        assert!(history[2].content.starts_with("Error:"));
        assert!(history[2].content.contains("network error"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("launch_rocket", serde_json::json!({}), "")),
            Ok(text_response("I cannot do that.")),
        ]);
        let h = harness(provider, false);
        h.controller.run(&sid("u"), "/wiki rockets").await.unwrap();

        let history = h.store.get_history(&sid("u")).await.unwrap();
        assert_eq!(history[2].content, "Error: Tool not found: launch_rocket");
    }

    #[tokio::test]
    async fn second_pass_tool_calls_are_not_executed() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("get_weather", serde_json::json!({"city": "Paris"}), "")),
            Ok(tool_response(
                "get_weather",
                serde_json::json!({"city": "Lyon"}),
                "Paris is mild.",
            )),
        ]);
        let h = harness(provider, false);
        let outcome = h.controller.run(&sid("adv"), "/weather Paris").await.unwrap();

        assert_eq!(outcome.reply, "Paris is mild.");
        assert_eq!(outcome.tool_phases, 1);
        assert_eq!(outcome.model_calls, 2);
        assert_eq!(h.weather.calls.load(Ordering::SeqCst), 1);

        let history = h.store.get_history(&sid("adv")).await.unwrap();
        assert_eq!(history.len(), 4);
        assert!(!history[3].requests_tools());
    }

    #[tokio::test]
    async fn second_pass_with_only_tool_calls_is_a_model_error() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("get_weather", serde_json::json!({"city": "Paris"}), "")),
            Ok(tool_response("get_weather", serde_json::json!({"city": "Lyon"}), "")),
        ]);
        let h = harness(provider, false);
        let err = h.controller.run(&sid("adv2"), "/weather Paris").await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::MalformedResponse(_))));

        // The tool round-trip persisted before the failure stays.
        let history = h.store.get_history(&sid("adv2")).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(h.weather.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uninvited_tool_calls_are_ignored() {
        let provider = ScriptedProvider::new(vec![Ok(tool_response(
            "get_weather",
            serde_json::json!({"city": "Paris"}),
            "Hello there.",
        ))]);
        let h = harness(provider, false);
        let outcome = h.controller.run(&sid("plain"), "Hello").await.unwrap();

        assert_eq!(outcome.reply, "Hello there.");
        assert_eq!(outcome.tool_phases, 0);
        assert_eq!(h.weather.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.get_history(&sid("plain")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn model_failure_persists_nothing() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::ApiError {
            status_code: 503,
            message: "unavailable".into(),
        })]);
        let h = harness(provider, false);
        let err = h.controller.run(&sid("down"), "Hello").await.unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::ApiError { .. })));
        assert!(h.store.get_history(&sid("down")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tools_stay_available_after_a_turn_failed_past_its_tool_step() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("get_weather", serde_json::json!({"city": "Paris"}), "")),
            Err(ProviderError::ApiError {
                status_code: 503,
                message: "unavailable".into(),
            }),
            Ok(tool_response("get_weather", serde_json::json!({"city": "Lyon"}), "")),
            Ok(text_response("Lyon is warm.")),
        ]);
        let h = harness(provider.clone(), false);

        h.controller.run(&sid("retry"), "/weather Paris").await.unwrap_err();
        let history = h.store.get_history(&sid("retry")).await.unwrap();
        assert!(history.last().unwrap().is_tool_result());

        let outcome = h.controller.run(&sid("retry"), "/weather Lyon").await.unwrap();
        assert_eq!(outcome.reply, "Lyon is warm.");
        assert_eq!(outcome.tool_phases, 1);
        assert_eq!(h.weather.calls.load(Ordering::SeqCst), 2);

        let requests = provider.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[2].tools_enabled);
        assert!(!requests[3].tools_enabled);
        assert_eq!(h.store.get_history(&sid("retry")).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn usage_is_summed_across_calls() {
        let provider = ScriptedProvider::new(vec![
            Ok(tool_response("get_weather", serde_json::json!({"city": "Paris"}), "")),
            Ok(text_response("Mild.")),
        ]);
        let h = harness(provider, false);
        let outcome = h.controller.run(&sid("t"), "/weather Paris").await.unwrap();
        assert_eq!(outcome.tokens_input, Some(30));
        assert_eq!(outcome.tokens_output, Some(13));
    }

    #[tokio::test]
    async fn missing_usage_stays_none() {
        let mut response = text_response("ok");
        response.usage = None;
        let provider = ScriptedProvider::new(vec![Ok(response)]);
        let h = harness(provider, false);
        let outcome = h.controller.run(&sid("n"), "Hello").await.unwrap();
        assert_eq!(outcome.tokens_input, None);
        assert_eq!(outcome.tokens_output, None);
    }

    #[tokio::test]
    async fn history_is_trimmed_to_budget() {
        let provider = ScriptedProvider::new(vec![Ok(text_response("short"))]);
        let h = harness(provider.clone(), false);
        let id = sid("long");
        for i in 0..50 {
            h.store
                .append(
                    &id,
                    vec![
                        Message::user(format!("question {i} {}", "q".repeat(40))),
                        Message::assistant(format!("answer {i} {}", "a".repeat(40))),
                    ],
                )
                .await
                .unwrap();
        }

        h.controller.run(&id, "Hello").await.unwrap();

        let request = &provider.requests()[0];
        let (user, trimmed) = request.messages.split_last().unwrap();
        assert_eq!(user.content, "Hello");
        assert_eq!(trimmed[0].role, Role::System);
        assert!(EchoProvider.count_tokens(trimmed) <= 1200);
        assert!(trimmed.len() < 101);
        assert!(trimmed.last().unwrap().content.starts_with("answer 49"));
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_serialize() {
        let h = Arc::new(harness(Arc::new(EchoProvider), false));
        let id = sid("shared");

        let mut handles = Vec::new();
        for i in 0..4 {
            let h = h.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                h.controller.run(&id, &format!("msg {i}")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = h.store.get_history(&id).await.unwrap();
        assert_eq!(history.len(), 8);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].content, format!("echo: {}", pair[0].content));
        }
    }
}
