//! End-to-end runs through the full router: start, stream, and the tool
//! results that reach the model.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use switchboard_agent::{AgentRegistry, LoopSettings};
use switchboard_config::{AppConfig, GatewayConfig};
use switchboard_core::error::{ProviderError, ToolError};
use switchboard_core::message::{Message, Role, ToolCallRequest};
use switchboard_core::provider::{Provider, ProviderRequest, ProviderResponse};
use switchboard_core::schema::ParameterSpec;
use switchboard_core::tool::{Tool, ToolOutput, ToolRegistry};
use switchboard_gateway::{GatewayState, build_router};

struct Scripted {
    script: Mutex<Vec<Message>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl Scripted {
    fn new(script: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl Provider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Err(ProviderError::Network("script exhausted".into()));
        }
        Ok(ProviderResponse {
            message: script.remove(0),
            usage: None,
            model: "scripted".into(),
        })
    }
}

struct Weather;

#[async_trait::async_trait]
impl Tool for Weather {
    fn name(&self) -> &str {
        "weather"
    }
    fn description(&self) -> &str {
        "Current weather for a city"
    }
    fn parameters(&self) -> ParameterSpec {
        json!({
            "type": "object",
            "properties": { "city": { "type": "string" } },
            "required": ["city"]
        })
        .into()
    }
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(format!(
            "Sunny in {}",
            arguments["city"].as_str().unwrap_or_default()
        )))
    }
}

fn app(provider: Arc<Scripted>) -> Router {
    let agents = Arc::new(AgentRegistry::new(provider, LoopSettings::default()));
    let mut tools = ToolRegistry::new();
    tools.register(Weather).unwrap();
    let state = Arc::new(GatewayState::new(agents, Arc::new(tools), &AppConfig::default()));
    build_router(state, &GatewayConfig::default())
}

async fn run(app: &Router, body: Value) -> Vec<Value> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/chat/start")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let started: Value = serde_json::from_slice(&bytes).unwrap();
    let run_id = started["runId"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/chat/stream/{run_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn registered_tool_result_reaches_the_model() {
    let provider = Scripted::new(vec![
        Message::assistant("Let me check.").with_tool_calls(vec![ToolCallRequest::new(
            "call-1",
            "weather",
            r#"{"city":"Oslo"}"#,
        )]),
        Message::assistant("It is sunny in Oslo."),
    ]);
    let app = app(provider.clone());

    let events = run(
        &app,
        json!({"threadId": "t-9", "messages": [{"role": "user", "content": "Weather in Oslo?"}]}),
    )
    .await;

    let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(
        types,
        vec![
            "RUN_STARTED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "TOOL_CALL_START",
            "TOOL_CALL_ARGS",
            "TOOL_CALL_END",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED"
        ]
    );
    assert_eq!(events[0]["threadId"], "t-9");
    assert_eq!(events[4]["toolCallName"], "weather");
    assert_eq!(events[4]["parentMessageId"], events[1]["messageId"]);
    assert_eq!(events[5]["delta"], r#"{"city":"Oslo"}"#);
    assert!(events[10].get("error").is_none());

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let tool_message = requests[1].messages.last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call-1"));
    assert_eq!(tool_message.content, "Sunny in Oslo");
}

#[tokio::test]
async fn invalid_arguments_are_reported_to_the_model() {
    let provider = Scripted::new(vec![
        Message::assistant("").with_tool_calls(vec![ToolCallRequest::new("call-1", "weather", r#"{"town":"Oslo"}"#)]),
        Message::assistant("Which city?"),
    ]);
    let app = app(provider.clone());

    let events = run(&app, json!({"messages": [{"role": "user", "content": "Weather?"}]})).await;
    assert_eq!(events.last().unwrap()["type"], "RUN_FINISHED");

    let requests = provider.requests.lock().unwrap();
    let tool_message = requests[1].messages.last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.content.starts_with("Error:"));
}
