//! HTTP API v1 — run start/stream and agent metadata.
//!
//! Endpoints (nested under `/api/v1`):
//!
//! - `POST /chat/start`              — Start a chat run, returns its run id
//! - `GET  /chat/stream/{run_id}`    — SSE stream of a chat run (read once)
//! - `GET  /agent`                   — List agent cards
//! - `GET  /agent/{id}`              — Get one agent card
//! - `POST /agent/{id}/start`        — Start a run against one agent
//! - `GET  /agent/stream/{run_id}`   — SSE stream of an agent run (read once)

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use switchboard_agent::{RunContext, RunJob, RunStream, TurnLoop, client_tool};
use switchboard_core::agent::{A2AOptions, AgentCard};
use switchboard_core::error::RunError;
use switchboard_core::message::{Message, Role, ToolCallRequest};
use switchboard_core::schema::ToolDescriptor;

use crate::SharedState;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/api/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat/start", post(chat_start_handler))
        .route("/chat/stream/{run_id}", get(chat_stream_handler))
        .route("/agent", get(list_agents_handler))
        .route("/agent/", get(list_agents_handler))
        .route("/agent/{id}", get(get_agent_handler))
        .route("/agent/{id}/start", post(agent_start_handler))
        .route("/agent/stream/{run_id}", get(agent_stream_handler))
        .with_state(state)
}

// ── Request / response types ──────────────────────────────────────────────

/// Body of a start request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<InputMessage>,
    /// Tools the client will handle itself
    #[serde(default)]
    pub tools: Vec<InputTool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// Calls an earlier assistant turn made
    #[serde(default)]
    pub tool_calls: Vec<InputToolCall>,
}

impl InputMessage {
    fn into_message(self) -> Message {
        let mut message = Message::new(self.role, self.content.unwrap_or_default());
        if let Some(id) = self.id {
            message.id = id;
        }
        message.name = self.name;
        message.tool_call_id = self.tool_call_id;
        message.tool_calls = self
            .tool_calls
            .into_iter()
            .map(|call| ToolCallRequest::new(call.id, call.function.name, call.function.arguments))
            .collect();
        message
    }
}

/// `{id, type: "function", function: {name, arguments}}`
#[derive(Debug, Deserialize)]
pub struct InputToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub function: InputFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct InputFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct InputTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub run_id: String,
    pub thread_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

fn run_error(error: RunError) -> ApiError {
    let status = match error {
        RunError::NotFound(_) => StatusCode::NOT_FOUND,
        RunError::Duplicate(_) => StatusCode::CONFLICT,
    };
    api_error(status, error.to_string())
}

/// Encode a run's events as SSE `data:` frames.
fn sse(stream: RunStream) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let events = stream.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().data(data))
    });
    Sse::new(events)
}

// ── Chat ──────────────────────────────────────────────────────────────────

/// `POST /api/v1/chat/start`: Record a chat run. Nothing executes until
/// its stream is requested.
async fn chat_start_handler(
    State(state): State<SharedState>,
    Json(input): Json<RunInput>,
) -> Result<Json<StartResponse>, ApiError> {
    let client_tools = input
        .tools
        .into_iter()
        .map(|tool| client_tool(tool.name, tool.description, tool.parameters))
        .collect::<Result<Vec<ToolDescriptor>, _>>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let mut history = Vec::with_capacity(input.messages.len() + 1);
    history.push(Message::system(&state.system_prompt));
    history.extend(input.messages.into_iter().map(InputMessage::into_message));

    info!(
        messages = history.len() - 1,
        client_tools = client_tools.len(),
        "Chat run requested"
    );

    let job_state = Arc::clone(&state);
    let job: RunJob = Box::new(move |ctx: RunContext| {
        async move {
            let mut history = history;
            TurnLoop::new(&job_state.agents)
                .with_tools(Some(job_state.tools.as_ref()))
                .with_client_tools(client_tools)
                .with_thread_id(ctx.thread_id)
                .with_events(ctx.events)
                .run(&mut history, &job_state.model)
                .await
        }
        .boxed()
    });

    let started = state
        .chat_runs
        .start(input.run_id, input.thread_id, job)
        .await
        .map_err(run_error)?;
    Ok(Json(StartResponse {
        run_id: started.run_id,
        thread_id: started.thread_id,
    }))
}

/// `GET /api/v1/chat/stream/{run_id}`: Stream a chat run's events.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let stream = state.chat_runs.stream(&run_id).await.map_err(|e| {
        warn!(run_id = %run_id, "Chat stream requested for unknown run");
        run_error(e)
    })?;
    Ok(sse(stream))
}

// ── Agents ────────────────────────────────────────────────────────────────

/// `GET /api/v1/agent`: List agent cards.
async fn list_agents_handler(State(state): State<SharedState>) -> Json<Vec<AgentCard>> {
    Json(state.agents.cards().await)
}

/// `GET /api/v1/agent/{id}`: Get one agent card.
async fn get_agent_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<AgentCard>, ApiError> {
    state
        .agents
        .lookup(&id)
        .await
        .map(|agent| Json(agent.card()))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Agent '{id}' not found")))
}

/// `POST /api/v1/agent/{id}/start`: Record a run against one agent, on
/// the text of the first message.
async fn agent_start_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(input): Json<RunInput>,
) -> Result<Json<StartResponse>, ApiError> {
    if !state.agents.contains(&id).await {
        return Err(api_error(StatusCode::NOT_FOUND, format!("Agent '{id}' not found")));
    }
    let text = input
        .messages
        .into_iter()
        .next()
        .and_then(|m| m.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "The first message must carry text"))?;

    info!(agent_id = %id, "Agent run requested");

    let job_state = Arc::clone(&state);
    let job: RunJob = Box::new(move |ctx: RunContext| {
        async move {
            let options = A2AOptions {
                thread_id: ctx.thread_id.clone(),
                ..A2AOptions::from_user(text)
            };
            let message = job_state.agents.execute(&id, options).await?;
            ctx.events.text_message(&message.id, &message.content);
            Ok(message)
        }
        .boxed()
    });

    let started = state
        .agent_runs
        .start(input.run_id, input.thread_id, job)
        .await
        .map_err(run_error)?;
    Ok(Json(StartResponse {
        run_id: started.run_id,
        thread_id: started.thread_id,
    }))
}

/// `GET /api/v1/agent/stream/{run_id}`: Stream an agent run's events.
async fn agent_stream_handler(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let stream = state.agent_runs.stream(&run_id).await.map_err(|e| {
        warn!(run_id = %run_id, "Agent stream requested for unknown run");
        run_error(e)
    })?;
    Ok(sse(stream))
}

// ── Tests ─────────────────────────────────────────────────────────────────
