// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Handlers validate their input and delegate to the stores or the state
//! adapters. Every failure leaves through [`ApiError`].

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use parley_core::{
    AgentType, Attachment, Conversation, CreatePolicy, FailedWrite, HealthStatus, IdentityKey,
    MemoryWrite, Message, MessageCursor, MergeStrategy, NewAttachment, NewConversation,
    ParleyError, Participant, PartialPersist, Role, WriteKind,
};
use parley_state::{TurnMessage, TurnUpdate};
use parley_storage::message_stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::server::GatewayState;

/// Page size used when streaming a whole conversation out of the store.
const MESSAGE_PAGE_SIZE: i64 = 200;

type ApiResult<T> = Result<T, ApiError>;

fn parse_agent(raw: &str) -> Result<AgentType, ParleyError> {
    AgentType::from_str(raw)
        .map_err(|_| ParleyError::InvalidInput(format!("unknown agent type `{raw}`")))
}

// --- Conversations ---

#[derive(Debug, Deserialize)]
pub struct ParticipantRequest {
    pub id: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub entity_type: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub agent_type: Option<AgentType>,
    pub participant: ParticipantRequest,
    #[serde(default)]
    pub policy: CreatePolicy,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: String,
    pub created: bool,
}

/// POST /v1/conversations
///
/// 201 when a conversation was inserted, 200 when an existing one was found.
pub async fn create_conversation(
    State(state): State<GatewayState>,
    body: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body?;
    let new = NewConversation {
        entity_type: body.entity_type,
        entity_id: body.entity_id,
        agent_type: body.agent_type,
        participant_id: body.participant.id,
        participant_role: body.participant.role,
    };
    let (conversation, created) = state.storage.create_conversation(&new, body.policy).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let response = CreateConversationResponse {
        conversation_id: conversation.id,
        created,
    };
    Ok((status, Json(response)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    #[serde(default)]
    pub participant: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
}

/// GET /v1/conversations?participant=ID
pub async fn list_conversations(
    State(state): State<GatewayState>,
    query: Result<Query<ListConversationsQuery>, QueryRejection>,
) -> ApiResult<Json<ConversationListResponse>> {
    let Query(query) = query?;
    let participant = query
        .participant
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ParleyError::InvalidInput("`participant` is required".into()))?;
    let conversations = state
        .storage
        .list_conversations_for_participant(&participant)
        .await?;
    Ok(Json(ConversationListResponse { conversations }))
}

#[derive(Debug, Deserialize)]
pub struct ByEntityQuery {
    #[serde(default)]
    pub agent_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationIdResponse {
    pub conversation_id: String,
}

/// GET /v1/conversations/by-entity/{entity_type}/{entity_id}
pub async fn find_by_entity(
    State(state): State<GatewayState>,
    path: Result<Path<(String, String)>, PathRejection>,
    query: Result<Query<ByEntityQuery>, QueryRejection>,
) -> ApiResult<Json<ConversationIdResponse>> {
    let Path((entity_type, entity_id)) = path?;
    let Query(query) = query?;
    let agent = query.agent_type.as_deref().map(parse_agent).transpose()?;

    let conversation = state
        .storage
        .find_conversation(&entity_type, Some(&entity_id), agent)
        .await?
        .ok_or_else(|| {
            ParleyError::not_found("conversation", format!("{entity_type}/{entity_id}"))
        })?;
    Ok(Json(ConversationIdResponse {
        conversation_id: conversation.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct GetConversationQuery {
    #[serde(default)]
    pub with_attachments: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<Participant>,
    pub messages: Vec<MessageView>,
}

/// GET /v1/conversations/{id}
///
/// The whole conversation: participants and every message in order,
/// optionally with attachments inlined under each message.
pub async fn get_conversation(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    query: Result<Query<GetConversationQuery>, QueryRejection>,
) -> ApiResult<Json<ConversationView>> {
    let Query(query) = query?;
    let storage = state.storage.as_ref();
    let conversation = storage
        .get_conversation(&id)
        .await?
        .ok_or_else(|| ParleyError::not_found("conversation", id.clone()))?;
    let participants = storage.list_participants(&id).await?;
    let messages: Vec<Message> = message_stream(storage, &id, MESSAGE_PAGE_SIZE)
        .try_collect()
        .await?;

    let mut attachments: Option<HashMap<String, Vec<Attachment>>> = None;
    if query.with_attachments {
        let mut by_message: HashMap<String, Vec<Attachment>> = HashMap::new();
        for (message_id, attachment) in storage.list_attachments_for_conversation(&id).await? {
            by_message.entry(message_id).or_default().push(attachment);
        }
        attachments = Some(by_message);
    }

    let messages = messages
        .into_iter()
        .map(|message| {
            let inlined = attachments
                .as_mut()
                .map(|by_message| by_message.remove(&message.id).unwrap_or_default());
            MessageView {
                message,
                attachments: inlined,
            }
        })
        .collect();

    Ok(Json(ConversationView {
        conversation,
        participants,
        messages,
    }))
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// POST /v1/conversations/{id}/participants
pub async fn add_participant(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Result<Json<ParticipantRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body?;
    state.storage.add_participant(&id, &body.id, body.role).await?;
    Ok((StatusCode::CREATED, Json(OkResponse { ok: true })).into_response())
}

// --- Messages ---

#[derive(Debug, Serialize)]
pub struct AppendMessageResponse {
    pub message_id: String,
    pub seq: i64,
    pub created_at: String,
    pub attachment_ids: Vec<String>,
}

/// POST /v1/conversations/{id}/messages
///
/// Appends one message and then its attachments. If the message lands but
/// an attachment does not, the response is a partial persist failure.
pub async fn append_message(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Result<Json<TurnMessage>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(TurnMessage {
        message,
        attachments,
    }) = body?;
    message.validate()?;
    for attachment in &attachments {
        attachment.validate()?;
    }

    let storage = state.storage.as_ref();
    let saved = storage.append_message(&id, &message).await?;

    let mut attachment_ids = Vec::with_capacity(attachments.len());
    let mut failures = Vec::new();
    for attachment in &attachments {
        match storage.add_attachment(&saved.id, attachment).await {
            Ok(stored) => attachment_ids.push(stored.id),
            Err(err) => failures.push(FailedWrite {
                kind: WriteKind::Attachment,
                target: format!("{}:{}", saved.id, attachment.storage_ref),
                reason: err.to_string(),
            }),
        }
    }
    if !failures.is_empty() {
        tracing::error!(
            conversation_id = %id,
            message_id = %saved.id,
            failures = ?failures,
            "message saved without all of its attachments"
        );
        return Err(ParleyError::PartialPersistFailure(Box::new(PartialPersist {
            conversation_id: id,
            saved_message_ids: vec![saved.id],
            saved_memory_keys: Vec::new(),
            failures,
        }))
        .into());
    }

    let response = AppendMessageResponse {
        message_id: saved.id,
        seq: saved.seq,
        created_at: saved.created_at,
        attachment_ids,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub after_seq: Option<i64>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
}

/// GET /v1/conversations/{id}/messages?after_seq=&after=&limit=
pub async fn list_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    query: Result<Query<ListMessagesQuery>, QueryRejection>,
) -> ApiResult<Json<MessageListResponse>> {
    let Query(query) = query?;
    let cursor = match (query.after_seq, query.after) {
        (Some(_), Some(_)) => {
            return Err(ParleyError::InvalidInput(
                "use either `after_seq` or `after`, not both".into(),
            )
            .into());
        }
        (Some(seq), None) => Some(MessageCursor::AfterSeq(seq)),
        (None, Some(message_id)) => Some(MessageCursor::AfterMessage(message_id)),
        (None, None) => None,
    };
    let messages = state
        .storage
        .list_messages(&id, cursor.as_ref(), query.limit)
        .await?;
    Ok(Json(MessageListResponse { messages }))
}

#[derive(Debug, Serialize)]
pub struct AttachmentIdResponse {
    pub attachment_id: String,
}

/// POST /v1/conversations/{id}/messages/{message_id}/attachments
pub async fn add_attachment(
    State(state): State<GatewayState>,
    Path((id, message_id)): Path<(String, String)>,
    body: Result<Json<NewAttachment>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(attachment) = body?;
    attachment.validate()?;

    let storage = state.storage.as_ref();
    let belongs = storage
        .get_message(&message_id)
        .await?
        .is_some_and(|m| m.conversation_id == id);
    if !belongs {
        return Err(ParleyError::not_found("message", message_id).into());
    }

    let stored = storage.add_attachment(&message_id, &attachment).await?;
    let response = AttachmentIdResponse {
        attachment_id: stored.id,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

// --- Memory ---

#[derive(Debug, Deserialize)]
pub struct PutMemoryRequest {
    pub value: Value,
    #[serde(default)]
    pub merge_strategy: Option<MergeStrategy>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PutMemoryResponse {
    pub ok: bool,
    pub version: i64,
}

/// PUT /v1/conversations/{id}/memory/{key}
///
/// Without `merge_strategy` the configured strategy for the key applies.
pub async fn put_memory(
    State(state): State<GatewayState>,
    Path((id, key)): Path<(String, String)>,
    body: Result<Json<PutMemoryRequest>, JsonRejection>,
) -> ApiResult<Json<PutMemoryResponse>> {
    let Json(body) = body?;
    if let Some(expected) = body.expected_version
        && expected < 0
    {
        return Err(ParleyError::InvalidInput(format!(
            "expected_version for `{key}` must not be negative"
        ))
        .into());
    }
    let strategy = body
        .merge_strategy
        .unwrap_or_else(|| state.policy.strategy_for(&key));
    let mut write = MemoryWrite::new(key, body.value, strategy);
    write.expected_version = body.expected_version;

    let entry = state.storage.put_memory(&id, &write).await?;
    Ok(Json(PutMemoryResponse {
        ok: true,
        version: entry.version,
    }))
}

#[derive(Debug, Serialize)]
pub struct MemoryValueResponse {
    pub value: Value,
    pub version: i64,
}

/// GET /v1/conversations/{id}/memory/{key}
pub async fn get_memory(
    State(state): State<GatewayState>,
    Path((id, key)): Path<(String, String)>,
) -> ApiResult<Json<MemoryValueResponse>> {
    let entry = state
        .storage
        .get_memory(&id, &key)
        .await?
        .ok_or_else(|| ParleyError::not_found("memory", key))?;
    Ok(Json(MemoryValueResponse {
        value: entry.value,
        version: entry.version,
    }))
}

#[derive(Debug, Serialize)]
pub struct MemoryMapResponse {
    pub memory: BTreeMap<String, Value>,
}

/// GET /v1/conversations/{id}/memory
pub async fn list_memory(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MemoryMapResponse>> {
    let memory = state
        .storage
        .list_memory(&id)
        .await?
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect();
    Ok(Json(MemoryMapResponse { memory }))
}

// --- Agent state ---

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub identity: IdentityKey,
}

/// POST /v1/agents/{agent_type}/restore
///
/// Storage failures degrade to an empty state with `degraded: true`.
pub async fn restore_state(
    State(state): State<GatewayState>,
    Path(agent): Path<String>,
    body: Result<Json<RestoreRequest>, JsonRejection>,
) -> ApiResult<Json<parley_state::RestoreOutcome>> {
    let agent = parse_agent(&agent)?;
    let Json(body) = body?;
    let outcome = state
        .restorer
        .restore_or_default(agent, &body.identity)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct PersistRequest {
    pub identity: IdentityKey,
    #[serde(flatten)]
    pub update: TurnUpdate,
}

/// POST /v1/agents/{agent_type}/persist
pub async fn persist_state(
    State(state): State<GatewayState>,
    Path(agent): Path<String>,
    body: Result<Json<PersistRequest>, JsonRejection>,
) -> ApiResult<Json<parley_state::PersistOutcome>> {
    let agent = parse_agent(&agent)?;
    let Json(body) = body?;
    let outcome = state
        .persister
        .persist(agent, &body.identity, &body.update)
        .await?;
    Ok(Json(outcome))
}

// --- Health ---

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// GET /health
///
/// Unauthenticated. Reports storage health; 503 when storage is unhealthy.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let (status, detail) = match state.storage.health_check().await {
        Ok(HealthStatus::Healthy) => ("healthy", None),
        Ok(HealthStatus::Degraded(reason)) => ("degraded", Some(reason)),
        Ok(HealthStatus::Unhealthy(reason)) => ("unhealthy", Some(reason)),
        Err(err) => ("unhealthy", Some(err.to_string())),
    };
    let code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = HealthResponse {
        status,
        detail,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    };
    (code, Json(body)).into_response()
}
