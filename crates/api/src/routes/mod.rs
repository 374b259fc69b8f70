use std::collections::HashSet;

use axum::extract::{Extension, Query, State};
use axum::{
    Json, Router,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use ludus_domain::chat::HistoryQuery;
use ludus_domain::error::DomainError;
use ludus_domain::notification::{SendError, SendInput, SendWarning};
use ludus_domain::profanity::CensorRule;
use ludus_domain::util::{format_ms_rfc3339, parse_rfc3339_ms};

use crate::middleware::AuthContext;
use crate::observability;
use crate::{error::ApiError, middleware as app_middleware, state::AppState, validation};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/messages/history", get(message_history))
        .route("/v1/messages/peers-latest", get(peers_latest))
        .route("/v1/messages/read", post(mark_messages_read))
        .route("/v1/messages/send", post(send_message))
        .route("/v1/profanity/list", get(profanity_list))
        .route("/v1/profanity/reload", post(profanity_reload))
        .route("/v1/notifications/send", post(send_notification))
        .route_layer(middleware::from_fn(app_middleware::require_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(protected)
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => ApiError::Internal.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    other_id: i64,
    before_iso: Option<String>,
    before_id: Option<i64>,
    after_iso: Option<String>,
    after_id: Option<i64>,
    latest: Option<bool>,
    take: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryItemResponse {
    message_id: i64,
    sender_id: i64,
    receiver_id: i64,
    content: String,
    sent_at_iso: String,
    is_mine: bool,
    is_read: bool,
}

async fn message_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryItemResponse>>, ApiError> {
    let viewer_id = viewer_id(&auth)?;
    let query = HistoryQuery {
        before_ms: parse_cursor(params.before_iso.as_deref())?,
        before_id: params.before_id,
        after_ms: parse_cursor(params.after_iso.as_deref())?,
        after_id: params.after_id,
        latest: params.latest.unwrap_or(false),
        take: params.take,
    };

    let items = state
        .chat
        .history(viewer_id, params.other_id, query)
        .await
        .map_err(map_domain_error)?;

    Ok(Json(
        items
            .into_iter()
            .map(|item| HistoryItemResponse {
                message_id: item.message_id,
                sender_id: item.sender_id,
                receiver_id: item.receiver_id,
                content: item.content,
                sent_at_iso: format_ms_rfc3339(item.sent_at_ms),
                is_mine: item.is_mine,
                is_read: item.is_read,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeersLatestParams {
    peer_ids: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PeerPreviewResponse {
    peer_id: i64,
    last_content: Option<String>,
    last_iso: Option<String>,
    unread: usize,
}

async fn peers_latest(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<PeersLatestParams>,
) -> Result<Json<Vec<PeerPreviewResponse>>, ApiError> {
    let viewer_id = viewer_id(&auth)?;
    let filter = params
        .peer_ids
        .as_deref()
        .map(parse_peer_filter)
        .transpose()?;

    let previews = state
        .chat
        .peers_latest(viewer_id, filter.as_ref())
        .await
        .map_err(map_domain_error)?;

    Ok(Json(
        previews
            .into_iter()
            .map(|preview| PeerPreviewResponse {
                peer_id: preview.peer_id,
                last_content: preview.last_content,
                last_iso: preview.last_sent_at_ms.map(format_ms_rfc3339),
                unread: preview.unread,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadRequest {
    other_id: i64,
}

#[derive(Serialize)]
struct MarkReadResponse {
    marked: usize,
}

async fn mark_messages_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let viewer_id = viewer_id(&auth)?;
    let marked = state
        .chat
        .mark_read(viewer_id, payload.other_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(MarkReadResponse { marked }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    other_id: i64,
    #[validate(length(min = 1, max = 2000))]
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageResponse {
    message_id: i64,
    sent_at_iso: String,
}

async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    validation::validate(&payload)?;
    let viewer_id = viewer_id(&auth)?;
    let message = state
        .chat
        .send_message(viewer_id, payload.other_id, &payload.content)
        .await
        .map_err(map_domain_error)?;
    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message_id: message.message_id,
            sent_at_iso: format_ms_rfc3339(message.sent_at_ms),
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct ProfanityListParams {
    nocache: Option<String>,
}

#[derive(Serialize)]
struct ProfanityListResponse {
    version: u64,
    rules: Vec<CensorRule>,
}

async fn profanity_list(
    State(state): State<AppState>,
    Query(params): Query<ProfanityListParams>,
) -> Result<Json<ProfanityListResponse>, ApiError> {
    if params.nocache.as_deref() == Some("1") {
        let version = state.censor.reload().await.map_err(map_domain_error)?;
        observability::register_censor_reload(version);
    }
    let (version, rules) = state.censor.client_rules();
    Ok(Json(ProfanityListResponse { version, rules }))
}

async fn profanity_reload(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let version = state.censor.reload().await.map_err(map_domain_error)?;
    observability::register_censor_reload(version);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendNotificationRequest {
    source_id: i64,
    action_id: i64,
    to_user_id: Option<i64>,
    to_manager_id: Option<i64>,
    sender_user_id: Option<i64>,
    sender_manager_id: Option<i64>,
    title: Option<String>,
    message: Option<String>,
    group_id: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendNotificationResponse {
    success: bool,
    notification_id: Option<i64>,
    recipients_added: usize,
    warnings: Vec<SendWarning>,
    errors: Vec<SendError>,
}

async fn send_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<SendNotificationRequest>,
) -> Result<Json<SendNotificationResponse>, ApiError> {
    if !auth.role.is_staff() {
        return Err(ApiError::Forbidden);
    }

    let outcome = state
        .dispatcher
        .send(SendInput {
            source_id: payload.source_id,
            action_id: payload.action_id,
            to_user_id: payload.to_user_id,
            to_manager_id: payload.to_manager_id,
            sender_user_id: payload.sender_user_id,
            sender_manager_id: payload.sender_manager_id,
            title: payload.title,
            message: payload.message,
            group_id: payload.group_id,
        })
        .await
        .map_err(map_domain_error)?;

    observability::register_notification_send(outcome.success);
    Ok(Json(SendNotificationResponse {
        success: outcome.success,
        notification_id: outcome.notification_id,
        recipients_added: outcome.recipients_added,
        warnings: outcome.warnings,
        errors: outcome.errors,
    }))
}

fn viewer_id(auth: &AuthContext) -> Result<i64, ApiError> {
    auth.user_id.ok_or(ApiError::Unauthorized)
}

fn parse_cursor(value: Option<&str>) -> Result<Option<i64>, ApiError> {
    value
        .map(|iso| parse_rfc3339_ms(iso).map_err(map_domain_error))
        .transpose()
}

fn parse_peer_filter(raw: &str) -> Result<HashSet<i64>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| ApiError::Validation(format!("invalid peer id '{part}'")))
        })
        .collect()
}

fn map_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(message) => ApiError::Validation(message),
        DomainError::NotFound => ApiError::NotFound,
        DomainError::Conflict => ApiError::Conflict,
        DomainError::Db(message) => {
            tracing::error!(error = %message, "storage failure");
            ApiError::Internal
        }
    }
}
