use crate::db::{Poll, PollResults};
use crate::error::PollError;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub option: String,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
    pub votes: std::collections::BTreeMap<String, u64>,
    pub total_votes: u64,
    pub created_at: String,
}

impl From<Poll> for PollResponse {
    fn from(poll: Poll) -> Self {
        PollResponse {
            total_votes: poll.votes.values().sum(),
            id: poll.id,
            question: poll.question,
            options: poll.options,
            votes: poll.votes,
            created_at: poll.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub success: bool,
    pub message: String,
    pub results: PollResults,
}

/// Create a new poll
pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, PollError> {
    let poll = app_state
        .polls
        .create_poll(payload.question, payload.options)
        .await?;

    Ok((StatusCode::CREATED, Json(PollResponse::from(poll))))
}

/// Get all polls
pub async fn list_polls(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, PollError> {
    let polls: Vec<PollResponse> = app_state
        .polls
        .list_polls()
        .await?
        .into_iter()
        .map(PollResponse::from)
        .collect();

    Ok((StatusCode::OK, Json(polls)))
}

/// Get a specific poll with its vote counts
pub async fn get_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, PollError> {
    let poll = app_state.polls.get_poll(poll_id).await?;

    Ok((StatusCode::OK, Json(PollResponse::from(poll))))
}

/// Replace a poll's question and options
pub async fn update_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
    Json(payload): Json<UpdatePollRequest>,
) -> Result<impl IntoResponse, PollError> {
    let poll = app_state
        .polls
        .update_poll(poll_id, payload.question, payload.options)
        .await?;

    Ok((StatusCode::OK, Json(PollResponse::from(poll))))
}

pub async fn delete_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, PollError> {
    app_state.polls.delete_poll(poll_id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Poll deleted successfully"
        })),
    ))
}

/// Cast a vote on a poll option
pub async fn vote_on_poll(
    Extension(app_state): Extension<AppState>,
    Path(poll_id): Path<Uuid>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, PollError> {
    let results = app_state.polls.vote(poll_id, &payload.option).await?;

    let response = VoteResponse {
        success: true,
        message: "Vote recorded successfully".to_string(),
        results,
    };
    Ok((StatusCode::OK, Json(response)))
}
