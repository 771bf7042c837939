//! HTTP routes for submitting records, sealing them and inspecting the chain.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, LedgerError};
use crate::ledger::{ChainReport, SealSummary, Snapshot};
use crate::model::{Block, Record, RecordId};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send-email", post(send_email))
        .route("/records", post(submit_record))
        .route("/seal", post(seal))
        .route("/blockchain", get(blockchain))
        .route("/block/:index", get(get_block))
        .route("/record/:id", get(get_record))
        .route("/validate", get(validate_chain))
        .route("/health", get(health))
        .route("/version", get(version))
}

/// Optional file carried along with an email. Content is opaque to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Base64 body, stored verbatim.
    pub content: String,
}

#[derive(Deserialize)]
pub struct EmailInput {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

/// Payload shape recorded for an email-send request.
#[derive(Serialize)]
struct EmailRecord {
    to: String,
    subject: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<Attachment>,
}

impl EmailInput {
    fn into_payload(self) -> Result<serde_json::Value, ApiError> {
        let to = match self.to {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(ApiError::BadRequest("must provide to".into())),
        };
        let subject = match self.subject {
            Some(s) if !s.trim().is_empty() => s,
            _ => return Err(ApiError::BadRequest("must provide subject".into())),
        };
        let record = EmailRecord {
            to,
            subject,
            text: self.text.unwrap_or_default(),
            attachment: self.attachment,
        };
        serde_json::to_value(record).map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

#[derive(Serialize, Deserialize)]
pub struct SendEmailOutput {
    pub id: RecordId,
    /// Block the record was sealed into, if it was.
    pub block: Option<Block>,
}

/// POST /send-email — record the request and seal it right away.
pub async fn send_email(
    State(state): State<AppState>,
    Json(payload): Json<EmailInput>,
) -> Result<Json<SendEmailOutput>, ApiError> {
    let payload = payload.into_payload()?;
    let id = state.ledger.submit(payload);
    state.ledger.seal_now_blocking().await?;

    // A concurrent seal may have picked the record up first.
    let block = state
        .ledger
        .find_record(&id)
        .and_then(|loc| state.ledger.block_at(loc.block_index));
    Ok(Json(SendEmailOutput { id, block }))
}

#[derive(Serialize, Deserialize)]
pub struct SubmitOutput {
    pub id: RecordId,
    pub pending: usize,
}

/// POST /records — queue an arbitrary JSON payload without sealing.
pub async fn submit_record(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<SubmitOutput>, ApiError> {
    if payload.is_null() {
        return Err(ApiError::BadRequest("payload must not be null".into()));
    }
    let id = state.ledger.submit(payload);
    Ok(Json(SubmitOutput {
        id,
        pending: state.ledger.pending_len(),
    }))
}

#[derive(Serialize)]
pub struct SealOutput {
    pub sealed: bool,
    pub summary: Option<SealSummary>,
}

/// POST /seal
pub async fn seal(State(state): State<AppState>) -> Result<Json<SealOutput>, ApiError> {
    let summary = state.ledger.seal_now_blocking().await?;
    Ok(Json(SealOutput {
        sealed: summary.is_some(),
        summary,
    }))
}

/// GET /blockchain
pub async fn blockchain(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.ledger.snapshot())
}

/// GET /block/:index
pub async fn get_block(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> Result<Json<Block>, ApiError> {
    state
        .ledger
        .block_at(index)
        .map(Json)
        .ok_or_else(|| LedgerError::NotFound(format!("block {index}")).into())
}

#[derive(Serialize, Deserialize)]
pub struct RecordStatus {
    /// `None` while the record is still pending.
    pub block_index: Option<u64>,
    pub record: Record,
}

/// GET /record/:id
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
) -> Result<Json<RecordStatus>, ApiError> {
    if let Some(loc) = state.ledger.find_record(&id) {
        return Ok(Json(RecordStatus {
            block_index: Some(loc.block_index),
            record: loc.record,
        }));
    }
    state
        .ledger
        .pending_record(&id)
        .map(|record| {
            Json(RecordStatus {
                block_index: None,
                record,
            })
        })
        .ok_or_else(|| LedgerError::NotFound(format!("record {id}")).into())
}

/// GET /validate
pub async fn validate_chain(State(state): State<AppState>) -> Json<ChainReport> {
    Json(state.ledger.validate())
}

/// GET /health
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// GET /version
#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
    pub git_sha: Option<&'static str>,
}
pub async fn version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("GIT_SHA"),
    })
}
