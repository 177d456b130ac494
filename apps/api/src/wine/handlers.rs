use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::{CurrentSession, Session, SessionInfo};
use crate::state::AppState;
use crate::wine::dedup::{resolve, Decision, ImportReport, MergeSuggestion, Resolution};
use crate::wine::export::{to_csv, to_json, to_markdown, ExportFormat};
use crate::wine::import::{apply, parse_uploads, UploadedFile};
use crate::wine::library::{CommitOutcome, ListQuery};
use crate::wine::models::{non_empty, RecordSource, WineRecord};
use crate::wine::selection::{combine, preview, summary, SelectionResponse};

// ────────────────────────────────────────────────────────────────────────────
// Request / response bodies
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub report: ImportReport,
    pub suggestions: Vec<MergeSuggestion>,
    pub records: Vec<WineRecord>,
}

/// Editable fields of a record. Ids, source and source files are server-owned.
#[derive(Deserialize)]
pub struct RecordInput {
    pub name: String,
    #[serde(default)]
    pub producer: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub grape_variety: Option<String>,
    #[serde(default)]
    pub vintage: Option<u16>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub alcohol_content: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RecordInput {
    fn into_record(self, source: RecordSource) -> Result<WineRecord, AppError> {
        if self.price.is_some_and(|p| !p.is_finite() || p < 0.0) {
            return Err(AppError::Validation("price must be a non-negative number".to_string()));
        }
        let mut record = WineRecord::new(self.name.trim(), source);
        record.producer = non_empty(self.producer);
        record.region = non_empty(self.region);
        record.country = non_empty(self.country);
        record.grape_variety = non_empty(self.grape_variety);
        record.vintage = self.vintage;
        record.price = self.price;
        record.alcohol_content = non_empty(self.alcohol_content);
        record.notes = non_empty(self.notes);
        Ok(record)
    }
}

#[derive(Serialize)]
pub struct CommitResponse {
    pub outcome: &'static str,
    pub record: WineRecord,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
}

#[derive(Deserialize)]
pub struct SelectionRequest {
    pub record_ids: Vec<Uuid>,
}

async fn in_session<R>(
    state: &AppState,
    caller: &CurrentSession,
    f: impl FnOnce(&mut Session) -> R,
) -> Result<R, AppError> {
    state
        .sessions
        .with_session(caller.token, f)
        .await
        .ok_or(AppError::Unauthorized)
}

// ────────────────────────────────────────────────────────────────────────────
// Sessions
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<(StatusCode, Json<SessionInfo>), AppError> {
    if !state.config.credentials.verify(req.username.trim(), &req.password) {
        info!(username = %req.username, "login rejected");
        return Err(AppError::Unauthorized);
    }
    let session = state.sessions.create(req.username.trim()).await;
    info!(username = %session.username, "session started");
    Ok((StatusCode::CREATED, Json(session)))
}

/// DELETE /api/v1/sessions
pub async fn handle_logout(
    State(state): State<AppState>,
    caller: CurrentSession,
) -> StatusCode {
    state.sessions.end(caller.token).await;
    info!(username = %caller.username, "session ended");
    StatusCode::NO_CONTENT
}

// ────────────────────────────────────────────────────────────────────────────
// Imports
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/imports
///
/// Multipart body with one or more `file` parts.
pub async fn handle_import(
    State(state): State<AppState>,
    caller: CurrentSession,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("upload-{}.pdf", files.len() + 1));
        let bytes = field.bytes().await?;
        files.push(UploadedFile { name, bytes });
    }
    if files.is_empty() {
        return Err(AppError::Validation("Attach at least one PDF as a 'file' part".to_string()));
    }

    let parsed = parse_uploads(state.extractor.clone(), files).await?;

    let threshold = state.config.fuzzy_match_threshold;
    let response = in_session(&state, &caller, |session| {
        let before: Vec<Uuid> = session.pending.list().iter().map(|s| s.id).collect();
        let report = apply(&mut session.library, &mut session.pending, threshold, parsed);
        ImportResponse {
            report,
            suggestions: session
                .pending
                .list()
                .iter()
                .filter(|s| !before.contains(&s.id))
                .cloned()
                .collect(),
            records: session.library.records().to_vec(),
        }
    })
    .await?;

    info!(
        username = %caller.username,
        added = response.report.added,
        merged = response.report.merged,
        skipped = response.report.skipped,
        flagged = response.report.flagged,
        dropped_fields = response.report.dropped_fields,
        library_size = response.records.len(),
        "import applied"
    );
    Ok(Json(response))
}

// ────────────────────────────────────────────────────────────────────────────
// Library
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/library
pub async fn handle_list_library(
    State(state): State<AppState>,
    caller: CurrentSession,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<WineRecord>>, AppError> {
    let records: Vec<WineRecord> = in_session(&state, &caller, |s| {
        s.library.list(&query).into_iter().cloned().collect()
    })
    .await?;
    Ok(Json(records))
}

/// DELETE /api/v1/library
pub async fn handle_clear_library(
    State(state): State<AppState>,
    caller: CurrentSession,
) -> Result<Json<ClearResponse>, AppError> {
    let removed = in_session(&state, &caller, |s| {
        s.pending.clear();
        s.library.clear()
    })
    .await?;
    Ok(Json(ClearResponse { removed }))
}

/// POST /api/v1/library/records
pub async fn handle_commit_record(
    State(state): State<AppState>,
    caller: CurrentSession,
    Json(input): Json<RecordInput>,
) -> Result<(StatusCode, Json<CommitResponse>), AppError> {
    let record = input.into_record(RecordSource::Manual)?;
    let (status, response) = in_session(&state, &caller, |s| {
        let (status, outcome, id) = match s.library.commit(record)? {
            CommitOutcome::Added(id) => (StatusCode::CREATED, "added", id),
            CommitOutcome::Replaced(id) => (StatusCode::OK, "replaced", id),
        };
        s.pending.prune(&s.library);
        let record = s
            .library
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("committed record {id} missing")))?;
        Ok::<_, AppError>((status, CommitResponse { outcome, record }))
    })
    .await??;
    Ok((status, Json(response)))
}

/// GET /api/v1/library/records/:id
pub async fn handle_get_record(
    State(state): State<AppState>,
    caller: CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<Json<WineRecord>, AppError> {
    in_session(&state, &caller, |s| s.library.get(id).cloned())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Wine record {id} not found")))
}

/// PUT /api/v1/library/records/:id
pub async fn handle_update_record(
    State(state): State<AppState>,
    caller: CurrentSession,
    Path(id): Path<Uuid>,
    Json(input): Json<RecordInput>,
) -> Result<Json<WineRecord>, AppError> {
    let record = input.into_record(RecordSource::Manual)?;
    let updated = in_session(&state, &caller, |s| {
        s.library.update(id, record).map(|r| r.clone())
    })
    .await??;
    Ok(Json(updated))
}

/// DELETE /api/v1/library/records/:id
pub async fn handle_delete_record(
    State(state): State<AppState>,
    caller: CurrentSession,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    in_session(&state, &caller, |s| {
        s.library.remove(id)?;
        s.pending.prune(&s.library);
        Ok::<_, AppError>(())
    })
    .await??;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/library/export?format=markdown|json|csv
pub async fn handle_export(
    State(state): State<AppState>,
    caller: CurrentSession,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let body = in_session(&state, &caller, |s| {
        let records: Vec<&WineRecord> = s.library.records().iter().collect();
        match query.format {
            ExportFormat::Markdown => Ok(to_markdown(&records)),
            ExportFormat::Json => to_json(&records).map_err(anyhow::Error::from),
            ExportFormat::Csv => to_csv(&records),
        }
    })
    .await??;

    let content_type = match query.format {
        ExportFormat::Markdown => "text/markdown; charset=utf-8",
        ExportFormat::Json => "application/json",
        ExportFormat::Csv => "text/csv; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

// ────────────────────────────────────────────────────────────────────────────
// Suggestions and selection
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/suggestions
pub async fn handle_list_suggestions(
    State(state): State<AppState>,
    caller: CurrentSession,
) -> Result<Json<Vec<MergeSuggestion>>, AppError> {
    let suggestions = in_session(&state, &caller, |s| s.pending.list().to_vec()).await?;
    Ok(Json(suggestions))
}

/// POST /api/v1/suggestions/:id
pub async fn handle_resolve_suggestion(
    State(state): State<AppState>,
    caller: CurrentSession,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<Resolution>, AppError> {
    let resolution = in_session(&state, &caller, |s| {
        resolve(&mut s.library, &mut s.pending, id, req.decision)
    })
    .await??;
    info!(username = %caller.username, suggestion = %id, ?resolution, "suggestion resolved");
    Ok(Json(resolution))
}

/// POST /api/v1/selection
pub async fn handle_selection(
    State(state): State<AppState>,
    caller: CurrentSession,
    Json(req): Json<SelectionRequest>,
) -> Result<Json<SelectionResponse>, AppError> {
    let merged = in_session(&state, &caller, |s| {
        let mut wines = Vec::with_capacity(req.record_ids.len());
        for id in &req.record_ids {
            let wine = s
                .library
                .get(*id)
                .ok_or_else(|| AppError::NotFound(format!("Wine record {id} not found")))?;
            wines.push(wine);
        }
        Ok::<_, AppError>(combine(&wines)?)
    })
    .await??;

    Ok(Json(SelectionResponse {
        preview: preview(&merged),
        summary: summary(&merged),
        merged,
    }))
}
