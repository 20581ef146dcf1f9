use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::{Stream, StreamExt, wrappers::WatchStream};
use tracing::info;

use orders::{
    dashboard::{self, DashboardStats, DeadlineEntry},
    model::{
        JobFields, JobOrder, JobPatch, OrderRecord, OrderStatus, RepairFields, RepairOrder,
        RepairPatch,
    },
};

use crate::{
    auth::{self, AuthUser},
    error::AppError,
    sheets::{self, SheetsClient, SheetsConfig},
    state::AppState,
    sync::{self, SyncOutcome},
};

pub async fn health() -> &'static str {
    "ok"
}

// ---- sessions ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    #[serde(default)]
    user: Option<AuthUser>,
    /// Error code reported by the identity provider when sign-in failed.
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    token: String,
    user: AuthUser,
}

#[derive(Serialize)]
pub struct SessionInfo {
    user: Option<AuthUser>,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if let Some(code) = payload.error_code {
        return Err(AppError::Auth(auth::provider_error_message(&code).to_string()));
    }

    let user = match (&state.config.provider, payload.user) {
        // no provider configured: deterministic stand-in identity
        (None, _) => auth::demo_user(),
        (Some(_), Some(user)) => user,
        (Some(_), None) => {
            return Err(AppError::Auth("missing provider profile".to_string()));
        }
    };

    if !auth::is_email_allowed(&state.config.allowed_emails, user.email.as_deref()) {
        let who = user.email.as_deref().unwrap_or(&user.uid);
        return Err(AppError::Forbidden(format!("{who} is not authorized")));
    }

    let token = auth::new_session_token();
    state
        .sessions
        .lock()
        .unwrap()
        .insert(token.clone(), user.clone());

    info!(
        "Session opened for {}",
        user.email.as_deref().unwrap_or(&user.uid)
    );
    Ok(Json(SessionResponse { token, user }))
}

pub async fn current_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<SessionInfo> {
    let user = auth::bearer_token(&headers)
        .and_then(|token| state.sessions.lock().unwrap().get(&token).cloned())
        .filter(|user| {
            auth::is_email_allowed(&state.config.allowed_emails, user.email.as_deref())
        });

    Json(SessionInfo { user })
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> StatusCode {
    if let Some(token) = auth::bearer_token(&headers) {
        state.sessions.lock().unwrap().remove(&token);
    }

    StatusCode::NO_CONTENT
}

// ---- orders ----

#[derive(Serialize)]
pub struct CreateResponse {
    id: String,
    sync: SyncOutcome,
}

#[derive(Serialize)]
pub struct UpdateResponse {
    sync: SyncOutcome,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    status: Option<OrderStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRowQuery {
    /// Zero-based data row of this order in the spreadsheet, when known.
    #[serde(default)]
    sheet_row: Option<usize>,
}

pub async fn create_repair(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(fields): Json<RepairFields>,
) -> Result<Json<CreateResponse>, AppError> {
    validate_repair(&fields)?;

    let id = state.repairs.create(fields).await?;
    let order = state
        .repairs
        .get(&id)
        .await?
        .ok_or_else(|| AppError::Persistence("created order not readable".to_string()))?;

    let sync = sync::mirror_repair_created(state.sheets_client(), &order).await;

    info!(
        "Repair order {id} created by {}",
        user.email.as_deref().unwrap_or(&user.uid)
    );
    Ok(Json(CreateResponse { id, sync }))
}

pub async fn list_repairs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RepairOrder>>, AppError> {
    let mut records = state.repairs.list().await?;
    if let Some(status) = query.status {
        records.retain(|record| record.status == status);
    }

    Ok(Json(records))
}

pub async fn update_repair(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SheetRowQuery>,
    Json(patch): Json<RepairPatch>,
) -> Result<Json<UpdateResponse>, AppError> {
    validate_repair_patch(&patch)?;

    state.repairs.update(&id, patch).await?;

    // absent in fallback mode means the update was a no-op: nothing to mirror
    let sync = match state.repairs.get(&id).await? {
        Some(record) => {
            sync::mirror_repair_updated(state.sheets_client(), &record, query.sheet_row).await
        }
        None => SyncOutcome::Skipped,
    };

    Ok(Json(UpdateResponse { sync }))
}

pub async fn delete_repair(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.repairs.delete(&id).await?;

    info!(
        "Repair order {id} deleted by {}",
        user.email.as_deref().unwrap_or(&user.uid)
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn live_repairs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    snapshot_stream(state.repairs.subscribe())
}

pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(fields): Json<JobFields>,
) -> Result<Json<CreateResponse>, AppError> {
    validate_job(&fields)?;

    let id = state.jobs.create(fields).await?;
    let order = state
        .jobs
        .get(&id)
        .await?
        .ok_or_else(|| AppError::Persistence("created order not readable".to_string()))?;

    let sync = sync::mirror_job_created(state.sheets_client(), &order).await;

    info!(
        "Job order {id} created by {}",
        user.email.as_deref().unwrap_or(&user.uid)
    );
    Ok(Json(CreateResponse { id, sync }))
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<JobOrder>>, AppError> {
    let mut records = state.jobs.list().await?;
    if let Some(status) = query.status {
        records.retain(|record| record.status == status);
    }

    Ok(Json(records))
}

pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SheetRowQuery>,
    Json(patch): Json<JobPatch>,
) -> Result<Json<UpdateResponse>, AppError> {
    validate_job_patch(&patch)?;

    state.jobs.update(&id, patch).await?;

    let sync = match state.jobs.get(&id).await? {
        Some(record) => {
            sync::mirror_job_updated(state.sheets_client(), &record, query.sheet_row).await
        }
        None => SyncOutcome::Skipped,
    };

    Ok(Json(UpdateResponse { sync }))
}

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.jobs.delete(&id).await?;

    info!(
        "Job order {id} deleted by {}",
        user.email.as_deref().unwrap_or(&user.uid)
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn live_jobs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    snapshot_stream(state.jobs.subscribe())
}

fn snapshot_stream<T>(
    rx: watch::Receiver<Vec<T>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let stream = WatchStream::new(rx).map(|records| Event::default().json_data(&records));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---- attachments ----

#[derive(Deserialize)]
pub struct AttachmentQuery {
    filename: String,
}

#[derive(Serialize)]
pub struct AttachmentResponse {
    url: String,
}

pub async fn upload_repair_attachment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AttachmentQuery>,
    body: Bytes,
) -> Result<Json<AttachmentResponse>, AppError> {
    require("filename", &query.filename)?;

    let url = state
        .repairs
        .upload_attachment(&id, &query.filename, body)
        .await?;

    Ok(Json(AttachmentResponse { url }))
}

pub async fn get_attachment(
    State(state): State<Arc<AppState>>,
    Path((collection, id, filename)): Path<(String, String, String)>,
) -> Result<Response, AppError> {
    let data = match collection.as_str() {
        c if c == RepairOrder::COLLECTION => state.repairs.fetch_attachment(&id, &filename).await?,
        c if c == JobOrder::COLLECTION => state.jobs.fetch_attachment(&id, &filename).await?,
        _ => None,
    };

    match data {
        Some(bytes) => Ok(bytes.into_response()),
        None => Err(AppError::NotFound(format!("attachment {id}/{filename}"))),
    }
}

// ---- dashboard ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    stats: DashboardStats,
    upcoming_deadlines: Vec<DeadlineEntry>,
}

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardResponse>, AppError> {
    let repairs = state.repairs.list().await?;
    let jobs = state.jobs.list().await?;
    let today = Utc::now().date_naive();

    Ok(Json(DashboardResponse {
        stats: dashboard::stats(&repairs, &jobs),
        upcoming_deadlines: dashboard::upcoming_deadlines(&repairs, &jobs, today),
    }))
}

// ---- spreadsheet sync ----

pub async fn import_sheet_repairs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RepairOrder>>, AppError> {
    let client = configured_client(&state)?;
    Ok(Json(client.load_repairs().await?))
}

pub async fn import_sheet_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<JobOrder>>, AppError> {
    let client = configured_client(&state)?;
    Ok(Json(client.load_jobs().await?))
}

fn configured_client(state: &AppState) -> Result<SheetsClient, AppError> {
    state
        .sheets_client()
        .ok_or_else(|| AppError::Validation("spreadsheet sync is not configured".to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetsConfigInfo {
    configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    spreadsheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repair_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_range: Option<String>,
}

/// The api key is write-only; it never comes back out.
pub async fn get_sheets_config(State(state): State<Arc<AppState>>) -> Json<SheetsConfigInfo> {
    let info = match state.sheets_client() {
        Some(client) => {
            let config = client.config().clone();
            SheetsConfigInfo {
                configured: true,
                spreadsheet_id: Some(config.spreadsheet_id),
                repair_range: Some(config.repair_range),
                job_range: Some(config.job_range),
            }
        }
        None => SheetsConfigInfo {
            configured: false,
            spreadsheet_id: None,
            repair_range: None,
            job_range: None,
        },
    };

    Json(info)
}

pub async fn save_sheets_config(
    State(state): State<Arc<AppState>>,
    Json(mut config): Json<SheetsConfig>,
) -> Result<StatusCode, AppError> {
    // accept a pasted spreadsheet URL in place of the bare id
    if let Some(id) = sheets::extract_spreadsheet_id(&config.spreadsheet_id) {
        config.spreadsheet_id = id;
    }

    if !config.is_complete() {
        return Err(AppError::Validation(
            "spreadsheet config is incomplete".to_string(),
        ));
    }

    sheets::persist(&state.config.data_dir, &config)
        .map_err(|e| AppError::Persistence(e.to_string()))?;
    *state.sheets.write().unwrap() = Some(SheetsClient::new(config));

    info!("Spreadsheet sync configured");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_sheets_config(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, AppError> {
    sheets::clear_persisted(&state.config.data_dir)
        .map_err(|e| AppError::Persistence(e.to_string()))?;
    *state.sheets.write().unwrap() = None;

    info!("Spreadsheet sync disabled");
    Ok(StatusCode::NO_CONTENT)
}

// ---- validation (caller-side; the store never validates) ----

fn require(name: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(())
}

fn require_price(price: f64) -> Result<(), AppError> {
    if !(price > 0.0) {
        return Err(AppError::Validation(
            "price must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn require_quantity(quantity: u32) -> Result<(), AppError> {
    if quantity < 1 {
        return Err(AppError::Validation(
            "quantity must be at least one".to_string(),
        ));
    }

    Ok(())
}

fn validate_repair(fields: &RepairFields) -> Result<(), AppError> {
    require("customerName", &fields.customer_name)?;
    require("phoneNumber", &fields.phone_number)?;
    require("damage", &fields.damage)?;
    require_price(fields.price)
}

fn validate_job(fields: &JobFields) -> Result<(), AppError> {
    require("customerName", &fields.customer_name)?;
    require("phoneNumber", &fields.phone_number)?;
    require("description", &fields.description)?;
    require_quantity(fields.quantity)?;
    require_price(fields.price)
}

fn validate_repair_patch(patch: &RepairPatch) -> Result<(), AppError> {
    if let Some(customer_name) = &patch.customer_name {
        require("customerName", customer_name)?;
    }
    if let Some(phone_number) = &patch.phone_number {
        require("phoneNumber", phone_number)?;
    }
    if let Some(damage) = &patch.damage {
        require("damage", damage)?;
    }
    if let Some(price) = patch.price {
        require_price(price)?;
    }

    Ok(())
}

fn validate_job_patch(patch: &JobPatch) -> Result<(), AppError> {
    if let Some(customer_name) = &patch.customer_name {
        require("customerName", customer_name)?;
    }
    if let Some(phone_number) = &patch.phone_number {
        require("phoneNumber", phone_number)?;
    }
    if let Some(description) = &patch.description {
        require("description", description)?;
    }
    if let Some(quantity) = patch.quantity {
        require_quantity(quantity)?;
    }
    if let Some(price) = patch.price {
        require_price(price)?;
    }

    Ok(())
}
