//! Sift Server - REST API for the sensitive-data scanner.
//!
//! Routes: `POST /scan` creates a job and hands listing to the durable
//! loop (or runs it inline when no loop executor is configured),
//! `GET /jobs/{id}` reports aggregated status, `GET /results` pages
//! findings.

pub mod refresher;
pub mod status;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use sift_connectors::{load_aws_config, ObjectStoreClient, QueueClient, StepFunctionsClient};
use sift_core::ListBatchState;
use sift_lister::run_listing_to_completion;
use sift_store::{next_cursor, Database, DbConfig, FindingsFilter, Pagination};

use status::get_job_status;

/// Sync-fallback listing ceiling when no durable-loop executor is set.
const SYNC_OBJECT_LIMIT: u64 = 200_000;

/// Progress cache refresh cadence.
const REFRESH_INTERVAL_SECS: u64 = 60;

const DEFAULT_RESULTS_LIMIT: i64 = 100;

/// Server configuration from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub queue_url: String,
    pub step_function_arn: Option<String>,
    pub region: Option<String>,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            queue_url: std::env::var("SQS_QUEUE_URL").context("SQS_QUEUE_URL required")?,
            step_function_arn: std::env::var("STEP_FUNCTION_ARN").ok(),
            region: std::env::var("AWS_REGION").ok(),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT")?,
        })
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub db: Database,
    pub store: ObjectStoreClient,
    pub queue: QueueClient,
    pub sfn: StepFunctionsClient,
    pub config: ServerConfig,
}

/// Error responses are JSON `{error}` bodies.
type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::from_env()?;
    if config.step_function_arn.is_none() {
        warn!("STEP_FUNCTION_ARN not set; scans will list synchronously");
    }

    let db = Database::connect(&DbConfig::from_env()?).await?;

    let aws_config = load_aws_config(config.region.clone()).await;
    let store = ObjectStoreClient::new(&aws_config);
    let queue = QueueClient::new(&aws_config, &config.queue_url);
    let sfn = StepFunctionsClient::new(&aws_config);

    refresher::spawn_refresher(db.clone(), REFRESH_INTERVAL_SECS);
    info!("Progress refresher started (interval: {}s)", REFRESH_INTERVAL_SECS);

    let port = config.port;
    let state = Arc::new(AppState {
        db,
        store,
        queue,
        sfn,
        config,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/scan", post(create_scan))
        .route("/jobs/:id", get(job_status))
        .route("/results", get(results))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    info!("Starting sift server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

// === Scan creation ===

#[derive(Deserialize, Default)]
struct ScanRequest {
    bucket: Option<String>,
    prefix: Option<String>,
}

// POST /scan
async fn create_scan(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<ScanRequest>>,
) -> Result<Json<Value>, ApiError> {
    // An invalid or absent body is tolerated as an empty one.
    let request = payload.map(|Json(r)| r).unwrap_or_default();

    let Some(bucket) = request.bucket.filter(|b| !b.is_empty()) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "bucket is required"));
    };
    let prefix = request.prefix.unwrap_or_default();

    match create_scan_job(&state, &bucket, &prefix).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!("Error creating scan job: {:#}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Start a scan. With a durable-loop executor configured, the execution is
/// started first so its identifier lands on the job row; if the row insert
/// then fails the loop is already running, so the failure is logged loudly
/// and the caller still gets the job id. Without an executor, listing runs
/// inline bounded to [`SYNC_OBJECT_LIMIT`] objects.
fn create_scan_job<'a>(
    state: &'a AppState,
    bucket: &'a str,
    prefix: &'a str,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value>> + Send + 'a>> {
    Box::pin(async move {
    let job_id = Uuid::new_v4();
    let initial = ListBatchState::initial(job_id, bucket, prefix);

    match &state.config.step_function_arn {
        Some(arn) => {
            let start_listing_fut: std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<String, _>> + Send + '_>,
            > = Box::pin(state.sfn.start_listing(arn, &initial));
            let execution_arn = start_listing_fut.await?;
            info!("Started listing execution: {}", execution_arn);

            let create_job_fut: std::pin::Pin<Box<dyn std::future::Future<Output = _> + Send + '_>> =
                Box::pin(
                    state
                        .db
                        .create_job(job_id, bucket, prefix, Some(&execution_arn)),
                );
            if let Err(e) = create_job_fut.await {
                error!("Error creating job record: {:#}", e);
                warn!(
                    "Execution {} is running but job record creation failed",
                    execution_arn
                );
            } else {
                info!("Created job {} for s3://{}/{}", job_id, bucket, prefix);
            }

            Ok(json!({
                "job_id": job_id,
                "bucket": bucket,
                "prefix": prefix,
                "status": "listing",
                "execution_arn": execution_arn,
                "message": "Job created. Objects are being listed and enqueued asynchronously.",
                "async": true,
            }))
        }
        None => {
            warn!("STEP_FUNCTION_ARN not set, falling back to synchronous listing");
            let create_job_fut2: std::pin::Pin<Box<dyn std::future::Future<Output = _> + Send + '_>> =
                Box::pin(state.db.create_job(job_id, bucket, prefix, None));
            create_job_fut2.await?;

            let run_listing_fut: std::pin::Pin<Box<dyn std::future::Future<Output = _> + Send + '_>> =
                Box::pin(run_listing_to_completion(
                    &state.store,
                    &state.queue,
                    &state.db,
                    initial,
                    SYNC_OBJECT_LIMIT,
                ));
            let output = run_listing_fut.await?;

            info!(
                "Created job {} with {}/{} messages enqueued",
                job_id, output.messages_enqueued, output.objects_processed
            );

            Ok(json!({
                "job_id": job_id,
                "bucket": bucket,
                "prefix": prefix,
                "total_objects": output.objects_processed,
                "messages_enqueued": output.messages_enqueued,
                "status": "queued",
            }))
        }
    }
    })
}

// === Job status ===

#[derive(Deserialize)]
struct JobStatusParams {
    real_time: Option<String>,
}

// GET /jobs/:id
async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<JobStatusParams>,
) -> Result<Json<status::JobStatusResponse>, ApiError> {
    let job_id = Uuid::parse_str(&id)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "invalid job id"))?;

    let real_time = params
        .real_time
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false);

    match get_job_status(&state, job_id, real_time).await {
        Ok(Some(response)) => Ok(Json(response)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Job not found")),
        Err(e) => {
            error!("Error getting job status for {}: {:#}", job_id, e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

// === Findings ===

#[derive(Deserialize)]
struct ResultsParams {
    job_id: Option<String>,
    bucket: Option<String>,
    /// Matched as a key prefix; a trailing `/` reads naturally but is not
    /// required.
    key: Option<String>,
    limit: Option<i64>,
    cursor: Option<String>,
    offset: Option<i64>,
}

// GET /results
async fn results(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResultsParams>,
) -> Result<Json<Value>, ApiError> {
    let job_id = match params.job_id {
        Some(id) => Some(
            Uuid::parse_str(&id)
                .map_err(|_| api_error(StatusCode::BAD_REQUEST, "invalid job_id"))?,
        ),
        None => None,
    };

    let filter = FindingsFilter {
        job_id,
        bucket: params.bucket,
        key_prefix: params.key,
    };

    let limit = params.limit.unwrap_or(DEFAULT_RESULTS_LIMIT).max(0);

    // Exactly one pagination mode per call; cursor wins when both are sent.
    let pagination = match &params.cursor {
        Some(cursor) => Pagination::Cursor(
            cursor
                .parse::<i64>()
                .map_err(|_| api_error(StatusCode::BAD_REQUEST, "invalid cursor"))?,
        ),
        None => Pagination::Offset(params.offset.unwrap_or(0).max(0)),
    };

    let (findings, total) = state
        .db
        .get_findings(&filter, pagination, limit)
        .await
        .map_err(|e| {
            error!("Error getting results: {:#}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let mut response = json!({
        "findings": findings,
        "total": total,
        "limit": limit,
        "has_more": findings.len() as i64 == limit,
    });

    match pagination {
        Pagination::Cursor(cursor) => {
            response["cursor"] = json!(cursor.to_string());
            if let Some(next) = next_cursor(&findings) {
                response["next_cursor"] = json!(next.to_string());
            }
        }
        Pagination::Offset(offset) => {
            response["offset"] = json!(offset);
            response["has_more"] = json!(offset + limit < total);
        }
    }

    Ok(Json(response))
}
