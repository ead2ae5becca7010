// Statement Analyzer - Web Server
// REST API with Axum over the shared ledger

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use statement_analyzer::{
    load_ledger, open_database, record_import, save_ledger, summarize, transaction_records, CategorySummary,
    Granularity, ImportSession, Importer, SharedLedger, SkippedRecord, StatementSource, TransactionRecord,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    session: Arc<ImportSession>,
    db: Arc<Mutex<Connection>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn err(data: T, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
        }
    }
}

#[derive(Deserialize)]
struct ImportQuery {
    statement_id: String,
}

/// Import response: what was imported and what was skipped
#[derive(Serialize, Default)]
struct ImportResponse {
    statement_id: String,
    layout: String,
    transactions: usize,
    inserted: usize,
    duplicates: usize,
    skipped: Vec<SkippedRecord>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/transactions - Ledger in date order
async fn get_transactions(State(state): State<AppState>) -> impl IntoResponse {
    let ledger = state.session.ledger().snapshot();
    let records: Vec<TransactionRecord> = transaction_records(&ledger);
    (StatusCode::OK, Json(ApiResponse::ok(records)))
}

/// GET /api/summaries/:granularity - Category totals per period
async fn get_summaries(State(state): State<AppState>, Path(granularity): Path<String>) -> impl IntoResponse {
    match granularity.parse::<Granularity>() {
        Ok(granularity) => {
            let ledger = state.session.ledger().snapshot();
            (StatusCode::OK, Json(ApiResponse::ok(summarize(&ledger, granularity)))).into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err(Vec::<CategorySummary>::new(), e)),
        )
            .into_response(),
    }
}

/// POST /api/import/csv?statement_id=... - Body is the CSV text
async fn import_csv(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> impl IntoResponse {
    let source = StatementSource::csv(query.statement_id.clone(), body.into_bytes());
    let session = state.session.clone();

    // Parsing is CPU-bound; keep it off the async workers
    let outcome = match tokio::task::spawn_blocking(move || session.import(&source)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("import task failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(ImportResponse::default(), "import task failed")),
            )
                .into_response();
        }
    };

    let conn = state.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Err(e) = record_import(&conn, &query.statement_id, &outcome) {
        log::error!("Error recording import: {}", e);
    }

    match outcome {
        Ok(report) => {
            if let Err(e) = save_ledger(&conn, &state.session.ledger().snapshot()) {
                log::error!("Error saving ledger: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::err(ImportResponse::default(), e.to_string())),
                )
                    .into_response();
            }

            let response = ImportResponse {
                statement_id: report.import.statement_id,
                layout: report.import.layout,
                transactions: report.import.transactions.len(),
                inserted: report.merge.inserted,
                duplicates: report.merge.duplicates,
                skipped: report.import.skipped,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            let status = if e.is_unrecognized_format() {
                StatusCode::UNPROCESSABLE_ENTITY
            } else {
                StatusCode::BAD_REQUEST
            };
            (
                status,
                Json(ApiResponse::err(
                    ImportResponse {
                        statement_id: query.statement_id,
                        ..ImportResponse::default()
                    },
                    e.to_string(),
                )),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌐 Statement Analyzer - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::var("STATEMENT_DB").unwrap_or_else(|_| "statements.db".to_string());
    let conn = open_database(&db_path)?;
    let ledger = load_ledger(&conn)?;
    println!("✓ Database opened: {} ({} transactions)", db_path, ledger.len());

    let session = ImportSession::new(Importer::with_defaults()).with_ledger(SharedLedger::new(ledger));

    // Create shared state
    let state = AppState {
        session: Arc::new(session),
        db: Arc::new(Mutex::new(conn)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(get_transactions))
        .route("/summaries/:granularity", get(get_summaries))
        .route("/import/csv", post(import_csv))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("STATEMENT_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/transactions", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;

    Ok(())
}
