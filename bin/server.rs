// Pharmacy Platform - API Server

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use pharmacy_platform::db::DATETIME_FMT;
use pharmacy_platform::{
    filter_pharmacies_by_mask_count, get_all_masks, get_all_pharmacies, get_all_users,
    get_open_pharmacies, get_opening_hours, get_pharmacy, get_pharmacy_masks, get_user_purchases,
    parse_query_time, purchase, CountOp, DayOfWeek, Mask, OpeningHour, Pharmacy, PurchaseHistory,
    StoreError, User,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

// ============================================================================
// Error mapping
// ============================================================================

/// An error response: `{"detail": "..."}` with the mapped status code.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: &str) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            detail: detail.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::UserNotFound | StoreError::PharmacyNotFound => StatusCode::NOT_FOUND,
            StoreError::InsufficientFunds | StoreError::InvalidAmount => StatusCode::BAD_REQUEST,
            StoreError::Db(ref e) => {
                tracing::error!(error = %e, "store failure");
                return ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: "Internal server error".to_string(),
                };
            }
        };
        ApiError {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

// ============================================================================
// Query / body types
// ============================================================================

/// Both parameters are optional; absence (not emptiness) means "unfiltered".
#[derive(Deserialize)]
struct OpenQuery {
    day_of_week: Option<String>,
    time_str: Option<String>,
}

#[derive(Deserialize)]
struct MaskSortQuery {
    sort_by: Option<String>,
}

#[derive(Deserialize)]
struct CountFilterQuery {
    count_op: String,
    count_val: i64,
    price_min: f64,
    price_max: f64,
}

#[derive(Deserialize)]
struct PurchaseRequest {
    pharmacy_id: i64,
    mask_name: String,
    transaction_amount: f64,
    transaction_date: String,
}

// ============================================================================
// Pharmacy handlers
// ============================================================================

/// GET /pharmacies
async fn list_pharmacies(State(state): State<AppState>) -> Result<Json<Vec<Pharmacy>>, ApiError> {
    let conn = state.db.lock().unwrap();
    Ok(Json(get_all_pharmacies(&conn)?))
}

/// GET /pharmacies/:id
async fn get_pharmacy_by_id(
    State(state): State<AppState>,
    Path(pharmacy_id): Path<i64>,
) -> Result<Json<Pharmacy>, ApiError> {
    let conn = state.db.lock().unwrap();
    Ok(Json(get_pharmacy(&conn, pharmacy_id)?))
}

/// GET /pharmacies/open?day_of_week=Thur&time_str=14:00
///
/// Without both parameters the full pharmacy list comes back unfiltered. An
/// unknown day symbol or unparsable time matches nothing.
async fn list_open_pharmacies(
    State(state): State<AppState>,
    Query(query): Query<OpenQuery>,
) -> Result<Json<Vec<Pharmacy>>, ApiError> {
    let conn = state.db.lock().unwrap();

    let (Some(day_param), Some(time_param)) = (query.day_of_week, query.time_str) else {
        return Ok(Json(get_all_pharmacies(&conn)?));
    };

    let (Some(day), Some(probe)) = (
        DayOfWeek::from_symbol(&day_param),
        parse_query_time(&time_param),
    ) else {
        return Ok(Json(Vec::new()));
    };

    Ok(Json(get_open_pharmacies(&conn, day, probe)?))
}

/// GET /pharmacies/:id/opening_hours
async fn list_opening_hours(
    State(state): State<AppState>,
    Path(pharmacy_id): Path<i64>,
) -> Result<Json<Vec<OpeningHour>>, ApiError> {
    let conn = state.db.lock().unwrap();
    Ok(Json(get_opening_hours(&conn, pharmacy_id)?))
}

/// GET /pharmacies/:id/masks?sort_by=name|price
async fn list_pharmacy_masks(
    State(state): State<AppState>,
    Path(pharmacy_id): Path<i64>,
    Query(query): Query<MaskSortQuery>,
) -> Result<Json<Vec<Mask>>, ApiError> {
    let conn = state.db.lock().unwrap();
    Ok(Json(get_pharmacy_masks(
        &conn,
        pharmacy_id,
        query.sort_by.as_deref(),
    )?))
}

/// GET /pharmacies/all_masks
async fn list_all_masks(State(state): State<AppState>) -> Result<Json<Vec<Mask>>, ApiError> {
    let conn = state.db.lock().unwrap();
    Ok(Json(get_all_masks(&conn)?))
}

/// GET /pharmacies/filter?count_op=gt&count_val=3&price_min=10&price_max=50
async fn filter_pharmacies(
    State(state): State<AppState>,
    Query(query): Query<CountFilterQuery>,
) -> Result<Json<Vec<Pharmacy>>, ApiError> {
    let Some(op) = CountOp::from_param(&query.count_op) else {
        return Err(ApiError::bad_request("count_op must be 'gt' or 'lt'"));
    };

    let conn = state.db.lock().unwrap();
    Ok(Json(filter_pharmacies_by_mask_count(
        &conn,
        op,
        query.count_val,
        query.price_min,
        query.price_max,
    )?))
}

// ============================================================================
// User handlers
// ============================================================================

/// GET /users
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let conn = state.db.lock().unwrap();
    Ok(Json(get_all_users(&conn)?))
}

/// GET /users/:id/purchases
async fn list_user_purchases(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<PurchaseHistory>>, ApiError> {
    let conn = state.db.lock().unwrap();
    Ok(Json(get_user_purchases(&conn, user_id)?))
}

/// POST /users/:id/purchase
async fn purchase_mask(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let transaction_date = parse_transaction_date(&body.transaction_date)
        .ok_or_else(|| ApiError::bad_request("transaction_date must be 'YYYY-MM-DD HH:MM:SS'"))?;

    let mut conn = state.db.lock().unwrap();
    let purchase_id = purchase(
        &mut conn,
        user_id,
        body.pharmacy_id,
        &body.mask_name,
        body.transaction_amount,
        transaction_date,
    )?;

    Ok(Json(json!({
        "message": "Purchase successful",
        "purchase_id": purchase_id,
    })))
}

// Accepts the dataset format and the ISO "T" separator
fn parse_transaction_date(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FMT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("Pharmacy Platform - API Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "pharmacy.db".to_string());
    let db_path = std::path::Path::new(&db_path);

    if !db_path.exists() {
        eprintln!("Database not found at {:?}", db_path);
        eprintln!("   Run: cargo run --bin pharmacy-import import");
        eprintln!("   to load the datasets first.");
        std::process::exit(1);
    }

    let conn = Connection::open(db_path).expect("Failed to open database");
    println!("✓ Database opened: {:?}", db_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let app = Router::new()
        .route("/pharmacies", get(list_pharmacies))
        .route("/pharmacies/open", get(list_open_pharmacies))
        .route("/pharmacies/filter", get(filter_pharmacies))
        .route("/pharmacies/all_masks", get(list_all_masks))
        .route("/pharmacies/:id", get(get_pharmacy_by_id))
        .route("/pharmacies/:id/opening_hours", get(list_opening_hours))
        .route("/pharmacies/:id/masks", get(list_pharmacy_masks))
        .route("/users", get(list_users))
        .route("/users/:id/purchases", get(list_user_purchases))
        .route("/users/:id/purchase", post(purchase_mask))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = "0.0.0.0:8000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\nServer running on http://localhost:8000");
    println!("   Try: http://localhost:8000/pharmacies\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
