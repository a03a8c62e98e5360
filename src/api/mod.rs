pub mod comparison;
pub mod validate;

use crate::config::Config;
use crate::database;
use crate::engine::coordinator::ValidationCoordinator;
use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub sessions: ValidationSessions,
}

pub async fn run(config: Config) -> Result<()> {
    let pool = database::create_connection(&config.database_url).await?;
    let bind_address = config.bind_address.clone();

    let state = AppState {
        pool,
        config,
        sessions: ValidationSessions::new(),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Listening on {}", bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/schedules/validate", post(validate::validate_schedule))
        .route("/timesheets/comparison", get(comparison::comparison_report))
        .route("/timesheets/missing", get(comparison::missing_timesheets))
        .with_state(state)
}

// フォーム編集が止まったまま放置されたセッションを掃除するまでの時間
const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// フォーム編集セッションごとの検証コーディネーターの置き場
///
/// セッションはフォームのライフサイクルと一致する。クライアントが
/// sessionId を付けて検証を呼ぶたびに同じコーディネーターへ振り分け、
/// しばらく使われていないものはアクセス時に破棄する
#[derive(Clone)]
pub struct ValidationSessions {
    inner: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

struct SessionEntry {
    coordinator: Arc<ValidationCoordinator>,
    last_used: Instant,
}

impl ValidationSessions {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn get_or_create(
        &self,
        session_id: &str,
        make: impl FnOnce() -> ValidationCoordinator,
    ) -> Arc<ValidationCoordinator> {
        let mut sessions = self.inner.lock().unwrap();
        let now = Instant::now();
        sessions.retain(|_, entry| now.duration_since(entry.last_used) < SESSION_IDLE_TTL);

        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                coordinator: Arc::new(make()),
                last_used: now,
            });
        entry.last_used = now;
        Arc::clone(&entry.coordinator)
    }
}

/// ハンドラー共通のエラー応答
pub struct ApiError {
    status: StatusCode,
    source: anyhow::Error,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            source: anyhow::anyhow!(message.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = if self.status == StatusCode::BAD_REQUEST {
            self.source.to_string()
        } else {
            tracing::error!("Request failed: {:?}", self.source);
            "内部エラーが発生しました".to_string()
        };

        (
            self.status,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            source: err.into(),
        }
    }
}
