//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and blob-root I/O

use crate::services::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
struct Probe {
    status: &'static str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// `GET /healthz`
///
/// Cheap liveness probe, never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    Json(Probe {
        status: "ok",
        checks: HashMap::new(),
    })
}

/// `GET /readyz`
///
/// Pings SQLite and does a write/read/delete round trip under the blob
/// root. 200 when both pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = HashMap::new();
    checks.insert("sqlite", check_sqlite(&state).await);
    checks.insert("disk", check_disk(&state).await);

    let ready = checks.values().all(|c| c.ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(Probe {
            status: if ready { "ok" } else { "error" },
            checks,
        }),
    )
}

async fn check_sqlite(state: &AppState) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.files.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(other) => CheckStatus::failed(format!("unexpected result: {other}")),
        Err(err) => CheckStatus::failed(err.to_string()),
    }
}

async fn check_disk(state: &AppState) -> CheckStatus {
    let probe_path = state
        .files
        .blobs
        .root()
        .join(format!(".readyz-{}", Uuid::new_v4()));

    let outcome = async {
        fs::write(&probe_path, b"readyz").await?;
        let bytes = fs::read(&probe_path).await?;
        if bytes != b"readyz" {
            return Err(std::io::Error::other("probe content mismatch"));
        }
        Ok(())
    }
    .await;
    let _ = fs::remove_file(&probe_path).await;

    match outcome {
        Ok(()) => CheckStatus::ok(),
        Err(err) => CheckStatus::failed(err.to_string()),
    }
}
