//! HTTP control surface
//!
//! Every command route answers with HTTP 200 and an [`ApiResult`] envelope;
//! the outcome is carried in the body.

use crate::controller::LightController;
use crate::error::{Result, YeegoError};
use crate::light::LightSnapshot;
use crate::registry::Registry;
use crate::types::{DeviceErrorPayload, DeviceId};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Response to a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResult {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeviceErrorPayload>,
}

impl ApiResult {
    pub fn ok(id: impl Into<DeviceId>) -> Self {
        Self {
            result: "ok".to_string(),
            id: Some(id.into()),
            params: None,
            error: None,
        }
    }

    fn error(id: Option<&str>, params: Option<Vec<String>>, error: Option<DeviceErrorPayload>) -> Self {
        Self {
            result: "error".to_string(),
            id: id.map(str::to_string),
            params,
            error,
        }
    }

    /// Render a failed command for light `id`
    pub fn from_error(id: &str, err: YeegoError) -> Self {
        match err {
            YeegoError::InvalidParameter(message) => Self::error(None, Some(vec![message]), None),
            YeegoError::NotFound(_) => Self::error(None, Some(vec!["not found".to_string()]), None),
            YeegoError::Timeout => Self::error(None, Some(vec!["timeout".to_string()]), None),
            YeegoError::Device(payload) => Self::error(Some(id), None, Some(payload)),
            other => Self::error(Some(id), Some(vec![other.to_string()]), None),
        }
    }

    /// `{"result":"not found"}`, the toggle route's answer for an unknown light
    pub fn not_found() -> Self {
        Self {
            result: "not found".to_string(),
            id: None,
            params: None,
            error: None,
        }
    }

    pub fn from_outcome(id: &str, outcome: Result<DeviceId>) -> Self {
        match outcome {
            Ok(id) => Self::ok(id),
            Err(e) => Self::from_error(id, e),
        }
    }
}

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    controller: LightController,
}

impl AppState {
    pub fn new(controller: LightController) -> Self {
        Self { controller }
    }

    fn registry(&self) -> &Registry {
        self.controller.registry()
    }
}

/// Optional query parameters of command routes
#[derive(Debug, Default, Deserialize)]
pub struct CommandOptions {
    /// Transition length in milliseconds, 0 for instant
    #[serde(default)]
    pub duration: u32,
}

async fn index() -> &'static str {
    "Yeego"
}

/// All lights, sorted by id
async fn list_lights(State(state): State<AppState>) -> Json<Vec<LightSnapshot>> {
    let mut snapshots = Vec::new();
    for light in state.registry().list().await {
        snapshots.push(light.snapshot().await);
    }
    snapshots.sort_by(|a, b| a.id.cmp(&b.id));
    Json(snapshots)
}

/// One light, `null` if unknown
async fn get_light(State(state): State<AppState>, Path(id): Path<String>) -> Json<Option<LightSnapshot>> {
    let snapshot = match state.registry().get(&id).await {
        Some(light) => Some(light.snapshot().await),
        None => None,
    };
    Json(snapshot)
}

async fn toggle_light(State(state): State<AppState>, Path(id): Path<String>) -> Json<ApiResult> {
    let outcome = state.controller.toggle(&id).await;
    match &outcome {
        Err(YeegoError::NotFound(_)) => return Json(ApiResult::not_found()),
        Err(e) => tracing::info!("Error toggling light {}: {}", id, e),
        Ok(_) => {}
    }
    Json(ApiResult::from_outcome(&id, outcome))
}

async fn command_light(
    State(state): State<AppState>,
    Path((id, command, value)): Path<(String, String, String)>,
    options: std::result::Result<Query<CommandOptions>, QueryRejection>,
) -> Json<ApiResult> {
    let Ok(Query(options)) = options else {
        return Json(ApiResult::from_error(
            &id,
            YeegoError::InvalidParameter("invalid duration".to_string()),
        ));
    };

    let outcome = state
        .controller
        .execute(&id, &command, &value, options.duration)
        .await;
    if let Err(e) = &outcome {
        tracing::info!("Error running {} on light {}: {}", command, id, e);
    }
    Json(ApiResult::from_outcome(&id, outcome))
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/light", get(list_lights))
        .route("/lights", get(list_lights))
        .route("/light/{id}", get(get_light))
        .route("/light/{id}/toggle", get(toggle_light))
        .route("/light/{id}/{command}/{value}", get(command_light))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "API server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
