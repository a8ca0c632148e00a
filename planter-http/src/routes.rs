use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use planter_advisor::{derive_profile, AdvisorError, CareAdvisor, PlantIdentifier, ProfileRequest};
use planter_core::{ControllerError, PlanterController};
use planter_store::parse_frame;
use planter_types::{
    Actuator, ActuatorState, AlertMessages, CareProfile, DeviceSnapshot, PlantProfile, ProfileId,
    ProfileKind,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PlanterController>,
    /// `None` when no identification key is configured.
    pub identifier: Option<Arc<dyn PlantIdentifier>>,
    pub advisor: Arc<dyn CareAdvisor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/profiles", get(list_profiles).post(create_profile))
        .route("/profiles/:id", get(get_profile).delete(delete_profile))
        .route("/profiles/:id/readings", post(ingest))
        .route("/profiles/:id/state", get(device_state))
        .route("/profiles/:id/actuators/:actuator", post(switch_actuator))
        .with_state(state)
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<ControllerError> for ApiError {
    fn from(e: ControllerError) -> Self {
        let status = match &e {
            ControllerError::NotFound(_) => StatusCode::NOT_FOUND,
            ControllerError::NotHardware(_)
            | ControllerError::Conflict(_)
            | ControllerError::CoolingDown { .. } => StatusCode::CONFLICT,
            ControllerError::Validation(_) | ControllerError::Source(_) => StatusCode::BAD_REQUEST,
            ControllerError::DeviceGone(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControllerError::Store(_) | ControllerError::Actuator(_) => StatusCode::BAD_GATEWAY,
        };
        ApiError(status, e.to_string())
    }
}

impl From<AdvisorError> for ApiError {
    fn from(e: AdvisorError) -> Self {
        let status = match &e {
            AdvisorError::EmptyImage => StatusCode::BAD_REQUEST,
            AdvisorError::NotRecognized => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_GATEWAY,
        };
        ApiError(status, e.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplaceParam {
    #[serde(default)]
    replace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreateProfile {
    /// Photo to identify; care ranges come from the advisor.
    Derive {
        image_base64: String,
        #[serde(default = "sim_kind")]
        kind: ProfileKind,
        #[serde(default)]
        messages: AlertMessages,
        #[serde(default)]
        replace: bool,
    },
    Explicit {
        #[serde(default)]
        id: Option<ProfileId>,
        kind: ProfileKind,
        name: String,
        care: CareProfile,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        messages: AlertMessages,
    },
}

fn sim_kind() -> ProfileKind {
    ProfileKind::Sim
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    on: bool,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_profiles(State(state): State<AppState>) -> Result<Json<Vec<PlantProfile>>, ApiError> {
    Ok(Json(state.controller.list_profiles().await?))
}

async fn create_profile(
    State(state): State<AppState>,
    Query(param): Query<ReplaceParam>,
    Json(req): Json<CreateProfile>,
) -> Result<(StatusCode, Json<PlantProfile>), ApiError> {
    let (profile, replace) = match req {
        CreateProfile::Derive {
            image_base64,
            kind,
            messages,
            replace,
        } => {
            let identifier = state.identifier.as_ref().ok_or_else(|| {
                ApiError(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "plant identification is not configured".into(),
                )
            })?;
            let profile = derive_profile(
                &**identifier,
                &*state.advisor,
                ProfileRequest {
                    image: image_base64,
                    kind,
                    messages,
                },
            )
            .await?;
            (profile, replace)
        }
        CreateProfile::Explicit {
            id,
            kind,
            name,
            care,
            image,
            messages,
        } => {
            let profile = PlantProfile {
                id: id.unwrap_or_else(|| ProfileId::for_kind(kind)),
                kind,
                name,
                care,
                image,
                messages,
            };
            (profile, false)
        }
    };

    let created = state
        .controller
        .create_profile(profile, replace || param.replace)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlantProfile>, ApiError> {
    Ok(Json(state.controller.get_profile(&ProfileId::from(id.as_str())).await?))
}

async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .controller
        .delete_profile(&ProfileId::from(id.as_str()))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Accepts either a raw board frame (`A`/`B`/`C`/`TEMP`/`HUMIDITY`) or a
/// normalized reading.
async fn ingest(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(frame): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    let reading = parse_frame(frame).map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;
    state
        .controller
        .ingest(&ProfileId::from(id.as_str()), reading)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn device_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceSnapshot>, ApiError> {
    Ok(Json(state.controller.snapshot(&ProfileId::from(id.as_str())).await?))
}

async fn switch_actuator(
    State(state): State<AppState>,
    Path((id, actuator)): Path<(String, String)>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<ActuatorState>, ApiError> {
    let actuator: Actuator = actuator
        .parse()
        .map_err(|e: String| ApiError(StatusCode::BAD_REQUEST, e))?;
    let state = state
        .controller
        .manual(&ProfileId::from(id.as_str()), actuator, req.on)
        .await?;
    Ok(Json(state))
}
