//! Thin JSON API over [`GameServices`]. The player id in the path or body is
//! trusted as-is.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cultivation::battle::SessionKey;
use cultivation::equipment::{EquipmentView, ForgeOutcome};
use cultivation::pets::{PetOutcome, PetView};
use cultivation::progression::{BreakthroughOutcome, CultivateOutcome};
use cultivation::{BattleRecordView, CombatBundle, ErrorCategory, GameError, GameServices, PlayerView, RoundData};
use presence::PlayerId;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type ApiState = Arc<GameServices>;

const HISTORY_DEFAULT: u32 = 20;
const HISTORY_MAX: u32 = 100;

/// Renders a [`GameError`] as `{code, category, message}`.
#[derive(Debug)]
pub struct ApiError(pub GameError);

impl From<GameError> for ApiError {
    fn from(e: GameError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            e => match e.category() {
                ErrorCategory::Auth => StatusCode::UNAUTHORIZED,
                ErrorCategory::Validation => StatusCode::BAD_REQUEST,
                ErrorCategory::State => StatusCode::CONFLICT,
                ErrorCategory::Resource => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = json!({
            "code": self.0.code(),
            "category": self.0.category().as_u8(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvpRequest {
    pub player_id: PlayerId,
    pub opponent_id: PlayerId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PveRequest {
    pub player_id: PlayerId,
    pub monster_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRequest {
    pub player_id: PlayerId,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAck {
    pub was_online: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndAck {
    pub ended: bool,
}

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/players/{id}", get(player))
        .route("/api/players/{id}/heartbeat", post(heartbeat))
        .route("/api/players/{id}/logout", post(logout))
        .route("/api/players/{id}/cultivate", post(cultivate))
        .route("/api/players/{id}/breakthrough", post(breakthrough))
        .route("/api/players/{id}/battles", get(battle_history))
        .route("/api/players/{id}/equipment", get(list_equipment))
        .route("/api/players/{id}/pets", get(list_pets))
        .route("/api/battle/pvp/start", post(pvp_start))
        .route("/api/battle/pvp/step", post(pvp_step))
        .route("/api/battle/pvp/end", post(pvp_end))
        .route("/api/battle/pve/start", post(pve_start))
        .route("/api/battle/pve/step", post(pve_step))
        .route("/api/battle/pve/end", post(pve_end))
        .route("/api/equipment/{id}/enhance", post(enhance))
        .route("/api/equipment/{id}/reforge", post(reforge))
        .route("/api/equipment/{id}/equip", post(equip))
        .route("/api/equipment/{id}/unequip", post(unequip))
        .route("/api/pets/{id}/upgrade", post(upgrade_pet))
        .route("/api/pets/{id}/evolve", post(evolve_pet))
        .route("/api/pets/{id}/deploy", post(deploy_pet))
        .route("/api/pets/{id}/recall", post(recall_pet))
        .with_state(state)
}

async fn register(State(s): State<ApiState>, Json(body): Json<Credentials>) -> ApiResult<PlayerView> {
    Ok(Json(s.register(&body.username, &body.password)?))
}

async fn login(
    State(s): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<Credentials>,
) -> ApiResult<PlayerView> {
    Ok(Json(s.login(&body.username, &body.password, &addr.ip().to_string())?))
}

async fn player(State(s): State<ApiState>, Path(id): Path<PlayerId>) -> ApiResult<PlayerView> {
    Ok(Json(s.player(id)?))
}

async fn heartbeat(State(s): State<ApiState>, Path(id): Path<PlayerId>) -> ApiResult<Ack> {
    s.heartbeat(id)?;
    Ok(Json(Ack { ok: true }))
}

async fn logout(State(s): State<ApiState>, Path(id): Path<PlayerId>) -> ApiResult<LogoutAck> {
    Ok(Json(LogoutAck {
        was_online: s.logout(id)?,
    }))
}

async fn cultivate(State(s): State<ApiState>, Path(id): Path<PlayerId>) -> ApiResult<CultivateOutcome> {
    s.require_online(id)?;
    Ok(Json(s.cultivate(id)?))
}

async fn breakthrough(State(s): State<ApiState>, Path(id): Path<PlayerId>) -> ApiResult<BreakthroughOutcome> {
    s.require_online(id)?;
    Ok(Json(s.breakthrough(id)?))
}

async fn battle_history(
    State(s): State<ApiState>,
    Path(id): Path<PlayerId>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Vec<BattleRecordView>> {
    let limit = params.limit.unwrap_or(HISTORY_DEFAULT).min(HISTORY_MAX);
    Ok(Json(s.battle_history(id, limit)?))
}

async fn list_equipment(State(s): State<ApiState>, Path(id): Path<PlayerId>) -> ApiResult<Vec<EquipmentView>> {
    Ok(Json(s.list_equipment(id)?))
}

async fn list_pets(State(s): State<ApiState>, Path(id): Path<PlayerId>) -> ApiResult<Vec<PetView>> {
    Ok(Json(s.list_pets(id)?))
}

async fn pvp_start(State(s): State<ApiState>, Json(body): Json<PvpRequest>) -> ApiResult<RoundData> {
    s.require_online(body.player_id)?;
    Ok(Json(s.battle.start_pvp(body.player_id, body.opponent_id)?))
}

async fn pvp_step(State(s): State<ApiState>, Json(body): Json<PvpRequest>) -> ApiResult<RoundData> {
    let key = SessionKey::pvp(body.player_id, body.opponent_id);
    Ok(Json(s.battle.step(&key).await?))
}

async fn pvp_end(State(s): State<ApiState>, Json(body): Json<PvpRequest>) -> ApiResult<EndAck> {
    let key = SessionKey::pvp(body.player_id, body.opponent_id);
    Ok(Json(EndAck {
        ended: s.battle.end(&key)?,
    }))
}

async fn pve_start(State(s): State<ApiState>, Json(body): Json<PveRequest>) -> ApiResult<RoundData> {
    s.require_online(body.player_id)?;
    Ok(Json(s.battle.start_pve(body.player_id, body.monster_id)?))
}

async fn pve_step(State(s): State<ApiState>, Json(body): Json<PveRequest>) -> ApiResult<RoundData> {
    let key = SessionKey::pve(body.player_id, body.monster_id);
    Ok(Json(s.battle.step(&key).await?))
}

async fn pve_end(State(s): State<ApiState>, Json(body): Json<PveRequest>) -> ApiResult<EndAck> {
    let key = SessionKey::pve(body.player_id, body.monster_id);
    Ok(Json(EndAck {
        ended: s.battle.end(&key)?,
    }))
}

async fn enhance(
    State(s): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerRequest>,
) -> ApiResult<ForgeOutcome> {
    s.require_online(body.player_id)?;
    Ok(Json(s.enhance(body.player_id, id)?))
}

async fn reforge(
    State(s): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerRequest>,
) -> ApiResult<ForgeOutcome> {
    s.require_online(body.player_id)?;
    Ok(Json(s.reforge(body.player_id, id)?))
}

async fn equip(
    State(s): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerRequest>,
) -> ApiResult<CombatBundle> {
    Ok(Json(s.equip(body.player_id, id)?))
}

async fn unequip(
    State(s): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerRequest>,
) -> ApiResult<CombatBundle> {
    Ok(Json(s.unequip(body.player_id, id)?))
}

async fn upgrade_pet(
    State(s): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerRequest>,
) -> ApiResult<PetOutcome> {
    s.require_online(body.player_id)?;
    Ok(Json(s.upgrade_pet(body.player_id, id)?))
}

async fn evolve_pet(
    State(s): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerRequest>,
) -> ApiResult<PetOutcome> {
    s.require_online(body.player_id)?;
    Ok(Json(s.evolve_pet(body.player_id, id)?))
}

async fn deploy_pet(
    State(s): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerRequest>,
) -> ApiResult<CombatBundle> {
    Ok(Json(s.deploy_pet(body.player_id, id)?))
}

async fn recall_pet(
    State(s): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<OwnerRequest>,
) -> ApiResult<CombatBundle> {
    Ok(Json(s.recall_pet(body.player_id, id)?))
}
