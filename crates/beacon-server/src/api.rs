//! HTTP control API used by feature code.
//!
//! Feature code owns message content; it calls these endpoints to manage room
//! membership and to trigger deliveries.

use crate::error::Result;
use crate::handlers::AppState;
use crate::metrics;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use beacon_core::{
    ConnectionInfo, Delivery, FanoutReport, PresenceError, RoomSnapshot, RosterStats, UserId,
};
use beacon_protocol::{validate_identifier, Envelope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Routes under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rooms", get(list_rooms))
        .route("/api/rooms/:chat_id/members", get(room_members))
        .route(
            "/api/rooms/:chat_id/members/:user_id",
            post(join_room).delete(leave_room),
        )
        .route("/api/rooms/:chat_id/broadcast", post(broadcast_room))
        .route("/api/broadcast", post(broadcast_all))
        .route("/api/users/:user_id/send", post(send_to_user))
        .route("/api/presence", get(all_presence))
        .route("/api/presence/:user_id", get(user_presence))
        .route("/api/stats", get(stats))
}

/// Body of broadcast requests.
#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(flatten)]
    pub envelope: Envelope,
    /// User to leave out (honored by the direct strategy only).
    #[serde(default)]
    pub exclude: Option<UserId>,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub chat_id: String,
    pub user_id: String,
    /// Whether the call changed membership.
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub chat_id: String,
    pub members: Vec<UserId>,
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub user_id: String,
    /// `sent` or `offline`.
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub user_id: String,
    pub online: bool,
    pub rooms: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HubStatsResponse {
    pub topics: usize,
    pub connections: usize,
    pub subscriptions: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub strategy: &'static str,
    pub roster: RosterStats,
    pub hub: HubStatsResponse,
}

async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<RoomSnapshot> {
    Json(state.roster.list_rooms())
}

async fn room_members(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<MembersResponse>> {
    let members = state.roster.members(&chat_id)?;
    Ok(Json(MembersResponse { chat_id, members }))
}

async fn join_room(
    State(state): State<Arc<AppState>>,
    Path((chat_id, user_id)): Path<(String, String)>,
) -> Result<Json<MembershipResponse>> {
    let changed = state.roster.join(&user_id, &chat_id)?;
    if changed {
        metrics::record_join();
        metrics::set_active_rooms(state.roster.stats().rooms);
    }
    Ok(Json(MembershipResponse {
        chat_id,
        user_id,
        changed,
    }))
}

async fn leave_room(
    State(state): State<Arc<AppState>>,
    Path((chat_id, user_id)): Path<(String, String)>,
) -> Json<MembershipResponse> {
    let changed = state.roster.leave(&user_id, &chat_id);
    if changed {
        metrics::set_active_rooms(state.roster.stats().rooms);
    }
    Json(MembershipResponse {
        chat_id,
        user_id,
        changed,
    })
}

async fn broadcast_room(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Json(request): Json<BroadcastRequest>,
) -> Result<Json<FanoutReport>> {
    validate_identifier(&chat_id).map_err(PresenceError::InvalidIdentifier)?;
    let report = state
        .broadcaster
        .broadcast_to_room(&chat_id, &request.envelope, request.exclude.as_deref())
        .await?;
    metrics::record_fanout(&report);
    Ok(Json(report))
}

async fn broadcast_all(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BroadcastRequest>,
) -> Result<Json<FanoutReport>> {
    let report = state
        .broadcaster
        .broadcast_to_all(&request.envelope, request.exclude.as_deref())
        .await?;
    metrics::record_fanout(&report);
    Ok(Json(report))
}

async fn send_to_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<DeliveryResponse>> {
    let status = match state.broadcaster.send_to_user(&user_id, &envelope).await {
        Delivery::Sent => "sent",
        Delivery::Offline => "offline",
        Delivery::Failed(e) => {
            metrics::record_error("send");
            return Err(e.into());
        }
    };
    debug!(user = %user_id, kind = %envelope.kind, status, "Direct send");
    Ok(Json(DeliveryResponse { user_id, status }))
}

async fn all_presence(State(state): State<Arc<AppState>>) -> Json<Vec<ConnectionInfo>> {
    Json(state.roster.all_connections())
}

async fn user_presence(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<PresenceResponse> {
    let rooms = state.roster.rooms_of(&user_id).ok();
    Json(PresenceResponse {
        online: rooms.is_some(),
        rooms: rooms.unwrap_or_default(),
        user_id,
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let hub = state.hub.stats();
    Json(StatsResponse {
        strategy: state.broadcaster.strategy(),
        roster: state.roster.stats(),
        hub: HubStatsResponse {
            topics: hub.topic_count,
            connections: hub.connection_count,
            subscriptions: hub.total_subscriptions,
        },
    })
}
