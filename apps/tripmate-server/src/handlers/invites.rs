//! Invite handlers: create/mint, join/redeem, info, revoke, list

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tripmate_storage::{Invite, InviteId, TripId};

use super::{Actor, JsonBody};
use crate::error::ApiError;
use crate::invites::{InviteInfo, IssueFlow, IssuedInvite, MaxUses, Redemption};
use crate::server::TripServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInviteBody {
    trip_id: Option<String>,
    max_uses: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintInviteBody {
    trip_id: Option<String>,
    max_uses: Option<Value>,
    hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteIdBody {
    #[serde(alias = "token")]
    invite_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteQuery {
    invite_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripQuery {
    trip_id: Option<String>,
}

fn trip_id(raw: Option<String>) -> TripId {
    TripId(raw.unwrap_or_default())
}

fn invite_id(raw: Option<String>) -> InviteId {
    InviteId(raw.unwrap_or_default())
}

pub async fn create_invite(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<CreateInviteBody>,
) -> Result<Json<IssuedInvite>, ApiError> {
    let max_uses = MaxUses::parse(body.max_uses.as_ref())?;
    server
        .issue_invite(&trip_id(body.trip_id), &actor, max_uses, IssueFlow::Share)
        .await
        .map(Json)
}

pub async fn mint_invite(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<MintInviteBody>,
) -> Result<Json<IssuedInvite>, ApiError> {
    let max_uses = MaxUses::parse(body.max_uses.as_ref())?;
    let flow = IssueFlow::Mint { hours: body.hours };
    server
        .issue_invite(&trip_id(body.trip_id), &actor, max_uses, flow)
        .await
        .map(Json)
}

pub async fn join_invite(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<InviteIdBody>,
) -> Result<Json<Redemption>, ApiError> {
    server
        .redeem_invite(&invite_id(body.invite_id), &actor)
        .await
        .map(Json)
}

pub async fn invite_info(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    Query(query): Query<InviteQuery>,
) -> Result<Json<InviteInfo>, ApiError> {
    server
        .invite_info(&invite_id(query.invite_id), &actor)
        .await
        .map(Json)
}

pub async fn revoke_invite(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<InviteIdBody>,
) -> Result<Json<Value>, ApiError> {
    server
        .revoke_invite(&invite_id(body.invite_id), &actor)
        .await?;
    Ok(Json(json!({ "revoked": true })))
}

pub async fn list_invites(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    Query(query): Query<TripQuery>,
) -> Result<Json<Value>, ApiError> {
    let invites: Vec<Invite> = server
        .list_invites(&trip_id(query.trip_id), &actor)
        .await?;
    Ok(Json(json!({ "invites": invites })))
}
