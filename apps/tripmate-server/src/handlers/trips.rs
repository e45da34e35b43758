//! Trip, list, item and comment handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tripmate_storage::{ItemId, ListId, PlaceInfo, TripId, UserId};

use super::{Actor, JsonBody};
use crate::error::ApiError;
use crate::server::TripServer;
use crate::trips::{CreatedTrip, DeletionSummary, LikeToggle};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripBody {
    #[serde(default)]
    name: String,
    cover_photo: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListBody {
    #[serde(default)]
    trip_id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemBody {
    #[serde(default)]
    list_id: String,
    #[serde(default)]
    title: String,
    note: Option<String>,
    place: Option<PlaceInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentBody {
    #[serde(default)]
    item_id: String,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveMemberBody {
    #[serde(default)]
    user_id: String,
}

pub async fn create_trip(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<CreateTripBody>,
) -> Result<Json<CreatedTrip>, ApiError> {
    server
        .create_trip(&actor, &body.name, body.cover_photo)
        .await
        .map(Json)
}

pub async fn delete_trip(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    Path(trip_id): Path<String>,
) -> Result<Json<DeletionSummary>, ApiError> {
    server
        .delete_trip(&actor, &TripId(trip_id))
        .await
        .map(Json)
}

pub async fn remove_member(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<RemoveMemberBody>,
) -> Result<Json<Value>, ApiError> {
    let trip = server
        .remove_member(&actor, &TripId(trip_id), &UserId(body.user_id))
        .await?;
    Ok(Json(json!({ "trip": trip })))
}

pub async fn create_list(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<CreateListBody>,
) -> Result<Json<Value>, ApiError> {
    let list = server
        .create_list(&actor, &TripId(body.trip_id), &body.name)
        .await?;
    Ok(Json(json!({ "list": list })))
}

pub async fn create_item(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<CreateItemBody>,
) -> Result<Json<Value>, ApiError> {
    if body.list_id.trim().is_empty() {
        return Err(ApiError::invalid("listId is required"));
    }
    let item = server
        .create_item(
            &actor,
            &ListId(body.list_id),
            &body.title,
            body.note,
            body.place,
        )
        .await?;
    Ok(Json(json!({ "item": item })))
}

pub async fn toggle_like(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
) -> Result<Json<LikeToggle>, ApiError> {
    server
        .toggle_like(&actor, &ItemId(item_id))
        .await
        .map(Json)
}

pub async fn add_comment(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<CreateCommentBody>,
) -> Result<Json<Value>, ApiError> {
    if body.item_id.trim().is_empty() {
        return Err(ApiError::invalid("itemId is required"));
    }
    let comment = server
        .add_comment(&actor, &ItemId(body.item_id), &body.body)
        .await?;
    Ok(Json(json!({ "comment": comment })))
}
