//! Authorization helper handlers used by other services.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tripmate_storage::TripId;

use super::{Actor, JsonBody};
use crate::access::{ResourceKind, ResourceRef};
use crate::error::ApiError;
use crate::server::TripServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBody {
    resource_type: Option<String>,
    resource_id: Option<String>,
}

impl ResourceBody {
    fn fields(self) -> Result<(String, String), ApiError> {
        match (self.resource_type, self.resource_id) {
            (Some(t), Some(id)) if !t.trim().is_empty() && !id.trim().is_empty() => Ok((t, id)),
            _ => Err(ApiError::MissingFields(
                "resourceType and resourceId are required".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    has_access: bool,
    resource_type: String,
    resource_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripIdResponse {
    trip_id: Option<TripId>,
    resource_type: String,
    resource_id: String,
}

pub async fn check_access(
    State(server): State<TripServer>,
    Actor(actor): Actor,
    JsonBody(body): JsonBody<ResourceBody>,
) -> Result<Json<AccessResponse>, ApiError> {
    let (resource_type, resource_id) = body.fields()?;
    let kind: ResourceKind = resource_type
        .parse()
        .map_err(|_| ApiError::invalid("Unsupported resource type"))?;

    let resource = ResourceRef::new(kind, resource_id.clone());
    let has_access = server.resolve_access(&resource, &actor).await;
    tracing::debug!(actor = %actor, %kind, %resource_id, has_access, "access check");

    Ok(Json(AccessResponse {
        has_access,
        resource_type,
        resource_id,
    }))
}

pub async fn get_trip_id(
    State(server): State<TripServer>,
    Actor(_actor): Actor,
    JsonBody(body): JsonBody<ResourceBody>,
) -> Result<Json<TripIdResponse>, ApiError> {
    let (resource_type, resource_id) = body.fields()?;

    let trip_id = match resource_type.parse::<ResourceKind>() {
        Ok(kind) => {
            server
                .resolve_trip_id(&ResourceRef::new(kind, resource_id.clone()))
                .await
        }
        Err(_) => None,
    };

    Ok(Json(TripIdResponse {
        trip_id,
        resource_type,
        resource_id,
    }))
}
