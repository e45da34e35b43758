//! HTTP surface: routing, identity and body extraction.
//!
//! Handlers are thin: they pull the actor and body out of the request, call into
//! [`TripServer`], and let [`ApiError`] render failures.

pub mod access;
pub mod invites;
pub mod trips;

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::routing::{delete, get, post};
use axum::{middleware, Json, Router};
use serde::de::DeserializeOwned;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tripmate_storage::UserId;

use crate::error::ApiError;
use crate::metrics;
use crate::server::TripServer;

/// Build the API router.
pub fn router(server: TripServer) -> Router {
    Router::new()
        // invites
        .route("/invite/create", post(invites::create_invite))
        .route("/invites/mint", post(invites::mint_invite))
        .route("/invite/join", post(invites::join_invite))
        .route("/invites/redeem", post(invites::join_invite))
        .route("/invite/info", get(invites::invite_info))
        .route("/invite/revoke", post(invites::revoke_invite))
        .route("/invite/list", get(invites::list_invites))
        // authorization helpers
        .route("/auth/check-access", post(access::check_access))
        .route("/auth/get-trip-id", post(access::get_trip_id))
        // trips and their contents
        .route("/trips", post(trips::create_trip))
        .route("/trips/:trip_id", delete(trips::delete_trip))
        .route("/trips/:trip_id/members/remove", post(trips::remove_member))
        .route("/lists", post(trips::create_list))
        .route("/items", post(trips::create_item))
        .route("/items/:item_id/like", post(trips::toggle_like))
        .route("/comments", post(trips::add_comment))
        .route_layer(middleware::from_fn(metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(server)
}

/// The authenticated user, as asserted by the upstream authorizer in the
/// configured identity header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub UserId);

#[async_trait]
impl FromRequestParts<TripServer> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        server: &TripServer,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&server.config.identity_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Actor(UserId::from(v)))
            .ok_or(ApiError::Unauthenticated)
    }
}

/// `Json` with rejections rendered as our `{"error": …}` 400.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(%rejection, "rejected request body");
                Err(ApiError::invalid("Invalid JSON in request body"))
            }
        }
    }
}
