use std::sync::Arc;

use chrono::{DateTime, Utc};
use tripmate_storage::{Store, Trip, TripId, UserId};

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics;
use crate::rate_limit::RateLimiter;

/// Shared service state. Cheap to clone; every handler gets its own copy.
#[derive(Clone)]
pub struct TripServer {
    pub store: Arc<dyn Store>,
    pub limiter: Arc<RateLimiter>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ServerConfig>,
}

impl TripServer {
    pub fn new(store: Arc<dyn Store>, config: ServerConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn Store>,
        config: ServerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            limiter: Arc::new(RateLimiter::new(clock.clone())),
            clock,
            config: Arc::new(config),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count one request against `scope:{actor}`.
    pub(crate) fn throttle(
        &self,
        scope: &'static str,
        actor: &UserId,
        max: u32,
    ) -> Result<(), ApiError> {
        let key = format!("{scope}:{actor}");
        if self.limiter.allow(&key, max, self.config.rate_limits.window) {
            return Ok(());
        }
        tracing::warn!(actor = %actor, scope, "rate limit exceeded");
        metrics::record_rate_limited(scope);
        Err(ApiError::RateLimited(
            "Too many requests, please try again later".into(),
        ))
    }

    pub(crate) async fn load_trip(&self, trip_id: &TripId) -> Result<Trip, ApiError> {
        self.store
            .get_trip(trip_id)
            .await
            .map_err(ApiError::store("Trip"))
    }

    /// Load the trip and require `actor` to be one of its owners.
    pub(crate) async fn owned_trip(
        &self,
        trip_id: &TripId,
        actor: &UserId,
    ) -> Result<Trip, ApiError> {
        let trip = self.load_trip(trip_id).await?;
        if !trip.is_owner(actor) {
            return Err(ApiError::unauthorized("You are not a member of this trip"));
        }
        Ok(trip)
    }
}
