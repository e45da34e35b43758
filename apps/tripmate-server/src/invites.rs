//! Invite issuance, redemption, inspection and revocation.

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use tripmate_storage::{CreateInviteParams, Invite, InviteId, StoreError, TripId, UserId};

use crate::config::{InviteConfig, MAX_INVITE_TTL_HOURS};
use crate::error::ApiError;
use crate::metrics;
use crate::server::TripServer;
use crate::trips::OwnerChange;

const INVITE_ID_BYTES: usize = 16;
const MINT_ATTEMPTS: usize = 3;

/// Which endpoint asked for the invite. The two differ only in defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueFlow {
    /// Shareable link: long-lived, many uses.
    Share,
    /// One-off token; the caller may pick the lifetime in hours.
    Mint { hours: Option<i64> },
}

impl IssueFlow {
    fn label(&self) -> &'static str {
        match self {
            Self::Share => "share",
            Self::Mint { .. } => "mint",
        }
    }

    fn ttl(&self, config: &InviteConfig) -> Duration {
        let hours = match self {
            Self::Share => config.share_ttl_hours,
            Self::Mint { hours: Some(h) } => (*h).clamp(1, MAX_INVITE_TTL_HOURS),
            Self::Mint { hours: None } => config.mint_ttl_hours,
        };
        Duration::hours(hours)
    }

    fn default_max_uses(&self, config: &InviteConfig) -> u32 {
        match self {
            Self::Share => config.share_default_max_uses,
            Self::Mint { .. } => config.mint_default_max_uses,
        }
    }
}

/// Requested usage limit, as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxUses {
    Default,
    Requested(i64),
}

impl MaxUses {
    /// Accepts a JSON number or a numeric string; fractional numbers are truncated.
    pub fn parse(value: Option<&Value>) -> Result<Self, ApiError> {
        let invalid = || ApiError::invalid("maxUses must be a number");
        match value {
            None | Some(Value::Null) => Ok(Self::Default),
            Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Self::Requested(i)),
                (None, Some(f)) if f.is_finite() => Ok(Self::Requested(f.trunc() as i64)),
                _ => Err(invalid()),
            },
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Self::Requested)
                .map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    fn resolve(self, flow: IssueFlow, config: &InviteConfig) -> u32 {
        match self {
            Self::Default => flow.default_max_uses(config),
            Self::Requested(n) => n.clamp(1, i64::from(config.max_uses_ceiling)) as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvite {
    pub invite_id: InviteId,
    pub expires_at: DateTime<Utc>,
    pub reused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub trip_id: TripId,
    /// `None` only on a repeat redemption whose trip lookup failed.
    pub trip_name: Option<String>,
    pub already_member: bool,
}

/// What an invitee sees before accepting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteInfo {
    pub trip_id: TripId,
    pub trip_name: String,
    pub cover_photo: Option<String>,
    pub member_count: usize,
    pub expires_at: DateTime<Utc>,
    pub already_member: bool,
}

pub fn generate_invite_id() -> InviteId {
    let mut bytes = [0u8; INVITE_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    InviteId(hex::encode(bytes))
}

pub fn validate_trip_id(trip_id: &TripId) -> Result<(), ApiError> {
    let len = trip_id.as_str().chars().count();
    if len == 0 || len >= 100 {
        return Err(ApiError::invalid("Invalid trip ID format"));
    }
    Ok(())
}

pub fn validate_invite_id(invite_id: &InviteId) -> Result<(), ApiError> {
    let len = invite_id.as_str().chars().count();
    if !(10..=100).contains(&len) {
        return Err(ApiError::invalid("Invalid invite ID format"));
    }
    Ok(())
}

fn redemption_outcome(result: &Result<Redemption, ApiError>) -> &'static str {
    match result {
        Ok(r) if r.already_member => "already_member",
        Ok(_) => "joined",
        Err(ApiError::Gone) => "gone",
        Err(ApiError::Expired) => "expired",
        Err(ApiError::Exhausted) => "exhausted",
        Err(ApiError::NotFound(_)) => "not_found",
        Err(_) => "error",
    }
}

impl TripServer {
    /// Hand `actor` an invite for `trip_id`, reusing their newest live one if any.
    pub async fn issue_invite(
        &self,
        trip_id: &TripId,
        actor: &UserId,
        max_uses: MaxUses,
        flow: IssueFlow,
    ) -> Result<IssuedInvite, ApiError> {
        validate_trip_id(trip_id)?;
        let max_uses = max_uses.resolve(flow, &self.config.invites);
        self.throttle("invite_create", actor, self.config.rate_limits.create_max)?;

        let trip = self.load_trip(trip_id).await?;
        if !trip.is_owner(actor) {
            return Err(ApiError::unauthorized(
                "You cannot create invitations for this trip",
            ));
        }

        let now = self.now();
        if let Some(existing) = self.reusable_invite(trip_id, actor, now).await {
            debug!(trip_id = %trip_id, actor = %actor, "reusing active invite");
            metrics::record_invite_issued(flow.label(), true);
            return Ok(IssuedInvite {
                invite_id: existing.id,
                expires_at: existing.expires_at,
                reused: true,
            });
        }

        let invite = self
            .mint_invite(trip_id, actor, now + flow.ttl(&self.config.invites), max_uses)
            .await?;
        info!(
            trip_id = %trip_id,
            actor = %actor,
            flow = flow.label(),
            max_uses,
            expires_at = %invite.expires_at,
            "invite created"
        );
        metrics::record_invite_issued(flow.label(), false);
        Ok(IssuedInvite {
            invite_id: invite.id,
            expires_at: invite.expires_at,
            reused: false,
        })
    }

    /// First live invite the actor already issued for the trip. Stale ones found on
    /// the way are switched off; any failure here just means a fresh invite is minted.
    async fn reusable_invite(
        &self,
        trip_id: &TripId,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Option<Invite> {
        let candidates = match self.store.list_active_invites(trip_id, actor).await {
            Ok(c) => c,
            Err(e) => {
                warn!(trip_id = %trip_id, error = %e, "could not list active invites");
                return None;
            }
        };

        let mut reusable = None;
        for invite in candidates {
            if invite.is_expired(now) || invite.is_exhausted() {
                self.deactivate_quietly(&invite.id, "stale").await;
            } else if reusable.is_none() {
                reusable = Some(invite);
            }
        }
        reusable
    }

    async fn mint_invite(
        &self,
        trip_id: &TripId,
        actor: &UserId,
        expires_at: DateTime<Utc>,
        max_uses: u32,
    ) -> Result<Invite, ApiError> {
        for _ in 0..MINT_ATTEMPTS {
            let params = CreateInviteParams {
                id: generate_invite_id(),
                trip_id: trip_id.clone(),
                created_by: actor.clone(),
                expires_at,
                max_uses: Some(max_uses),
            };
            match self.store.create_invite(&params).await {
                Ok(invite) => return Ok(invite),
                Err(StoreError::AlreadyExists) => {
                    warn!(trip_id = %trip_id, "invite id collision, retrying");
                }
                Err(e) => return Err(ApiError::internal("failed to create invite", e)),
            }
        }
        Err(ApiError::internal(
            "failed to create invite",
            "no unique id after retries",
        ))
    }

    async fn deactivate_quietly(&self, invite_id: &InviteId, reason: &'static str) {
        match self.store.deactivate_invite(invite_id).await {
            Ok(()) => debug!(invite_id = %invite_id, reason, "invite deactivated"),
            Err(e) => warn!(invite_id = %invite_id, reason, error = %e, "failed to deactivate invite"),
        }
    }

    /// Join the trip behind `invite_id`.
    pub async fn redeem_invite(
        &self,
        invite_id: &InviteId,
        actor: &UserId,
    ) -> Result<Redemption, ApiError> {
        validate_invite_id(invite_id)?;
        self.throttle("invite_join", actor, self.config.rate_limits.join_max)?;

        let result = self.redeem_checked(invite_id, actor).await;
        metrics::record_invite_redeemed(redemption_outcome(&result));
        result
    }

    async fn redeem_checked(
        &self,
        invite_id: &InviteId,
        actor: &UserId,
    ) -> Result<Redemption, ApiError> {
        let invite = self
            .store
            .get_invite(invite_id)
            .await
            .map_err(ApiError::store("Invite"))?;

        if !invite.is_active {
            return Err(ApiError::Gone);
        }
        if invite.is_expired(self.now()) {
            self.deactivate_quietly(&invite.id, "expired").await;
            return Err(ApiError::Expired);
        }
        if invite.has_been_used_by(actor) {
            let trip_name = match self.store.get_trip(&invite.trip_id).await {
                Ok(trip) => Some(trip.name),
                Err(e) => {
                    debug!(trip_id = %invite.trip_id, error = %e, "trip lookup failed on repeat redemption");
                    None
                }
            };
            return Ok(Redemption {
                trip_id: invite.trip_id,
                trip_name,
                already_member: true,
            });
        }
        if invite.is_exhausted() {
            self.deactivate_quietly(&invite.id, "exhausted").await;
            return Err(ApiError::Exhausted);
        }

        let trip = self.load_trip(&invite.trip_id).await?;
        let already_member = trip.is_owner(actor);

        let trip = self
            .store
            .add_trip_owner(&trip.id, actor)
            .await
            .map_err(|e| ApiError::internal("failed to add trip owner", e))?;

        self.propagate_list_owner(&trip.id, actor, OwnerChange::Add)
            .await;

        // The actor is a member from here on; a failed count is logged, not undone.
        self.store
            .record_invite_use(&invite.id, actor)
            .await
            .map_err(|e| ApiError::internal("failed to record invite use", e))?;

        info!(
            invite_id = %invite.id,
            trip_id = %trip.id,
            actor = %actor,
            already_member,
            "invite redeemed"
        );
        Ok(Redemption {
            trip_id: trip.id,
            trip_name: Some(trip.name),
            already_member,
        })
    }

    /// Preview an invite without touching it.
    pub async fn invite_info(
        &self,
        invite_id: &InviteId,
        actor: &UserId,
    ) -> Result<InviteInfo, ApiError> {
        validate_invite_id(invite_id)?;

        let invite = self
            .store
            .get_invite(invite_id)
            .await
            .map_err(ApiError::store("Invite"))?;
        if !invite.is_active {
            return Err(ApiError::Inactive);
        }
        if invite.is_expired(self.now()) {
            return Err(ApiError::Expired);
        }

        let trip = self.load_trip(&invite.trip_id).await?;
        Ok(InviteInfo {
            already_member: trip.is_owner(actor) || invite.has_been_used_by(actor),
            member_count: trip.member_count(),
            trip_id: trip.id,
            trip_name: trip.name,
            cover_photo: trip.cover_photo,
            expires_at: invite.expires_at,
        })
    }

    /// Switch an invite off. Allowed for its creator and for trip admins.
    pub async fn revoke_invite(
        &self,
        invite_id: &InviteId,
        actor: &UserId,
    ) -> Result<(), ApiError> {
        validate_invite_id(invite_id)?;

        let invite = self
            .store
            .get_invite(invite_id)
            .await
            .map_err(ApiError::store("Invite"))?;

        if invite.created_by != *actor {
            let trip = self.load_trip(&invite.trip_id).await?;
            if !trip.is_admin(actor) {
                return Err(ApiError::unauthorized("You cannot revoke this invitation"));
            }
        }

        if !invite.is_active {
            return Ok(());
        }

        self.store
            .deactivate_invite(&invite.id)
            .await
            .map_err(|e| ApiError::internal("failed to revoke invite", e))?;
        info!(invite_id = %invite.id, trip_id = %invite.trip_id, actor = %actor, "invite revoked");
        Ok(())
    }

    /// All invites of a trip, newest first. Owners only.
    pub async fn list_invites(
        &self,
        trip_id: &TripId,
        actor: &UserId,
    ) -> Result<Vec<Invite>, ApiError> {
        validate_trip_id(trip_id)?;
        self.owned_trip(trip_id, actor).await?;
        self.store
            .list_invites(trip_id)
            .await
            .map_err(|e| ApiError::internal("failed to list invites", e))
    }
}
