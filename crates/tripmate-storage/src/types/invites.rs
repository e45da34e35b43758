//! Invite types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{InviteId, TripId, UserId};

/// Invite record. The id doubles as the shareable code.
///
/// Invites are never deleted: a dead invite keeps `is_active = false`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: InviteId,
    pub trip_id: TripId,
    pub created_by: UserId,
    pub expires_at: DateTime<Utc>,
    pub max_uses: Option<u32>, // None = unlimited
    pub used_count: u32,
    pub used_by: BTreeSet<UserId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invite {
    /// Redemption strictly after `expires_at` fails.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_uses, Some(max) if self.used_count >= max)
    }

    pub fn has_been_used_by(&self, user_id: &UserId) -> bool {
        self.used_by.contains(user_id)
    }

    /// Record a redemption by `user_id`. The counter only moves when the user is new.
    /// Returns whether the use was recorded.
    pub fn apply_use(&mut self, user_id: &UserId) -> bool {
        if self.used_by.insert(user_id.clone()) {
            self.used_count += 1;
            true
        } else {
            false
        }
    }
}

/// Parameters for creating an invite. The caller supplies the token.
#[derive(Clone, Debug)]
pub struct CreateInviteParams {
    pub id: InviteId,
    pub trip_id: TripId,
    pub created_by: UserId,
    pub expires_at: DateTime<Utc>,
    pub max_uses: Option<u32>,
}
