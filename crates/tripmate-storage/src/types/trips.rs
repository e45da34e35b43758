//! Trip types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TripId, UserId};

/// Trip record. `owners` is the membership set; `admins` is a subset with elevated rights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub name: String,
    pub owners: BTreeSet<UserId>,
    pub admins: BTreeSet<UserId>,
    pub cover_photo: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn is_owner(&self, user_id: &UserId) -> bool {
        self.owners.contains(user_id)
    }

    pub fn is_admin(&self, user_id: &UserId) -> bool {
        self.admins.contains(user_id)
    }

    pub fn member_count(&self) -> usize {
        self.owners.len()
    }

    /// Removing `user_id` would leave the trip without owners.
    pub fn is_sole_owner(&self, user_id: &UserId) -> bool {
        self.owners.len() == 1 && self.is_owner(user_id)
    }
}

/// Parameters for creating a trip. The creator becomes the sole owner and admin.
#[derive(Clone, Debug)]
pub struct CreateTripParams {
    pub name: String,
    pub created_by: UserId,
    pub cover_photo: Option<String>,
}
