//! List types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ListId, TripId, UserId};

/// List record. A list belongs to exactly one trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: ListId,
    pub trip_id: TripId,
    pub name: String,
    pub created_by: UserId,
    /// Independent owners copy. `None` means the list keeps no copy of its own
    /// and membership is read from the trip.
    pub owners: Option<BTreeSet<UserId>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl List {
    pub fn has_owner_copy(&self) -> bool {
        self.owners.is_some()
    }
}

/// Parameters for creating a list
#[derive(Clone, Debug)]
pub struct CreateListParams {
    pub trip_id: TripId,
    pub name: String,
    pub created_by: UserId,
    pub owners: Option<BTreeSet<UserId>>,
}
