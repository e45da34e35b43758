//! Access resolution through the containment chain Comment → ListItem → List → Trip.
//!
//! Nothing is cached: every hop is a fresh read, so a member removed from the trip
//! loses access on the next check.

use std::fmt;
use std::str::FromStr;

use tripmate_storage::{CommentId, ItemId, ListId, StoreError, TripId, UserId};

use crate::server::TripServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Trip,
    List,
    ListItem,
    Comment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trip => "Trip",
            Self::List => "List",
            Self::ListItem => "ListItem",
            Self::Comment => "Comment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownResourceKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Trip" => Ok(Self::Trip),
            "List" => Ok(Self::List),
            "ListItem" => Ok(Self::ListItem),
            "Comment" => Ok(Self::Comment),
            other => Err(UnknownResourceKind(other.to_string())),
        }
    }
}

/// A resource named by kind and typed id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    Trip(TripId),
    List(ListId),
    ListItem(ItemId),
    Comment(CommentId),
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        let id = id.into();
        match kind {
            ResourceKind::Trip => Self::Trip(TripId(id)),
            ResourceKind::List => Self::List(ListId(id)),
            ResourceKind::ListItem => Self::ListItem(ItemId(id)),
            ResourceKind::Comment => Self::Comment(CommentId(id)),
        }
    }

    #[cfg(test)]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Trip(_) => ResourceKind::Trip,
            Self::List(_) => ResourceKind::List,
            Self::ListItem(_) => ResourceKind::ListItem,
            Self::Comment(_) => ResourceKind::Comment,
        }
    }
}

/// Turn a lookup result into an optional value; backend failures are logged,
/// and both they and misses resolve to "no access".
fn found<T>(res: Result<T, StoreError>, what: &str) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(StoreError::NotFound) => None,
        Err(e) => {
            tracing::warn!(error = %e, what, "lookup failed while resolving access");
            None
        }
    }
}

impl TripServer {
    /// Walk the containment chain up to the owning trip.
    pub async fn resolve_trip_id(&self, resource: &ResourceRef) -> Option<TripId> {
        match resource {
            ResourceRef::Trip(id) => Some(id.clone()),
            ResourceRef::List(id) => self.trip_of_list(id).await,
            ResourceRef::ListItem(id) => self.trip_of_item(id).await,
            ResourceRef::Comment(id) => {
                let comment = found(self.store.get_comment(id).await, "comment")?;
                self.trip_of_item(&comment.item_id).await
            }
        }
    }

    /// Whether `actor` may act on `resource`: trip ownership, or authorship for comments.
    pub async fn resolve_access(&self, resource: &ResourceRef, actor: &UserId) -> bool {
        if let ResourceRef::Comment(id) = resource {
            let Some(comment) = found(self.store.get_comment(id).await, "comment") else {
                return false;
            };
            if comment.author_id == *actor {
                return true;
            }
            let Some(trip_id) = self.trip_of_item(&comment.item_id).await else {
                return false;
            };
            return self.is_trip_owner(&trip_id, actor).await;
        }

        match self.resolve_trip_id(resource).await {
            Some(trip_id) => self.is_trip_owner(&trip_id, actor).await,
            None => false,
        }
    }

    async fn trip_of_list(&self, list_id: &ListId) -> Option<TripId> {
        found(self.store.get_list(list_id).await, "list").map(|l| l.trip_id)
    }

    async fn trip_of_item(&self, item_id: &ItemId) -> Option<TripId> {
        let item = found(self.store.get_item(item_id).await, "item")?;
        self.trip_of_list(&item.list_id).await
    }

    async fn is_trip_owner(&self, trip_id: &TripId, actor: &UserId) -> bool {
        found(self.store.get_trip(trip_id).await, "trip")
            .map(|t| t.is_owner(actor))
            .unwrap_or(false)
    }
}
