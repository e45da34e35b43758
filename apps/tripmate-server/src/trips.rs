//! Trip membership operations: creating trips and their contents, likes,
//! member removal and the cascading trip delete.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tripmate_storage::{
    Comment, CreateCommentParams, CreateItemParams, CreateListParams, CreateTripParams, ItemId,
    List, ListId, ListItem, PlaceInfo, StoreError, Trip, TripId, UserId,
};

use crate::access::ResourceRef;
use crate::error::ApiError;
use crate::invites::validate_trip_id;
use crate::server::TripServer;

pub const DEFAULT_LIST_NAME: &str = "General";
const MAX_NAME_CHARS: usize = 200;
const MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerChange {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTrip {
    pub trip: Trip,
    /// Missing only if the trip was stored but its default list could not be.
    pub default_list: Option<List>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggle {
    pub item_id: ItemId,
    pub liked: bool,
    pub vote_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionSummary {
    pub deleted_lists: usize,
    pub deleted_items: usize,
    pub deleted_comments: usize,
}

fn non_empty(value: &str, field: &str, max_chars: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid(format!("{field} is required")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ApiError::invalid(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn last_member() -> ApiError {
    ApiError::Conflict("Cannot remove the last member of a trip".into())
}

fn forbidden() -> ApiError {
    ApiError::unauthorized("You do not have access to this resource")
}

/// Outcome of one delete in the saga: `Ok(true)` deleted now, `Ok(false)` already gone.
fn saga_step(
    res: Result<(), StoreError>,
    step: &'static str,
    id: &str,
) -> Result<bool, ApiError> {
    match res {
        Ok(()) => {
            debug!(step, id, "deleted");
            Ok(true)
        }
        Err(StoreError::NotFound) => {
            debug!(step, id, "already deleted");
            Ok(false)
        }
        Err(e) => {
            error!(step, id, error = %e, "trip deletion halted");
            Err(ApiError::Internal)
        }
    }
}

fn scan_failed(trip_id: &TripId, what: &'static str, e: StoreError) -> ApiError {
    error!(trip_id = %trip_id, what, error = %e, "trip deletion halted while listing children");
    ApiError::Internal
}

impl TripServer {
    /// Apply an owner change to every list of the trip that keeps its own owners copy.
    /// Failures are logged and skipped. Returns how many lists were updated.
    pub(crate) async fn propagate_list_owner(
        &self,
        trip_id: &TripId,
        user_id: &UserId,
        change: OwnerChange,
    ) -> usize {
        let lists = match self
            .store
            .list_lists(trip_id, self.config.list_scan_limit)
            .await
        {
            Ok(lists) => lists,
            Err(e) => {
                warn!(trip_id = %trip_id, error = %e, "could not load lists for owner propagation");
                return 0;
            }
        };

        let updates = lists.iter().filter(|l| l.has_owner_copy()).map(|list| async move {
            let res = match change {
                OwnerChange::Add => self.store.add_list_owner(&list.id, user_id).await,
                OwnerChange::Remove => self.store.remove_list_owner(&list.id, user_id).await,
            };
            (&list.id, res)
        });

        let mut updated = 0;
        for (list_id, res) in join_all(updates).await {
            match res {
                Ok(_) => updated += 1,
                Err(e) => warn!(
                    list_id = %list_id,
                    user_id = %user_id,
                    ?change,
                    error = %e,
                    "failed to update list owners"
                ),
            }
        }
        updated
    }

    async fn require_access(
        &self,
        resource: &ResourceRef,
        actor: &UserId,
    ) -> Result<(), ApiError> {
        if self.resolve_access(resource, actor).await {
            Ok(())
        } else {
            Err(forbidden())
        }
    }

    /// Create a trip owned by `actor`, plus its default list.
    pub async fn create_trip(
        &self,
        actor: &UserId,
        name: &str,
        cover_photo: Option<String>,
    ) -> Result<CreatedTrip, ApiError> {
        let name = non_empty(name, "name", MAX_NAME_CHARS)?;

        let trip = self
            .store
            .create_trip(&CreateTripParams {
                name,
                created_by: actor.clone(),
                cover_photo,
            })
            .await
            .map_err(|e| ApiError::internal("failed to create trip", e))?;
        info!(trip_id = %trip.id, actor = %actor, "trip created");

        let default_list = match self
            .store
            .create_list(&CreateListParams {
                trip_id: trip.id.clone(),
                name: DEFAULT_LIST_NAME.to_string(),
                created_by: actor.clone(),
                owners: Some(trip.owners.clone()),
            })
            .await
        {
            Ok(list) => Some(list),
            Err(e) => {
                warn!(trip_id = %trip.id, error = %e, "failed to create default list");
                None
            }
        };

        Ok(CreatedTrip { trip, default_list })
    }

    /// New list under a trip; its owners copy is a snapshot of the trip's owners.
    pub async fn create_list(
        &self,
        actor: &UserId,
        trip_id: &TripId,
        name: &str,
    ) -> Result<List, ApiError> {
        validate_trip_id(trip_id)?;
        let name = non_empty(name, "name", MAX_NAME_CHARS)?;

        let trip = match self.store.get_trip(trip_id).await {
            Ok(trip) if trip.is_owner(actor) => trip,
            Ok(_) | Err(StoreError::NotFound) => return Err(forbidden()),
            Err(e) => return Err(ApiError::internal("failed to load trip", e)),
        };

        let list = self
            .store
            .create_list(&CreateListParams {
                trip_id: trip.id,
                name,
                created_by: actor.clone(),
                owners: Some(trip.owners),
            })
            .await
            .map_err(|e| ApiError::internal("failed to create list", e))?;
        debug!(list_id = %list.id, trip_id = %list.trip_id, "list created");
        Ok(list)
    }

    pub async fn create_item(
        &self,
        actor: &UserId,
        list_id: &ListId,
        title: &str,
        note: Option<String>,
        place: Option<PlaceInfo>,
    ) -> Result<ListItem, ApiError> {
        let title = non_empty(title, "title", MAX_NAME_CHARS)?;
        self.require_access(&ResourceRef::List(list_id.clone()), actor)
            .await?;

        self.store
            .create_item(&CreateItemParams {
                list_id: list_id.clone(),
                title,
                note: note.filter(|n| !n.trim().is_empty()),
                created_by: actor.clone(),
                place,
            })
            .await
            .map_err(|e| ApiError::internal("failed to create item", e))
    }

    /// Like or unlike an item. Calling twice restores the original count.
    pub async fn toggle_like(
        &self,
        actor: &UserId,
        item_id: &ItemId,
    ) -> Result<LikeToggle, ApiError> {
        self.require_access(&ResourceRef::ListItem(item_id.clone()), actor)
            .await?;

        let item = self
            .store
            .toggle_item_like(item_id, actor)
            .await
            .map_err(ApiError::store("Item"))?;
        Ok(LikeToggle {
            liked: item.is_liked_by(actor),
            vote_count: item.vote_count,
            item_id: item.id,
        })
    }

    pub async fn add_comment(
        &self,
        actor: &UserId,
        item_id: &ItemId,
        body: &str,
    ) -> Result<Comment, ApiError> {
        let body = non_empty(body, "body", MAX_COMMENT_CHARS)?;
        self.require_access(&ResourceRef::ListItem(item_id.clone()), actor)
            .await?;

        self.store
            .create_comment(&CreateCommentParams {
                item_id: item_id.clone(),
                body,
                author_id: actor.clone(),
            })
            .await
            .map_err(|e| ApiError::internal("failed to create comment", e))
    }

    /// Remove `member` from the trip. Members may leave; admins may remove anyone.
    pub async fn remove_member(
        &self,
        actor: &UserId,
        trip_id: &TripId,
        member: &UserId,
    ) -> Result<Trip, ApiError> {
        validate_trip_id(trip_id)?;
        if member.as_str().trim().is_empty() {
            return Err(ApiError::invalid("userId is required"));
        }

        let trip = self.load_trip(trip_id).await?;
        if actor != member && !trip.is_admin(actor) {
            return Err(ApiError::unauthorized(
                "Only trip admins can remove other members",
            ));
        }
        if !trip.is_owner(member) {
            return Err(ApiError::not_found("Member not found"));
        }
        if trip.is_sole_owner(member) {
            return Err(last_member());
        }

        // The store re-checks under its own lock; the read above may be stale.
        let trip = match self.store.remove_trip_owner(trip_id, member).await {
            Ok(trip) => trip,
            Err(StoreError::Conflict) => return Err(last_member()),
            Err(StoreError::NotFound) => return Err(ApiError::not_found("Trip not found")),
            Err(e) => return Err(ApiError::internal("failed to remove trip owner", e)),
        };
        let lists = self
            .propagate_list_owner(trip_id, member, OwnerChange::Remove)
            .await;
        info!(trip_id = %trip_id, actor = %actor, member = %member, lists, "member removed");
        Ok(trip)
    }

    /// Delete a trip and everything under it.
    ///
    /// Runs forward only: comments, then their item, then the list, and the trip
    /// last. The first failing step stops the run with `Internal` and leaves the
    /// trip in place; calling again picks up where it stopped.
    pub async fn delete_trip(
        &self,
        actor: &UserId,
        trip_id: &TripId,
    ) -> Result<DeletionSummary, ApiError> {
        validate_trip_id(trip_id)?;
        self.owned_trip(trip_id, actor).await?;
        info!(trip_id = %trip_id, actor = %actor, "deleting trip");

        let mut summary = DeletionSummary::default();
        loop {
            let lists = self
                .store
                .list_lists(trip_id, self.config.list_scan_limit)
                .await
                .map_err(|e| scan_failed(trip_id, "lists", e))?;
            if lists.is_empty() {
                break;
            }

            for list in lists {
                let items = self
                    .store
                    .list_items(&list.id)
                    .await
                    .map_err(|e| scan_failed(trip_id, "items", e))?;
                for item in items {
                    let comments = self
                        .store
                        .list_comments(&item.id)
                        .await
                        .map_err(|e| scan_failed(trip_id, "comments", e))?;
                    for comment in comments {
                        let res = self.store.delete_comment(&comment.id).await;
                        if saga_step(res, "comment", comment.id.as_str())? {
                            summary.deleted_comments += 1;
                        }
                    }
                    let res = self.store.delete_item(&item.id).await;
                    if saga_step(res, "item", item.id.as_str())? {
                        summary.deleted_items += 1;
                    }
                }
                let res = self.store.delete_list(&list.id).await;
                if saga_step(res, "list", list.id.as_str())? {
                    summary.deleted_lists += 1;
                }
            }
        }

        let res = self.store.delete_trip(trip_id).await;
        saga_step(res, "trip", trip_id.as_str())?;
        info!(
            trip_id = %trip_id,
            lists = summary.deleted_lists,
            items = summary.deleted_items,
            comments = summary.deleted_comments,
            "trip deleted"
        );
        Ok(summary)
    }
}
