//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait the server depends on.
///
/// Each method touches a single record (or scans one collection). Methods that
/// change a set field are read-modify-write units on that one record; nothing here
/// spans records, so referential integrity is the caller's job.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Trips ──────────────────────────────────────────

    /// Create a trip with the creator as sole owner and admin.
    async fn create_trip(&self, params: &CreateTripParams) -> Result<Trip, StoreError>;

    /// Get trip by ID.
    async fn get_trip(&self, trip_id: &TripId) -> Result<Trip, StoreError>;

    /// Add a user to the trip owners (set union; already present is not an error).
    async fn add_trip_owner(&self, trip_id: &TripId, user_id: &UserId)
        -> Result<Trip, StoreError>;

    /// Remove a user from the trip owners and admins.
    /// Fails with `Conflict` instead of leaving the trip without owners.
    async fn remove_trip_owner(
        &self,
        trip_id: &TripId,
        user_id: &UserId,
    ) -> Result<Trip, StoreError>;

    /// Delete a trip record. Does not touch child lists.
    async fn delete_trip(&self, trip_id: &TripId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Lists ──────────────────────────────────────────

    /// Create a list under a trip.
    async fn create_list(&self, params: &CreateListParams) -> Result<List, StoreError>;

    /// Get list by ID.
    async fn get_list(&self, list_id: &ListId) -> Result<List, StoreError>;

    /// List up to `limit` lists belonging to a trip, oldest first.
    async fn list_lists(&self, trip_id: &TripId, limit: usize) -> Result<Vec<List>, StoreError>;

    /// Add a user to a list's independent owners copy. Lists without a copy are left untouched.
    async fn add_list_owner(&self, list_id: &ListId, user_id: &UserId)
        -> Result<List, StoreError>;

    /// Remove a user from a list's independent owners copy.
    async fn remove_list_owner(
        &self,
        list_id: &ListId,
        user_id: &UserId,
    ) -> Result<List, StoreError>;

    /// Delete a list record. Does not touch child items.
    async fn delete_list(&self, list_id: &ListId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Items ──────────────────────────────────────────

    /// Create a list item with no likes.
    async fn create_item(&self, params: &CreateItemParams) -> Result<ListItem, StoreError>;

    /// Get item by ID.
    async fn get_item(&self, item_id: &ItemId) -> Result<ListItem, StoreError>;

    /// List all items of a list, oldest first.
    async fn list_items(&self, list_id: &ListId) -> Result<Vec<ListItem>, StoreError>;

    /// Atomically add or remove `user_id` in `liked_by` and set `vote_count` to match.
    async fn toggle_item_like(
        &self,
        item_id: &ItemId,
        user_id: &UserId,
    ) -> Result<ListItem, StoreError>;

    /// Delete an item record. Does not touch comments.
    async fn delete_item(&self, item_id: &ItemId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Comments ───────────────────────────────────────

    /// Create a comment on an item.
    async fn create_comment(&self, params: &CreateCommentParams) -> Result<Comment, StoreError>;

    /// Get comment by ID.
    async fn get_comment(&self, comment_id: &CommentId) -> Result<Comment, StoreError>;

    /// List all comments on an item, oldest first.
    async fn list_comments(&self, item_id: &ItemId) -> Result<Vec<Comment>, StoreError>;

    /// Delete a comment record.
    async fn delete_comment(&self, comment_id: &CommentId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Invites ────────────────────────────────────────

    /// Persist a new invite (`used_count = 0`, `used_by = {}`, `is_active = true`).
    /// Fails with `AlreadyExists` on a token collision.
    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError>;

    /// Get invite by its token.
    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError>;

    /// List all invites of a trip, newest first.
    async fn list_invites(&self, trip_id: &TripId) -> Result<Vec<Invite>, StoreError>;

    /// List invites of a trip issued by `created_by` that are still flagged active, newest first.
    async fn list_active_invites(
        &self,
        trip_id: &TripId,
        created_by: &UserId,
    ) -> Result<Vec<Invite>, StoreError>;

    /// Record a redemption: insert into `used_by`, increment `used_count` only on insert.
    async fn record_invite_use(
        &self,
        invite_id: &InviteId,
        user_id: &UserId,
    ) -> Result<Invite, StoreError>;

    /// Mark an invite permanently inactive.
    async fn deactivate_invite(&self, invite_id: &InviteId) -> Result<(), StoreError>;
}
