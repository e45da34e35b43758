//! In-memory store implementation backed by `DashMap`.
//!
//! This implementation is suitable for:
//! - Single server deployments that can afford to lose state on restart
//! - Development and testing
//!
//! Record updates run under the shard lock of the record's entry, so each
//! per-record read-modify-write is atomic. Nothing spans records.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tripmate_storage::*;
use uuid::Uuid;

/// Process-local store. Cloning is not supported; share it behind an `Arc`.
pub struct MemoryStore {
    trips: DashMap<TripId, Trip>,
    lists: DashMap<ListId, List>,
    items: DashMap<ItemId, ListItem>,
    comments: DashMap<CommentId, Comment>,
    invites: DashMap<InviteId, Invite>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            trips: DashMap::new(),
            lists: DashMap::new(),
            items: DashMap::new(),
            comments: DashMap::new(),
            invites: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

#[async_trait]
impl Store for MemoryStore {
    // ───────────────────────────── Trips ─────────────────────────────

    async fn create_trip(&self, params: &CreateTripParams) -> Result<Trip, StoreError> {
        let ts = now();
        let members = BTreeSet::from([params.created_by.clone()]);
        let trip = Trip {
            id: TripId(new_id()),
            name: params.name.clone(),
            owners: members.clone(),
            admins: members,
            cover_photo: params.cover_photo.clone(),
            created_by: params.created_by.clone(),
            created_at: ts,
            updated_at: ts,
        };
        self.trips.insert(trip.id.clone(), trip.clone());
        Ok(trip)
    }

    async fn get_trip(&self, trip_id: &TripId) -> Result<Trip, StoreError> {
        self.trips
            .get(trip_id)
            .map(|t| t.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn add_trip_owner(
        &self,
        trip_id: &TripId,
        user_id: &UserId,
    ) -> Result<Trip, StoreError> {
        let mut trip = self.trips.get_mut(trip_id).ok_or(StoreError::NotFound)?;
        if trip.owners.insert(user_id.clone()) {
            trip.updated_at = now();
        }
        Ok(trip.clone())
    }

    async fn remove_trip_owner(
        &self,
        trip_id: &TripId,
        user_id: &UserId,
    ) -> Result<Trip, StoreError> {
        let mut trip = self.trips.get_mut(trip_id).ok_or(StoreError::NotFound)?;
        if trip.is_sole_owner(user_id) {
            return Err(StoreError::Conflict);
        }
        let removed = trip.owners.remove(user_id);
        trip.admins.remove(user_id);
        if removed {
            trip.updated_at = now();
        }
        Ok(trip.clone())
    }

    async fn delete_trip(&self, trip_id: &TripId) -> Result<(), StoreError> {
        self.trips
            .remove(trip_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    // ───────────────────────────── Lists ─────────────────────────────

    async fn create_list(&self, params: &CreateListParams) -> Result<List, StoreError> {
        let ts = now();
        let list = List {
            id: ListId(new_id()),
            trip_id: params.trip_id.clone(),
            name: params.name.clone(),
            created_by: params.created_by.clone(),
            owners: params.owners.clone(),
            created_at: ts,
            updated_at: ts,
        };
        self.lists.insert(list.id.clone(), list.clone());
        Ok(list)
    }

    async fn get_list(&self, list_id: &ListId) -> Result<List, StoreError> {
        self.lists
            .get(list_id)
            .map(|l| l.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list_lists(&self, trip_id: &TripId, limit: usize) -> Result<Vec<List>, StoreError> {
        let mut lists: Vec<List> = self
            .lists
            .iter()
            .filter(|l| &l.trip_id == trip_id)
            .map(|l| l.clone())
            .collect();
        lists.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        lists.truncate(limit);
        Ok(lists)
    }

    async fn add_list_owner(
        &self,
        list_id: &ListId,
        user_id: &UserId,
    ) -> Result<List, StoreError> {
        let mut list = self.lists.get_mut(list_id).ok_or(StoreError::NotFound)?;
        let inserted = match list.owners.as_mut() {
            Some(owners) => owners.insert(user_id.clone()),
            None => false,
        };
        if inserted {
            list.updated_at = now();
        }
        Ok(list.clone())
    }

    async fn remove_list_owner(
        &self,
        list_id: &ListId,
        user_id: &UserId,
    ) -> Result<List, StoreError> {
        let mut list = self.lists.get_mut(list_id).ok_or(StoreError::NotFound)?;
        let removed = match list.owners.as_mut() {
            Some(owners) => owners.remove(user_id),
            None => false,
        };
        if removed {
            list.updated_at = now();
        }
        Ok(list.clone())
    }

    async fn delete_list(&self, list_id: &ListId) -> Result<(), StoreError> {
        self.lists
            .remove(list_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    // ───────────────────────────── Items ─────────────────────────────

    async fn create_item(&self, params: &CreateItemParams) -> Result<ListItem, StoreError> {
        let ts = now();
        let item = ListItem {
            id: ItemId(new_id()),
            list_id: params.list_id.clone(),
            title: params.title.clone(),
            note: params.note.clone(),
            created_by: params.created_by.clone(),
            place: params.place.clone(),
            liked_by: BTreeSet::new(),
            vote_count: 0,
            created_at: ts,
            updated_at: ts,
        };
        self.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn get_item(&self, item_id: &ItemId) -> Result<ListItem, StoreError> {
        self.items
            .get(item_id)
            .map(|i| i.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list_items(&self, list_id: &ListId) -> Result<Vec<ListItem>, StoreError> {
        let mut items: Vec<ListItem> = self
            .items
            .iter()
            .filter(|i| &i.list_id == list_id)
            .map(|i| i.clone())
            .collect();
        items.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(items)
    }

    async fn toggle_item_like(
        &self,
        item_id: &ItemId,
        user_id: &UserId,
    ) -> Result<ListItem, StoreError> {
        let mut item = self.items.get_mut(item_id).ok_or(StoreError::NotFound)?;
        item.apply_like_toggle(user_id);
        item.updated_at = now();
        Ok(item.clone())
    }

    async fn delete_item(&self, item_id: &ItemId) -> Result<(), StoreError> {
        self.items
            .remove(item_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    // ───────────────────────────── Comments ──────────────────────────

    async fn create_comment(&self, params: &CreateCommentParams) -> Result<Comment, StoreError> {
        let comment = Comment {
            id: CommentId(new_id()),
            item_id: params.item_id.clone(),
            body: params.body.clone(),
            author_id: params.author_id.clone(),
            created_at: now(),
        };
        self.comments.insert(comment.id.clone(), comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, comment_id: &CommentId) -> Result<Comment, StoreError> {
        self.comments
            .get(comment_id)
            .map(|c| c.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list_comments(&self, item_id: &ItemId) -> Result<Vec<Comment>, StoreError> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|c| &c.item_id == item_id)
            .map(|c| c.clone())
            .collect();
        comments.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(comments)
    }

    async fn delete_comment(&self, comment_id: &CommentId) -> Result<(), StoreError> {
        self.comments
            .remove(comment_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    // ───────────────────────────── Invites ───────────────────────────

    async fn create_invite(&self, params: &CreateInviteParams) -> Result<Invite, StoreError> {
        let ts = now();
        match self.invites.entry(params.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                let invite = Invite {
                    id: params.id.clone(),
                    trip_id: params.trip_id.clone(),
                    created_by: params.created_by.clone(),
                    expires_at: params.expires_at.trunc_subsecs(3),
                    max_uses: params.max_uses,
                    used_count: 0,
                    used_by: BTreeSet::new(),
                    is_active: true,
                    created_at: ts,
                    updated_at: ts,
                };
                slot.insert(invite.clone());
                Ok(invite)
            }
        }
    }

    async fn get_invite(&self, invite_id: &InviteId) -> Result<Invite, StoreError> {
        self.invites
            .get(invite_id)
            .map(|i| i.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list_invites(&self, trip_id: &TripId) -> Result<Vec<Invite>, StoreError> {
        let mut invites: Vec<Invite> = self
            .invites
            .iter()
            .filter(|i| &i.trip_id == trip_id)
            .map(|i| i.clone())
            .collect();
        invites.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));
        Ok(invites)
    }

    async fn list_active_invites(
        &self,
        trip_id: &TripId,
        created_by: &UserId,
    ) -> Result<Vec<Invite>, StoreError> {
        let mut invites = self.list_invites(trip_id).await?;
        invites.retain(|i| i.is_active && &i.created_by == created_by);
        Ok(invites)
    }

    async fn record_invite_use(
        &self,
        invite_id: &InviteId,
        user_id: &UserId,
    ) -> Result<Invite, StoreError> {
        let mut invite = self.invites.get_mut(invite_id).ok_or(StoreError::NotFound)?;
        if invite.apply_use(user_id) {
            invite.updated_at = now();
        }
        Ok(invite.clone())
    }

    async fn deactivate_invite(&self, invite_id: &InviteId) -> Result<(), StoreError> {
        let mut invite = self.invites.get_mut(invite_id).ok_or(StoreError::NotFound)?;
        if invite.is_active {
            invite.is_active = false;
            invite.updated_at = now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn user(s: &str) -> UserId {
        UserId::from(s)
    }

    async fn trip_for(store: &MemoryStore, owner: &str) -> Trip {
        store
            .create_trip(&CreateTripParams {
                name: "Lisbon".to_string(),
                created_by: user(owner),
                cover_photo: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn trip_owner_set_union() {
        let store = MemoryStore::new();
        let trip = trip_for(&store, "alice").await;
        assert_eq!(trip.owners, BTreeSet::from([user("alice")]));
        assert_eq!(trip.admins, BTreeSet::from([user("alice")]));

        store.add_trip_owner(&trip.id, &user("bob")).await.unwrap();
        let trip = store.add_trip_owner(&trip.id, &user("bob")).await.unwrap();
        assert_eq!(trip.owners.len(), 2);

        let trip = store.remove_trip_owner(&trip.id, &user("alice")).await.unwrap();
        assert_eq!(trip.owners, BTreeSet::from([user("bob")]));
        assert!(trip.admins.is_empty());
    }

    #[tokio::test]
    async fn sole_owner_cannot_be_removed() {
        let store = MemoryStore::new();
        let trip = trip_for(&store, "alice").await;

        assert!(matches!(
            store.remove_trip_owner(&trip.id, &user("alice")).await,
            Err(StoreError::Conflict)
        ));
        // Removing someone who is not an owner leaves a lone owner in place
        let trip = store.remove_trip_owner(&trip.id, &user("bob")).await.unwrap();
        assert_eq!(trip.owners, BTreeSet::from([user("alice")]));
    }

    #[tokio::test]
    async fn concurrent_leaves_keep_one_owner() {
        let store = Arc::new(MemoryStore::new());
        let trip = trip_for(&store, "alice").await;
        store.add_trip_owner(&trip.id, &user("bob")).await.unwrap();

        let handles: Vec<_> = ["alice", "bob"]
            .into_iter()
            .map(|who| {
                let store = store.clone();
                let trip_id = trip.id.clone();
                tokio::spawn(async move { store.remove_trip_owner(&trip_id, &user(who)).await })
            })
            .collect();

        let mut conflicts = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => {}
                Err(StoreError::Conflict) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(conflicts, 1);
        assert_eq!(store.get_trip(&trip.id).await.unwrap().owners.len(), 1);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_trip(&TripId::from("nope")).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.add_trip_owner(&TripId::from("nope"), &user("a")).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.delete_list(&ListId::from("nope")).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_owner_copy_only_when_present() {
        let store = MemoryStore::new();
        let trip = trip_for(&store, "alice").await;

        let with_copy = store
            .create_list(&CreateListParams {
                trip_id: trip.id.clone(),
                name: "Food".to_string(),
                created_by: user("alice"),
                owners: Some(BTreeSet::from([user("alice")])),
            })
            .await
            .unwrap();
        let without_copy = store
            .create_list(&CreateListParams {
                trip_id: trip.id.clone(),
                name: "Sights".to_string(),
                created_by: user("alice"),
                owners: None,
            })
            .await
            .unwrap();

        let updated = store.add_list_owner(&with_copy.id, &user("bob")).await.unwrap();
        assert_eq!(updated.owners.unwrap().len(), 2);
        let untouched = store
            .add_list_owner(&without_copy.id, &user("bob"))
            .await
            .unwrap();
        assert!(untouched.owners.is_none());

        let lists = store.list_lists(&trip.id, 200).await.unwrap();
        assert_eq!(lists.len(), 2);
        let limited = store.list_lists(&trip.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn invite_token_collision_rejected() {
        let store = MemoryStore::new();
        let params = CreateInviteParams {
            id: InviteId::from("0123456789abcdef"),
            trip_id: TripId::from("t"),
            created_by: user("alice"),
            expires_at: Utc::now() + Duration::hours(1),
            max_uses: Some(1),
        };
        store.create_invite(&params).await.unwrap();
        assert!(matches!(
            store.create_invite(&params).await,
            Err(StoreError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn active_invites_filtered_by_creator_and_flag() {
        let store = MemoryStore::new();
        let trip_id = TripId::from("t");
        for (id, by) in [("aaaaaaaaaa", "alice"), ("bbbbbbbbbb", "bob"), ("cccccccccc", "alice")] {
            store
                .create_invite(&CreateInviteParams {
                    id: InviteId::from(id),
                    trip_id: trip_id.clone(),
                    created_by: user(by),
                    expires_at: Utc::now() + Duration::hours(1),
                    max_uses: None,
                })
                .await
                .unwrap();
        }
        store
            .deactivate_invite(&InviteId::from("cccccccccc"))
            .await
            .unwrap();

        let active = store
            .list_active_invites(&trip_id, &user("alice"))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, InviteId::from("aaaaaaaaaa"));
        assert_eq!(store.list_invites(&trip_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn concurrent_uses_by_same_user_count_once() {
        let store = Arc::new(MemoryStore::new());
        let invite_id = InviteId::from("0123456789abcdef");
        store
            .create_invite(&CreateInviteParams {
                id: invite_id.clone(),
                trip_id: TripId::from("t"),
                created_by: user("alice"),
                expires_at: Utc::now() + Duration::hours(1),
                max_uses: Some(10),
            })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let invite_id = invite_id.clone();
            handles.push(tokio::spawn(async move {
                store.record_invite_use(&invite_id, &user("bob")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let invite = store.get_invite(&invite_id).await.unwrap();
        assert_eq!(invite.used_count, 1);
        assert_eq!(invite.used_by.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_like_toggles_keep_count_consistent() {
        let store = Arc::new(MemoryStore::new());
        let item = store
            .create_item(&CreateItemParams {
                list_id: ListId::from("l"),
                title: "Pastel de nata".to_string(),
                note: None,
                created_by: user("alice"),
                place: None,
            })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let item_id = item.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .toggle_item_like(&item_id, &UserId(format!("user-{}", i % 5)))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let item = store.get_item(&item.id).await.unwrap();
        assert_eq!(item.vote_count as usize, item.liked_by.len());
    }
}
