//! List item and comment types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CommentId, ItemId, ListId, UserId};

/// Place-search metadata attached to an item. Opaque to the service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceInfo {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
    pub rating: Option<f64>,
    pub photo_reference: Option<String>,
}

/// List item record.
///
/// `vote_count` always equals `liked_by.len()`; stores only change the two
/// together through [`crate::Store::toggle_item_like`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: ItemId,
    pub list_id: ListId,
    pub title: String,
    pub note: Option<String>,
    pub created_by: UserId,
    pub place: Option<PlaceInfo>,
    pub liked_by: BTreeSet<UserId>,
    pub vote_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListItem {
    pub fn is_liked_by(&self, user_id: &UserId) -> bool {
        self.liked_by.contains(user_id)
    }

    /// Flip `user_id` in `liked_by` and recompute `vote_count`.
    /// Returns whether the user likes the item afterwards.
    pub fn apply_like_toggle(&mut self, user_id: &UserId) -> bool {
        let liked = if self.liked_by.remove(user_id) {
            false
        } else {
            self.liked_by.insert(user_id.clone());
            true
        };
        self.vote_count = self.liked_by.len() as u32;
        liked
    }
}

/// Parameters for creating a list item
#[derive(Clone, Debug)]
pub struct CreateItemParams {
    pub list_id: ListId,
    pub title: String,
    pub note: Option<String>,
    pub created_by: UserId,
    pub place: Option<PlaceInfo>,
}

/// Comment record. The author keeps access to their own comment regardless of trip membership.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub item_id: ItemId,
    pub body: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a comment
#[derive(Clone, Debug)]
pub struct CreateCommentParams {
    pub item_id: ItemId,
    pub body: String,
    pub author_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ListItem {
        let now = Utc::now();
        ListItem {
            id: ItemId::from("item-1"),
            list_id: ListId::from("list-1"),
            title: "Ramen".to_string(),
            note: None,
            created_by: UserId::from("alice"),
            place: None,
            liked_by: BTreeSet::new(),
            vote_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn toggle_twice_restores_vote_count() {
        let mut item = item();
        let bob = UserId::from("bob");

        assert!(item.apply_like_toggle(&bob));
        assert_eq!(item.vote_count, 1);
        assert!(item.is_liked_by(&bob));

        assert!(!item.apply_like_toggle(&bob));
        assert_eq!(item.vote_count, 0);
        assert!(item.liked_by.is_empty());
    }

    #[test]
    fn vote_count_tracks_distinct_likers() {
        let mut item = item();
        item.apply_like_toggle(&UserId::from("a"));
        item.apply_like_toggle(&UserId::from("b"));
        item.apply_like_toggle(&UserId::from("c"));
        item.apply_like_toggle(&UserId::from("b"));
        assert_eq!(item.vote_count as usize, item.liked_by.len());
        assert_eq!(item.vote_count, 2);
    }
}
