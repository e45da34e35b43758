//! Partial-failure behaviour, driven by a mocked store.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::executor::block_on;
use tripmate_storage::*;
use tripmate_store_memory::MemoryStore;

use super::common::*;
use crate::access::ResourceRef;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::invites::{IssueFlow, MaxUses};

const CODE: &str = "00112233445566778899aabbccddeeff";

fn set(users: &[&str]) -> BTreeSet<UserId> {
    users.iter().map(|u| UserId::from(*u)).collect()
}

fn trip(owners: &[&str]) -> Trip {
    let now = Utc::now();
    Trip {
        id: TripId::from("trip-1"),
        name: "Mocked".into(),
        owners: set(owners),
        admins: set(&owners[..1]),
        cover_photo: None,
        created_by: UserId::from(owners[0]),
        created_at: now,
        updated_at: now,
    }
}

fn list(id: &str, owners: Option<BTreeSet<UserId>>) -> List {
    let now = Utc::now();
    List {
        id: ListId::from(id),
        trip_id: TripId::from("trip-1"),
        name: id.into(),
        created_by: UserId::from("alice"),
        owners,
        created_at: now,
        updated_at: now,
    }
}

fn item(id: &str, list_id: &str) -> ListItem {
    let now = Utc::now();
    ListItem {
        id: ItemId::from(id),
        list_id: ListId::from(list_id),
        title: "Museum".into(),
        note: None,
        created_by: UserId::from("alice"),
        place: None,
        liked_by: BTreeSet::new(),
        vote_count: 0,
        created_at: now,
        updated_at: now,
    }
}

fn comment(id: &str, item_id: &str) -> Comment {
    Comment {
        id: CommentId::from(id),
        item_id: ItemId::from(item_id),
        body: "nice".into(),
        author_id: UserId::from("alice"),
        created_at: Utc::now(),
    }
}

fn invite(used_by: &[&str]) -> Invite {
    let now = Utc::now();
    Invite {
        id: InviteId::from(CODE),
        trip_id: TripId::from("trip-1"),
        created_by: UserId::from("alice"),
        expires_at: now + Duration::days(30),
        max_uses: Some(5),
        used_count: used_by.len() as u32,
        used_by: set(used_by),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn backend_down() -> StoreError {
    StoreError::Backend("connection reset".into())
}

fn server_over(mock: MockStore) -> TestServer {
    create_test_server_with(Arc::new(mock), ServerConfig::default())
}

#[tokio::test]
async fn failed_list_owner_update_does_not_fail_redemption() {
    let mut mock = MockStore::new();
    mock.expect_get_invite().returning(|_| Ok(invite(&[])));
    mock.expect_get_trip().returning(|_| Ok(trip(&["alice"])));
    mock.expect_add_trip_owner()
        .times(1)
        .returning(|_, _| Ok(trip(&["alice", "bob"])));
    mock.expect_list_lists().returning(|_, _| {
        Ok(vec![
            list("general", Some(set(&["alice"]))),
            list("shared", None),
            list("food", Some(set(&["alice"]))),
        ])
    });
    // Only the two lists with their own owners copy are touched
    mock.expect_add_list_owner()
        .times(2)
        .returning(|list_id, _| {
            if list_id.as_str() == "general" {
                Err(backend_down())
            } else {
                Ok(list("food", Some(set(&["alice", "bob"]))))
            }
        });
    mock.expect_record_invite_use()
        .times(1)
        .returning(|_, _| Ok(invite(&["bob"])));

    let t = server_over(mock);
    let joined = t
        .server
        .redeem_invite(&InviteId::from(CODE), &UserId::from("bob"))
        .await
        .unwrap();
    assert_eq!(joined.trip_id, TripId::from("trip-1"));
    assert!(!joined.already_member);
}

#[tokio::test]
async fn failed_owner_add_stops_before_counting_a_use() {
    let mut mock = MockStore::new();
    mock.expect_get_invite().returning(|_| Ok(invite(&[])));
    mock.expect_get_trip().returning(|_| Ok(trip(&["alice"])));
    mock.expect_add_trip_owner()
        .returning(|_, _| Err(backend_down()));
    mock.expect_record_invite_use().times(0);

    let t = server_over(mock);
    let err = t
        .server
        .redeem_invite(&InviteId::from(CODE), &UserId::from("bob"))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Internal);
}

#[tokio::test]
async fn repeat_redemption_survives_missing_trip_name() {
    let mut mock = MockStore::new();
    mock.expect_get_invite().returning(|_| Ok(invite(&["bob"])));
    mock.expect_get_trip().returning(|_| Err(backend_down()));
    mock.expect_add_trip_owner().times(0);

    let t = server_over(mock);
    let again = t
        .server
        .redeem_invite(&InviteId::from(CODE), &UserId::from("bob"))
        .await
        .unwrap();
    assert!(again.already_member);
    assert_eq!(again.trip_name, None);
}

#[tokio::test]
async fn issue_mints_fresh_when_lookup_fails_and_retries_collisions() {
    let mut mock = MockStore::new();
    mock.expect_get_trip().returning(|_| Ok(trip(&["alice"])));
    mock.expect_list_active_invites()
        .returning(|_, _| Err(backend_down()));
    let mut attempts = 0;
    mock.expect_create_invite().times(2).returning(move |params| {
        attempts += 1;
        if attempts == 1 {
            return Err(StoreError::AlreadyExists);
        }
        let mut minted = invite(&[]);
        minted.id = params.id.clone();
        minted.expires_at = params.expires_at;
        minted.max_uses = params.max_uses;
        Ok(minted)
    });

    let t = server_over(mock);
    let issued = t
        .server
        .issue_invite(
            &TripId::from("trip-1"),
            &UserId::from("alice"),
            MaxUses::Default,
            IssueFlow::Share,
        )
        .await
        .unwrap();
    assert!(!issued.reused);
    assert_eq!(issued.invite_id.as_str().len(), 32);
}

#[tokio::test]
async fn delete_halts_on_first_failure_and_keeps_the_trip() {
    let mut mock = MockStore::new();
    mock.expect_get_trip().returning(|_| Ok(trip(&["alice"])));
    mock.expect_list_lists()
        .returning(|_, _| Ok(vec![list("general", Some(set(&["alice"])))]));
    mock.expect_list_items()
        .returning(|_| Ok(vec![item("item-1", "general")]));
    mock.expect_list_comments()
        .returning(|_| Ok(vec![comment("c-1", "item-1")]));
    mock.expect_delete_comment().times(1).returning(|_| Ok(()));
    mock.expect_delete_item()
        .times(1)
        .returning(|_| Err(backend_down()));
    mock.expect_delete_list().times(0);
    mock.expect_delete_trip().times(0);

    let t = server_over(mock);
    let err = t
        .server
        .delete_trip(&UserId::from("alice"), &TripId::from("trip-1"))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::Internal);
}

#[tokio::test]
async fn delete_treats_already_deleted_children_as_done() {
    let mut mock = MockStore::new();
    mock.expect_get_trip().returning(|_| Ok(trip(&["alice"])));
    let mut scans = 0;
    mock.expect_list_lists().returning(move |_, _| {
        scans += 1;
        if scans == 1 {
            Ok(vec![list("general", Some(set(&["alice"])))])
        } else {
            Ok(vec![])
        }
    });
    mock.expect_list_items()
        .returning(|_| Ok(vec![item("item-1", "general")]));
    mock.expect_list_comments()
        .returning(|_| Ok(vec![comment("c-1", "item-1")]));
    mock.expect_delete_comment()
        .returning(|_| Err(StoreError::NotFound));
    mock.expect_delete_item().returning(|_| Ok(()));
    mock.expect_delete_list().returning(|_| Ok(()));
    mock.expect_delete_trip().times(1).returning(|_| Ok(()));

    let t = server_over(mock);
    let summary = t
        .server
        .delete_trip(&UserId::from("alice"), &TripId::from("trip-1"))
        .await
        .unwrap();
    assert_eq!(summary.deleted_comments, 0);
    assert_eq!(summary.deleted_items, 1);
    assert_eq!(summary.deleted_lists, 1);
}

#[tokio::test]
async fn backend_errors_resolve_to_no_access() {
    let mut mock = MockStore::new();
    mock.expect_get_list().returning(|_| Err(backend_down()));

    let t = server_over(mock);
    let resource = ResourceRef::List(ListId::from("general"));
    assert!(!t.server.resolve_access(&resource, &UserId::from("alice")).await);
    assert_eq!(t.server.resolve_trip_id(&resource).await, None);
}

#[tokio::test]
async fn concurrent_leaves_never_empty_the_trip() {
    // Both leaves read the trip while it still has two owners; the removals
    // themselves go to a real in-memory store.
    let backing = Arc::new(MemoryStore::new());
    let created = backing
        .create_trip(&CreateTripParams {
            name: "Mocked".into(),
            created_by: UserId::from("alice"),
            cover_photo: None,
        })
        .await
        .unwrap();
    let stale = backing
        .add_trip_owner(&created.id, &UserId::from("bob"))
        .await
        .unwrap();
    let trip_id = stale.id.clone();

    let mut mock = MockStore::new();
    mock.expect_get_trip().returning(move |_| Ok(stale.clone()));
    let store = backing.clone();
    mock.expect_remove_trip_owner()
        .times(2)
        .returning(move |trip_id, user_id| block_on(store.remove_trip_owner(trip_id, user_id)));
    mock.expect_list_lists().returning(|_, _| Ok(vec![]));

    let t = server_over(mock);
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");
    let (a, b) = tokio::join!(
        t.server.remove_member(&alice, &trip_id, &alice),
        t.server.remove_member(&bob, &trip_id, &bob),
    );

    let conflicts = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(ApiError::Conflict(_))))
        .count();
    assert_eq!(conflicts, 1, "alice: {a:?}, bob: {b:?}");
    assert!(a.is_ok() || b.is_ok());
    assert_eq!(backing.get_trip(&trip_id).await.unwrap().owners.len(), 1);
}
