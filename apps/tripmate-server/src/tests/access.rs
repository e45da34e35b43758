//! Access resolution through Comment → ListItem → List → Trip.

use tripmate_storage::{CommentId, TripId};

use super::common::*;
use crate::access::{ResourceKind, ResourceRef};

#[tokio::test]
async fn members_reach_everything_under_their_trip() {
    let t = create_test_server();
    let alice = user("alice");
    let trip = create_trip(&t.server, &alice, "Bergen").await;
    let (list, item, comment) = seed_contents(&t.server, &trip, &alice).await;

    let resources = [
        ResourceRef::Trip(trip.id.clone()),
        ResourceRef::List(list.id.clone()),
        ResourceRef::ListItem(item.id.clone()),
        ResourceRef::Comment(comment.id.clone()),
    ];
    for resource in &resources {
        assert!(t.server.resolve_access(resource, &alice).await, "{resource:?}");
        assert!(!t.server.resolve_access(resource, &user("eve")).await, "{resource:?}");
        assert_eq!(t.server.resolve_trip_id(resource).await, Some(trip.id.clone()));
    }
}

#[tokio::test]
async fn comment_author_keeps_access_after_leaving() {
    let t = create_test_server();
    let alice = user("alice");
    let bob = user("bob");
    let trip = create_trip(&t.server, &alice, "Dakar").await;
    add_member(&t.server, &trip, &bob).await;
    let (_, item, _) = seed_contents(&t.server, &trip, &alice).await;
    let bobs = t
        .server
        .add_comment(&bob, &item.id, "count me in")
        .await
        .unwrap();

    t.server.remove_member(&bob, &trip.id, &bob).await.unwrap();

    assert!(t.server.resolve_access(&ResourceRef::Comment(bobs.id.clone()), &bob).await);
    assert!(!t.server.resolve_access(&ResourceRef::ListItem(item.id.clone()), &bob).await);
    // Other members still reach it through the trip
    assert!(t.server.resolve_access(&ResourceRef::Comment(bobs.id), &alice).await);
}

#[tokio::test]
async fn broken_chain_denies() {
    let t = create_test_server();
    let alice = user("alice");
    let trip = create_trip(&t.server, &alice, "Tunis").await;
    let (list, item, comment) = seed_contents(&t.server, &trip, &alice).await;

    // Orphan the item by deleting its list out from under it
    t.server.store.delete_list(&list.id).await.unwrap();

    let item_ref = ResourceRef::ListItem(item.id.clone());
    assert!(!t.server.resolve_access(&item_ref, &alice).await);
    assert_eq!(t.server.resolve_trip_id(&item_ref).await, None);

    // The author still owns their comment even though the chain is broken
    let comment_ref = ResourceRef::Comment(comment.id);
    assert!(t.server.resolve_access(&comment_ref, &alice).await);
    assert_eq!(t.server.resolve_trip_id(&comment_ref).await, None);

    let missing = ResourceRef::Comment(CommentId::from("nope"));
    assert!(!t.server.resolve_access(&missing, &alice).await);
}

#[tokio::test]
async fn trip_id_for_unknown_trip_is_passed_through() {
    let t = create_test_server();
    let id = TripId::from("not-stored");
    let resource = ResourceRef::Trip(id.clone());
    assert_eq!(t.server.resolve_trip_id(&resource).await, Some(id));
    assert!(!t.server.resolve_access(&resource, &user("alice")).await);
}

#[test]
fn resource_kinds_parse_exactly() {
    for kind in [
        ResourceKind::Trip,
        ResourceKind::List,
        ResourceKind::ListItem,
        ResourceKind::Comment,
    ] {
        assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        assert_eq!(ResourceRef::new(kind, "x").kind(), kind);
    }
    assert!("trip".parse::<ResourceKind>().is_err());
    assert!("Invite".parse::<ResourceKind>().is_err());
    assert!("TripInvite".parse::<ResourceKind>().is_err());
}
