//! Integration tests for link proposal, rejection, and restoration.
//!
//! This test suite validates:
//! - Dedup gates reject conflicting proposals without partial writes
//! - Reject adds a blacklist entry and flips status in one transaction
//! - Restore removes the blacklist entry and reactivates the link
//! - One LinkChanged event per insertion and per status transition
//!
//! **IMPORTANT**: These tests require a running PostgreSQL server; each
//! test migrates its own throwaway schema.

use semlink_db::{
    test_fixtures::{propose_request, TestDatabase},
    BlacklistRepository, Error, LinkEvent, LinkRepository, LinkStatus, ProposeLinkRequest,
};

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_propose_and_get_roundtrip() {
    let test_db = setup().await;
    let db = &test_db.db;

    let id = db.links.propose(propose_request(1, "first")).await.unwrap();
    let link = db.links.get(id).await.unwrap();

    assert_eq!(link.source_id, 1);
    assert_eq!(link.status, LinkStatus::Active);
    assert_eq!(link.target_url, "https://example.com/first");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_duplicate_edge_is_rejected() {
    let test_db = setup().await;
    let db = &test_db.db;

    db.links.propose(propose_request(1, "guide")).await.unwrap();

    // Same (source, target) with a different anchor still counts as an
    // existing edge.
    let mut second = propose_request(1, "guide");
    second.anchor_text = "a different anchor".to_string();
    let err = db.links.propose(second).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateLink(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_global_anchor_gate_spans_sources() {
    let test_db = setup().await;
    let db = &test_db.db;

    db.links
        .propose(ProposeLinkRequest {
            source_id: 1,
            anchor_text: "mortgage rates".to_string(),
            target_url: "https://example.com/rates".to_string(),
            target_id: None,
            score: 0.7,
        })
        .await
        .unwrap();

    // Same anchor from another source to a different URL violates the
    // site-wide anchor gate.
    let err = db
        .links
        .propose(ProposeLinkRequest {
            source_id: 2,
            anchor_text: "mortgage rates".to_string(),
            target_url: "https://example.com/other".to_string(),
            target_id: None,
            score: 0.7,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateLink(_)));

    // Same anchor to the same URL from another source is fine.
    db.links
        .propose(ProposeLinkRequest {
            source_id: 2,
            anchor_text: "mortgage rates".to_string(),
            target_url: "https://example.com/rates".to_string(),
            target_id: None,
            score: 0.7,
        })
        .await
        .unwrap();

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_reject_blacklists_and_restore_unblacklists() {
    let test_db = setup().await;
    let db = &test_db.db;

    let id = db.links.propose(propose_request(5, "page")).await.unwrap();

    db.links.reject(id).await.unwrap();
    let link = db.links.get(id).await.unwrap();
    assert_eq!(link.status, LinkStatus::Rejected);
    assert!(db
        .blacklist
        .contains(5, "https://example.com/page")
        .await
        .unwrap());

    db.links.restore(id).await.unwrap();
    let link = db.links.get(id).await.unwrap();
    assert_eq!(link.status, LinkStatus::Active);
    assert!(!db
        .blacklist
        .contains(5, "https://example.com/page")
        .await
        .unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_set_status_applies_blacklist_transitions() {
    let test_db = setup().await;
    let db = &test_db.db;

    let id = db.links.propose(propose_request(6, "article")).await.unwrap();

    db.links.set_status(id, LinkStatus::Rejected).await.unwrap();
    assert!(db
        .blacklist
        .contains(6, "https://example.com/article")
        .await
        .unwrap());

    // Reactivating through the generic path must clean up the blacklist
    // entry, same as restore.
    db.links.set_status(id, LinkStatus::Active).await.unwrap();
    assert_eq!(db.links.get(id).await.unwrap().status, LinkStatus::Active);
    assert!(!db
        .blacklist
        .contains(6, "https://example.com/article")
        .await
        .unwrap());

    db.links.set_status(id, LinkStatus::Filtered).await.unwrap();
    assert!(!db
        .blacklist
        .contains(6, "https://example.com/article")
        .await
        .unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_rejected_rows_do_not_block_new_proposals() {
    let test_db = setup().await;
    let db = &test_db.db;

    let id = db.links.propose(propose_request(9, "old")).await.unwrap();
    db.links.set_status(id, LinkStatus::Filtered).await.unwrap();

    // A filtered row is invisible to every dedup gate.
    db.links.propose(propose_request(9, "old")).await.unwrap();

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_propose_emits_link_changed() {
    let test_db = setup().await;
    let db = &test_db.db;

    let mut rx = db.events.subscribe();
    db.links.propose(propose_request(3, "evt")).await.unwrap();

    let envelope = rx.recv().await.unwrap();
    assert_eq!(envelope.event_type, "link.changed");
    assert!(matches!(
        envelope.payload,
        LinkEvent::LinkChanged { source_id: 3 }
    ));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires database connection
async fn test_active_counts_by_target_groups_urls() {
    let test_db = setup().await;
    let db = &test_db.db;

    db.links.propose(propose_request(1, "a")).await.unwrap();
    db.links.propose(propose_request(2, "a")).await.unwrap();
    db.links.propose(propose_request(1, "b")).await.unwrap();

    let counts = db.links.active_counts_by_target().await.unwrap();
    assert_eq!(counts.get("https://example.com/a"), Some(&2));
    assert_eq!(counts.get("https://example.com/b"), Some(&1));

    test_db.cleanup().await;
}
