//! Queue lifecycle semantics: ordering, cancellation, terminal states,
//! and crash recovery.

use std::collections::HashMap;
use std::sync::Arc;

use libcrosspost::config::{Config, DispatchConfig};
use libcrosspost::db::NewConnection;
use libcrosspost::fanout::{self, NewPostRequest};
use libcrosspost::platforms::mock::MockPublisher;
use libcrosspost::platforms::Publisher;
use libcrosspost::types::{ContentKind, EntryStatus, PlatformId, PostStatus};
use libcrosspost::{ConnectionManager, Database, Dispatcher};
use tempfile::TempDir;

async fn test_db() -> (Database, TempDir) {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("queue.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    (db, dir)
}

async fn submit_at(db: &Database, platform: PlatformId, at: Option<i64>) -> String {
    let post = fanout::submit(
        db,
        NewPostRequest {
            account_id: "acct-1".to_string(),
            content: "queued content".to_string(),
            platforms: vec![platform],
            scheduled_at: at,
            media: vec![],
            hashtags: vec![],
            content_kind: ContentKind::Text,
        },
    )
    .await
    .unwrap();
    post.id
}

fn dispatcher_with(db: &Database, publisher: Arc<MockPublisher>) -> Dispatcher {
    let connections = Arc::new(ConnectionManager::new(
        db.clone(),
        Arc::new(Config::default_config()),
    ));
    let mut publishers: HashMap<PlatformId, Arc<dyn Publisher>> = HashMap::new();
    publishers.insert(publisher.platform(), publisher);
    Dispatcher::with_publishers(
        db.clone(),
        connections,
        DispatchConfig {
            poll_interval: 1,
            max_attempts: 3,
            retry_base_delay: 0,
            retry_max_delay: 0,
            http_timeout: 5,
        },
        publishers,
    )
}

#[tokio::test]
async fn due_entries_come_back_in_deterministic_order() {
    let (db, _dir) = test_db().await;
    let now = chrono::Utc::now().timestamp();

    let b = submit_at(&db, PlatformId::Twitter, None).await;
    let a = submit_at(&db, PlatformId::Mastodon, None).await;
    let c = submit_at(&db, PlatformId::Linkedin, None).await;

    // push the entries to distinct (and one pair of equal) past due times
    let entry_of = |post_id: &str| {
        let db = db.clone();
        let post_id = post_id.to_string();
        async move { db.entries_for_post(&post_id).await.unwrap().remove(0) }
    };
    let (entry_a, entry_b, entry_c) =
        (entry_of(&a).await, entry_of(&b).await, entry_of(&c).await);
    db.reschedule_entry(entry_a.id, now - 200).await.unwrap();
    db.reschedule_entry(entry_b.id, now - 50).await.unwrap();
    db.reschedule_entry(entry_c.id, now - 50).await.unwrap();

    let due = db.due_entries(now, 10).await.unwrap();
    assert_eq!(due.len(), 3);
    // earliest process_after first
    assert_eq!(due[0].post_id, a);
    // equal timestamps tie-break by entry id, so creation order holds
    assert_eq!(due[1].post_id, b);
    assert_eq!(due[2].post_id, c);
}

#[tokio::test]
async fn cancelling_a_pending_entry_abandons_it() {
    let (db, _dir) = test_db().await;
    let post_id = submit_at(&db, PlatformId::Twitter, None).await;
    let entry = db.entries_for_post(&post_id).await.unwrap().remove(0);

    assert!(db.cancel_entry(entry.id).await.unwrap());
    db.recompute_post_status(&post_id).await.unwrap();

    let entry = db.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Abandoned);
    assert_eq!(entry.last_error.as_deref(), Some("cancelled"));

    // the sole entry was cancelled, so the post failed
    let post = db.get_post(&post_id).await.unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Failed);
}

#[tokio::test]
async fn in_flight_entries_cannot_be_cancelled() {
    let (db, _dir) = test_db().await;
    let post_id = submit_at(&db, PlatformId::Twitter, None).await;
    let entry = db.entries_for_post(&post_id).await.unwrap().remove(0);

    assert!(db.claim_entry(entry.id).await.unwrap());
    assert!(!db.cancel_entry(entry.id).await.unwrap());

    let entry = db.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::InFlight);
}

#[tokio::test]
async fn cancelled_entries_are_invisible_to_dispatch() {
    let (db, _dir) = test_db().await;
    let post_id = submit_at(&db, PlatformId::Twitter, None).await;
    let entry = db.entries_for_post(&post_id).await.unwrap().remove(0);
    db.cancel_entry(entry.id).await.unwrap();

    let publisher = MockPublisher::succeeding(PlatformId::Twitter);
    let dispatcher = dispatcher_with(&db, publisher.clone());

    assert_eq!(dispatcher.tick().await.unwrap(), 0);
    assert_eq!(publisher.call_count(), 0);
}

#[tokio::test]
async fn startup_recovery_returns_stalled_work_to_the_queue() {
    let (db, _dir) = test_db().await;
    let crashed = submit_at(&db, PlatformId::Twitter, None).await;
    let finished = submit_at(&db, PlatformId::Mastodon, None).await;

    let crashed_entry = db.entries_for_post(&crashed).await.unwrap().remove(0);
    let finished_entry = db.entries_for_post(&finished).await.unwrap().remove(0);

    // simulate a daemon that died mid-flight on one entry and completed
    // the other
    db.claim_entry(crashed_entry.id).await.unwrap();
    db.claim_entry(finished_entry.id).await.unwrap();
    db.complete_entry(finished_entry.id, "done").await.unwrap();

    assert_eq!(db.recover_stalled_entries().await.unwrap(), 1);

    let crashed_entry = db.get_entry(crashed_entry.id).await.unwrap().unwrap();
    assert_eq!(crashed_entry.status, EntryStatus::Pending);
    // the attempt that died still counts
    assert_eq!(crashed_entry.attempts, 1);

    let finished_entry = db.get_entry(finished_entry.id).await.unwrap().unwrap();
    assert_eq!(finished_entry.status, EntryStatus::Succeeded);
}

#[tokio::test]
async fn reschedule_only_moves_pending_entries() {
    let (db, _dir) = test_db().await;
    let post_id = submit_at(&db, PlatformId::Twitter, None).await;
    let entry = db.entries_for_post(&post_id).await.unwrap().remove(0);
    let later = chrono::Utc::now().timestamp() + 900;

    assert!(db.reschedule_entry(entry.id, later).await.unwrap());
    let entry = db.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(entry.process_after, later);

    db.claim_entry(entry.id).await.unwrap();
    assert!(!db.reschedule_entry(entry.id, later + 60).await.unwrap());
}

#[tokio::test]
async fn queue_stats_track_the_full_lifecycle() {
    let (db, _dir) = test_db().await;

    // connection so dispatch can publish
    db.upsert_connection(&NewConnection {
        account_id: "acct-1".to_string(),
        platform: PlatformId::Twitter,
        external_id: "ext".to_string(),
        handle: "@h".to_string(),
        access_token: "tok".to_string(),
        refresh_token: None,
        expires_at: None,
        scope: String::new(),
    })
    .await
    .unwrap();

    submit_at(&db, PlatformId::Twitter, None).await;
    let future = submit_at(
        &db,
        PlatformId::Twitter,
        Some(chrono::Utc::now().timestamp() + 3600),
    )
    .await;

    let stats = db.queue_stats().await.unwrap();
    assert_eq!(stats.pending, 2);

    let dispatcher = dispatcher_with(&db, MockPublisher::succeeding(PlatformId::Twitter));
    dispatcher.tick().await.unwrap();

    let stats = db.queue_stats().await.unwrap();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.pending, 1);

    // the future entry is the one still waiting
    let waiting = db.entries_for_post(&future).await.unwrap().remove(0);
    assert_eq!(waiting.status, EntryStatus::Pending);
}
