//! Backend symmetry tests.
//!
//! Every backend is driven through `Box<dyn TicketRepository>` and must give
//! the same answers for the same sequence of calls.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::rstest;
use std::sync::Arc;
use taskline_core::{
    create_repository, DomainError, Priority, QueryCriteria, SearchField, StorageBackend,
    TasklineError, Ticket, TicketId, TicketRepository, TicketStatus, TicketType, UlidGenerator,
};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy)]
enum Kind {
    File,
    Sqlite,
    Memory,
}

/// Repository plus the temp dir that must outlive it
struct Fixture {
    repo: Box<dyn TicketRepository>,
    _dir: TempDir,
}

fn open(kind: Kind) -> Fixture {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let backend = match kind {
        Kind::File => StorageBackend::File(dir.path().join("tickets.json")),
        Kind::Sqlite => StorageBackend::Sqlite(dir.path().join("tickets.db")),
        Kind::Memory => StorageBackend::InMemory,
    };
    Fixture {
        repo: create_repository(backend).expect("Failed to create repository"),
        _dir: dir,
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Ticket whose timestamps are `base + offset_secs`
fn ticket_at(ids: &UlidGenerator, title: &str, offset_secs: i64) -> Ticket {
    let mut ticket =
        Ticket::new(ids.generate_ticket_id().unwrap(), title, TicketType::Task, Priority::Medium)
            .unwrap();
    ticket.created_at = base_time();
    ticket.updated_at = base_time() + Duration::seconds(offset_secs);
    ticket
}

fn titles(tickets: &[Ticket]) -> Vec<&str> {
    tickets.iter().map(|t| t.title.as_str()).collect()
}

#[rstest]
#[case::file(Kind::File)]
#[case::sqlite(Kind::Sqlite)]
#[case::memory(Kind::Memory)]
#[tokio::test]
async fn test_save_then_find_round_trips(#[case] kind: Kind) {
    let fixture = open(kind);
    let ids = UlidGenerator::new();
    let ticket = ticket_at(&ids, "Round trip", 5)
        .with_description("Body text")
        .unwrap();

    fixture.repo.save(&ticket).await.unwrap();
    let loaded = fixture.repo.find_by_id(&ticket.id).await.unwrap().unwrap();
    assert_eq!(loaded, ticket);

    let unknown: TicketId = ids.generate_ticket_id().unwrap();
    assert!(fixture.repo.find_by_id(&unknown).await.unwrap().is_none());
}

#[rstest]
#[case::file(Kind::File)]
#[case::sqlite(Kind::Sqlite)]
#[case::memory(Kind::Memory)]
#[tokio::test]
async fn test_upsert_is_idempotent_and_keeps_created_at(#[case] kind: Kind) {
    let fixture = open(kind);
    let ids = UlidGenerator::new();
    let original = ticket_at(&ids, "First", 0);
    fixture.repo.save(&original).await.unwrap();
    fixture.repo.save(&original).await.unwrap();

    let mut replacement = original.clone();
    replacement.created_at = base_time() + Duration::hours(1);
    replacement.updated_at = base_time() + Duration::hours(2);
    replacement.title = "Second".to_string();
    fixture.repo.save(&replacement).await.unwrap();

    let all = fixture.repo.query_tickets(&QueryCriteria::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "Second");
    assert_eq!(all[0].created_at, original.created_at);
    assert_eq!(all[0].updated_at, replacement.updated_at);
}

#[rstest]
#[case::file(Kind::File)]
#[case::sqlite(Kind::Sqlite)]
#[case::memory(Kind::Memory)]
#[tokio::test]
async fn test_delete_contract(#[case] kind: Kind) {
    let fixture = open(kind);
    let ids = UlidGenerator::new();
    let keep = ticket_at(&ids, "Keep", 0);
    let drop = ticket_at(&ids, "Drop", 1);
    fixture.repo.save(&keep).await.unwrap();
    fixture.repo.save(&drop).await.unwrap();

    fixture.repo.delete(&drop.id).await.unwrap();
    assert!(fixture.repo.find_by_id(&drop.id).await.unwrap().is_none());
    assert!(fixture.repo.find_by_id(&keep.id).await.unwrap().is_some());

    let err = fixture.repo.delete(&drop.id).await.unwrap_err();
    assert!(matches!(err, TasklineError::TicketNotFound { id, .. } if id == drop.id.to_string()));
}

#[rstest]
#[case::file(Kind::File)]
#[case::sqlite(Kind::Sqlite)]
#[case::memory(Kind::Memory)]
#[tokio::test]
async fn test_ordering_and_pagination(#[case] kind: Kind) {
    let fixture = open(kind);
    let ids = UlidGenerator::new();
    for i in 0..7 {
        fixture
            .repo
            .save(&ticket_at(&ids, &format!("t{}", i), i))
            .await
            .unwrap();
    }

    let all = fixture.repo.query_tickets(&QueryCriteria::new()).await.unwrap();
    assert_eq!(titles(&all), vec!["t6", "t5", "t4", "t3", "t2", "t1", "t0"]);

    let page = fixture
        .repo
        .query_tickets(&QueryCriteria::new().offset(2).limit(3))
        .await
        .unwrap();
    assert_eq!(titles(&page), vec!["t4", "t3", "t2"]);

    let tail = fixture
        .repo
        .query_tickets(&QueryCriteria::new().offset(5))
        .await
        .unwrap();
    assert_eq!(titles(&tail), vec!["t1", "t0"]);

    let past_end = fixture
        .repo
        .query_tickets(&QueryCriteria::new().offset(10))
        .await
        .unwrap();
    assert!(past_end.is_empty());
}

#[rstest]
#[case::file(Kind::File)]
#[case::sqlite(Kind::Sqlite)]
#[case::memory(Kind::Memory)]
#[tokio::test]
async fn test_filters_and_search_agree(#[case] kind: Kind) {
    let fixture = open(kind);
    let ids = UlidGenerator::new();

    let mut login = ticket_at(&ids, "Fix login crash", 3);
    login.ticket_type = TicketType::Bug;
    login.priority = Priority::High;
    login.status = TicketStatus::InProgress;

    // Set directly so the timestamps stay fixed
    let mut export = ticket_at(&ids, "Export report", 2);
    export.description = Some("Crash when exporting to CSV".to_string());

    let mut archived = ticket_at(&ids, "Old crash notes", 1);
    archived.status = TicketStatus::Archived;

    for ticket in [&login, &export, &archived] {
        fixture.repo.save(ticket).await.unwrap();
    }

    let crash = fixture
        .repo
        .query_tickets(&QueryCriteria::new().search("CRASH"))
        .await
        .unwrap();
    assert_eq!(
        titles(&crash),
        vec!["Fix login crash", "Export report", "Old crash notes"]
    );

    let title_only = fixture
        .repo
        .query_tickets(
            &QueryCriteria::new()
                .search("crash")
                .search_in(&[SearchField::Title]),
        )
        .await
        .unwrap();
    assert_eq!(titles(&title_only), vec!["Fix login crash", "Old crash notes"]);

    let combined = fixture
        .repo
        .query_tickets(
            &QueryCriteria::new()
                .status(TicketStatus::InProgress)
                .priority(Priority::High)
                .ticket_type(TicketType::Bug),
        )
        .await
        .unwrap();
    assert_eq!(titles(&combined), vec!["Fix login crash"]);

    let none = fixture
        .repo
        .query_tickets(&QueryCriteria::new().status(TicketStatus::Completed))
        .await
        .unwrap();
    assert!(none.is_empty());

    let blank = fixture
        .repo
        .query_tickets(&QueryCriteria::new().search("   "))
        .await
        .unwrap();
    assert_eq!(blank.len(), 3);

    let umlaut = ticket_at(&ids, "ÄRGER mit Login", 0);
    fixture.repo.save(&umlaut).await.unwrap();
    let folded = fixture
        .repo
        .query_tickets(&QueryCriteria::new().search("ärger"))
        .await
        .unwrap();
    assert_eq!(titles(&folded), vec!["ÄRGER mit Login"]);
}

#[rstest]
#[case::file(Kind::File)]
#[case::sqlite(Kind::Sqlite)]
#[case::memory(Kind::Memory)]
#[tokio::test]
async fn test_stale_snapshot_is_rejected(#[case] kind: Kind) {
    let fixture = open(kind);
    let ids = UlidGenerator::new();

    let mut fresh = ticket_at(&ids, "Fresh", 0);
    fresh.created_at = base_time() + Duration::hours(1);
    fresh.updated_at = fresh.created_at;
    fixture.repo.save(&fresh).await.unwrap();

    let mut stale = fresh.clone();
    stale.title = "Stale".to_string();
    stale.created_at = base_time();
    stale.updated_at = base_time();
    assert!(matches!(
        fixture.repo.save(&stale).await,
        Err(TasklineError::Domain(DomainError::TimestampOrder { .. }))
    ));

    // The stored ticket is untouched and the store stays usable
    let loaded = fixture.repo.find_by_id(&fresh.id).await.unwrap().unwrap();
    assert_eq!(loaded, fresh);
    fixture.repo.save(&ticket_at(&ids, "Unrelated", 5)).await.unwrap();
    let all = fixture.repo.query_tickets(&QueryCriteria::new()).await.unwrap();
    assert_eq!(titles(&all), vec!["Fresh", "Unrelated"]);
}

#[rstest]
#[case::file(Kind::File)]
#[case::sqlite(Kind::Sqlite)]
#[case::memory(Kind::Memory)]
#[tokio::test]
async fn test_concurrent_saves_are_all_kept(#[case] kind: Kind) {
    let fixture = open(kind);
    let repo: Arc<dyn TicketRepository> = Arc::from(fixture.repo);
    let ids = UlidGenerator::new();

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let repo = Arc::clone(&repo);
            let ticket = ticket_at(&ids, &format!("concurrent {}", i), i);
            tokio::spawn(async move { repo.save(&ticket).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = repo.query_tickets(&QueryCriteria::new()).await.unwrap();
    assert_eq!(all.len(), 10);
}

#[rstest]
#[case::file(Kind::File)]
#[case::memory(Kind::Memory)]
#[tokio::test]
async fn test_alias_operations(#[case] kind: Kind) {
    let fixture = open(kind);
    let ids = UlidGenerator::new();

    let mut owner = ticket_at(&ids, "Has aliases", 1);
    owner.set_canonical_alias("Login-Bug").unwrap();
    owner.add_custom_alias("auth").unwrap();
    let plain = ticket_at(&ids, "No aliases", 0);
    fixture.repo.save(&owner).await.unwrap();
    fixture.repo.save(&plain).await.unwrap();

    let found = fixture.repo.find_by_alias("LOGIN-BUG").await.unwrap().unwrap();
    assert_eq!(found.id, owner.id);
    assert!(!fixture.repo.is_alias_available("auth").await.unwrap());
    assert!(fixture.repo.is_alias_available("free").await.unwrap());
    assert_eq!(
        fixture.repo.get_all_aliases().await.unwrap(),
        vec!["auth", "login-bug"]
    );

    let with_aliases = fixture.repo.find_tickets_with_aliases().await.unwrap();
    assert_eq!(titles(&with_aliases), vec!["Has aliases"]);

    let mut thief = ticket_at(&ids, "Thief", 2);
    thief.add_custom_alias("AUTH").unwrap();
    assert!(matches!(
        fixture.repo.save(&thief).await,
        Err(TasklineError::AliasConflict { owner: o, .. }) if o == owner.id.to_string()
    ));
}

#[tokio::test]
async fn test_sqlite_alias_operations_are_unsupported() {
    let fixture = open(Kind::Sqlite);
    assert!(matches!(
        fixture.repo.get_all_aliases().await,
        Err(TasklineError::Unsupported { backend: "sqlite", .. })
    ));
}

#[tokio::test]
async fn test_file_store_skips_corrupt_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tickets.json");
    let ids = UlidGenerator::new();
    let good = ticket_at(&ids, "Good", 0);
    let good_json = serde_json::to_string(&taskline_core::storage::record::to_persistence(&good))
        .unwrap();
    std::fs::write(
        &path,
        format!(
            r#"[{}, {{"id": "{}", "title": "", "status": "pending", "priority": "low", "type": "task", "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"}}]"#,
            good_json,
            ids.generate_ticket_id().unwrap()
        ),
    )
    .unwrap();

    let repo = create_repository(StorageBackend::File(path.clone())).unwrap();
    let all = repo.query_tickets(&QueryCriteria::new()).await.unwrap();
    assert_eq!(titles(&all), vec!["Good"]);

    // An unrelated save keeps the corrupt record on disk
    repo.save(&ticket_at(&ids, "Another", 1)).await.unwrap();
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw.len(), 3);
}
