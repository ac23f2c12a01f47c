use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use taskdeck_core::db::open_db_in_memory;
use taskdeck_core::model::snapshot::{
    Snapshot, SnapshotSubtask, SnapshotTag, SnapshotTodo, SnapshotTodoTag,
};
use taskdeck_core::{
    FixedClock, Priority, SnapshotService, SqliteSubtaskRepository, SqliteTagRepository,
    SqliteTodoRepository, StoreError, SubtaskRepository, Tag, TagRepository, Todo, TodoRepository,
    FALLBACK_TAG_COLOR, SNAPSHOT_VERSION,
};
use uuid::Uuid;

fn owner_one() -> Uuid {
    Uuid::parse_str("00000000-0000-4000-8000-0000000000e1").unwrap()
}

fn owner_two() -> Uuid {
    Uuid::parse_str("00000000-0000-4000-8000-0000000000e2").unwrap()
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
}

/// Builds a small graph for `owner_one`: two todos, two tags, two links and
/// two subtasks on the first todo.
fn seed_owner_one(conn: &rusqlite::Connection) {
    let todo_repo = SqliteTodoRepository::try_new(conn).unwrap();
    let tag_repo = SqliteTagRepository::try_new(conn).unwrap();
    let subtask_repo = SqliteSubtaskRepository::try_new(conn).unwrap();

    let mut report = Todo::new(owner_one(), "Ship report", now());
    report.priority = Priority::High;
    report.due_at = Some(now() + Duration::days(1));
    report.reminder_minutes = Some(60);
    todo_repo.create_todo(&report).unwrap();

    let mut groceries = Todo::new(owner_one(), "Buy groceries", now() + Duration::minutes(1));
    groceries.priority = Priority::Low;
    todo_repo.create_todo(&groceries).unwrap();
    todo_repo
        .toggle_complete(owner_one(), groceries.uuid, true)
        .unwrap();

    let work = Tag::new(owner_one(), "Work", "336699", now());
    let home = Tag::new(owner_one(), "Home", "663399", now());
    tag_repo.create_tag(&work).unwrap();
    tag_repo.create_tag(&home).unwrap();
    tag_repo.attach(owner_one(), report.uuid, work.uuid).unwrap();
    tag_repo
        .attach(owner_one(), groceries.uuid, home.uuid)
        .unwrap();

    subtask_repo
        .create_subtask(owner_one(), report.uuid, "Draft", None)
        .unwrap();
    subtask_repo
        .create_subtask(owner_one(), report.uuid, "Review", None)
        .unwrap();
}

#[test]
fn export_then_import_into_other_owner_preserves_content() {
    let conn = open_db_in_memory().unwrap();
    seed_owner_one(&conn);

    let clock = FixedClock(now() + Duration::hours(1));
    let service = SnapshotService::new(&conn, &clock);

    let snapshot = service.export(owner_one()).unwrap();
    assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    assert_eq!(snapshot.todos.len(), 2);
    assert_eq!(snapshot.subtasks.len(), 2);
    assert_eq!(snapshot.tags.len(), 2);
    assert_eq!(snapshot.todo_tags.len(), 2);

    let outcome = service.import(owner_two(), &snapshot).unwrap();
    assert_eq!(outcome.created_todo_ids.len(), 2);
    assert_eq!(outcome.created_subtask_ids.len(), 2);
    assert_eq!(outcome.created_tag_ids.len(), 2);
    assert_eq!(outcome.skipped_todos, 0);

    let todo_repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let imported = todo_repo.list_for_owner(owner_two()).unwrap();
    let titles: BTreeSet<String> = imported.iter().map(|todo| todo.title.clone()).collect();
    assert_eq!(
        titles,
        BTreeSet::from(["Ship report".to_string(), "Buy groceries".to_string()])
    );
    let report = imported
        .iter()
        .find(|todo| todo.title == "Ship report")
        .unwrap();
    assert_eq!(report.priority, Priority::High);
    assert_eq!(report.reminder_minutes, Some(60));
    let groceries = imported
        .iter()
        .find(|todo| todo.title == "Buy groceries")
        .unwrap();
    assert!(groceries.is_completed);
    assert!(groceries.completed_at.is_some());

    // New ids, same content.
    let original_ids: BTreeSet<Uuid> = todo_repo
        .list_for_owner(owner_one())
        .unwrap()
        .iter()
        .map(|todo| todo.uuid)
        .collect();
    assert!(imported.iter().all(|todo| !original_ids.contains(&todo.uuid)));

    let tag_repo = SqliteTagRepository::try_new(&conn).unwrap();
    let tag_names: Vec<String> = tag_repo
        .list_with_counts(owner_two())
        .unwrap()
        .into_iter()
        .map(|entry| entry.tag.name)
        .collect();
    assert_eq!(tag_names, vec!["Home".to_string(), "Work".to_string()]);

    let subtask_repo = SqliteSubtaskRepository::try_new(&conn).unwrap();
    let subtasks = subtask_repo.list_for_todo(owner_two(), report.uuid).unwrap();
    let subtask_titles: Vec<&str> = subtasks
        .iter()
        .map(|subtask| subtask.title.as_str())
        .collect();
    assert_eq!(subtask_titles, vec!["Draft", "Review"]);
    let positions: Vec<i64> = subtasks.iter().map(|subtask| subtask.position).collect();
    assert_eq!(positions, vec![1, 2]);
}

#[test]
fn importing_twice_reuses_tags_but_duplicates_todos() {
    let conn = open_db_in_memory().unwrap();
    seed_owner_one(&conn);

    let clock = FixedClock(now() + Duration::hours(1));
    let service = SnapshotService::new(&conn, &clock);
    let snapshot = service.export(owner_one()).unwrap();

    let first = service.import(owner_two(), &snapshot).unwrap();
    assert_eq!(first.created_tag_ids.len(), 2);

    let second = service.import(owner_two(), &snapshot).unwrap();
    assert_eq!(second.created_todo_ids.len(), 2);
    // Same case-insensitive names already exist, so no new tag rows.
    assert!(second.created_tag_ids.is_empty());

    let todo_repo = SqliteTodoRepository::try_new(&conn).unwrap();
    assert_eq!(todo_repo.list_for_owner(owner_two()).unwrap().len(), 4);
    let tag_repo = SqliteTagRepository::try_new(&conn).unwrap();
    let tags = tag_repo.list_with_counts(owner_two()).unwrap();
    assert_eq!(tags.len(), 2);
    // Both imported todo sets share the reused tag rows.
    let work = tags.iter().find(|entry| entry.tag.name == "Work").unwrap();
    assert_eq!(work.todo_count, 2);
}

#[test]
fn version_mismatch_fails_and_mutates_nothing() {
    let conn = open_db_in_memory().unwrap();

    let snapshot = Snapshot {
        version: "0.9".to_string(),
        generated_at: "2026-01-01T00:00:00.000Z".to_string(),
        todos: vec![SnapshotTodo {
            id: "t-1".to_string(),
            title: Some("should not appear".to_string()),
            ..SnapshotTodo::default()
        }],
        subtasks: Vec::new(),
        tags: Vec::new(),
        todo_tags: Vec::new(),
    };

    let clock = FixedClock(now());
    let service = SnapshotService::new(&conn, &clock);
    let err = service.import(owner_two(), &snapshot).unwrap_err();
    match err {
        StoreError::UnsupportedVersion { found, supported } => {
            assert_eq!(found, "0.9");
            assert_eq!(supported, SNAPSHOT_VERSION);
        }
        other => panic!("unexpected error: {other}"),
    }

    let todo_repo = SqliteTodoRepository::try_new(&conn).unwrap();
    assert!(todo_repo.list_for_owner(owner_two()).unwrap().is_empty());
}

#[test]
fn malformed_entries_are_skipped_not_fatal() {
    let conn = open_db_in_memory().unwrap();

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        generated_at: "2026-01-01T00:00:00.000Z".to_string(),
        todos: vec![
            SnapshotTodo {
                id: "good".to_string(),
                title: Some("Valid todo".to_string()),
                priority: Some("medium".to_string()),
                ..SnapshotTodo::default()
            },
            // Missing id: cannot be mapped, skipped.
            SnapshotTodo {
                id: "  ".to_string(),
                title: Some("No id".to_string()),
                ..SnapshotTodo::default()
            },
            // Unknown priority string: enum re-validation skips it.
            SnapshotTodo {
                id: "bad-priority".to_string(),
                title: Some("Urgent?".to_string()),
                priority: Some("urgent".to_string()),
                ..SnapshotTodo::default()
            },
            // Missing title: skipped.
            SnapshotTodo {
                id: "no-title".to_string(),
                ..SnapshotTodo::default()
            },
        ],
        subtasks: vec![
            SnapshotSubtask {
                id: "s-1".to_string(),
                todo_id: "good".to_string(),
                title: Some("Attached".to_string()),
                position: Some(9),
                ..SnapshotSubtask::default()
            },
            // Parent never resolved: skipped.
            SnapshotSubtask {
                id: "s-2".to_string(),
                todo_id: "ghost".to_string(),
                title: Some("Orphan".to_string()),
                position: Some(1),
                ..SnapshotSubtask::default()
            },
        ],
        tags: vec![
            // Malformed color sanitizes to the fallback instead of skipping.
            SnapshotTag {
                id: "g-1".to_string(),
                name: Some("Smudged".to_string()),
                color: Some("not-a-color".to_string()),
                ..SnapshotTag::default()
            },
            // Missing name: skipped.
            SnapshotTag {
                id: "g-2".to_string(),
                ..SnapshotTag::default()
            },
        ],
        todo_tags: vec![
            SnapshotTodoTag {
                todo_id: "good".to_string(),
                tag_id: "g-1".to_string(),
            },
            // Dangling tag reference: skipped.
            SnapshotTodoTag {
                todo_id: "good".to_string(),
                tag_id: "g-2".to_string(),
            },
        ],
    };

    let clock = FixedClock(now());
    let service = SnapshotService::new(&conn, &clock);
    let outcome = service.import(owner_two(), &snapshot).unwrap();

    assert_eq!(outcome.created_todo_ids.len(), 1);
    assert_eq!(outcome.skipped_todos, 3);
    assert_eq!(outcome.created_subtask_ids.len(), 1);
    assert_eq!(outcome.skipped_subtasks, 1);
    assert_eq!(outcome.created_tag_ids.len(), 1);
    assert_eq!(outcome.skipped_tags, 1);
    assert_eq!(outcome.skipped_links, 1);

    let tag_repo = SqliteTagRepository::try_new(&conn).unwrap();
    let tags = tag_repo.list_with_counts(owner_two()).unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].tag.color, FALLBACK_TAG_COLOR);
    assert_eq!(tags[0].todo_count, 1);

    // The surviving subtask was renumbered densely under its new parent.
    let subtask_repo = SqliteSubtaskRepository::try_new(&conn).unwrap();
    let subtasks = subtask_repo
        .list_for_todo(owner_two(), outcome.created_todo_ids[0])
        .unwrap();
    assert_eq!(subtasks.len(), 1);
    assert_eq!(subtasks[0].position, 1);
}

#[test]
fn import_copies_timestamps_verbatim_and_defaults_missing_ones() {
    let conn = open_db_in_memory().unwrap();

    let completed_at = "2026-03-01T10:30:00.000Z";
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        generated_at: "2026-01-01T00:00:00.000Z".to_string(),
        todos: vec![
            SnapshotTodo {
                id: "done".to_string(),
                title: Some("Archived work".to_string()),
                is_completed: Some(true),
                completed_at: Some(completed_at.to_string()),
                ..SnapshotTodo::default()
            },
            // Completed without an instant: defaulted, not skipped.
            SnapshotTodo {
                id: "done-bare".to_string(),
                title: Some("Completed sometime".to_string()),
                is_completed: Some(true),
                ..SnapshotTodo::default()
            },
        ],
        subtasks: Vec::new(),
        tags: Vec::new(),
        todo_tags: Vec::new(),
    };

    let import_instant = now() + Duration::days(10);
    let clock = FixedClock(import_instant);
    let service = SnapshotService::new(&conn, &clock);
    service.import(owner_two(), &snapshot).unwrap();

    let todo_repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let imported = todo_repo.list_for_owner(owner_two()).unwrap();

    let verbatim = imported
        .iter()
        .find(|todo| todo.title == "Archived work")
        .unwrap();
    assert_eq!(
        verbatim.completed_at,
        Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap())
    );

    let defaulted = imported
        .iter()
        .find(|todo| todo.title == "Completed sometime")
        .unwrap();
    assert_eq!(defaulted.completed_at, Some(import_instant));
}

#[test]
fn import_drops_recurrence_and_reminder_without_due() {
    let conn = open_db_in_memory().unwrap();

    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        generated_at: "2026-01-01T00:00:00.000Z".to_string(),
        todos: vec![SnapshotTodo {
            id: "inconsistent".to_string(),
            title: Some("Recurring without due".to_string()),
            is_recurring: Some(true),
            recurrence_pattern: Some("weekly".to_string()),
            reminder_minutes: Some(60),
            ..SnapshotTodo::default()
        }],
        subtasks: Vec::new(),
        tags: Vec::new(),
        todo_tags: Vec::new(),
    };

    let clock = FixedClock(now());
    let service = SnapshotService::new(&conn, &clock);
    let outcome = service.import(owner_two(), &snapshot).unwrap();
    assert_eq!(outcome.created_todo_ids.len(), 1);

    let todo_repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let imported = todo_repo
        .get_todo(owner_two(), outcome.created_todo_ids[0])
        .unwrap()
        .unwrap();
    assert!(!imported.is_recurring);
    assert!(imported.recurrence_pattern.is_none());
    assert!(imported.reminder_minutes.is_none());
}

#[test]
fn snapshot_json_roundtrips_through_serde() {
    let conn = open_db_in_memory().unwrap();
    seed_owner_one(&conn);

    let clock = FixedClock(now() + Duration::hours(1));
    let service = SnapshotService::new(&conn, &clock);
    let snapshot = service.export(owner_one()).unwrap();

    let encoded = serde_json::to_string(&snapshot).unwrap();
    assert!(encoded.contains("\"generatedAt\""));
    assert!(encoded.contains("\"todoTags\""));
    assert!(encoded.contains("\"isCompleted\""));

    let decoded: Snapshot = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, snapshot);

    let outcome = service.import(owner_two(), &decoded).unwrap();
    assert_eq!(outcome.created_todo_ids.len(), 2);
}
