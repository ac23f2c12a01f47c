use chrono::{Duration, TimeZone, Utc};
use taskdeck_core::db::open_db_in_memory;
use taskdeck_core::{
    Priority, SqliteSubtaskRepository, SqliteTagRepository, SqliteTodoRepository, StoreError,
    Subtask, SubtaskRepository, Tag, TagRepository, Todo, TodoRepository,
};
use uuid::Uuid;

fn owner() -> Uuid {
    Uuid::parse_str("00000000-0000-4000-8000-0000000000cc").unwrap()
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
}

fn make_todo(conn: &rusqlite::Connection, title: &str) -> Todo {
    let repo = SqliteTodoRepository::try_new(conn).unwrap();
    let todo = Todo::new(owner(), title, now());
    repo.create_todo(&todo).unwrap();
    todo
}

fn positions(subtasks: &[Subtask]) -> Vec<i64> {
    subtasks.iter().map(|subtask| subtask.position).collect()
}

fn titles(subtasks: &[Subtask]) -> Vec<&str> {
    subtasks.iter().map(|subtask| subtask.title.as_str()).collect()
}

#[test]
fn omitted_position_appends_at_end() {
    let conn = open_db_in_memory().unwrap();
    let todo = make_todo(&conn, "list");
    let repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    let first = repo.create_subtask(owner(), todo.uuid, "one", None).unwrap();
    let second = repo.create_subtask(owner(), todo.uuid, "two", None).unwrap();
    assert_eq!(first.position, 1);
    assert_eq!(second.position, 2);
}

#[test]
fn given_position_shifts_followers_up() {
    let conn = open_db_in_memory().unwrap();
    let todo = make_todo(&conn, "list");
    let repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    repo.create_subtask(owner(), todo.uuid, "one", None).unwrap();
    repo.create_subtask(owner(), todo.uuid, "three", None).unwrap();
    let inserted = repo
        .create_subtask(owner(), todo.uuid, "two", Some(2))
        .unwrap();
    assert_eq!(inserted.position, 2);

    let listed = repo.list_for_todo(owner(), todo.uuid).unwrap();
    assert_eq!(titles(&listed), vec!["one", "two", "three"]);
    assert_eq!(positions(&listed), vec![1, 2, 3]);
}

#[test]
fn position_clamps_into_valid_range() {
    let conn = open_db_in_memory().unwrap();
    let todo = make_todo(&conn, "list");
    let repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    // Clamped up to 1 on an empty list.
    let low = repo
        .create_subtask(owner(), todo.uuid, "clamped low", Some(-5))
        .unwrap();
    assert_eq!(low.position, 1);

    // Clamped down to count + 1.
    let high = repo
        .create_subtask(owner(), todo.uuid, "clamped high", Some(99))
        .unwrap();
    assert_eq!(high.position, 2);
}

#[test]
fn delete_renumbers_to_dense_sequence() {
    let conn = open_db_in_memory().unwrap();
    let todo = make_todo(&conn, "list");
    let repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    let a = repo.create_subtask(owner(), todo.uuid, "a", None).unwrap();
    let b = repo.create_subtask(owner(), todo.uuid, "b", None).unwrap();
    let c = repo.create_subtask(owner(), todo.uuid, "c", None).unwrap();

    repo.delete_subtask(owner(), b.uuid).unwrap();

    let listed = repo.list_for_todo(owner(), todo.uuid).unwrap();
    assert_eq!(titles(&listed), vec!["a", "c"]);
    assert_eq!(positions(&listed), vec![1, 2]);
    assert_eq!(listed[0].uuid, a.uuid);
    assert_eq!(listed[1].uuid, c.uuid);
}

#[test]
fn positions_stay_dense_after_mixed_operations() {
    let conn = open_db_in_memory().unwrap();
    let todo = make_todo(&conn, "list");
    let repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    let mut ids = Vec::new();
    for index in 0..5 {
        let subtask = repo
            .create_subtask(owner(), todo.uuid, &format!("step {index}"), None)
            .unwrap();
        ids.push(subtask.uuid);
    }
    repo.delete_subtask(owner(), ids[1]).unwrap();
    repo.create_subtask(owner(), todo.uuid, "wedge", Some(2)).unwrap();
    repo.delete_subtask(owner(), ids[4]).unwrap();
    repo.create_subtask(owner(), todo.uuid, "tail", Some(100)).unwrap();

    let listed = repo.list_for_todo(owner(), todo.uuid).unwrap();
    let expected: Vec<i64> = (1..=listed.len() as i64).collect();
    assert_eq!(positions(&listed), expected);
}

#[test]
fn progress_counts_completed_and_never_divides_by_zero() {
    let conn = open_db_in_memory().unwrap();
    let todo = make_todo(&conn, "list");
    let repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    let empty = repo.progress(owner(), todo.uuid).unwrap();
    assert_eq!(empty.completed, 0);
    assert_eq!(empty.total, 0);
    assert_eq!(empty.percent, 0);

    let a = repo.create_subtask(owner(), todo.uuid, "a", None).unwrap();
    repo.create_subtask(owner(), todo.uuid, "b", None).unwrap();
    repo.create_subtask(owner(), todo.uuid, "c", None).unwrap();

    let after_toggle = repo.toggle_completion(owner(), a.uuid).unwrap();
    assert_eq!(after_toggle.completed, 1);
    assert_eq!(after_toggle.total, 3);
    assert_eq!(after_toggle.percent, 33);

    // Toggling back refreshes the projection again.
    let after_untoggle = repo.toggle_completion(owner(), a.uuid).unwrap();
    assert_eq!(after_untoggle.completed, 0);
    assert_eq!(after_untoggle.percent, 0);
}

#[test]
fn update_title_validates_and_returns_progress() {
    let conn = open_db_in_memory().unwrap();
    let todo = make_todo(&conn, "list");
    let repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    let subtask = repo.create_subtask(owner(), todo.uuid, "draft", None).unwrap();

    let progress = repo
        .update_title(owner(), subtask.uuid, "final draft")
        .unwrap();
    assert_eq!(progress.total, 1);
    let listed = repo.list_for_todo(owner(), todo.uuid).unwrap();
    assert_eq!(listed[0].title, "final draft");

    let err = repo.update_title(owner(), subtask.uuid, "   ").unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let overlong = "x".repeat(201);
    let err = repo.update_title(owner(), subtask.uuid, &overlong).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn operations_scope_by_owner() {
    let conn = open_db_in_memory().unwrap();
    let todo = make_todo(&conn, "list");
    let repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    let subtask = repo.create_subtask(owner(), todo.uuid, "secret", None).unwrap();
    let stranger = Uuid::new_v4();

    let err = repo
        .create_subtask(stranger, todo.uuid, "intruder", None)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "todo", .. }));

    let err = repo.delete_subtask(stranger, subtask.uuid).unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "subtask", .. }));

    let err = repo.toggle_completion(stranger, subtask.uuid).unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "subtask", .. }));
}

// Worked end-to-end example: "Ship report" with tag, subtasks, delete and
// progress.
#[test]
fn ship_report_walkthrough() {
    let conn = open_db_in_memory().unwrap();
    let todo_repo = SqliteTodoRepository::try_new(&conn).unwrap();
    let tag_repo = SqliteTagRepository::try_new(&conn).unwrap();
    let subtask_repo = SqliteSubtaskRepository::try_new(&conn).unwrap();

    let mut todo = Todo::new(owner(), "Ship report", now());
    todo.priority = Priority::High;
    todo.due_at = Some(now() + Duration::hours(21)); // tomorrow 9am civil
    todo_repo.create_todo(&todo).unwrap();

    let tag = Tag::new(owner(), "Work", "336699", now());
    tag_repo.create_tag(&tag).unwrap();
    tag_repo.attach(owner(), todo.uuid, tag.uuid).unwrap();

    let draft = subtask_repo
        .create_subtask(owner(), todo.uuid, "Draft", Some(1))
        .unwrap();
    let review = subtask_repo
        .create_subtask(owner(), todo.uuid, "Review", Some(2))
        .unwrap();
    assert_eq!(draft.position, 1);
    assert_eq!(review.position, 2);

    subtask_repo.delete_subtask(owner(), draft.uuid).unwrap();

    let listed = subtask_repo.list_for_todo(owner(), todo.uuid).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Review");
    assert_eq!(listed[0].position, 1);

    let progress = subtask_repo.progress(owner(), todo.uuid).unwrap();
    assert_eq!(progress.completed, 0);
    assert_eq!(progress.total, 1);
    assert_eq!(progress.percent, 0);
}
