use std::fs;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hearth_core::recurrence::occurs_on;
use hearth_core::store::{FileTaskStore, TaskStore, resolve_task_id, toggle_status};
use hearth_core::task::{NewTask, RepeatRule, Status, TaskPatch, Visibility, legacy_id};
use hearth_core::view::{
    DotKind, OwnershipFilter, ViewState, calendar_month, list_entries, summary,
};
use tempfile::tempdir;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .expect("valid instant")
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

#[test]
fn store_roundtrip_with_subtasks_and_patches() {
    let temp = tempdir().expect("tempdir");
    let store = FileTaskStore::open(temp.path()).expect("open store");

    let task = store
        .create_task(NewTask {
            title: "Take out bins".to_string(),
            deadline: Some(at(2024, 1, 10, 19, 0)),
            repeat_rule: Some(RepeatRule::Weekly),
            ..NewTask::default()
        })
        .expect("create task");
    let sub = store.add_subtask(task.id, "Recycling").expect("add subtask");
    store.toggle_subtask(sub.id, true).expect("toggle subtask");

    let patched = store
        .patch_task(
            task.id,
            &TaskPatch {
                visibility: Some(Visibility::Personal),
                deadline: Some(None),
                ..TaskPatch::default()
            },
        )
        .expect("patch task");
    assert_eq!(patched.visibility, Visibility::Personal);
    assert_eq!(patched.deadline, None);
    assert_eq!(patched.repeat_rule, Some(RepeatRule::Weekly));

    let reopened = FileTaskStore::open(temp.path()).expect("reopen store");
    let tasks = reopened.list_tasks().expect("list tasks");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].subtask_progress(), Some((1, 1)));

    let short = &task.id.to_string()[..6];
    assert_eq!(resolve_task_id(&tasks, short).expect("resolve"), task.id);

    let done = toggle_status(&reopened, &tasks[0]).expect("toggle status");
    assert_eq!(done.status, Status::Done);

    reopened.delete_task(task.id).expect("delete task");
    assert!(reopened.list_tasks().expect("list").is_empty());
    assert!(reopened.delete_task(task.id).is_err());
}

#[test]
fn reads_legacy_snapshot_fields() {
    let temp = tempdir().expect("tempdir");
    let line = r#"{"id":"6f1c2a58-3b1e-4c55-9d0a-2f3b4c5d6e7f","title":"Pay rent","visibility":"common","status":"pending","deadline":"2024-01-31T09:00:00","repeatRule":"monthly","subtasks":[{"id":"0b1c2a58-3b1e-4c55-9d0a-2f3b4c5d6e7f","title":"Transfer","isDone":true}]}"#;
    fs::write(temp.path().join("tasks.data"), format!("{line}\n")).expect("write snapshot");

    let store = FileTaskStore::open(temp.path()).expect("open store");
    let tasks = store.list_tasks().expect("list tasks");
    assert_eq!(tasks.len(), 1);

    let task = &tasks[0];
    assert_eq!(task.visibility, Visibility::Shared);
    assert_eq!(task.deadline, Some(at(2024, 1, 31, 9, 0)));
    assert_eq!(task.repeat_rule, Some(RepeatRule::Monthly));
    assert!(task.subtasks[0].is_done);

    // The 31st never lands in February.
    assert!(!occurs_on(task, day(2024, 2, 29), &chrono_tz::UTC));
    assert!(occurs_on(task, day(2024, 3, 31), &chrono_tz::UTC));
}

#[test]
fn list_and_calendar_agree_on_a_selected_day() {
    let temp = tempdir().expect("tempdir");
    let store = FileTaskStore::open(temp.path()).expect("open store");
    let tz = chrono_tz::UTC;

    store
        .create_task(NewTask {
            title: "Gym".to_string(),
            visibility: Visibility::Personal,
            deadline: Some(at(2024, 1, 1, 7, 0)),
            repeat_rule: Some(RepeatRule::Daily),
            ..NewTask::default()
        })
        .expect("create gym");
    store
        .create_task(NewTask {
            title: "Dentist".to_string(),
            deadline: Some(at(2024, 1, 17, 10, 0)),
            ..NewTask::default()
        })
        .expect("create dentist");

    let tasks = store.list_tasks().expect("list tasks");
    let now = at(2024, 1, 17, 12, 0);

    let mut state = ViewState::new(day(2024, 1, 17));
    state.select_day(day(2024, 1, 17));
    let entries = list_entries(&tasks, &state, now, &tz);
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.late));
    assert_eq!(
        entries[0].display,
        Some(at(2024, 1, 17, 7, 0)),
        "gym is projected onto the selected day"
    );

    state.ownership = OwnershipFilter::Shared;
    let shared = list_entries(&tasks, &state, now, &tz);
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].task.title, "Dentist");

    // Calendar ignores the ownership filter.
    let month = calendar_month(&tasks, &state, now, &tz, 3);
    let cell = month
        .cells
        .iter()
        .find(|cell| cell.day == day(2024, 1, 17))
        .expect("cell for the 17th");
    assert!(cell.is_today);
    assert!(cell.is_selected);
    assert_eq!(cell.dots, vec![DotKind::Late, DotKind::Late]);

    let tomorrow = month
        .cells
        .iter()
        .find(|cell| cell.day == day(2024, 1, 18))
        .expect("cell for the 18th");
    assert_eq!(tomorrow.dots, vec![DotKind::Personal]);

    let digest = summary(&tasks, now, &tz);
    assert_eq!(digest.pending, 2);
    assert_eq!(digest.today, 2);
    assert_eq!(digest.late, 2);
}

#[test]
fn integer_ids_do_not_break_the_store() {
    let temp = tempdir().expect("tempdir");
    let lines = [
        r#"{"id":3,"title":"Feed cat","visibility":"husband","status":"completed"}"#,
        r#"{"id":"6f1c2a58-3b1e-4c55-9d0a-2f3b4c5d6e7f","title":"Pay rent"}"#,
    ];
    fs::write(temp.path().join("tasks.data"), lines.join("\n")).expect("write snapshot");

    let store = FileTaskStore::open(temp.path()).expect("open store");
    let tasks = store.list_tasks().expect("list tasks");
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, legacy_id(3));
    assert!(tasks[0].is_done());

    let id = resolve_task_id(&tasks, "00000003").expect("resolve legacy id");
    store.delete_task(id).expect("delete legacy task");
    assert_eq!(store.list_tasks().expect("list").len(), 1);
}
