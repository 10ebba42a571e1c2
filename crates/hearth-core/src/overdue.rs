//! Lateness classification shared by the list and the calendar.

use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;

use crate::datetime::today;
use crate::task::{
  Status,
  Task
};

/// Whether an occurrence shown at `display` is late at `now`.
///
/// A selected view day after today is never late, whatever the projected
/// instant says.
#[must_use]
pub fn is_late(
  display: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
  status: Status,
  selected_day: Option<NaiveDate>,
  tz: &Tz
) -> bool {
  if status == Status::Done {
    return false;
  }
  let Some(display) = display else {
    return false;
  };
  if let Some(day) = selected_day
    && day > today(now, tz)
  {
    return false;
  }
  now > display
}

/// Unfinished work whose stored deadline has passed is also listed on
/// today's calendar cell, independent of the repeat rule.
#[must_use]
pub fn is_overdue_debt(
  task: &Task,
  day: NaiveDate,
  now: DateTime<Utc>,
  tz: &Tz
) -> bool {
  if task.is_done() || day != today(now, tz)
  {
    return false;
  }
  task
    .deadline
    .is_some_and(|deadline| deadline < now)
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::*;
  use crate::task::{
    NewTask,
    RepeatRule
  };

  const UTC: Tz = chrono_tz::UTC;

  fn at(
    y: i32,
    m: u32,
    d: u32,
    h: u32,
    min: u32
  ) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(y, m, d, h, min, 0)
      .single()
      .expect("valid instant")
  }

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn done_is_never_late() {
    let now = at(2024, 6, 1, 12, 0);
    let long_ago = now - Duration::days(400);
    assert!(!is_late(
      Some(long_ago),
      now,
      Status::Done,
      None,
      &UTC
    ));
    assert!(!is_late(
      Some(long_ago),
      now,
      Status::Done,
      Some(ymd(2023, 1, 1)),
      &UTC
    ));
  }

  #[test]
  fn missing_display_is_not_late() {
    assert!(!is_late(
      None,
      at(2024, 6, 1, 12, 0),
      Status::Pending,
      None,
      &UTC
    ));
  }

  #[test]
  fn late_once_now_passes_display() {
    let now = at(2024, 6, 1, 12, 0);
    assert!(is_late(
      Some(at(2024, 6, 1, 11, 59)),
      now,
      Status::Pending,
      None,
      &UTC
    ));
    assert!(!is_late(
      Some(now),
      now,
      Status::Pending,
      None,
      &UTC
    ));
    assert!(!is_late(
      Some(at(2024, 6, 1, 12, 1)),
      now,
      Status::Pending,
      None,
      &UTC
    ));
  }

  #[test]
  fn future_selected_day_overrides_lateness(
  ) {
    let now = at(2024, 6, 1, 12, 0);
    let stale = at(2024, 5, 1, 9, 0);
    assert!(!is_late(
      Some(stale),
      now,
      Status::Pending,
      Some(ymd(2024, 6, 2)),
      &UTC
    ));
    assert!(is_late(
      Some(stale),
      now,
      Status::Pending,
      Some(ymd(2024, 6, 1)),
      &UTC
    ));
    assert!(is_late(
      Some(stale),
      now,
      Status::Pending,
      Some(ymd(2024, 5, 1)),
      &UTC
    ));
  }

  #[test]
  fn debt_surfaces_only_on_today() {
    let now = at(2024, 6, 1, 12, 0);
    let mut task =
      Task::from_new(NewTask {
        title: "Fix sink".to_string(),
        deadline: Some(at(
          2024, 5, 20, 18, 0
        )),
        repeat_rule: Some(
          RepeatRule::Weekly
        ),
        ..NewTask::default()
      });

    assert!(is_overdue_debt(
      &task,
      ymd(2024, 6, 1),
      now,
      &UTC
    ));
    assert!(!is_overdue_debt(
      &task,
      ymd(2024, 6, 2),
      now,
      &UTC
    ));
    assert!(!is_overdue_debt(
      &task,
      ymd(2024, 5, 31),
      now,
      &UTC
    ));

    task.status = Status::Done;
    assert!(!is_overdue_debt(
      &task,
      ymd(2024, 6, 1),
      now,
      &UTC
    ));

    task.status = Status::Pending;
    task.deadline =
      Some(at(2024, 6, 1, 18, 0));
    assert!(!is_overdue_debt(
      &task,
      ymd(2024, 6, 1),
      now,
      &UTC
    ));
  }

  #[test]
  fn repeated_calls_agree() {
    let berlin = chrono_tz::Europe::Berlin;
    let now = at(2024, 3, 31, 0, 30);
    let task = Task::from_new(NewTask {
      title: "Bins".to_string(),
      deadline: Some(at(
        2024, 3, 30, 23, 15
      )),
      repeat_rule: Some(
        RepeatRule::Daily
      ),
      ..NewTask::default()
    });
    let snapshot = task.clone();

    for tz in [UTC, berlin] {
      for day in [
        None,
        Some(ymd(2024, 3, 30)),
        Some(ymd(2024, 3, 31)),
        Some(ymd(2024, 4, 1))
      ] {
        for status in
          [Status::Pending, Status::Done]
        {
          let first = is_late(
            task.deadline,
            now,
            status,
            day,
            &tz
          );
          let second = is_late(
            task.deadline,
            now,
            status,
            day,
            &tz
          );
          assert_eq!(
            first, second,
            "is_late {tz} {day:?} {status:?}"
          );
        }

        if let Some(day) = day {
          let first = is_overdue_debt(
            &task, day, now, &tz
          );
          let second = is_overdue_debt(
            &task, day, now, &tz
          );
          assert_eq!(
            first, second,
            "is_overdue_debt {tz} {day}"
          );
        }
      }
    }
    assert_eq!(task, snapshot);
  }
}
