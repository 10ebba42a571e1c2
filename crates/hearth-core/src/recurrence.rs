//! Occurrence resolution and projection for tasks with a deadline and an
//! optional repeat rule.
//!
//! A task's stored deadline is the origin of its series. Every consumer
//! (list filtering, calendar cells, lateness) goes through these two
//! functions so the occurrence sets never diverge between views.

use chrono::{
  DateTime,
  Datelike,
  NaiveDate,
  Timelike,
  Utc
};
use chrono_tz::Tz;

use crate::datetime::{
  local_to_utc,
  to_local_day
};
use crate::task::{
  RepeatRule,
  Task
};

/// Whether `task` has an occurrence on `view_day` (a day in `tz`).
///
/// Tasks never occur before the day of their deadline and always occur on
/// it. Monthly rules match the same day-of-month only, so a series that
/// starts on the 31st skips every shorter month.
#[must_use]
pub fn occurs_on(
  task: &Task,
  view_day: NaiveDate,
  tz: &Tz
) -> bool {
  let Some(deadline) = task.deadline
  else {
    return false;
  };
  let origin_day =
    to_local_day(deadline, tz);

  if view_day < origin_day {
    return false;
  }
  if view_day == origin_day {
    return true;
  }

  match task.repeat_rule {
    | None => false,
    | Some(RepeatRule::Daily) => true,
    | Some(RepeatRule::Weekly) => {
      view_day.weekday()
        == origin_day.weekday()
    }
    | Some(RepeatRule::Monthly) => {
      view_day.day() == origin_day.day()
    }
  }
}

/// Places the origin deadline's local time of day onto `view_day`.
///
/// Callers are expected to have checked [`occurs_on`] first; the result for
/// a non-occurrence day is still well defined but meaningless.
#[must_use]
pub fn project_occurrence(
  deadline: DateTime<Utc>,
  view_day: NaiveDate,
  tz: &Tz
) -> DateTime<Utc> {
  let origin_local =
    deadline.with_timezone(tz);
  let local = view_day
    .and_hms_opt(
      origin_local.hour(),
      origin_local.minute(),
      0
    )
    .unwrap_or_else(|| {
      view_day
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
    });
  local_to_utc(local, tz)
}

/// The instant shown next to a task in the list.
///
/// Repeating tasks viewed through a selected day show that day's virtual
/// occurrence; everything else shows the stored deadline as is.
#[must_use]
pub fn display_instant(
  task: &Task,
  selected_day: Option<NaiveDate>,
  tz: &Tz
) -> Option<DateTime<Utc>> {
  let deadline = task.deadline?;
  match (selected_day, task.repeat_rule)
  {
    | (Some(day), Some(_)) => {
      Some(project_occurrence(
        deadline, day, tz
      ))
    }
    | _ => Some(deadline)
  }
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
    Task
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn task_with(
    deadline: Option<DateTime<Utc>>,
    repeat_rule: Option<RepeatRule>
  ) -> Task {
    Task::from_new(NewTask {
      title: "sample".to_string(),
      deadline,
      repeat_rule,
      ..NewTask::default()
    })
  }

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

  const UTC: Tz = chrono_tz::UTC;

  #[test]
  fn no_deadline_never_occurs() {
    for rule in [
      None,
      Some(RepeatRule::Daily),
      Some(RepeatRule::Weekly),
      Some(RepeatRule::Monthly)
    ] {
      let task = task_with(None, rule);
      let mut day = ymd(2023, 12, 25);
      while day < ymd(2024, 3, 1) {
        assert!(!occurs_on(
          &task, day, &UTC
        ));
        day += Duration::days(1);
      }
    }
  }

  #[test]
  fn origin_day_always_occurs_and_earlier_days_never(
  ) {
    let origin = at(2024, 1, 10, 15, 30);
    for rule in [
      None,
      Some(RepeatRule::Daily),
      Some(RepeatRule::Weekly),
      Some(RepeatRule::Monthly)
    ] {
      let task =
        task_with(Some(origin), rule);
      assert!(occurs_on(
        &task,
        ymd(2024, 1, 10),
        &UTC
      ));
      for back in 1..=62 {
        assert!(!occurs_on(
          &task,
          ymd(2024, 1, 10)
            - Duration::days(back),
          &UTC
        ));
      }
    }
  }

  #[test]
  fn single_deadline_matches_only_its_day(
  ) {
    let task = task_with(
      Some(at(2024, 1, 10, 9, 0)),
      None
    );
    assert!(!occurs_on(
      &task,
      ymd(2024, 1, 11),
      &UTC
    ));
    assert!(!occurs_on(
      &task,
      ymd(2024, 1, 17),
      &UTC
    ));
  }

  #[test]
  fn daily_recurs_forward() {
    let task = task_with(
      Some(at(2024, 1, 10, 8, 0)),
      Some(RepeatRule::Daily)
    );
    assert!(occurs_on(
      &task,
      ymd(2024, 1, 11),
      &UTC
    ));
    assert!(occurs_on(
      &task,
      ymd(2024, 2, 1),
      &UTC
    ));
    assert!(!occurs_on(
      &task,
      ymd(2024, 1, 9),
      &UTC
    ));
  }

  #[test]
  fn weekly_matches_same_weekday() {
    let task = task_with(
      Some(at(2024, 1, 10, 8, 0)),
      Some(RepeatRule::Weekly)
    );
    assert!(occurs_on(
      &task,
      ymd(2024, 1, 17),
      &UTC
    ));
    assert!(!occurs_on(
      &task,
      ymd(2024, 1, 18),
      &UTC
    ));
    assert!(occurs_on(
      &task,
      ymd(2024, 3, 6),
      &UTC
    ));
  }

  #[test]
  fn monthly_matches_day_of_month_without_clamping(
  ) {
    let mid = task_with(
      Some(at(2024, 1, 15, 10, 0)),
      Some(RepeatRule::Monthly)
    );
    for month in 2..=12 {
      assert!(occurs_on(
        &mid,
        ymd(2024, month, 15),
        &UTC
      ));
      assert!(!occurs_on(
        &mid,
        ymd(2024, month, 14),
        &UTC
      ));
    }

    let end = task_with(
      Some(at(2024, 1, 31, 10, 0)),
      Some(RepeatRule::Monthly)
    );
    for day in 1..=29 {
      assert!(!occurs_on(
        &end,
        ymd(2024, 2, day),
        &UTC
      ));
    }
    assert!(!occurs_on(
      &end,
      ymd(2024, 4, 30),
      &UTC
    ));
    assert!(occurs_on(
      &end,
      ymd(2024, 3, 31),
      &UTC
    ));
  }

  #[test]
  fn origin_day_is_cut_in_display_timezone(
  ) {
    // 23:30 UTC is already the next morning in Moscow.
    let task = task_with(
      Some(at(2024, 1, 10, 23, 30)),
      Some(RepeatRule::Weekly)
    );
    let moscow = chrono_tz::Europe::Moscow;
    assert!(!occurs_on(
      &task,
      ymd(2024, 1, 10),
      &moscow
    ));
    assert!(occurs_on(
      &task,
      ymd(2024, 1, 11),
      &moscow
    ));
    assert!(occurs_on(
      &task,
      ymd(2024, 1, 18),
      &moscow
    ));
  }

  #[test]
  fn projection_keeps_origin_time_of_day()
  {
    let origin = at(2024, 1, 10, 15, 30);
    assert_eq!(
      project_occurrence(
        origin,
        ymd(2024, 2, 7),
        &UTC
      ),
      at(2024, 2, 7, 15, 30)
    );

    let with_seconds = Utc
      .with_ymd_and_hms(
        2024, 1, 10, 15, 30, 45
      )
      .single()
      .expect("valid instant");
    assert_eq!(
      project_occurrence(
        with_seconds,
        ymd(2024, 1, 11),
        &UTC
      ),
      at(2024, 1, 11, 15, 30)
    );
  }

  #[test]
  fn projection_preserves_local_wall_clock_across_dst(
  ) {
    let berlin = chrono_tz::Europe::Berlin;
    // 09:00 CET in winter.
    let origin = at(2024, 1, 10, 8, 0);
    let projected = project_occurrence(
      origin,
      ymd(2024, 7, 10),
      &berlin
    );
    // 09:00 CEST in summer.
    assert_eq!(
      projected,
      at(2024, 7, 10, 7, 0)
    );
  }

  #[test]
  fn display_instant_projects_only_repeating_tasks_on_selected_day(
  ) {
    let origin = at(2024, 1, 10, 15, 30);
    let repeating = task_with(
      Some(origin),
      Some(RepeatRule::Daily)
    );
    let single =
      task_with(Some(origin), None);
    let day = ymd(2024, 2, 7);

    assert_eq!(
      display_instant(
        &repeating,
        Some(day),
        &UTC
      ),
      Some(at(2024, 2, 7, 15, 30))
    );
    assert_eq!(
      display_instant(
        &repeating, None, &UTC
      ),
      Some(origin)
    );
    assert_eq!(
      display_instant(
        &single,
        Some(day),
        &UTC
      ),
      Some(origin)
    );
    assert_eq!(
      display_instant(
        &task_with(None, None),
        Some(day),
        &UTC
      ),
      None
    );
  }

  #[test]
  fn repeated_calls_agree() {
    let task = task_with(
      Some(at(2024, 1, 10, 15, 30)),
      Some(RepeatRule::Weekly)
    );
    let day = ymd(2024, 1, 24);
    assert_eq!(
      occurs_on(&task, day, &UTC),
      occurs_on(&task, day, &UTC)
    );
    let origin = at(2024, 1, 10, 15, 30);
    assert_eq!(
      project_occurrence(
        origin, day, &UTC
      ),
      project_occurrence(
        origin, day, &UTC
      )
    );
  }
}
