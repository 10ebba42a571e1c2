use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::datetime::{
    add_days, days_in_month, first_day_of_month, monday_offset, shift_months, today,
};
use crate::overdue::{is_late, is_overdue_debt};
use crate::recurrence::{display_instant, occurs_on};
use crate::task::{Task, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipFilter {
    #[default]
    All,
    Shared,
    Personal,
}

impl OwnershipFilter {
    pub fn admits(self, task: &Task) -> bool {
        match self {
            OwnershipFilter::All => true,
            OwnershipFilter::Shared => task.visibility == Visibility::Shared,
            OwnershipFilter::Personal => task.visibility == Visibility::Personal,
        }
    }
}

/// Everything the list and calendar renderers need besides the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub ownership: OwnershipFilter,
    pub selected_day: Option<NaiveDate>,
    /// First day of the month shown in the calendar.
    pub focus_month: NaiveDate,
}

impl ViewState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            ownership: OwnershipFilter::All,
            selected_day: None,
            focus_month: first_day_of_month(today.year(), today.month()),
        }
    }

    pub fn select_day(&mut self, day: NaiveDate) {
        self.selected_day = Some(day);
        self.focus_month = first_day_of_month(day.year(), day.month());
    }

    pub fn clear_selection(&mut self) {
        self.selected_day = None;
    }

    pub fn shift_month(&mut self, delta: i32) {
        if let Some(month) = shift_months(self.focus_month, delta) {
            self.focus_month = month;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListEntry<'a> {
    pub task: &'a Task,
    pub display: Option<DateTime<Utc>>,
    pub late: bool,
}

impl ListEntry<'_> {
    pub fn is_repeating(&self) -> bool {
        self.task.repeat_rule.is_some()
    }
}

/// Tasks for the list view, in snapshot order.
///
/// With a selected day only tasks occurring on it are kept, and repeating
/// ones carry that day's virtual occurrence as their display instant.
#[tracing::instrument(skip(tasks, state, now, tz), fields(total = tasks.len()))]
pub fn list_entries<'a>(
    tasks: &'a [Task],
    state: &ViewState,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<ListEntry<'a>> {
    let entries: Vec<ListEntry<'a>> = tasks
        .iter()
        .filter(|task| state.ownership.admits(task))
        .filter(|task| {
            state
                .selected_day
                .is_none_or(|day| occurs_on(task, day, tz))
        })
        .map(|task| {
            let display = display_instant(task, state.selected_day, tz);
            let late = is_late(display, now, task.status, state.selected_day, tz);
            ListEntry {
                task,
                display,
                late,
            }
        })
        .collect();

    debug!(
        shown = entries.len(),
        selected = ?state.selected_day,
        ownership = ?state.ownership,
        "list entries built"
    );
    entries
}

/// Occurrences on `day`, plus overdue debt when `day` is today.
pub fn tasks_on_calendar_day<'a>(
    tasks: &'a [Task],
    day: NaiveDate,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| occurs_on(task, day, tz) || is_overdue_debt(task, day, now, tz))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotKind {
    Shared,
    Personal,
    Late,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarCell {
    pub day: NaiveDate,
    pub is_today: bool,
    pub is_selected: bool,
    pub task_count: usize,
    pub dots: Vec<DotKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarMonth {
    pub first_day: NaiveDate,
    /// Empty cells before the 1st in a Monday-first week row.
    pub leading_blanks: u32,
    pub cells: Vec<CalendarCell>,
}

/// The cell is treated as the selected day so a dot turns late exactly when
/// the list would show that task as late after selecting the cell.
pub fn dot_for(task: &Task, day: NaiveDate, now: DateTime<Utc>, tz: &Tz) -> DotKind {
    let display = if occurs_on(task, day, tz) {
        display_instant(task, Some(day), tz)
    } else {
        task.deadline
    };

    if is_late(display, now, task.status, Some(day), tz) {
        DotKind::Late
    } else if task.is_shared() {
        DotKind::Shared
    } else {
        DotKind::Personal
    }
}

#[tracing::instrument(skip(tasks, state, now, tz), fields(month = %state.focus_month))]
pub fn calendar_month(
    tasks: &[Task],
    state: &ViewState,
    now: DateTime<Utc>,
    tz: &Tz,
    max_dots: usize,
) -> CalendarMonth {
    let first_day = first_day_of_month(state.focus_month.year(), state.focus_month.month());
    let length = days_in_month(first_day.year(), first_day.month());
    let local_today = today(now, tz);

    let cells = (0..i64::from(length))
        .filter_map(|offset| add_days(first_day, offset))
        .map(|day| {
            let day_tasks = tasks_on_calendar_day(tasks, day, now, tz);
            let dots = day_tasks
                .iter()
                .take(max_dots)
                .map(|task| dot_for(task, day, now, tz))
                .collect();
            CalendarCell {
                day,
                is_today: day == local_today,
                is_selected: state.selected_day == Some(day),
                task_count: day_tasks.len(),
                dots,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        days = cells.len(),
        busy_days = cells.iter().filter(|cell| cell.task_count > 0).count(),
        "calendar month built"
    );

    CalendarMonth {
        first_day,
        leading_blanks: monday_offset(first_day),
        cells,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub pending: usize,
    pub today: usize,
    pub late: usize,
}

/// Morning digest numbers for the household.
pub fn summary(tasks: &[Task], now: DateTime<Utc>, tz: &Tz) -> Summary {
    let local_today = today(now, tz);
    let on_today = tasks_on_calendar_day(tasks, local_today, now, tz);
    Summary {
        pending: tasks.iter().filter(|task| !task.is_done()).count(),
        today: on_today.iter().filter(|task| !task.is_done()).count(),
        late: on_today
            .iter()
            .filter(|task| dot_for(task, local_today, now, tz) == DotKind::Late)
            .count(),
    }
}
