use std::thread;
use std::time::Duration as StdDuration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, CalendarArgs, Command, EditArgs, ListArgs, SubtaskCommand, WatchArgs};
use crate::config::Settings;
use crate::datetime::{
    local_to_utc, parse_clock, parse_day_expr, parse_deadline_expr, parse_month_expr,
    to_local_day, today,
};
use crate::render::{Renderer, short_id};
use crate::store::{TaskStore, resolve_subtask_id, resolve_task_id, toggle_status};
use crate::task::{NewTask, TaskPatch};
use crate::view::{ViewState, calendar_month, list_entries, summary};

/// Everything a command needs besides the store.
pub struct CommandContext<'a> {
    pub settings: &'a Settings,
    pub renderer: &'a Renderer,
    pub tz: Tz,
    pub now: DateTime<Utc>,
}

#[instrument(skip(store, ctx, command))]
pub fn dispatch(store: &dyn TaskStore, ctx: &CommandContext<'_>, command: Command) -> anyhow::Result<()> {
    debug!(?command, now = %ctx.now, timezone = %ctx.tz, "dispatching command");

    match command {
        Command::List(args) => cmd_list(store, ctx, &args),
        Command::Calendar(args) => cmd_calendar(store, ctx, &args),
        Command::Add(args) => cmd_add(store, ctx, &args),
        Command::Edit(args) => cmd_edit(store, ctx, &args),
        Command::Done { id } => cmd_done(store, &id),
        Command::Delete { id } => cmd_delete(store, &id),
        Command::Show { id } => cmd_show(store, ctx, &id),
        Command::Subtask(sub) => cmd_subtask(store, sub),
        Command::Summary => cmd_summary(store, ctx),
        Command::Watch(args) => cmd_watch(store, ctx, &args),
    }
}

fn view_state_for(ctx: &CommandContext<'_>, args: &ListArgs) -> anyhow::Result<ViewState> {
    let mut state = ViewState::new(today(ctx.now, &ctx.tz));
    state.ownership = args.ownership.filter();
    if let Some(expr) = &args.on {
        let day = parse_day_expr(expr, ctx.now, &ctx.tz)?;
        state.select_day(day);
    }
    Ok(state)
}

#[instrument(skip(store, ctx, args))]
fn cmd_list(store: &dyn TaskStore, ctx: &CommandContext<'_>, args: &ListArgs) -> anyhow::Result<()> {
    info!("command list");

    let tasks = store.list_tasks()?;
    let state = view_state_for(ctx, args)?;
    let entries = list_entries(&tasks, &state, ctx.now, &ctx.tz);
    if let Some(day) = state.selected_day {
        println!("{}", day.format("%A, %d %B %Y"));
    }
    ctx.renderer.print_list(&entries, &ctx.tz)
}

#[instrument(skip(store, ctx, args))]
fn cmd_calendar(
    store: &dyn TaskStore,
    ctx: &CommandContext<'_>,
    args: &CalendarArgs,
) -> anyhow::Result<()> {
    info!("command calendar");

    let local_today = today(ctx.now, &ctx.tz);
    let mut state = ViewState::new(local_today);
    if let Some(expr) = &args.on {
        state.select_day(parse_day_expr(expr, ctx.now, &ctx.tz)?);
    }
    if let Some(expr) = &args.month {
        let anchor = state.selected_day.unwrap_or(local_today);
        state.focus_month = parse_month_expr(expr, anchor)?;
    }

    let tasks = store.list_tasks()?;
    let month = calendar_month(&tasks, &state, ctx.now, &ctx.tz, ctx.settings.calendar_dots);
    ctx.renderer.print_calendar(&month)?;

    if let Some(day) = state.selected_day {
        println!();
        println!("{}", day.format("%A, %d %B %Y"));
        let entries = list_entries(&tasks, &state, ctx.now, &ctx.tz);
        ctx.renderer.print_list(&entries, &ctx.tz)?;
    }
    Ok(())
}

fn parse_at(raw: Option<&str>) -> anyhow::Result<Option<(u32, u32)>> {
    raw.map(|value| parse_clock(value).ok_or_else(|| anyhow!("invalid time of day: {value}")))
        .transpose()
}

#[instrument(skip(store, ctx, args))]
fn cmd_add(store: &dyn TaskStore, ctx: &CommandContext<'_>, args: &AddArgs) -> anyhow::Result<()> {
    info!("command add");

    let visibility = args
        .ownership
        .visibility()
        .unwrap_or(ctx.settings.default_visibility);

    let at = parse_at(args.at.as_deref())?;
    let deadline = match &args.due {
        Some(expr) => Some(parse_deadline_expr(
            expr,
            at,
            ctx.settings.default_time,
            ctx.now,
            &ctx.tz,
        )?),
        None if at.is_some() => {
            return Err(anyhow!("--at needs --due to pick the day"));
        }
        None => None,
    };

    let repeat_rule = args.repeat.and_then(|repeat| repeat.rule());
    if repeat_rule.is_some() && deadline.is_none() {
        return Err(anyhow!("--repeat needs a --due deadline to start from"));
    }

    let task = store.create_task(NewTask {
        title: args.title.join(" "),
        description: args.description.clone(),
        visibility,
        deadline,
        repeat_rule,
    })?;

    println!("Created task {}.", short_id(&task));
    Ok(())
}

#[instrument(skip(store, ctx, args))]
fn cmd_edit(store: &dyn TaskStore, ctx: &CommandContext<'_>, args: &EditArgs) -> anyhow::Result<()> {
    info!("command edit");

    let tasks = store.list_tasks()?;
    let id = resolve_task_id(&tasks, &args.id)?;
    let current = tasks
        .iter()
        .find(|task| task.id == id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;

    let mut patch = TaskPatch {
        title: args.title.clone(),
        visibility: args.ownership.visibility(),
        repeat_rule: args.repeat.map(|repeat| repeat.rule()),
        ..TaskPatch::default()
    };

    if args.clear_desc {
        patch.description = Some(None);
    } else if let Some(description) = &args.description {
        patch.description = Some(Some(description.clone()));
    }

    let at = parse_at(args.at.as_deref())?;
    if args.clear_due {
        patch.deadline = Some(None);
    } else if let Some(expr) = &args.due {
        let deadline = parse_deadline_expr(expr, at, ctx.settings.default_time, ctx.now, &ctx.tz)?;
        patch.deadline = Some(Some(deadline));
    } else if let Some((hour, minute)) = at {
        let existing = current
            .deadline
            .ok_or_else(|| anyhow!("--at needs --due when the task has no deadline"))?;
        let day = to_local_day(existing, &ctx.tz);
        let local = day
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("invalid time of day {hour:02}:{minute:02}"))?;
        patch.deadline = Some(Some(local_to_utc(local, &ctx.tz)));
    }

    if patch.is_empty() {
        return Err(anyhow!("edit needs at least one field to change"));
    }

    let updated = store.patch_task(id, &patch)?;
    if updated.repeat_rule.is_some() && updated.deadline.is_none() {
        tracing::warn!(id = %updated.id, "repeat rule has no deadline; task will not recur");
    }
    println!("Modified task {}.", short_id(&updated));
    Ok(())
}

#[instrument(skip(store))]
fn cmd_done(store: &dyn TaskStore, id: &str) -> anyhow::Result<()> {
    info!("command done");

    let tasks = store.list_tasks()?;
    let id = resolve_task_id(&tasks, id)?;
    let task = tasks
        .iter()
        .find(|task| task.id == id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;

    let updated = toggle_status(store, task)?;
    if updated.is_done() {
        println!("Completed task {} '{}'.", short_id(&updated), updated.title);
    } else {
        println!("Reopened task {} '{}'.", short_id(&updated), updated.title);
    }
    Ok(())
}

#[instrument(skip(store))]
fn cmd_delete(store: &dyn TaskStore, id: &str) -> anyhow::Result<()> {
    info!("command delete");

    let tasks = store.list_tasks()?;
    let id = resolve_task_id(&tasks, id)?;
    store.delete_task(id)?;
    println!("Deleted task {}.", &id.to_string()[..8]);
    Ok(())
}

#[instrument(skip(store, ctx))]
fn cmd_show(store: &dyn TaskStore, ctx: &CommandContext<'_>, id: &str) -> anyhow::Result<()> {
    info!("command show");

    let tasks = store.list_tasks()?;
    let id = resolve_task_id(&tasks, id)?;
    let task = tasks
        .iter()
        .find(|task| task.id == id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;
    ctx.renderer.print_task_detail(task, ctx.now, &ctx.tz)
}

#[instrument(skip(store, command))]
fn cmd_subtask(store: &dyn TaskStore, command: SubtaskCommand) -> anyhow::Result<()> {
    let tasks = store.list_tasks()?;
    match command {
        SubtaskCommand::Add { task, title } => {
            info!("command subtask add");
            let task_id = resolve_task_id(&tasks, &task)?;
            let subtask = store.add_subtask(task_id, &title.join(" "))?;
            println!("Added subtask {}.", &subtask.id.to_string()[..8]);
        }
        SubtaskCommand::Toggle { id, done } => {
            info!("command subtask toggle");
            let sub_id = resolve_subtask_id(&tasks, &id)?;
            let current = tasks
                .iter()
                .flat_map(|task| task.subtasks.iter())
                .find(|sub| sub.id == sub_id)
                .map(|sub| sub.is_done)
                .unwrap_or_default();
            let target = done.unwrap_or(!current);
            store.toggle_subtask(sub_id, target)?;
            println!(
                "Subtask {} is now {}.",
                &sub_id.to_string()[..8],
                if target { "done" } else { "open" }
            );
        }
    }
    Ok(())
}

#[instrument(skip(store, ctx))]
fn cmd_summary(store: &dyn TaskStore, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
    info!("command summary");

    let tasks = store.list_tasks()?;
    let digest = summary(&tasks, ctx.now, &ctx.tz);
    ctx.renderer.print_summary(&digest)
}

/// Each pass reads a fresh snapshot and recomputes every derived value.
#[instrument(skip(store, ctx, args))]
fn cmd_watch(store: &dyn TaskStore, ctx: &CommandContext<'_>, args: &WatchArgs) -> anyhow::Result<()> {
    info!("command watch");

    let interval = args
        .interval
        .unwrap_or(ctx.settings.refresh_seconds)
        .max(1);

    let mut pass = 0_u64;
    loop {
        pass += 1;
        let pass_ctx = CommandContext {
            now: Utc::now(),
            ..*ctx
        };
        println!("-- {} --", pass_ctx.now.with_timezone(&ctx.tz).format("%H:%M:%S"));
        cmd_list(store, &pass_ctx, &args.list)?;

        if args.iterations.is_some_and(|limit| pass >= limit) {
            debug!(passes = pass, "watch finished");
            return Ok(());
        }
        thread::sleep(StdDuration::from_secs(interval));
    }
}
