use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Settings;
use crate::task::Task;
use crate::view::{CalendarMonth, DotKind, ListEntry, Summary};

const CELL_WIDTH: usize = 5;
const WEEKDAY_HEADER: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(settings: &Settings) -> Self {
        Self {
            color: settings.color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, entries, tz))]
    pub fn print_list(&self, entries: &[ListEntry<'_>], tz: &Tz) -> anyhow::Result<()> {
        self.write_list(io::stdout().lock(), entries, tz)
    }

    pub fn write_list<W: Write>(
        &self,
        mut out: W,
        entries: &[ListEntry<'_>],
        tz: &Tz,
    ) -> anyhow::Result<()> {
        if entries.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "".to_string(),
            "Due".to_string(),
            "Title".to_string(),
            "Owner".to_string(),
            "Subtasks".to_string(),
        ];

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let task = entry.task;
            let id = self.paint(&short_id(task), "33");
            let check = if task.is_done() { "[x]" } else { "[ ]" }.to_string();

            let due = entry
                .display
                .map(|instant| format_local(instant, tz))
                .unwrap_or_default();
            let due = if entry.late {
                self.paint(&format!("!{due}"), "31")
            } else {
                due
            };

            let mut title = task.title.clone();
            if entry.is_repeating() {
                title.push_str(" ↻");
            }
            if task.is_done() {
                title = self.paint(&title, "2");
            }

            let subtasks = task
                .subtask_progress()
                .map(|(done, total)| format!("{done}/{total}"))
                .unwrap_or_default();

            rows.push(vec![
                id,
                check,
                due,
                title,
                task.visibility.to_string(),
                subtasks,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, month))]
    pub fn print_calendar(&self, month: &CalendarMonth) -> anyhow::Result<()> {
        self.write_calendar(io::stdout().lock(), month)
    }

    pub fn write_calendar<W: Write>(&self, mut out: W, month: &CalendarMonth) -> anyhow::Result<()> {
        let title = month.first_day.format("%B %Y").to_string();
        let grid_width = CELL_WIDTH * 7 + 6;
        writeln!(out, "{title:^grid_width$}")?;

        let header = WEEKDAY_HEADER
            .iter()
            .map(|name| format!("{name:<CELL_WIDTH$}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{}", header.trim_end())?;

        let mut line: Vec<String> = (0..month.leading_blanks)
            .map(|_| " ".repeat(CELL_WIDTH))
            .collect();

        for cell in &month.cells {
            let dots: String = cell.dots.iter().map(|dot| dot_glyph(*dot)).collect();
            let plain = format!("{:>2}{dots}", cell.day.day());
            let padding = CELL_WIDTH.saturating_sub(UnicodeWidthStr::width(plain.as_str()));
            let mut text = format!("{plain}{}", " ".repeat(padding));
            if cell.is_today {
                text = self.paint(&text, "1;33");
            }
            if cell.is_selected {
                text = self.paint(&text, "4");
            }
            line.push(text);

            if line.len() == 7 {
                writeln!(out, "{}", line.join(" ").trim_end())?;
                line.clear();
            }
        }
        if !line.is_empty() {
            writeln!(out, "{}", line.join(" ").trim_end())?;
        }

        writeln!(out)?;
        writeln!(
            out,
            "{} shared  {} personal  {} late",
            dot_glyph(DotKind::Shared),
            dot_glyph(DotKind::Personal),
            dot_glyph(DotKind::Late)
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task, now, tz))]
    pub fn print_task_detail(&self, task: &Task, now: DateTime<Utc>, tz: &Tz) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(
            out,
            "description {}",
            task.description
                .as_deref()
                .filter(|text| !text.trim().is_empty())
                .unwrap_or("-")
        )?;
        writeln!(out, "visibility  {}", task.visibility)?;
        writeln!(out, "status      {:?}", task.status)?;

        if let Some(deadline) = task.deadline {
            let mut due = format_local(deadline, tz);
            if crate::overdue::is_late(Some(deadline), now, task.status, None, tz) {
                due = self.paint(&format!("{due} (late)"), "31");
            }
            writeln!(out, "deadline    {due}")?;
        }
        if let Some(rule) = task.repeat_rule {
            writeln!(out, "repeats     {rule}")?;
        }

        if !task.subtasks.is_empty() {
            writeln!(out, "subtasks")?;
            for sub in &task.subtasks {
                let mark = if sub.is_done { "[x]" } else { "[ ]" };
                let short = sub.id.to_string();
                writeln!(out, "  {mark} {} {}", &short[..8], sub.title)?;
            }
        }

        Ok(())
    }

    pub fn print_summary(&self, summary: &Summary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "Good morning! {} pending task(s) in the household, {} on today's calendar.",
            summary.pending, summary.today
        )?;
        if summary.late > 0 {
            let late = format!("{} of them are late.", summary.late);
            writeln!(out, "{}", self.paint(&late, "31"))?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(task: &Task) -> String {
    let full = task.id.to_string();
    full[..8].to_string()
}

fn format_local(instant: DateTime<Utc>, tz: &Tz) -> String {
    instant.with_timezone(tz).format("%d %b %H:%M").to_string()
}

fn dot_glyph(kind: DotKind) -> char {
    match kind {
        DotKind::Shared => '•',
        DotKind::Personal => '◦',
        DotKind::Late => '!',
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
