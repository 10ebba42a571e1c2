use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::{RepeatRule, Visibility};
use crate::view::OwnershipFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hearth",
    version,
    about = "Hearth: shared household tasks, list and calendar",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show tasks, optionally only those occurring on one day.
    List(ListArgs),
    /// Show a month grid with task markers.
    Calendar(CalendarArgs),
    Add(AddArgs),
    Edit(EditArgs),
    /// Toggle a task between pending and done.
    Done { id: String },
    Delete { id: String },
    Show { id: String },
    #[command(subcommand)]
    Subtask(SubtaskCommand),
    /// Morning digest of pending and late work.
    Summary,
    /// Re-read the store periodically and redraw the list.
    Watch(WatchArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct OwnershipArgs {
    #[arg(long, conflicts_with = "personal")]
    pub shared: bool,

    #[arg(long)]
    pub personal: bool,
}

impl OwnershipArgs {
    pub fn filter(&self) -> OwnershipFilter {
        if self.shared {
            OwnershipFilter::Shared
        } else if self.personal {
            OwnershipFilter::Personal
        } else {
            OwnershipFilter::All
        }
    }

    pub fn visibility(&self) -> Option<Visibility> {
        if self.shared {
            Some(Visibility::Shared)
        } else if self.personal {
            Some(Visibility::Personal)
        } else {
            None
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    #[command(flatten)]
    pub ownership: OwnershipArgs,

    /// Day to filter on: today, tomorrow, friday, +3d, 2024-01-17...
    #[arg(long = "on")]
    pub on: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CalendarArgs {
    /// Month to show: 2024-02, next, prev, +N, -N, march...
    #[arg(long)]
    pub month: Option<String>,

    /// Highlight a selected day and list its tasks below the grid.
    #[arg(long = "on")]
    pub on: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RepeatArg {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RepeatArg {
    pub fn rule(self) -> Option<RepeatRule> {
        match self {
            RepeatArg::None => None,
            RepeatArg::Daily => Some(RepeatRule::Daily),
            RepeatArg::Weekly => Some(RepeatRule::Weekly),
            RepeatArg::Monthly => Some(RepeatRule::Monthly),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long = "desc")]
    pub description: Option<String>,

    #[command(flatten)]
    pub ownership: OwnershipArgs,

    /// Deadline: a day expression, YYYY-MM-DD HH:MM, +2h, 18:30...
    #[arg(long)]
    pub due: Option<String>,

    /// Time of day for a day-only deadline (defaults to default.time).
    #[arg(long)]
    pub at: Option<String>,

    #[arg(long, value_enum)]
    pub repeat: Option<RepeatArg>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long = "desc", conflicts_with = "clear_desc")]
    pub description: Option<String>,

    #[arg(long)]
    pub clear_desc: bool,

    #[command(flatten)]
    pub ownership: OwnershipArgs,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    #[arg(long, conflicts_with = "clear_due")]
    pub at: Option<String>,

    #[arg(long)]
    pub clear_due: bool,

    #[arg(long, value_enum)]
    pub repeat: Option<RepeatArg>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskCommand {
    Add {
        task: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Flip a subtask, or set it explicitly with --done true|false.
    Toggle {
        id: String,
        #[arg(long)]
        done: Option<bool>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub list: ListArgs,

    /// Seconds between refreshes (defaults to refresh.seconds).
    #[arg(long)]
    pub interval: Option<u64>,

    /// Stop after this many refreshes.
    #[arg(long)]
    pub iterations: Option<u64>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of argv
/// before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
