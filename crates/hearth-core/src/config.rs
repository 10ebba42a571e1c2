use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::{
  DEFAULT_DEADLINE_TIME,
  parse_clock
};
use crate::task::Visibility;

const RC_ENV_VAR: &str = "HEARTHRC";
const RC_FILE_NAME: &str = ".hearthrc";

pub const DEFAULT_DATA_LOCATION: &str =
  "~/.hearth";
pub const DEFAULT_CALENDAR_DOTS: usize =
  3;
pub const DEFAULT_REFRESH_SECONDS: u64 =
  15;

/// Raw `key = value` pairs from the rc
/// chain and command-line overrides.
///
/// Typed keys are checked as they arrive,
/// so a bad value is reported against the
/// file line or override that set it.
#[derive(Debug, Clone, Default)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// Household preferences with every
/// typed key parsed and defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  pub data_location:      PathBuf,
  /// Color when stdout is a terminal.
  pub color:              bool,
  pub calendar_dots:      usize,
  pub refresh_seconds:    u64,
  pub default_time:       (u32, u32),
  pub default_visibility: Visibility
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      data_location:      expand_tilde(
        Path::new(
          DEFAULT_DATA_LOCATION
        )
      ),
      color:              true,
      calendar_dots:
        DEFAULT_CALENDAR_DOTS,
      refresh_seconds:
        DEFAULT_REFRESH_SECONDS,
      default_time:
        DEFAULT_DEADLINE_TIME,
      default_visibility:
        Visibility::Shared
    }
  }
}

enum Setting {
  DataLocation(PathBuf),
  Color(bool),
  CalendarDots(usize),
  RefreshSeconds(u64),
  DefaultTime((u32, u32)),
  DefaultVisibility(Visibility)
}

/// `None` for keys without a typed
/// meaning (`timezone`, or unknown keys
/// kept for forward compatibility).
fn parse_setting(
  key: &str,
  value: &str
) -> anyhow::Result<Option<Setting>> {
  let setting = match key {
    | "data.location" => {
      if value.is_empty() {
        return Err(anyhow!(
          "data.location cannot be \
           empty"
        ));
      }
      Setting::DataLocation(
        expand_tilde(Path::new(value))
      )
    }
    | "color" => {
      Setting::Color(parse_switch(
        value
      )?)
    }
    | "calendar.dots" => {
      Setting::CalendarDots(
        value.parse().with_context(
          || {
            format!(
              "calendar.dots expects \
               a count, got {value:?}"
            )
          }
        )?
      )
    }
    | "refresh.seconds" => {
      let seconds: u64 = value
        .parse()
        .with_context(|| {
          format!(
            "refresh.seconds expects \
             a number, got {value:?}"
          )
        })?;
      if seconds == 0 {
        return Err(anyhow!(
          "refresh.seconds must be at \
           least 1"
        ));
      }
      Setting::RefreshSeconds(seconds)
    }
    | "default.time" => {
      Setting::DefaultTime(
        parse_clock(value).ok_or_else(
          || {
            anyhow!(
              "default.time expects \
               HH:MM, got {value:?}"
            )
          }
        )?
      )
    }
    | "default.visibility" => {
      Setting::DefaultVisibility(
        value.parse()?
      )
    }
    | _ => return Ok(None)
  };
  Ok(Some(setting))
}

fn parse_switch(
  value: &str
) -> anyhow::Result<bool> {
  match value
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Ok(true)
    }
    | "off" | "no" | "false" | "0" => {
      Ok(false)
    }
    | other => {
      Err(anyhow!(
        "expected on/off, got {other:?}"
      ))
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading hearthrc");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no hearthrc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Accepts `rc.key` or bare `key`.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (raw_key, value) in overrides {
      let key = raw_key
        .strip_prefix("rc.")
        .unwrap_or(&raw_key);
      self
        .set(key, value.trim())
        .with_context(|| {
          format!(
            "invalid override \
             {raw_key}={value}"
          )
        })?;
      debug!(key, value = %value, "applied override");
    }
    Ok(())
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn settings(
    &self
  ) -> anyhow::Result<Settings> {
    let mut settings =
      Settings::default();
    for (key, value) in &self.map {
      match parse_setting(key, value)? {
        | Some(Setting::DataLocation(
          path
        )) => settings.data_location = path,
        | Some(Setting::Color(on)) => {
          settings.color = on
        }
        | Some(Setting::CalendarDots(
          dots
        )) => settings.calendar_dots = dots,
        | Some(Setting::RefreshSeconds(
          seconds
        )) => {
          settings.refresh_seconds =
            seconds
        }
        | Some(Setting::DefaultTime(
          time
        )) => settings.default_time = time,
        | Some(
          Setting::DefaultVisibility(
            visibility
          )
        ) => {
          settings.default_visibility =
            visibility
        }
        | None => {}
      }
    }
    Ok(settings)
  }

  fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    if parse_setting(key, value)?
      .is_none()
      && key != "timezone"
    {
      warn!(key, "unknown config key; keeping it");
    }
    self
      .map
      .insert(key.to_string(), value.to_string());
    Ok(())
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    if self.loaded_files.contains(&path) {
      return Err(anyhow!(
        "{} is included more than once",
        path.display()
      ));
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self
      .loaded_files
      .push(path.clone());

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let at = || {
        format!(
          "{}:{}",
          path.display(),
          idx + 1
        )
      };
      match parse_rc_line(raw_line)
        .with_context(at)?
      {
        | RcLine::Blank => {}
        | RcLine::Include(target) => {
          let include =
            resolve_include_path(
              &path, target
            )
            .with_context(at)?;
          if include.exists() {
            self
              .load_file(&include)
              .with_context(at)?;
          } else {
            warn!(include = %include.display(), "include file does not exist; skipping");
          }
        }
        | RcLine::Entry(key, value) => {
          trace!(key, value, "rc entry");
          self
            .set(key, value)
            .with_context(at)?;
        }
      }
    }

    Ok(())
  }
}

enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Entry(&'a str, &'a str)
}

fn parse_rc_line(
  raw: &str
) -> anyhow::Result<RcLine<'_>> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();

  if line.is_empty() {
    return Ok(RcLine::Blank);
  }
  if let Some(target) =
    line.strip_prefix("include ")
  {
    return Ok(RcLine::Include(
      target.trim()
    ));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected `key = value` or \
         `include <path>`, got {raw:?}"
      )
    })?;
  Ok(RcLine::Entry(
    key.trim(),
    value.trim()
  ))
}

/// `--data` wins over `data.location`.
pub fn resolve_data_dir(
  settings: &Settings,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = override_dir
    .map(Path::to_path_buf)
    .unwrap_or_else(|| {
      settings.data_location.clone()
    });

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping hearthrc"
    );
    return None;
  };
  Some(home.join(RC_FILE_NAME))
    .filter(|candidate| candidate.exists())
}

/// Relative includes resolve against the
/// including file's directory.
fn resolve_include_path(
  including: &Path,
  target: &str
) -> anyhow::Result<PathBuf> {
  if target.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(target));
  if expanded.is_absolute() {
    return Ok(expanded);
  }
  let base = including
    .parent()
    .unwrap_or_else(|| Path::new("."));
  Ok(base.join(expanded))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  if let Ok(rest) =
    path.strip_prefix("~")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}
