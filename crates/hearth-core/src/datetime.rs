use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeDelta,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::config::Config;

const TIMEZONE_CONFIG_FILE: &str =
  "hearth-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "HEARTH_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "HEARTH_TIME_CONFIG";

pub const DEFAULT_DEADLINE_TIME:
  (u32, u32) = (12, 0);

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Display timezone used to cut instants into calendar days.
///
/// Lookup order: the `timezone` config key, `HEARTH_TIMEZONE`, a
/// `hearth-time.toml` file, then UTC.
pub fn resolve_timezone(
  cfg: &Config
) -> Tz {
  if let Some(raw) = cfg.get("timezone")
    && let Some(tz) =
      parse_timezone(&raw, "config")
  {
    return tz;
  }

  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn to_local_day(
  instant: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  instant.with_timezone(tz).date_naive()
}

#[must_use]
pub fn today(
  now: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  to_local_day(now, tz)
}

/// Resolves a wall-clock time in `tz` to UTC. Ambiguous times take the
/// earliest mapping; times inside a DST gap move forward by one hour.
pub fn local_to_utc(
  local_naive: NaiveDateTime,
  tz: &Tz
) -> DateTime<Utc> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      local_dt.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      let chosen = if first <= second {
        first
      } else {
        second
      };
      chosen.with_timezone(&Utc)
    }
    | LocalResult::None => {
      let shifted =
        local_naive + TimeDelta::hours(1);
      tracing::warn!(
        local = %local_naive,
        timezone = %tz,
        "local time falls in a DST gap; shifting forward"
      );
      tz.from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| {
          DateTime::<Utc>::from_naive_utc_and_offset(
            local_naive,
            Utc
          )
        })
    }
  }
}

/// Parses a stored deadline. The store may omit the trailing `Z`; the
/// value is UTC either way.
pub fn parse_utc_timestamp(
  raw: &str
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  let naive = token
    .strip_suffix('Z')
    .or_else(|| {
      token.strip_suffix('z')
    })
    .unwrap_or(token);

  [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M"
  ]
  .iter()
  .find_map(|fmt| {
    NaiveDateTime::parse_from_str(
      naive, fmt
    )
    .ok()
  })
  .map(|ndt| {
    DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc)
  })
}

#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_day_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let local_today = today(now, tz);

  match lower.as_str() {
    | "today" => return Ok(local_today),
    | "tomorrow" => {
      return offset_day(
        local_today,
        1
      );
    }
    | "yesterday" => {
      return offset_day(
        local_today,
        -1
      );
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return next_weekday_date(
      local_today,
      target_weekday
    )
    .ok_or_else(|| {
      anyhow!(
        "no {target_weekday} after \
         {local_today}"
      )
    });
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)d$")
    .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps["num"]
      .parse()
      .context(
        "invalid relative day count"
      )?;
    let signed = if &caps["sign"] == "-"
    {
      -num
    } else {
      num
    };
    return offset_day(
      local_today,
      signed
    );
  }

  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .map_err(|_| {
    anyhow!(
      "unrecognized day expression: \
       {input}"
    )
  })
  .context(
    "supported formats: \
     today/tomorrow/yesterday, \
     weekday names (e.g. friday), \
     +Nd/-Nd, YYYY-MM-DD"
  )
}

#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_deadline_expr(
  input: &str,
  at: Option<(u32, u32)>,
  default_time: (u32, u32),
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  if lower == "now" {
    return Ok(now);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(local_to_utc(ndt, tz));
    }
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[hm])$")
    .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps["num"]
      .parse()
      .context(
        "invalid relative amount"
      )?;
    let duration = match &caps["unit"]
    {
      | "h" => TimeDelta::try_hours(num),
      | _ => TimeDelta::try_minutes(num)
    }
    .ok_or_else(|| {
      anyhow!(
        "relative offset out of \
         range: {input}"
      )
    })?;
    let shifted =
      if &caps["sign"] == "-" {
        now.checked_sub_signed(duration)
      } else {
        now.checked_add_signed(duration)
      };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative offset out of \
         range: {input}"
      )
    });
  }

  if let Some((hour, minute)) =
    parse_clock(token)
  {
    let local_now =
      now.with_timezone(tz);
    let mut day =
      local_now.date_naive();
    let candidate = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct clock \
           time candidate"
        )
      })?;
    if candidate
      <= local_now.naive_local()
    {
      day = offset_day(day, 1)?;
    }
    let next = day
      .and_hms_opt(hour, minute, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct next \
           clock time candidate"
        )
      })?;
    return Ok(local_to_utc(next, tz));
  }

  let day =
    parse_day_expr(token, now, tz)
      .with_context(|| {
        format!(
          "unrecognized deadline \
           expression: {input}"
        )
      })?;
  let (hour, minute) =
    at.unwrap_or(default_time);
  let local = day
    .and_hms_opt(hour, minute, 0)
    .ok_or_else(|| {
      anyhow!(
        "invalid time of day \
         {hour:02}:{minute:02}"
      )
    })?;
  Ok(local_to_utc(local, tz))
}

/// Returns the first day of the requested month.
pub fn parse_month_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let current = first_day_of_month(
    today.year(),
    today.month()
  );
  let shift = |months: i32| {
    shift_months(current, months)
      .ok_or_else(|| {
        anyhow!(
          "month offset out of range: \
           {input}"
        )
      })
  };

  match lower.as_str() {
    | "" | "this" => return Ok(current),
    | "next" => return shift(1),
    | "prev" | "last" => {
      return shift(-1);
    }
    | _ => {}
  }

  if let Ok(offset) =
    lower.parse::<i32>()
    && (lower.starts_with('+')
      || lower.starts_with('-'))
  {
    return shift(offset);
  }

  if let Some(month) =
    parse_month_name(&lower)
  {
    return Ok(first_day_of_month(
      today.year(),
      month
    ));
  }

  NaiveDate::parse_from_str(
    &format!("{token}-01"),
    "%Y-%m-%d"
  )
  .map_err(|_| {
    anyhow!(
      "unrecognized month \
       expression: {input}"
    )
  })
  .context(
    "supported formats: YYYY-MM, \
     this/next/prev, +N/-N, month \
     names (e.g. march)"
  )
}

pub fn parse_clock(
  token: &str
) -> Option<(u32, u32)> {
  let clock_re = Regex::new(
    r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
  )
  .ok()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    match ampm_match
      .as_str()
      .to_ascii_lowercase()
      .as_str()
    {
      | "am" => raw_hour % 12,
      | _ => raw_hour % 12 + 12
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> Option<NaiveDate> {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}

/// `None` when the result leaves chrono's date range.
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> Option<NaiveDate> {
  date.checked_add_signed(
    TimeDelta::try_days(days)?
  )
}

fn offset_day(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  add_days(date, days).ok_or_else(|| {
    anyhow!(
      "day offset {days:+} from {date} \
       is out of range"
    )
  })
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  first_day_of_month(
    next_year, next_month
  )
  .pred_opt()
  .map_or(31, |last| last.day())
}

/// Same day in the shifted month, clamped to its length. `None` past
/// chrono's year range.
pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> Option<NaiveDate> {
  let index = i64::from(date.year())
    * 12
    + i64::from(date.month0())
    + i64::from(months);
  let year =
    i32::try_from(index.div_euclid(12))
      .ok()?;
  let month =
    u32::try_from(index.rem_euclid(12))
      .ok()?
      + 1;

  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
}

/// Blank cells before the 1st in a Monday-first grid.
pub fn monday_offset(
  first: NaiveDate
) -> u32 {
  first
    .weekday()
    .num_days_from_monday()
}

pub mod deadline_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &Option<DateTime<Utc>>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match dt {
      | Some(value) => {
        serializer.serialize_str(
          &value.to_rfc3339_opts(
            SecondsFormat::Secs,
            true
          )
        )
      }
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<
    Option<DateTime<Utc>>,
    D::Error
  >
  where
    D: Deserializer<'de>
  {
    let opt =
      Option::<String>::deserialize(
        deserializer
      )?;
    Ok(opt.and_then(|raw| {
      let parsed =
        super::parse_utc_timestamp(
          &raw
        );
      if parsed.is_none()
        && !raw.trim().is_empty()
      {
        tracing::warn!(
          deadline = %raw,
          "malformed deadline; treating as absent"
        );
      }
      parsed
    }))
  }
}
