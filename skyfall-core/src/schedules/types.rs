use chrono::{Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A persisted trigger binding a playbook to a time policy.
///
/// Fields are kept as entered; they are interpreted only when the policy is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub playbook_id: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    pub execution_time: String,
    #[serde(with = "bool_text", default)]
    pub repeat: bool,
    #[serde(default)]
    pub repeat_frequency: String,
}

/// Input to `ScheduleStore::add_schedule`. A missing name is generated from the
/// current time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub name: Option<String>,
    pub playbook_id: String,
    pub start_date: String,
    pub end_date: String,
    pub execution_time: String,
    pub repeat: bool,
    pub repeat_frequency: String,
}

impl NewSchedule {
    pub fn new(
        name: Option<String>,
        playbook_id: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
        execution_time: impl Into<String>,
        repeat: bool,
        repeat_frequency: impl Into<String>,
    ) -> Self {
        Self {
            name,
            playbook_id: playbook_id.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
            execution_time: execution_time.into(),
            repeat,
            repeat_frequency: repeat_frequency.into(),
        }
    }

    pub fn into_parts(self) -> (Option<String>, Schedule) {
        (
            self.name,
            Schedule {
                playbook_id: self.playbook_id,
                start_date: self.start_date,
                end_date: self.end_date,
                execution_time: self.execution_time,
                repeat: self.repeat,
                repeat_frequency: self.repeat_frequency,
            },
        )
    }
}

pub fn default_schedule_name() -> String {
    format!("schedule_{}", Local::now().format("%Y%m%d_%H%M%S_%6f"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatFrequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl std::str::FromStr for RepeatFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hourly" => Ok(RepeatFrequency::Hourly),
            "daily" => Ok(RepeatFrequency::Daily),
            "weekly" => Ok(RepeatFrequency::Weekly),
            "monthly" => Ok(RepeatFrequency::Monthly),
            other => Err(format!(
                "unknown repeat frequency '{}' (expected hourly, daily, weekly or monthly)",
                other
            )),
        }
    }
}

impl std::fmt::Display for RepeatFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepeatFrequency::Hourly => write!(f, "hourly"),
            RepeatFrequency::Daily => write!(f, "daily"),
            RepeatFrequency::Weekly => write!(f, "weekly"),
            RepeatFrequency::Monthly => write!(f, "monthly"),
        }
    }
}

/// Parsed form of a [`Schedule`], in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    pub first: NaiveDateTime,
    /// Last day (inclusive) an occurrence may fall on.
    pub end_date: Option<NaiveDate>,
    /// `None` fires once at `first`.
    pub repeat: Option<RepeatFrequency>,
}

impl Schedule {
    pub fn policy(&self, name: &str) -> Result<TriggerPolicy, ScheduleError> {
        let invalid = |message: String| ScheduleError::InvalidPolicy {
            name: name.to_string(),
            message,
        };

        let start = NaiveDate::parse_from_str(self.start_date.trim(), DATE_FORMAT)
            .map_err(|e| invalid(format!("start date '{}': {}", self.start_date, e)))?;
        let time = parse_time(&self.execution_time)
            .ok_or_else(|| invalid(format!("execution time '{}'", self.execution_time)))?;

        let end_date = match self.end_date.trim() {
            "" => None,
            end => Some(
                NaiveDate::parse_from_str(end, DATE_FORMAT)
                    .map_err(|e| invalid(format!("end date '{}': {}", end, e)))?,
            ),
        };
        if let Some(end) = end_date {
            if end < start {
                return Err(invalid(format!(
                    "end date {} is before start date {}",
                    end, start
                )));
            }
        }

        let repeat = if self.repeat {
            Some(
                self.repeat_frequency
                    .parse::<RepeatFrequency>()
                    .map_err(invalid)?,
            )
        } else {
            None
        };

        Ok(TriggerPolicy {
            first: start.and_time(time),
            end_date,
            repeat,
        })
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

impl TriggerPolicy {
    /// First occurrence strictly after `after`, if any remains.
    pub fn next_occurrence_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let next = if after < self.first {
            self.first
        } else {
            match self.repeat {
                None => return None,
                Some(RepeatFrequency::Hourly) => step_fixed(self.first, after, Duration::hours(1)),
                Some(RepeatFrequency::Daily) => step_fixed(self.first, after, Duration::days(1)),
                Some(RepeatFrequency::Weekly) => step_fixed(self.first, after, Duration::weeks(1)),
                Some(RepeatFrequency::Monthly) => step_monthly(self.first, after)?,
            }
        };

        match self.end_date {
            Some(end) if next.date() > end => None,
            _ => Some(next),
        }
    }

    /// Whether an occurrence falls in `(window_start, window_end]`.
    pub fn is_due(&self, window_start: NaiveDateTime, window_end: NaiveDateTime) -> bool {
        self.next_occurrence_after(window_start)
            .map(|next| next <= window_end)
            .unwrap_or(false)
    }
}

fn step_fixed(first: NaiveDateTime, after: NaiveDateTime, period: Duration) -> NaiveDateTime {
    let elapsed = (after - first).num_seconds();
    let periods = elapsed / period.num_seconds() + 1;
    first + Duration::seconds(periods * period.num_seconds())
}

fn step_monthly(first: NaiveDateTime, after: NaiveDateTime) -> Option<NaiveDateTime> {
    let months_between =
        (after.year() - first.year()) * 12 + after.month() as i32 - first.month() as i32;
    let mut n = months_between.max(0) as u32;
    loop {
        let candidate = first.checked_add_months(Months::new(n))?;
        if candidate > after {
            return Some(candidate);
        }
        n += 1;
    }
}

/// `repeat` is stored as `"true"`/`"false"` text but plain booleans are accepted.
mod bool_text {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(b),
            Raw::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" | "" => Ok(false),
                other => Err(de::Error::custom(format!("invalid repeat flag '{}'", other))),
            },
        }
    }
}
