//! Schedule date parsing.

use crate::constants::{SCHEDULE_DATETIME_FORMATS, SCHEDULE_DATE_FORMAT};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

/// A schedule date as handed to the engine: either a concrete instant or a string that
/// still has to be parsed.
///
/// Naive strings are interpreted as UTC.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScheduleDate {
    At(DateTime<Utc>),
    Text(String),
}

impl ScheduleDate {
    /// Resolve to an instant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DateFormat`] if the text matches none of the accepted formats.
    pub fn resolve(&self) -> CoreResult<DateTime<Utc>> {
        match self {
            ScheduleDate::At(at) => Ok(*at),
            ScheduleDate::Text(text) => parse_naive(text.trim())
                .map(|naive| naive.and_utc())
                .ok_or_else(|| CoreError::DateFormat(text.clone())),
        }
    }
}

impl From<DateTime<Utc>> for ScheduleDate {
    fn from(at: DateTime<Utc>) -> Self {
        ScheduleDate::At(at)
    }
}

impl From<&str> for ScheduleDate {
    fn from(text: &str) -> Self {
        ScheduleDate::Text(text.to_owned())
    }
}

impl From<String> for ScheduleDate {
    fn from(text: String) -> Self {
        ScheduleDate::Text(text)
    }
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    for format in SCHEDULE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }

    // chrono needs a minute to build a time, so hour-only strings are assembled by hand
    if let Some((date, hour)) = text.split_once(' ') {
        if hour.len() != 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, SCHEDULE_DATE_FORMAT).ok()?;
        let hour: u32 = hour.parse().ok()?;
        return date.and_hms_opt(hour, 0, 0);
    }

    NaiveDate::parse_from_str(text, SCHEDULE_DATE_FORMAT)
        .ok()?
        .and_hms_opt(0, 0, 0)
}
