//! Header metadata of SID/SuperSID files.
//!
//! Keys are stored lower-cased, in insertion order. The configuration and the file header
//! name a few fields differently (`site_name` vs `site`, `log_interval` vs `loginterval`),
//! so lookups go through alias lists.

use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{DecodeError, Result, SidError};

pub const SITE: &[&str] = &["site_name", "site"];
pub const CONTACT: &[&str] = &["contact"];
pub const VERSION: &[&str] = &["supersid_version"];
pub const LONGITUDE: &[&str] = &["longitude"];
pub const LATITUDE: &[&str] = &["latitude"];
pub const UTC_OFFSET: &[&str] = &["utc_offset"];
pub const TIME_ZONE: &[&str] = &["time_zone", "timezone"];
pub const UTC_START: &[&str] = &["utc_starttime"];
pub const LOG_INTERVAL: &[&str] = &["log_interval", "loginterval"];
pub const LOG_TYPE: &[&str] = &["log_type", "logtype"];
pub const MONITOR_ID: &[&str] = &["monitor_id", "monitorid"];
pub const STATIONS: &str = "stations";
pub const FREQUENCIES: &str = "frequencies";
pub const STATION_ID: &str = "stationid";
pub const FREQUENCY: &str = "frequency";

/// Timestamp written with second precision
pub const TIMESTAMP_STANDARD: &str = "%Y-%m-%d %H:%M:%S";
/// Timestamp written with microsecond precision
pub const TIMESTAMP_EXTENDED: &str = "%Y-%m-%d %H:%M:%S%.6f";
// Parses both precisions: `%.f` consumes an optional fraction
const TIMESTAMP_PARSE: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Precision of the timestamps in a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    #[default]
    Standard,
    Extended,
}

impl TimestampFormat {
    pub fn from_extended(extended: bool) -> Self {
        if extended {
            TimestampFormat::Extended
        } else {
            TimestampFormat::Standard
        }
    }

    pub fn is_extended(self) -> bool {
        self == TimestampFormat::Extended
    }

    pub fn pattern(self) -> &'static str {
        match self {
            TimestampFormat::Standard => TIMESTAMP_STANDARD,
            TimestampFormat::Extended => TIMESTAMP_EXTENDED,
        }
    }

    pub fn format(self, t: &NaiveDateTime) -> String {
        t.format(self.pattern()).to_string()
    }
}

/// Parse a timestamp in either precision. Returns the value and whether it carried a fraction.
pub fn parse_timestamp(s: &str) -> Option<(NaiveDateTime, TimestampFormat)> {
    let s = s.trim();
    let t = NaiveDateTime::parse_from_str(s, TIMESTAMP_PARSE).ok()?;
    Some((t, TimestampFormat::from_extended(s.contains('.'))))
}

/// Midnight at the start of `date`
pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// `raw` or `filtered`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogType {
    #[default]
    Raw,
    Filtered,
}

impl LogType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Raw => "raw",
            LogType::Filtered => "filtered",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(LogType::Raw),
            "filtered" => Ok(LogType::Filtered),
            other => Err(format!("'{other}' is neither 'raw' nor 'filtered'")),
        }
    }
}

/// Ordered `key = value` header pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidParams {
    entries: Vec<(String, String)>,
}

impl SidParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value found under any of the aliases
    pub fn get_any(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|k| self.get(k))
    }

    pub fn require(&self, aliases: &[&str]) -> Result<&str> {
        self.get_any(aliases)
            .ok_or_else(|| SidError::MissingParam(aliases[0].to_owned()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace, keeping the original position of an existing key
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = key.to_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Replace the value under whichever alias is present, or insert under the first one
    pub fn set_any(&mut self, aliases: &[&str], value: impl Into<String>) {
        let key = aliases
            .iter()
            .find(|k| self.contains(k))
            .unwrap_or(&aliases[0])
            .to_string();
        self.set(&key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let key = key.to_lowercase();
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse one `# key = value` header line. Lines that do not hold exactly one `=` are ignored.
    pub fn parse_line(&mut self, line: &str) {
        let body = line.strip_prefix('#').unwrap_or(line);
        let mut tokens = body.split('=');
        if let (Some(key), Some(value), None) = (tokens.next(), tokens.next(), tokens.next()) {
            self.set(key.trim(), value.trim());
        }
    }

    pub fn log_type(&self) -> Option<LogType> {
        self.get_any(LOG_TYPE).and_then(|s| s.parse().ok())
    }

    /// Interpret a parameter, reporting the key and raw value when the cast fails
    pub fn parse_as<T: FromStr>(&self, aliases: &[&str]) -> Option<Result<T, DecodeError>> {
        let raw = self.get_any(aliases)?;
        Some(raw.trim().parse().map_err(|_| DecodeError::InvalidHeader {
            key: aliases[0].to_owned(),
            value: raw.to_owned(),
        }))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for SidParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = SidParams::new();
        for (k, v) in iter {
            params.set(k.as_ref(), v);
        }
        params
    }
}
