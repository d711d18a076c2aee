//! Resuming a partially recorded day from a file written by an earlier run.

use std::{
    fmt,
    io::{BufRead, Write},
    path::Path,
};

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::{
    codec,
    error::{MismatchKind, Result, SidError},
    params::{midnight, LogType, TimestampFormat},
    record::DailyRecord,
};

/// Why a previous file does not fit the current run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchReport {
    pub kind: MismatchKind,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, found {}",
            self.kind, self.expected, self.actual
        )
    }
}

/// Decides whether to keep going despite a mismatch
pub trait Confirm {
    fn confirm(&mut self, report: &MismatchReport) -> bool;
}

impl<F: FnMut(&MismatchReport) -> bool> Confirm for F {
    fn confirm(&mut self, report: &MismatchReport) -> bool {
        self(report)
    }
}

/// Accepts every mismatch
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _report: &MismatchReport) -> bool {
        true
    }
}

/// Asks on a terminal-like pair of streams, `y` to proceed
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for Prompt<R, W> {
    fn confirm(&mut self, report: &MismatchReport) -> bool {
        let asked = writeln!(self.output, "{report}").and_then(|_| {
            write!(
                self.output,
                "Do you still want to keep its content and continue recording? [y/N] "
            )?;
            self.output.flush()
        });
        if asked.is_err() {
            return false;
        }
        let mut answer = String::new();
        match self.input.read_line(&mut answer) {
            Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
            Err(_) => false,
        }
    }
}

pub struct ContinuationResolver<C> {
    confirm: C,
    today: NaiveDate,
}

impl<C: Confirm> ContinuationResolver<C> {
    pub fn new(confirm: C) -> Self {
        Self {
            confirm,
            today: Utc::now().date_naive(),
        }
    }

    /// Compare against `today` instead of the current UTC date
    pub fn on_date(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Every way `previous` differs from the live record
    pub fn mismatches(&self, previous: &DailyRecord, live: &DailyRecord) -> Vec<MismatchReport> {
        let mut reports = Vec::new();

        let log_type = previous.params().log_type();
        if log_type != Some(LogType::Raw) {
            reports.push(MismatchReport {
                kind: MismatchKind::LogType,
                expected: LogType::Raw.to_string(),
                actual: log_type.map_or_else(|| "none".to_owned(), |t| t.to_string()),
            });
        }

        let today = midnight(self.today);
        if previous.start_time() != today {
            reports.push(MismatchReport {
                kind: MismatchKind::Date,
                expected: TimestampFormat::Standard.format(&today),
                actual: TimestampFormat::Standard.format(&previous.start_time()),
            });
        }

        let mut theirs: Vec<&str> = previous.stations().iter().map(|s| s.call_sign.as_str()).collect();
        let mut ours: Vec<&str> = live.stations().iter().map(|s| s.call_sign.as_str()).collect();
        theirs.sort_unstable();
        ours.sort_unstable();
        if theirs != ours {
            reports.push(MismatchReport {
                kind: MismatchKind::Stations,
                expected: ours.join(","),
                actual: theirs.join(","),
            });
        }

        if previous.log_interval() != live.log_interval() {
            reports.push(MismatchReport {
                kind: MismatchKind::LogInterval,
                expected: live.log_interval().to_string(),
                actual: previous.log_interval().to_string(),
            });
        }
        reports
    }

    /// Read `path` and merge it into `live`. Returns the number of stations copied.
    pub fn resolve(&mut self, path: impl AsRef<Path>, live: &mut DailyRecord) -> Result<usize> {
        let path = path.as_ref();
        let previous = codec::read(path)?;
        let copied = self.merge(&previous, live)?;
        info!(
            path = %path.display(),
            stations = copied,
            "Continue recording with data from file"
        );
        Ok(copied)
    }

    /// Merge an already decoded record, asking for confirmation on every mismatch
    pub fn merge(&mut self, previous: &DailyRecord, live: &mut DailyRecord) -> Result<usize> {
        for report in self.mismatches(previous, live) {
            warn!("{report}");
            if !self.confirm.confirm(&report) {
                return Err(SidError::ContinuationDeclined(report.kind));
            }
        }
        Ok(live.copy_from(previous))
    }
}
