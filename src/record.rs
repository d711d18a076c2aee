//! The in-memory day of samples.
//!
//! A `DailyRecord` holds one sample vector per station plus a parallel vector of
//! timestamps. Slot `i` of the day is `start_time + i * log_interval`.

use chrono::{Duration, NaiveDateTime, Utc};

use crate::{
    error::{DecodeError, Result, SidError},
    params::{self, midnight, SidParams, TimestampFormat},
};

pub const SECONDS_PER_DAY: u32 = 86_400;

/// One monitored VLF transmitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub call_sign: String,
    /// Hz
    pub frequency: u32,
}

impl Station {
    pub fn new(call_sign: impl Into<String>, frequency: u32) -> Self {
        Self {
            call_sign: call_sign.into(),
            frequency,
        }
    }
}

/// Number of slots in one day for a given interval
pub fn slots_per_day(log_interval: u32) -> usize {
    (SECONDS_PER_DAY / log_interval.max(1)) as usize
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub(crate) params: SidParams,
    pub(crate) stations: Vec<Station>,
    pub(crate) log_interval: u32,
    pub(crate) start_time: NaiveDateTime,
    /// Precision observed when this record was read; write calls still choose explicitly
    pub(crate) timestamp_format: TimestampFormat,
    pub(crate) data: Vec<Vec<f64>>,
    pub(crate) timestamps: Vec<NaiveDateTime>,
}

impl DailyRecord {
    /// A zero-filled record for the day starting at `start_time`
    pub fn new(
        params: SidParams,
        stations: Vec<Station>,
        log_interval: u32,
        start_time: NaiveDateTime,
    ) -> Self {
        let slots = slots_per_day(log_interval);
        let mut record = Self {
            params,
            data: vec![vec![0f64; slots]; stations.len()],
            stations,
            log_interval,
            start_time,
            timestamp_format: TimestampFormat::Standard,
            timestamps: Vec::new(),
        };
        record.sync_start_param();
        record.generate_timestamps();
        record
    }

    /// A zero-filled record for the current UTC day
    pub fn for_today(params: SidParams, stations: Vec<Station>, log_interval: u32) -> Self {
        let start = midnight(Utc::now().date_naive());
        Self::new(params, stations, log_interval, start)
    }

    /// Assemble a record from decoded columns. All vectors must have the same length.
    pub(crate) fn from_parts(
        params: SidParams,
        stations: Vec<Station>,
        log_interval: u32,
        start_time: NaiveDateTime,
        timestamp_format: TimestampFormat,
        data: Vec<Vec<f64>>,
        timestamps: Option<Vec<NaiveDateTime>>,
    ) -> Result<Self, DecodeError> {
        let rows = data.first().map_or(0, Vec::len);
        for (station, column) in stations.iter().zip(&data) {
            if column.len() != rows {
                return Err(DecodeError::LengthMismatch {
                    station: station.call_sign.clone(),
                    expected: rows,
                    found: column.len(),
                });
            }
        }
        let mut record = Self {
            params,
            stations,
            log_interval,
            start_time,
            timestamp_format,
            data,
            timestamps: Vec::new(),
        };
        match timestamps {
            Some(ts) => record.timestamps = ts,
            None => record.generate_timestamps(),
        }
        Ok(record)
    }

    pub fn params(&self) -> &SidParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut SidParams {
        &mut self.params
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn log_interval(&self) -> u32 {
        self.log_interval
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn timestamp_format(&self) -> TimestampFormat {
        self.timestamp_format
    }

    pub fn is_extended(&self) -> bool {
        self.timestamp_format.is_extended()
    }

    /// Multi-station header keys are present
    pub fn is_supersid(&self) -> bool {
        self.params.contains(params::STATIONS)
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    /// Number of sample slots per station
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn station_index(&self, call_sign: &str) -> Result<usize> {
        self.stations
            .iter()
            .position(|s| s.call_sign == call_sign)
            .ok_or_else(|| SidError::StationNotFound(call_sign.to_owned()))
    }

    pub fn station_data(&self, call_sign: &str) -> Result<&[f64]> {
        let idx = self.station_index(call_sign)?;
        Ok(&self.data[idx])
    }

    pub fn station_data_by_index(&self, index: usize) -> Result<&[f64]> {
        self.data
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| SidError::StationNotFound(format!("#{index}")))
    }

    pub(crate) fn station_data_mut(&mut self, call_sign: &str) -> Result<&mut Vec<f64>> {
        let idx = self.station_index(call_sign)?;
        Ok(&mut self.data[idx])
    }

    /// Store one sample. The only mutation used during live capture.
    pub fn set_sample(&mut self, index: usize, station_index: usize, value: f64) -> Result<()> {
        let len = self.len();
        let column = self
            .data
            .get_mut(station_index)
            .ok_or_else(|| SidError::StationNotFound(format!("#{station_index}")))?;
        let slot = column
            .get_mut(index)
            .ok_or(SidError::IndexOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Record the actual capture time of a slot
    pub fn set_timestamp(&mut self, index: usize, t: NaiveDateTime) -> Result<()> {
        let len = self.len();
        let slot = self
            .timestamps
            .get_mut(index)
            .ok_or(SidError::IndexOutOfRange { index, len })?;
        *slot = t;
        Ok(())
    }

    /// Reset the buffer for the current UTC day
    pub fn clear(&mut self, next_day: bool) {
        self.clear_at(next_day, Utc::now().naive_utc());
    }

    /// With `next_day`, zero every slot in place and move the start to the midnight of `utc_now`.
    /// Otherwise reallocate a full day of zeros keeping the current start.
    pub fn clear_at(&mut self, next_day: bool, utc_now: NaiveDateTime) {
        if next_day {
            for column in &mut self.data {
                column.fill(0.0);
            }
            self.start_time = midnight(utc_now.date());
            self.sync_start_param();
        } else {
            let slots = slots_per_day(self.log_interval);
            self.data = vec![vec![0f64; slots]; self.stations.len()];
        }
        self.generate_timestamps();
    }

    /// Copy every station also present in `other` (matched by call sign).
    /// Timestamps are taken from `other` when at least one station was copied.
    /// Returns the number of stations copied.
    pub fn copy_from(&mut self, other: &DailyRecord) -> usize {
        let mut copied = 0;
        for (idx, station) in self.stations.iter().enumerate() {
            let Ok(source) = other.station_data(&station.call_sign) else {
                continue;
            };
            let target = &mut self.data[idx];
            let n = target.len().min(source.len());
            target[..n].copy_from_slice(&source[..n]);
            copied += 1;
        }
        if copied > 0 {
            let n = self.timestamps.len().min(other.timestamps.len());
            self.timestamps[..n].copy_from_slice(&other.timestamps[..n]);
        }
        copied
    }

    /// `<site>_<station>_<YYYY-MM-DD>.csv`
    pub fn sid_filename(&self, call_sign: &str) -> Result<String> {
        Ok(format!(
            "{}_{}_{}.csv",
            self.params.require(params::SITE)?,
            call_sign,
            self.start_date()
        ))
    }

    /// `<site>_<YYYY-MM-DD>.csv`
    pub fn supersid_filename(&self) -> Result<String> {
        Ok(format!(
            "{}_{}.csv",
            self.params.require(params::SITE)?,
            self.start_date()
        ))
    }

    pub fn start_date(&self) -> String {
        self.start_time.format("%Y-%m-%d").to_string()
    }

    fn generate_timestamps(&mut self) {
        let rows = self
            .data
            .first()
            .map_or_else(|| slots_per_day(self.log_interval), Vec::len);
        let step = Duration::seconds(i64::from(self.log_interval));
        self.timestamps = (0..rows)
            .scan(self.start_time, |t, _| {
                let current = *t;
                *t += step;
                Some(current)
            })
            .collect();
    }

    fn sync_start_param(&mut self) {
        let start = TimestampFormat::Standard.format(&self.start_time);
        self.params.set_any(params::UTC_START, start);
    }
}
