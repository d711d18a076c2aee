//! Reading and writing SID (one station, timestamped) and SuperSID (many stations) files.
//!
//! Both formats are line oriented text: a block of `# Key = Value` header lines followed by
//! one line per sample slot.
//!
//! ```text
//! # Site = MYSITE
//! ...
//! # StationID = NWC
//! # Frequency = 24000
//! 2024-06-01 00:00:00, 1.000000000000000
//! ```
//!
//! SuperSID lines carry one value per station, optionally prefixed with a microsecond
//! timestamp (the "extended" variant).

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::{
    error::{DecodeError, Result, SidError},
    filter::{BemaFilter, DEFAULT_WING},
    params::{self, midnight, parse_timestamp, LogType, SidParams, TimestampFormat},
    record::{slots_per_day, DailyRecord, Station, SECONDS_PER_DAY},
};

/// Used when a file header has no LogInterval
const FALLBACK_LOG_INTERVAL: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// One station: `timestamp, value`
    SidSingle,
    /// N stations, N columns, timestamps implied by start time and interval
    SuperSidPlain,
    /// N stations, leading timestamp column
    SuperSidExtended,
}

impl FileFormat {
    pub fn of(record: &DailyRecord) -> Self {
        match (record.is_supersid(), record.is_extended()) {
            (false, _) => FileFormat::SidSingle,
            (true, false) => FileFormat::SuperSidPlain,
            (true, true) => FileFormat::SuperSidExtended,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Always parse the timestamp column of single-station files.
    /// Otherwise a full day is assumed to sit on the `UTC_StartTime + k * LogInterval` grid
    /// and its timestamps are regenerated, dropping the offset of any late capture.
    pub force_read_timestamp: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub log_type: LogType,
    /// Only honoured for `LogType::Filtered`
    pub apply_filter: bool,
    pub extended: bool,
    pub wing: usize,
    /// Hours to rotate filtered output by, towards local time
    pub gmt_offset: i32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            log_type: LogType::Raw,
            apply_filter: true,
            extended: false,
            wing: DEFAULT_WING,
            gmt_offset: 0,
        }
    }
}

impl WriteOptions {
    pub fn new(log_type: LogType) -> Self {
        Self {
            log_type,
            ..Default::default()
        }
    }

    pub fn extended(mut self, extended: bool) -> Self {
        self.extended = extended;
        self
    }

    pub fn apply_filter(mut self, apply: bool) -> Self {
        self.apply_filter = apply;
        self
    }

    pub fn wing(mut self, wing: usize) -> Self {
        self.wing = wing;
        self
    }

    pub fn gmt_offset(mut self, hours: i32) -> Self {
        self.gmt_offset = hours;
        self
    }

    fn filters(&self) -> bool {
        self.log_type == LogType::Filtered && self.apply_filter
    }
}

/// Read a SID or SuperSID file
pub fn read(path: impl AsRef<Path>) -> Result<DailyRecord> {
    read_with(path, ReadOptions::default())
}

pub fn read_with(path: impl AsRef<Path>, opts: ReadOptions) -> Result<DailyRecord> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| SidError::io(path, e))?;
    let record = decode(&text, opts).map_err(|source| SidError::Decode {
        path: path.to_owned(),
        source,
    })?;
    debug!(
        path = %path.display(),
        format = ?FileFormat::of(&record),
        rows = record.len(),
        "Read file"
    );
    Ok(record)
}

/// Parse the full text of a file
pub fn decode(text: &str, opts: ReadOptions) -> Result<DailyRecord, DecodeError> {
    let mut params = SidParams::new();
    let mut lines = text.lines().enumerate().peekable();
    while let Some((_, line)) = lines.next_if(|(_, l)| l.starts_with('#')) {
        params.parse_line(line);
    }
    // Line numbers are 1-based for error messages
    let rows: Vec<(usize, &str)> = lines
        .filter(|(_, l)| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        })
        .map(|(i, l)| (i + 1, l))
        .collect();

    let (supersid, stations) = header_stations(&params)?;
    let log_interval = header_log_interval(&mut params)?;
    let start_time = header_start_time(&mut params)?;

    let &(first_line, first_row) = rows.first().ok_or(DecodeError::NoData)?;
    let first_field = first_row.split(',').next().unwrap_or_default().trim();
    let has_timestamp = first_field.contains(':');
    let format = if has_timestamp {
        parse_timestamp(first_field)
            .map(|(_, f)| f)
            .ok_or_else(|| DecodeError::InvalidTimestamp {
                line: first_line,
                value: first_field.to_owned(),
            })?
    } else {
        TimestampFormat::Standard
    };

    let n = stations.len();
    let (data, timestamps) = if supersid {
        decode_rows(&rows, n, has_timestamp)?
    } else {
        let read_timestamps = rows.len() != slots_per_day(log_interval)
            || opts.force_read_timestamp
            || format.is_extended();
        if read_timestamps {
            decode_rows(&rows, 1, true)?
        } else {
            // Full day at the nominal interval: timestamps follow from the start time
            decode_values_only(&rows)?
        }
    };

    DailyRecord::from_parts(
        params,
        stations,
        log_interval,
        start_time,
        format,
        data,
        timestamps,
    )
}

fn header_stations(params: &SidParams) -> Result<(bool, Vec<Station>), DecodeError> {
    let (supersid, calls, freqs, freq_key) = if let Some(calls) = params.get(params::STATIONS) {
        let freqs = params.get(params::FREQUENCIES).unwrap_or_default();
        (true, calls, freqs, params::FREQUENCIES)
    } else if let Some(call) = params.get(params::STATION_ID) {
        let freq = params.get(params::FREQUENCY).unwrap_or_default();
        (false, call, freq, params::FREQUENCY)
    } else {
        return Err(DecodeError::MissingStations);
    };

    let calls: Vec<&str> = calls.split(',').map(str::trim).collect();
    let freqs: Vec<&str> = freqs.split(',').map(str::trim).collect();
    if calls.len() != freqs.len() {
        return Err(DecodeError::StationFrequencyCount {
            stations: calls.len(),
            frequencies: freqs.len(),
        });
    }
    let stations = calls
        .into_iter()
        .zip(freqs)
        .map(|(call, freq)| -> Result<Station, DecodeError> {
            let frequency = freq.parse().map_err(|_| DecodeError::InvalidHeader {
                key: freq_key.to_owned(),
                value: freq.to_owned(),
            })?;
            Ok(Station::new(call, frequency))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((supersid, stations))
}

fn header_log_interval(params: &mut SidParams) -> Result<u32, DecodeError> {
    let interval = match params.parse_as::<u32>(params::LOG_INTERVAL) {
        Some(parsed) => parsed?,
        None => {
            warn!("LogInterval is missing, assuming {FALLBACK_LOG_INTERVAL} s");
            params.set(params::LOG_INTERVAL[0], FALLBACK_LOG_INTERVAL.to_string());
            FALLBACK_LOG_INTERVAL
        }
    };
    if interval == 0 || SECONDS_PER_DAY % interval != 0 {
        return Err(DecodeError::InvalidHeader {
            key: params::LOG_INTERVAL[0].to_owned(),
            value: interval.to_string(),
        });
    }
    Ok(interval)
}

fn header_start_time(params: &mut SidParams) -> Result<NaiveDateTime, DecodeError> {
    match params.get_any(params::UTC_START) {
        Some(raw) => parse_timestamp(raw)
            .map(|(t, _)| t)
            .ok_or_else(|| DecodeError::InvalidHeader {
                key: params::UTC_START[0].to_owned(),
                value: raw.to_owned(),
            }),
        None => {
            let start = midnight(Utc::now().date_naive());
            warn!("UTC_StartTime is missing, assuming {start}");
            params.set(params::UTC_START[0], TimestampFormat::Standard.format(&start));
            Ok(start)
        }
    }
}

fn parse_value(line: usize, column: usize, field: &str) -> Result<f64, DecodeError> {
    field
        .trim()
        .parse()
        .map_err(|_| DecodeError::InvalidValue {
            line,
            column,
            value: field.trim().to_owned(),
        })
}

type Columns = (Vec<Vec<f64>>, Option<Vec<NaiveDateTime>>);

/// Decode rows of `[timestamp,] v1, ..., vn`
fn decode_rows(
    rows: &[(usize, &str)],
    stations: usize,
    with_timestamp: bool,
) -> Result<Columns, DecodeError> {
    let expected = stations + usize::from(with_timestamp);
    let mut data = vec![Vec::with_capacity(rows.len()); stations];
    let mut timestamps = Vec::with_capacity(if with_timestamp { rows.len() } else { 0 });
    for &(line, row) in rows {
        let fields: Vec<&str> = row.split(',').collect();
        if fields.len() != expected {
            return Err(DecodeError::FieldCount {
                line,
                expected,
                found: fields.len(),
            });
        }
        let values = if with_timestamp {
            let (t, _) = parse_timestamp(fields[0]).ok_or_else(|| DecodeError::InvalidTimestamp {
                line,
                value: fields[0].trim().to_owned(),
            })?;
            timestamps.push(t);
            &fields[1..]
        } else {
            &fields[..]
        };
        for (column, (field, target)) in values.iter().zip(data.iter_mut()).enumerate() {
            let column = column + 1 + usize::from(with_timestamp);
            target.push(parse_value(line, column, field)?);
        }
    }
    Ok((data, with_timestamp.then_some(timestamps)))
}

/// Decode only the value column of `timestamp, value` rows
fn decode_values_only(rows: &[(usize, &str)]) -> Result<Columns, DecodeError> {
    let values = rows
        .iter()
        .map(|&(line, row)| {
            let fields: Vec<&str> = row.split(',').collect();
            if fields.len() != 2 {
                return Err(DecodeError::FieldCount {
                    line,
                    expected: 2,
                    found: fields.len(),
                });
            }
            parse_value(line, 2, fields[1])
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((vec![values], None))
}

impl DailyRecord {
    /// Header block. `station` selects the single-station layout.
    pub fn header(&self, station: Option<&Station>, log_type: LogType) -> Result<String> {
        let p = &self.params;
        let mut hdr = format!("# Site = {}\n", p.require(params::SITE)?);
        if let Some(contact) = p.get_any(params::CONTACT) {
            hdr += &format!("# Contact = {contact}\n");
        }
        if let Some(version) = p.get_any(params::VERSION) {
            hdr += &format!("# Supersid_Version = {version}\n");
        }
        hdr += &format!("# Longitude = {}\n", p.require(params::LONGITUDE)?);
        hdr += &format!("# Latitude = {}\n", p.require(params::LATITUDE)?);
        hdr += "#\n";
        hdr += &format!("# UTC_Offset = {}\n", p.require(params::UTC_OFFSET)?);
        hdr += &format!("# TimeZone = {}\n", p.require(params::TIME_ZONE)?);
        hdr += "#\n";
        hdr += &format!(
            "# UTC_StartTime = {}\n",
            TimestampFormat::Standard.format(&self.start_time)
        );
        hdr += &format!("# LogInterval = {}\n", self.log_interval);
        hdr += &format!("# LogType = {log_type}\n");
        hdr += &format!("# MonitorID = {}\n", p.require(params::MONITOR_ID)?);
        match station {
            Some(station) => {
                hdr += &format!("# StationID = {}\n", station.call_sign);
                hdr += &format!("# Frequency = {}\n", station.frequency);
            }
            None => {
                let calls: Vec<&str> = self.stations.iter().map(|s| s.call_sign.as_str()).collect();
                let freqs: Vec<String> =
                    self.stations.iter().map(|s| s.frequency.to_string()).collect();
                hdr += &format!("# Stations = {}\n", calls.join(","));
                hdr += &format!("# Frequencies = {}\n", freqs.join(","));
            }
        }
        Ok(hdr)
    }

    /// Write one station in the single-station format
    pub fn write_single(
        &self,
        call_sign: &str,
        path: impl AsRef<Path>,
        opts: &WriteOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SidError::io(path, e))?;
        self.write_single_to(call_sign, BufWriter::new(file), opts)
            .map_err(|e| into_path_error(e, path))
    }

    pub fn write_single_to<W: Write>(
        &self,
        call_sign: &str,
        mut w: W,
        opts: &WriteOptions,
    ) -> Result<()> {
        let idx = self.station_index(call_sign)?;
        let hdr = self.header(Some(&self.stations[idx]), opts.log_type)?;
        let values = self.prepared(&self.data[idx], opts);
        let ts_format = TimestampFormat::from_extended(opts.extended);

        let io = |e| SidError::io("<stream>", e);
        w.write_all(hdr.as_bytes()).map_err(io)?;
        for (t, v) in self.timestamps.iter().zip(values.iter()) {
            writeln!(w, "{}, {v:.15}", ts_format.format(t)).map_err(io)?;
        }
        w.flush().map_err(io)
    }

    /// Write every station in the multi-station format
    pub fn write_multi(&self, path: impl AsRef<Path>, opts: &WriteOptions) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| SidError::io(path, e))?;
        self.write_multi_to(BufWriter::new(file), opts)
            .map_err(|e| into_path_error(e, path))
    }

    pub fn write_multi_to<W: Write>(&self, mut w: W, opts: &WriteOptions) -> Result<()> {
        let hdr = self.header(None, opts.log_type)?;
        let columns: Vec<Vec<f64>> = self
            .data
            .iter()
            .map(|raw| self.prepared(raw, opts).into_owned())
            .collect();

        let io = |e| SidError::io("<stream>", e);
        w.write_all(hdr.as_bytes()).map_err(io)?;
        let mut line = String::new();
        for (row, t) in self.timestamps.iter().enumerate() {
            line.clear();
            if opts.extended {
                line += &TimestampFormat::Extended.format(t);
                line += ", ";
            }
            let values: Vec<String> = columns.iter().map(|c| format!("{:.15}", c[row])).collect();
            line += &values.join(", ");
            writeln!(w, "{line}").map_err(io)?;
        }
        w.flush().map_err(io)
    }

    /// Write in `format`; a single-station format needs `call_sign`
    pub fn write_format(
        &self,
        format: FileFormat,
        call_sign: Option<&str>,
        path: impl AsRef<Path>,
        opts: &WriteOptions,
    ) -> Result<()> {
        match format {
            FileFormat::SidSingle => {
                let call_sign = match call_sign {
                    Some(c) => c,
                    None => self
                        .stations
                        .first()
                        .map(|s| s.call_sign.as_str())
                        .ok_or_else(|| SidError::StationNotFound(String::new()))?,
                };
                self.write_single(call_sign, path, opts)
            }
            FileFormat::SuperSidPlain => self.write_multi(path, &opts.extended(false)),
            FileFormat::SuperSidExtended => self.write_multi(path, &opts.extended(true)),
        }
    }

    fn prepared<'a>(&self, raw: &'a [f64], opts: &WriteOptions) -> std::borrow::Cow<'a, [f64]> {
        if opts.filters() {
            let filter =
                BemaFilter::new(opts.wing).with_gmt_offset(opts.gmt_offset, self.log_interval);
            std::borrow::Cow::Owned(filter.apply(raw))
        } else {
            std::borrow::Cow::Borrowed(raw)
        }
    }
}

// Stream writers don't know the path; attach it here
fn into_path_error(err: SidError, path: &Path) -> SidError {
    match err {
        SidError::Io { source, .. } => SidError::io(path, source),
        other => other,
    }
}
