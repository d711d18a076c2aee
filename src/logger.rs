//! The recorder ties capture, the live record and the file writers together.
//!
//! The record sits behind a mutex shared by the clock thread (one `on_tick` per interval)
//! and the control thread (manual saves). Every read or write of the record takes the lock,
//! so a save never sees a half-stored tick.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, error, info};

use crate::{
    capture::Capture,
    clock::Tick,
    codec::WriteOptions,
    config::{Config, LogFormat},
    continuation::{Confirm, ContinuationResolver},
    error::Result,
    params::{LogType, TimestampFormat},
    record::DailyRecord,
};

#[derive(Clone)]
pub struct Recorder {
    config: Arc<Config>,
    record: Arc<Mutex<DailyRecord>>,
}

impl Recorder {
    /// A recorder with an empty record for the current UTC day
    pub fn new(config: Config) -> Self {
        let record = DailyRecord::for_today(
            config.header_params(),
            config.stations.clone(),
            config.log_interval,
        );
        Self::with_record(config, record)
    }

    pub fn with_record(config: Config, record: DailyRecord) -> Self {
        Self {
            config: Arc::new(config),
            record: Arc::new(Mutex::new(record)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Exclusive access to the live record
    pub fn lock(&self) -> MutexGuard<'_, DailyRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Preload the live record from a file of an earlier run
    pub fn continue_from<C: Confirm>(
        &self,
        path: impl AsRef<Path>,
        resolver: &mut ContinuationResolver<C>,
    ) -> Result<usize> {
        let mut record = self.lock();
        resolver.resolve(path, &mut record)
    }

    /// Capture and store one tick
    pub fn record_tick(&self, tick: &Tick, capture: &mut Capture) -> Result<Vec<PathBuf>> {
        let strengths = capture.signal_strengths();
        self.on_tick(tick, &strengths)
    }

    /// Store the strengths of one tick. On the hour the record is snapshotted, and on the
    /// first tick of a new UTC day the old day is saved and the record rolled over.
    /// `None` leaves that station's slot untouched. Returns the files written.
    ///
    /// A failed save never blocks the rollover or the tick itself: every step still runs
    /// and the first save error is returned afterwards.
    pub fn on_tick(&self, tick: &Tick, strengths: &[Option<f64>]) -> Result<Vec<PathBuf>> {
        let mut record = self.lock();
        let mut written = Vec::new();
        let mut failure = None;
        let now = tick.utc_now;

        let mut keep = |saved: Result<Vec<PathBuf>>, written: &mut Vec<PathBuf>| match saved {
            Ok(paths) => written.extend(paths),
            Err(e) => {
                failure.get_or_insert(e);
            }
        };

        if self.config.hourly_save && now.minute() == 0 && now.second() < self.config.log_interval
        {
            let name = format!("hourly_current_buffers.raw.ext.{}.csv", record.start_date());
            keep(
                self.save_locked(&record, Some(&name), LogType::Raw, LogFormat::SupersidExtended),
                &mut written,
            );
        }
        if now.date_naive() != record.start_time().date() {
            // The record still holds the previous day
            keep(
                self.save_locked(&record, None, self.config.log_type, self.config.log_format),
                &mut written,
            );
            record.clear_at(true, now.naive_utc());
            info!(date = %record.start_date(), "New day");
        }

        let mut message = format!(
            "{}  [{}]  ",
            TimestampFormat::Extended.format(&now.naive_utc()),
            tick.index
        );
        for (idx, strength) in strengths.iter().enumerate() {
            let Some(value) = strength else {
                continue;
            };
            record.set_sample(tick.index, idx, *value)?;
            if let Some(station) = record.stations().get(idx) {
                message += &format!("{}={value:.6} ", station.call_sign);
            }
        }
        record.set_timestamp(tick.index, now.naive_utc())?;
        debug!("{}", message.trim_end());

        match failure {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Write the live record. `filename` overrides the multi-station file name;
    /// single-station files are always named after their station.
    pub fn save_current_buffers(
        &self,
        filename: Option<&str>,
        log_type: LogType,
        log_format: LogFormat,
    ) -> Result<Vec<PathBuf>> {
        let record = self.lock();
        self.save_locked(&record, filename, log_type, log_format)
    }

    /// Write every file `log_format` selects. A file that fails is logged and skipped;
    /// the first failure is returned once the others are written.
    fn save_locked(
        &self,
        record: &DailyRecord,
        filename: Option<&str>,
        log_type: LogType,
        log_format: LogFormat,
    ) -> Result<Vec<PathBuf>> {
        let opts = WriteOptions::new(log_type)
            .extended(log_format.extended())
            .wing(self.config.bema_wing);
        let data_path = &self.config.data_path;
        let mut written = Vec::new();
        let mut failure = None;

        let mut attempt = |path: Result<PathBuf>, write: &dyn Fn(&Path) -> Result<()>| {
            match path.and_then(|p| write(&p).map(|_| p)) {
                Ok(p) => {
                    info!(path = %p.display(), %log_type, "Saved");
                    written.push(p);
                }
                Err(e) => {
                    error!("Save failed: {e}");
                    failure.get_or_insert(e);
                }
            }
        };

        if log_format.writes_sid() {
            for station in record.stations() {
                let call = station.call_sign.as_str();
                attempt(
                    record.sid_filename(call).map(|name| data_path.join(name)),
                    &|p: &Path| record.write_single(call, p, &opts),
                );
            }
        }
        if log_format.writes_supersid() {
            let path = match filename {
                // An absolute name is used as is, `join` handles both
                Some(name) => Ok(data_path.join(name)),
                None => record.supersid_filename().map(|name| data_path.join(name)),
            };
            attempt(path, &|p: &Path| record.write_multi(p, &opts));
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// One-line summary for the console
    pub fn status(&self, now: DateTime<Utc>) -> String {
        let record = self.lock();
        format!(
            "{} UTC, {} stations, {} slots, day {}",
            TimestampFormat::Standard.format(&now.naive_utc()),
            record.stations().len(),
            record.len(),
            record.start_date()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec, params::midnight, record::Station};
    use std::fs;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn config(dir: &Path, hourly_save: bool) -> Config {
        Config {
            site_name: "TESTSITE".into(),
            contact: None,
            longitude: "2.35".into(),
            latitude: "48.85".into(),
            utc_offset: "+01:00".into(),
            time_zone: "CET".into(),
            monitor_id: "M01".into(),
            log_type: LogType::Raw,
            log_format: LogFormat::Both,
            log_interval: 5,
            audio_sampling_rate: 48000,
            hourly_save,
            data_path: dir.to_owned(),
            bema_wing: 6,
            stations: vec![Station::new("NWC", 24000), Station::new("JJI", 22200)],
        }
    }

    fn recorder(dir: &Path, hourly_save: bool) -> Recorder {
        let cfg = config(dir, hourly_save);
        let start = midnight(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let record = DailyRecord::new(cfg.header_params(), cfg.stations.clone(), 5, start);
        Recorder::with_record(cfg, record)
    }

    fn tick_at(t: DateTime<Utc>) -> Tick {
        Tick {
            index: crate::clock::data_index(&t, 5),
            utc_now: t,
            expected: t,
        }
    }

    #[test]
    fn stores_values_at_tick_index() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), false);
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 30).unwrap();
        let written = rec.on_tick(&tick_at(t), &[Some(1.5), None]).unwrap();
        assert!(written.is_empty());
        let record = rec.lock();
        assert_eq!(record.station_data("NWC").unwrap()[8646], 1.5);
        assert_eq!(record.station_data("JJI").unwrap()[8646], 0.0);
        assert_eq!(record.timestamps()[8646], t.naive_utc());
    }

    #[test]
    fn hourly_save_writes_extended_raw() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), true);
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).unwrap();
        let written = rec.on_tick(&tick_at(t), &[Some(1.0), Some(2.0)]).unwrap();
        assert_eq!(
            written,
            vec![dir
                .path()
                .join("hourly_current_buffers.raw.ext.2024-06-01.csv")]
        );
        let back = codec::read(&written[0]).unwrap();
        assert!(back.is_extended());
    }

    #[test]
    fn midnight_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), false);
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 55).unwrap();
        rec.on_tick(&tick_at(late), &[Some(3.0), Some(4.0)]).unwrap();

        let boundary = late + Duration::seconds(5);
        let written = rec.on_tick(&tick_at(boundary), &[Some(5.0), Some(6.0)]).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "TESTSITE_NWC_2024-06-01.csv",
                "TESTSITE_JJI_2024-06-01.csv",
                "TESTSITE_2024-06-01.csv"
            ]
        );
        let yesterday = codec::read(&written[2]).unwrap();
        assert_eq!(yesterday.station_data("JJI").unwrap()[17279], 4.0);

        let record = rec.lock();
        assert_eq!(record.start_date(), "2024-06-02");
        assert_eq!(record.station_data("NWC").unwrap()[0], 5.0);
        assert_eq!(record.station_data("NWC").unwrap()[17279], 0.0);
    }

    #[test]
    fn failed_midnight_save_still_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), false);
        // A directory where the NWC file should go makes its write fail
        fs::create_dir(dir.path().join("TESTSITE_NWC_2024-06-01.csv")).unwrap();

        let boundary = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        let err = rec
            .on_tick(&tick_at(boundary), &[Some(9.0), Some(8.0)])
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
        {
            let record = rec.lock();
            assert_eq!(record.start_date(), "2024-06-02");
            assert_eq!(record.station_data("NWC").unwrap()[0], 9.0);
        }
        // The other files of the old day were still written
        assert!(dir.path().join("TESTSITE_JJI_2024-06-01.csv").is_file());
        assert!(dir.path().join("TESTSITE_2024-06-01.csv").is_file());

        let next = boundary + Duration::seconds(5);
        let written = rec.on_tick(&tick_at(next), &[Some(7.0), Some(6.0)]).unwrap();
        assert!(written.is_empty());
        let record = rec.lock();
        assert_eq!(record.start_date(), "2024-06-02");
        assert_eq!(record.station_data("NWC").unwrap()[..2], [9.0, 7.0]);
    }

    #[test]
    fn failed_hourly_save_does_not_block_daily_save() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), true);
        fs::create_dir(dir.path().join("hourly_current_buffers.raw.ext.2024-06-01.csv")).unwrap();

        let boundary = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap();
        assert!(rec.on_tick(&tick_at(boundary), &[Some(1.0), Some(2.0)]).is_err());
        assert!(dir.path().join("TESTSITE_2024-06-01.csv").is_file());
        assert_eq!(rec.lock().start_date(), "2024-06-02");
    }

    #[test]
    fn late_first_tick_of_day_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), false);
        // More than one interval past midnight
        let late = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 6).unwrap();
        let written = rec.on_tick(&tick_at(late), &[Some(4.0), Some(5.0)]).unwrap();
        assert_eq!(written.len(), 3);
        assert!(written.contains(&dir.path().join("TESTSITE_2024-06-01.csv")));

        let record = rec.lock();
        assert_eq!(record.start_date(), "2024-06-02");
        assert_eq!(record.station_data("JJI").unwrap()[1], 5.0);
        assert_eq!(record.timestamps()[1], late.naive_utc());
    }

    #[test]
    fn later_hours_do_not_roll_over() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), false);
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap();
        assert!(rec.on_tick(&tick_at(t), &[Some(1.0), None]).unwrap().is_empty());
        assert_eq!(rec.lock().start_date(), "2024-06-01");
    }

    #[test]
    fn manual_save_respects_filename() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(dir.path(), false);
        let written = rec
            .save_current_buffers(Some("manual.csv"), LogType::Filtered, LogFormat::SupersidFormat)
            .unwrap();
        assert_eq!(written, vec![dir.path().join("manual.csv")]);
        let back = codec::read(&written[0]).unwrap();
        assert_eq!(back.params().log_type(), Some(LogType::Filtered));
    }

    #[test]
    fn write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recorder(&dir.path().join("missing"), false);
        let err = rec
            .save_current_buffers(None, LogType::Raw, LogFormat::SidFormat)
            .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
