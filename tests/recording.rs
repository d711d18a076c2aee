use std::{fs, path::Path, sync::Arc};

use chrono::{NaiveDate, TimeZone, Utc};
use crossbeam_channel::unbounded;
use sid_logger::{
    capture::{Capture, SyntheticSource},
    clock::{SampleClock, SimulatedTime},
    codec::{self, WriteOptions},
    config::Config,
    continuation::{AssumeYes, ContinuationResolver, MismatchReport},
    error::MismatchKind,
    logger::Recorder,
    params::{midnight, LogType},
    DailyRecord, SidError,
};

const TICKS_PER_DAY: usize = 17280;

fn config(dir: &Path) -> Config {
    let text = format!(
        r#"
[parameters]
site_name = "TESTSITE"
longitude = "2.35"
latitude = "48.85"
utc_offset = "+01:00"
time_zone = "CET"
monitor_id = "M01"
log_type = "raw"
log_format = "both"
log_interval = 5
number_of_stations = 2
audio_sampling_rate = 48000
data_path = "{}"

[[station]]
call_sign = "NWC"
frequency = 24000

[[station]]
call_sign = "JJI"
frequency = 22200
"#,
        dir.display().to_string().replace('\\', "/")
    );
    Config::from_toml(&text).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

#[test]
fn full_day_of_synthetic_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let source = SyntheticSource::with_levels(&cfg.stations, 48000, &[1.0, 2.0]);
    let mut capture = Capture::new(Box::new(source), &cfg.stations, 48000);
    let yesterday = DailyRecord::new(
        cfg.header_params(),
        cfg.stations.clone(),
        5,
        midnight(day(1).pred_opt().unwrap()),
    );
    let recorder = Recorder::with_record(cfg, yesterday);

    // First tick lands on 2024-06-01 00:00:00 and rolls the record over
    let time = Arc::new(SimulatedTime::new(
        Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 55).unwrap(),
    ));
    let (tx, rx) = unbounded();
    let tick_recorder = recorder.clone();
    let mut count = 0;
    let mut clock = SampleClock::start_with(5, time, move |tick| {
        if count < TICKS_PER_DAY {
            count += 1;
            tick_recorder.record_tick(tick, &mut capture)?;
            let _ = tx.send(tick.index);
        }
        Ok(())
    });
    let indices: Vec<usize> = rx.iter().take(TICKS_PER_DAY).collect();
    clock.stop();
    assert_eq!(indices, (0..TICKS_PER_DAY).collect::<Vec<_>>());

    let out = dir.path().join("day.csv");
    recorder
        .lock()
        .write_multi(&out, &WriteOptions::new(LogType::Raw))
        .unwrap();
    let text = fs::read_to_string(&out).unwrap();
    let (header, rows): (Vec<&str>, Vec<&str>) = text.lines().partition(|l| l.starts_with('#'));
    assert_eq!(header.len(), 14);
    assert!(header.contains(&"# UTC_StartTime = 2024-06-01 00:00:00"));
    assert!(header.contains(&"# Stations = NWC,JJI"));
    assert_eq!(rows.len(), TICKS_PER_DAY);
    assert!(rows
        .iter()
        .all(|r| *r == "1.000000000000000, 2.000000000000000"));

    // The rollover saved the previous, empty day
    let previous = codec::read(dir.path().join("TESTSITE_2024-05-31.csv")).unwrap();
    assert!(previous.station_data("NWC").unwrap().iter().all(|v| *v == 0.0));
}

#[test]
fn filtered_file_is_not_continued() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let path = dir.path().join("previous.csv");
    let mut previous = DailyRecord::new(cfg.header_params(), cfg.stations.clone(), 5, midnight(day(1)));
    previous.set_sample(10, 0, 3.0).unwrap();
    previous
        .write_multi(&path, &WriteOptions::new(LogType::Filtered))
        .unwrap();

    let live = DailyRecord::new(cfg.header_params(), cfg.stations.clone(), 5, midnight(day(1)));
    let recorder = Recorder::with_record(cfg, live);
    let mut resolver = ContinuationResolver::new(|_: &MismatchReport| false).on_date(day(1));
    let err = recorder.continue_from(&path, &mut resolver).unwrap_err();
    assert!(matches!(
        err,
        SidError::ContinuationDeclined(MismatchKind::LogType)
    ));
    assert_eq!(err.exit_code(), 10);
    assert_eq!(recorder.lock().station_data("NWC").unwrap()[10], 0.0);
}

#[test]
fn accepted_continuation_keeps_samples() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let path = dir.path().join("previous.csv");
    let mut previous = DailyRecord::new(cfg.header_params(), cfg.stations.clone(), 5, midnight(day(1)));
    previous.set_sample(10, 1, 7.5).unwrap();
    previous
        .write_multi(&path, &WriteOptions::new(LogType::Raw).extended(true))
        .unwrap();

    let live = DailyRecord::new(cfg.header_params(), cfg.stations.clone(), 5, midnight(day(2)));
    let recorder = Recorder::with_record(cfg, live);
    // Yesterday's file: only the date differs
    let mut resolver = ContinuationResolver::new(AssumeYes).on_date(day(2));
    assert_eq!(recorder.continue_from(&path, &mut resolver).unwrap(), 2);
    assert_eq!(recorder.lock().station_data("JJI").unwrap()[10], 7.5);
}

#[test]
fn saved_files_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let mut record = DailyRecord::new(cfg.header_params(), cfg.stations.clone(), 5, midnight(day(1)));
    for i in 0..record.len() {
        record.set_sample(i, 0, (i % 100) as f64 / 8.0).unwrap();
        record.set_sample(i, 1, 1.0 + (i % 3) as f64).unwrap();
    }
    let recorder = Recorder::with_record(cfg, record);
    let written = recorder
        .save_current_buffers(None, LogType::Raw, sid_logger::config::LogFormat::Both)
        .unwrap();
    assert_eq!(written.len(), 3);

    let live = recorder.lock();
    for path in &written {
        let back = codec::read(path).unwrap();
        for station in back.stations() {
            assert_eq!(
                back.station_data(&station.call_sign).unwrap(),
                live.station_data(&station.call_sign).unwrap()
            );
        }
        assert_eq!(back.timestamps(), live.timestamps());
    }
}
