//! Offline utilities over recorded files: inspect, split, merge and filter.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    codec::{self, FileFormat, ReadOptions, WriteOptions},
    error::{DecodeError, Result, SidError},
    params::{LogType, TimestampFormat},
    record::DailyRecord,
};

/// `<dir>/<stem>.<tag>.<ext>` next to `path`
fn sibling(path: &Path, tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{tag}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{tag}"),
    };
    path.with_file_name(name)
}

fn log_type_of(record: &DailyRecord) -> LogType {
    record.params().log_type().unwrap_or(LogType::Raw)
}

fn write_like(record: &DailyRecord, path: &Path, opts: WriteOptions) -> Result<()> {
    let opts = opts.extended(record.is_extended());
    record.write_format(FileFormat::of(record), None, path, &opts)
}

/// Human readable description of a file
pub fn info(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let record = codec::read_with(
        path,
        ReadOptions {
            force_read_timestamp: true,
        },
    )?;

    let calls: Vec<&str> = record.stations().iter().map(|s| s.call_sign.as_str()).collect();
    let mut out = format!("{}\n", path.display());
    out += &format!("Format: {:?}\n", FileFormat::of(&record));
    out += &format!("Stations: {}\n", calls.join(", "));
    out += &format!(
        "Start time: {}\n",
        TimestampFormat::Standard.format(&record.start_time())
    );
    out += &format!("Timestamps: {}\n", record.timestamps().len());
    out += &format!("Data: {} x {}\n", record.stations().len(), record.len());

    // First rows with a signal, skipping the leading zero-filled part of a partial day
    let first = (0..record.len())
        .find(|&row| record.data().iter().any(|c| c[row] != 0.0))
        .unwrap_or(0);
    out += &format!("Rows from {first}:\n");
    for row in first..record.len().min(first + 5) {
        let values: Vec<String> = record.data().iter().map(|c| format!("{:.6}", c[row])).collect();
        out += &format!(
            "  {}  {}\n",
            record.timestamp_format().format(&record.timestamps()[row]),
            values.join(", ")
        );
    }

    out += "Header:\n";
    for (key, value) in record.params().iter() {
        out += &format!("  {key} = {value}\n");
    }
    Ok(out)
}

/// Write each station of a multi-station file into its own single-station file
pub fn split(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let record = codec::read(path)?;
    let opts = WriteOptions::new(log_type_of(&record))
        .apply_filter(false)
        .extended(record.is_extended());
    let dir = path.parent().unwrap_or_else(|| Path::new(""));

    let mut written = Vec::new();
    for station in record.stations() {
        let name = record.sid_filename(&station.call_sign)?;
        let target = dir.join(sibling(Path::new(&name), "split"));
        record.write_single(&station.call_sign, &target, &opts)?;
        info!(path = %target.display(), "Split");
        written.push(target);
    }
    Ok(written)
}

fn add_into(target: &mut [f64], source: &[f64], station: &str) -> Result<(), DecodeError> {
    if target.len() != source.len() {
        return Err(DecodeError::LengthMismatch {
            station: station.to_owned(),
            expected: target.len(),
            found: source.len(),
        });
    }
    for (t, s) in target.iter_mut().zip(source) {
        *t += s;
    }
    Ok(())
}

/// Add the samples of `b` into `a` and write the sum as `<a-stem>.merge.<ext>`.
/// When exactly one file is single-station, the sum is written in its format.
pub fn merge(a: impl AsRef<Path>, b: impl AsRef<Path>) -> Result<PathBuf> {
    let (a, b) = (a.as_ref(), b.as_ref());
    let first = codec::read(a)?;
    let second = codec::read(b)?;

    let (mut base, other, base_path, other_path) =
        match (first.is_supersid(), second.is_supersid()) {
            (true, false) => (second, first, b, a),
            _ => (first, second, a, b),
        };
    let mismatch = |source| SidError::Decode {
        path: other_path.to_owned(),
        source,
    };

    let calls: Vec<String> = base.stations().iter().map(|s| s.call_sign.clone()).collect();
    match (base.is_supersid(), other.is_supersid()) {
        // Two single-station files add element-wise whatever their stations
        (false, false) => {
            let source = other.station_data_by_index(0)?.to_vec();
            let target = base.station_data_mut(&calls[0])?;
            add_into(target, &source, &calls[0]).map_err(mismatch)?;
        }
        _ => {
            let mut matched = 0;
            for call in &calls {
                let Ok(source) = other.station_data(call) else {
                    continue;
                };
                let target = base.station_data_mut(call)?;
                add_into(target, source, call).map_err(mismatch)?;
                matched += 1;
            }
            if matched == 0 {
                return Err(SidError::StationNotFound(calls.join(",")));
            }
        }
    }

    let target = sibling(base_path, "merge");
    let opts = WriteOptions::new(log_type_of(&base)).apply_filter(false);
    write_like(&base, &target, opts)?;
    info!(path = %target.display(), "Merged");
    Ok(target)
}

/// Write a BEMA-filtered copy `<stem>.filtered.<ext>` in the file's own format.
/// A non-zero `gmt_offset` rotates the filtered curve by that many hours.
pub fn filter(path: impl AsRef<Path>, wing: usize, gmt_offset: i32) -> Result<PathBuf> {
    let path = path.as_ref();
    let record = codec::read(path)?;
    if log_type_of(&record) != LogType::Raw {
        warn!(path = %path.display(), "Input is not raw data, filtering it again");
    }
    let target = sibling(path, "filtered");
    let opts = WriteOptions::new(LogType::Filtered)
        .wing(wing)
        .gmt_offset(gmt_offset);
    write_like(&record, &target, opts)?;
    info!(path = %target.display(), wing, gmt_offset, "Filtered");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        filter::bema,
        params::{midnight, SidParams},
        record::Station,
    };
    use chrono::NaiveDate;

    fn params() -> SidParams {
        [
            ("site", "TESTSITE"),
            ("longitude", "2.35"),
            ("latitude", "48.85"),
            ("utc_offset", "+01:00"),
            ("timezone", "CET"),
            ("monitorid", "M01"),
            ("logtype", "raw"),
        ]
        .into_iter()
        .collect()
    }

    fn record(calls: &[&str], fill: f64) -> DailyRecord {
        let stations = calls.iter().map(|c| Station::new(*c, 20000)).collect();
        let start = midnight(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let mut rec = DailyRecord::new(params(), stations, 5, start);
        for s in 0..calls.len() {
            for i in 0..rec.len() {
                rec.set_sample(i, s, fill + s as f64 + (i % 7) as f64).unwrap();
            }
        }
        rec
    }

    fn raw() -> WriteOptions {
        WriteOptions::new(LogType::Raw)
    }

    #[test]
    fn sibling_names() {
        assert_eq!(
            sibling(Path::new("/d/SITE_2024-06-01.csv"), "merge"),
            PathBuf::from("/d/SITE_2024-06-01.merge.csv")
        );
        assert_eq!(sibling(Path::new("noext"), "x"), PathBuf::from("noext.x"));
    }

    #[test]
    fn split_writes_one_file_per_station() {
        let dir = tempfile::tempdir().unwrap();
        let multi = dir.path().join("TESTSITE_2024-06-01.csv");
        let rec = record(&["NWC", "JJI"], 1.0);
        rec.write_multi(&multi, &raw()).unwrap();

        let written = split(&multi).unwrap();
        assert_eq!(
            written,
            vec![
                dir.path().join("TESTSITE_NWC_2024-06-01.split.csv"),
                dir.path().join("TESTSITE_JJI_2024-06-01.split.csv"),
            ]
        );
        let jji = codec::read(&written[1]).unwrap();
        assert!(!jji.is_supersid());
        assert_eq!(jji.station_data("JJI").unwrap(), rec.station_data("JJI").unwrap());
    }

    #[test]
    fn merge_two_multi_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        record(&["NWC", "JJI"], 1.0).write_multi(&a, &raw()).unwrap();
        record(&["JJI", "DHO"], 10.0).write_multi(&b, &raw()).unwrap();

        let out = merge(&a, &b).unwrap();
        assert_eq!(out, dir.path().join("a.merge.csv"));
        let merged = codec::read(&out).unwrap();
        // JJI: 2.0 + i%7 in a, 10.0 + i%7 in b
        assert_eq!(merged.station_data("JJI").unwrap()[3], 2.0 + 3.0 + 10.0 + 3.0);
        // NWC has no partner
        assert_eq!(merged.station_data("NWC").unwrap()[3], 1.0 + 3.0);
    }

    #[test]
    fn merge_single_into_multi_targets_single() {
        let dir = tempfile::tempdir().unwrap();
        let multi = dir.path().join("multi.csv");
        let single = dir.path().join("single.csv");
        record(&["NWC", "JJI"], 1.0).write_multi(&multi, &raw()).unwrap();
        record(&["JJI"], 5.0).write_single("JJI", &single, &raw()).unwrap();

        let out = merge(&multi, &single).unwrap();
        assert_eq!(out, dir.path().join("single.merge.csv"));
        let merged = codec::read(&out).unwrap();
        assert!(!merged.is_supersid());
        assert_eq!(merged.station_data("JJI").unwrap()[0], 5.0 + 2.0);
    }

    #[test]
    fn merge_without_common_station_fails() {
        let dir = tempfile::tempdir().unwrap();
        let multi = dir.path().join("multi.csv");
        let single = dir.path().join("single.csv");
        record(&["NWC", "JJI"], 1.0).write_multi(&multi, &raw()).unwrap();
        record(&["DHO"], 5.0).write_single("DHO", &single, &raw()).unwrap();
        assert!(matches!(
            merge(&single, &multi),
            Err(SidError::StationNotFound(_))
        ));
    }

    #[test]
    fn merge_length_mismatch_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        record(&["NWC"], 1.0).write_single("NWC", &a, &raw()).unwrap();
        let stations = vec![Station::new("NWC", 20000)];
        let start = midnight(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        DailyRecord::new(params(), stations, 10, start)
            .write_single("NWC", &b, &raw())
            .unwrap();
        let err = merge(&a, &b).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn filter_keeps_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.csv");
        let rec = record(&["NWC", "JJI"], 1.0);
        rec.write_multi(&path, &raw().extended(true)).unwrap();

        let out = filter(&path, 3, 0).unwrap();
        assert_eq!(out, dir.path().join("day.filtered.csv"));
        let back = codec::read(&out).unwrap();
        assert!(back.is_extended());
        assert_eq!(back.params().log_type(), Some(LogType::Filtered));
        let expected = bema(rec.station_data("JJI").unwrap(), 3);
        let got = back.station_data("JJI").unwrap();
        assert!(got.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-12));
    }

    #[test]
    fn filter_rotates_by_gmt_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("TESTSITE_NWC_2024-06-01.csv");
        let rec = record(&["NWC"], 1.0);
        rec.write_single("NWC", &path, &raw()).unwrap();

        let out = filter(&path, 2, -1).unwrap();
        let back = codec::read(&out).unwrap();
        let mut expected = bema(rec.station_data("NWC").unwrap(), 2);
        expected.rotate_right(720);
        let got = back.station_data("NWC").unwrap();
        assert!(got.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-12));
    }

    #[test]
    fn info_lists_rows_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.csv");
        let mut rec = record(&["NWC"], 0.0);
        for i in 0..100 {
            rec.set_sample(i, 0, 0.0).unwrap();
        }
        rec.write_single("NWC", &path, &raw()).unwrap();

        let text = info(&path).unwrap();
        assert!(text.contains("Format: SidSingle"));
        assert!(text.contains("Stations: NWC"));
        assert!(text.contains("Timestamps: 17280"));
        assert!(text.contains("Rows from 100:"));
        assert!(text.contains("  site = TESTSITE"));
    }
}
