//! Station configuration, read from a TOML file.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;

use crate::{
    error::{Result, SidError},
    filter::DEFAULT_WING,
    params::{self, LogType, SidParams},
    record::{Station, SECONDS_PER_DAY},
};

const DEFAULT_DATA_PATH: &str = "../Data/";

/// Which files a save produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    SidFormat,
    SidExtended,
    SupersidFormat,
    SupersidExtended,
    Both,
    BothExtended,
}

impl LogFormat {
    /// One single-station file per station
    pub fn writes_sid(self) -> bool {
        matches!(
            self,
            LogFormat::SidFormat | LogFormat::SidExtended | LogFormat::Both | LogFormat::BothExtended
        )
    }

    /// One multi-station file
    pub fn writes_supersid(self) -> bool {
        matches!(
            self,
            LogFormat::SupersidFormat
                | LogFormat::SupersidExtended
                | LogFormat::Both
                | LogFormat::BothExtended
        )
    }

    pub fn extended(self) -> bool {
        matches!(
            self,
            LogFormat::SidExtended | LogFormat::SupersidExtended | LogFormat::BothExtended
        )
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sid_format" => Ok(LogFormat::SidFormat),
            "sid_extended" => Ok(LogFormat::SidExtended),
            "supersid_format" => Ok(LogFormat::SupersidFormat),
            "supersid_extended" => Ok(LogFormat::SupersidExtended),
            "both" => Ok(LogFormat::Both),
            "both_extended" => Ok(LogFormat::BothExtended),
            other => Err(format!(
                "'{other}' must be one of sid_format, sid_extended, supersid_format, \
                 supersid_extended, both, both_extended"
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogFormat::SidFormat => "sid_format",
            LogFormat::SidExtended => "sid_extended",
            LogFormat::SupersidFormat => "supersid_format",
            LogFormat::SupersidExtended => "supersid_extended",
            LogFormat::Both => "both",
            LogFormat::BothExtended => "both_extended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    parameters: RawParameters,
    #[serde(default, rename = "station")]
    stations: Vec<RawStation>,
}

#[derive(Debug, Deserialize)]
struct RawParameters {
    site_name: String,
    contact: Option<String>,
    longitude: String,
    latitude: String,
    utc_offset: String,
    time_zone: String,
    monitor_id: String,
    log_type: String,
    #[serde(default)]
    log_format: Option<String>,
    log_interval: u32,
    number_of_stations: usize,
    audio_sampling_rate: u32,
    #[serde(default)]
    hourly_save: Option<String>,
    #[serde(default)]
    data_path: Option<String>,
    #[serde(default)]
    bema_wing: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawStation {
    call_sign: String,
    frequency: u32,
}

/// Validated configuration of one logger run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub site_name: String,
    pub contact: Option<String>,
    pub longitude: String,
    pub latitude: String,
    pub utc_offset: String,
    pub time_zone: String,
    pub monitor_id: String,
    pub log_type: LogType,
    pub log_format: LogFormat,
    pub log_interval: u32,
    pub audio_sampling_rate: u32,
    pub hourly_save: bool,
    /// Existing directory all files are written into
    pub data_path: PathBuf,
    pub bema_wing: usize,
    pub stations: Vec<Station>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| SidError::io(path, e))?;
        Self::from_toml(&text).map_err(|e| match e {
            SidError::ConfigParse { source, .. } => SidError::ConfigParse {
                path: path.to_owned(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| SidError::ConfigParse {
            path: PathBuf::new(),
            source,
        })?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self> {
        let p = raw.parameters;

        let log_type = p
            .log_type
            .parse()
            .map_err(|e| SidError::config("log_type", e))?;
        let log_format = match &p.log_format {
            Some(s) => s.parse().map_err(|e| SidError::config("log_format", e))?,
            None => LogFormat::default(),
        };
        if p.log_interval <= 2 {
            return Err(SidError::config("log_interval", "must be > 2, too fast"));
        }
        if SECONDS_PER_DAY % p.log_interval != 0 {
            return Err(SidError::config(
                "log_interval",
                format!("{} does not divide a day evenly", p.log_interval),
            ));
        }
        if p.audio_sampling_rate == 0 {
            return Err(SidError::config("audio_sampling_rate", "must be positive"));
        }
        let hourly_save = match p.hourly_save.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("no") => false,
            Some("yes") => true,
            Some(other) => {
                return Err(SidError::config(
                    "hourly_save",
                    format!("'{other}' must be either 'yes' or 'no'"),
                ))
            }
        };
        if p.number_of_stations != raw.stations.len() {
            return Err(SidError::config(
                "number_of_stations",
                format!(
                    "{} announced but {} [[station]] tables found",
                    p.number_of_stations,
                    raw.stations.len()
                ),
            ));
        }
        if raw.stations.is_empty() {
            return Err(SidError::config("station", "no station to log"));
        }
        let data_path = PathBuf::from(p.data_path.as_deref().unwrap_or(DEFAULT_DATA_PATH));
        if !data_path.is_dir() {
            return Err(SidError::config(
                "data_path",
                format!("{} is not a valid directory", data_path.display()),
            ));
        }

        Ok(Self {
            site_name: p.site_name,
            contact: p.contact,
            longitude: p.longitude,
            latitude: p.latitude,
            utc_offset: p.utc_offset,
            time_zone: p.time_zone,
            monitor_id: p.monitor_id,
            log_type,
            log_format,
            log_interval: p.log_interval,
            audio_sampling_rate: p.audio_sampling_rate,
            hourly_save,
            data_path,
            bema_wing: p.bema_wing.unwrap_or(DEFAULT_WING),
            stations: raw
                .stations
                .into_iter()
                .map(|s| Station::new(s.call_sign, s.frequency))
                .collect(),
        })
    }

    /// Header parameters for a fresh record of this run
    pub fn header_params(&self) -> SidParams {
        let mut p = SidParams::new();
        p.set(params::SITE[0], &self.site_name);
        if let Some(contact) = &self.contact {
            p.set(params::CONTACT[0], contact);
        }
        p.set(params::VERSION[0], env!("CARGO_PKG_VERSION"));
        p.set(params::LONGITUDE[0], &self.longitude);
        p.set(params::LATITUDE[0], &self.latitude);
        p.set(params::UTC_OFFSET[0], &self.utc_offset);
        p.set(params::TIME_ZONE[0], &self.time_zone);
        p.set(params::LOG_INTERVAL[0], self.log_interval.to_string());
        p.set(params::LOG_TYPE[0], self.log_type.as_str());
        p.set(params::MONITOR_ID[0], &self.monitor_id);
        if let [station] = self.stations.as_slice() {
            p.set(params::STATION_ID, &station.call_sign);
            p.set(params::FREQUENCY, station.frequency.to_string());
        } else {
            let calls: Vec<&str> = self.stations.iter().map(|s| s.call_sign.as_str()).collect();
            let freqs: Vec<String> = self.stations.iter().map(|s| s.frequency.to_string()).collect();
            p.set(params::STATIONS, calls.join(","));
            p.set(params::FREQUENCIES, freqs.join(","));
        }
        p
    }

    /// `key = value` listing for the console
    pub fn describe(&self) -> String {
        let mut out = format!(
            "site_name = {}\nmonitor_id = {}\nlongitude = {}\nlatitude = {}\n\
             utc_offset = {}\ntime_zone = {}\nlog_type = {}\nlog_format = {}\n\
             log_interval = {}\naudio_sampling_rate = {}\nhourly_save = {}\n\
             data_path = {}\nbema_wing = {}\n",
            self.site_name,
            self.monitor_id,
            self.longitude,
            self.latitude,
            self.utc_offset,
            self.time_zone,
            self.log_type,
            self.log_format,
            self.log_interval,
            self.audio_sampling_rate,
            if self.hourly_save { "yes" } else { "no" },
            self.data_path.display(),
            self.bema_wing,
        );
        for s in &self.stations {
            out += &format!("station {} = {} Hz\n", s.call_sign, s.frequency);
        }
        out
    }
}
