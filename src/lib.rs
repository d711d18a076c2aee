//! Sudden Ionospheric Disturbance logger: records the strength of VLF transmitters
//! into daily SID/SuperSID files.

pub mod args;
pub mod capture;
pub mod clock;
pub mod codec;
pub mod config;
pub mod continuation;
pub mod error;
pub mod filter;
pub mod logger;
pub mod params;
pub mod record;
pub mod tools;

pub use error::{Result, SidError};
pub use filter::bema;
pub use record::{DailyRecord, Station};
