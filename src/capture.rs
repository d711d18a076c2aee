//! This module contains the capture boundary
//!
//! Whatever sits upstream (sound card, SDR, an external DSP process) delivers one power
//! spectrum per tick. We only look up the FFT bins of the monitored stations.

use std::io::BufRead;

use tracing::warn;

use crate::{error::CaptureError, record::Station};

/// FFT length the bins are computed for
pub const NFFT: usize = 1024;

/// Produces one power spectrum per call, indexed by FFT bin
pub trait SpectrumSource: Send {
    fn capture(&mut self) -> Result<Vec<f64>, CaptureError>;
}

/// FFT bin holding `frequency` Hz
pub fn monitored_bin(frequency: u32, nfft: usize, sampling_rate: u32) -> usize {
    (u64::from(frequency) * nfft as u64 / u64::from(sampling_rate.max(1))) as usize
}

pub struct Capture {
    source: Box<dyn SpectrumSource>,
    bins: Vec<usize>,
}

impl Capture {
    pub fn new(source: Box<dyn SpectrumSource>, stations: &[Station], sampling_rate: u32) -> Self {
        let bins = stations
            .iter()
            .map(|s| monitored_bin(s.frequency, NFFT, sampling_rate))
            .collect();
        Self { source, bins }
    }

    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// One strength per station, `None` where the capture gave nothing usable
    pub fn signal_strengths(&mut self) -> Vec<Option<f64>> {
        match self.source.capture() {
            Ok(spectrum) => {
                let strengths: Vec<Option<f64>> =
                    self.bins.iter().map(|&b| spectrum.get(b).copied()).collect();
                if strengths.iter().any(Option::is_none) {
                    warn!(
                        len = spectrum.len(),
                        "Spectrum too short for some monitored bins"
                    );
                }
                strengths
            }
            Err(e) => {
                warn!("Capture failed: {e}");
                vec![None; self.bins.len()]
            }
        }
    }
}

/// A fixed spectrum, returned on every capture
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    spectrum: Vec<f64>,
}

impl SyntheticSource {
    pub fn new(spectrum: Vec<f64>) -> Self {
        Self { spectrum }
    }

    /// Put `level` into the bin of each station, zero everywhere else
    pub fn with_levels(stations: &[Station], sampling_rate: u32, levels: &[f64]) -> Self {
        let mut spectrum = vec![0f64; NFFT / 2 + 1];
        for (station, level) in stations.iter().zip(levels) {
            let bin = monitored_bin(station.frequency, NFFT, sampling_rate);
            if bin >= spectrum.len() {
                spectrum.resize(bin + 1, 0.0);
            }
            spectrum[bin] = *level;
        }
        Self { spectrum }
    }
}

impl SpectrumSource for SyntheticSource {
    fn capture(&mut self) -> Result<Vec<f64>, CaptureError> {
        Ok(self.spectrum.clone())
    }
}

/// Reads one spectrum per line, values separated by commas or whitespace
pub struct LineSource<R> {
    reader: R,
    line: String,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead + Send> SpectrumSource for LineSource<R> {
    fn capture(&mut self) -> Result<Vec<f64>, CaptureError> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Err(CaptureError::Exhausted);
        }
        self.line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(|_| CaptureError::Malformed(s.to_owned())))
            .collect()
    }
}
