//! BEMA smoothing: a sliding minimum followed by a moving average.
//!
//! Every sample is replaced by the minimum of the `2 * wing + 1` samples centred on it,
//! then by the mean of `2 * wing + 1` consecutive minima. The raw series is padded with
//! `wing` copies of its first and last value so edge samples still see a full window.

/// Default half-width of the filter window (window of 13 samples)
pub const DEFAULT_WING: usize = 6;

/// Smoothing filter with an optional rotation of the result to local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BemaFilter {
    pub wing: usize,
    /// Hours to rotate the output by; zero keeps UTC alignment
    pub gmt_offset: i32,
    /// Seconds between samples, only needed to convert `gmt_offset` to samples
    pub log_interval: u32,
}

impl Default for BemaFilter {
    fn default() -> Self {
        Self {
            wing: DEFAULT_WING,
            gmt_offset: 0,
            log_interval: 5,
        }
    }
}

impl BemaFilter {
    pub fn new(wing: usize) -> Self {
        Self {
            wing,
            ..Default::default()
        }
    }

    pub fn with_gmt_offset(mut self, gmt_offset: i32, log_interval: u32) -> Self {
        self.gmt_offset = gmt_offset;
        self.log_interval = log_interval;
        self
    }

    pub fn apply(&self, raw: &[f64]) -> Vec<f64> {
        let mut out = bema(raw, self.wing);
        if self.gmt_offset != 0 && !out.is_empty() && self.log_interval > 0 {
            let shift = i64::from(self.gmt_offset) * 3600 / i64::from(self.log_interval);
            let mid = shift.rem_euclid(out.len() as i64) as usize;
            out.rotate_left(mid);
        }
        out
    }
}

/// Filter `raw` with a window of `2 * wing + 1` samples. The output has the length of the input.
pub fn bema(raw: &[f64], wing: usize) -> Vec<f64> {
    let len = raw.len();
    if len == 0 || wing == 0 {
        return raw.to_vec();
    }
    let width = 2 * wing + 1;

    // Pad both ends with the edge values
    let mut padded = Vec::with_capacity(len + 2 * wing);
    padded.extend(std::iter::repeat(raw[0]).take(wing));
    padded.extend_from_slice(raw);
    padded.extend(std::iter::repeat(raw[len - 1]).take(wing));

    // Minimum over the centred window for each original position
    let mut dmin = vec![0f64; len + 2 * wing];
    for i in wing..len + wing {
        dmin[i] = padded[i - wing..=i + wing]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
    }
    // The padding takes the nearest computed minimum, not the padded raw value
    let first = dmin[wing];
    let last = dmin[len + wing - 1];
    dmin[..wing].fill(first);
    dmin[len + wing..].fill(last);

    // out[j] averages dmin[j..=j + 2 * wing], i.e. centred on raw[j]
    dmin.windows(width)
        .map(|w| w.iter().sum::<f64>() / width as f64)
        .collect()
}
