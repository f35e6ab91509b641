//! Band aggregation and scalar feature extraction
//!
//! The `fft_samples / 2` spectrum bins are split into `fft_bands` contiguous
//! groups of `bins / bands` bins each; the last band also takes the remainder.
//! Each band value is the summed energy (squared magnitude) of its bins.

use crate::spectrum::Spectrum;
use crate::window::Window;
use std::ops::Range;

/// Per-band energy values, one entry per configured band
pub type BandVector = Vec<f64>;

/// Frequency edges of every band in Hz, index-aligned with the band vector
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BandEdges {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
    pub center: Vec<f64>,
}

/// Partition of spectrum bins into bands
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    ranges: Vec<Range<usize>>,
    bin_count: usize,
}

impl BandLayout {
    /// Build the layout for a spectrum of `fft_samples / 2` bins
    pub fn new(fft_samples: usize, fft_bands: usize) -> Self {
        let bin_count = fft_samples / 2;
        let bands = fft_bands.clamp(1, bin_count.max(1));
        let per_band = bin_count / bands;

        let ranges = (0..bands)
            .map(|b| {
                let start = b * per_band;
                let end = if b + 1 == bands { bin_count } else { start + per_band };
                start..end
            })
            .collect();

        Self { ranges, bin_count }
    }

    pub fn band_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Band index containing spectrum bin `bin`
    pub fn band_of(&self, bin: usize) -> Option<usize> {
        self.ranges.iter().position(|r| r.contains(&bin))
    }

    /// Frequency span `[low, high)` of band `band` in Hz
    pub fn band_range_hz(&self, band: usize, bin_hz: f64) -> Option<(f64, f64)> {
        self.ranges
            .get(band)
            .map(|r| (r.start as f64 * bin_hz, r.end as f64 * bin_hz))
    }

    /// Edges of all bands for a bin width of `bin_hz`
    pub fn edges_hz(&self, bin_hz: f64) -> BandEdges {
        let mut edges = BandEdges::default();
        for band in 0..self.ranges.len() {
            if let Some((low, high)) = self.band_range_hz(band, bin_hz) {
                edges.low.push(low);
                edges.high.push(high);
                edges.center.push((low + high) / 2.0);
            }
        }
        edges
    }

    /// Reduce a spectrum to band energies and the peak frequency
    pub fn reduce(&self, spectrum: &Spectrum) -> (BandVector, f64) {
        debug_assert_eq!(spectrum.len(), self.bin_count, "spectrum length does not match layout");

        let bands = self
            .ranges
            .iter()
            .map(|r| {
                spectrum.magnitudes[r.start.min(spectrum.len())..r.end.min(spectrum.len())]
                    .iter()
                    .map(|m| m * m)
                    .sum()
            })
            .collect();

        let peak_hz = peak_bin(spectrum) as f64 * spectrum.bin_hz;
        (bands, peak_hz)
    }
}

/// Index of the strongest non-DC bin; lowest index wins ties, 0 if nothing beats zero
pub fn peak_bin(spectrum: &Spectrum) -> usize {
    let mut best = 0usize;
    let mut best_mag = 0.0f64;
    for (k, &m) in spectrum.magnitudes.iter().enumerate().skip(1) {
        if m > best_mag {
            best_mag = m;
            best = k;
        }
    }
    best
}

/// Root-mean-square of the time-domain window
pub fn rms(window: &Window) -> f64 {
    let samples = window.as_slice();
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&x| (x as f64) * (x as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFT_SIZES: [usize; 5] = [128, 256, 512, 1024, 2048];

    fn spectrum(magnitudes: Vec<f64>, bin_hz: f64) -> Spectrum {
        Spectrum { magnitudes, bin_hz }
    }

    #[test]
    fn test_partition_covers_every_bin_once() {
        for &n in &FFT_SIZES {
            for bands in 1..=64 {
                let layout = BandLayout::new(n, bands);
                assert_eq!(layout.band_count(), bands, "n={} bands={}", n, bands);

                let mut hits = vec![0u32; n / 2];
                for r in layout.ranges() {
                    assert!(r.start < r.end, "empty band n={} bands={}", n, bands);
                    for k in r.clone() {
                        hits[k] += 1;
                    }
                }
                assert!(hits.iter().all(|&h| h == 1), "n={} bands={}", n, bands);

                // contiguous, ascending
                for pair in layout.ranges().windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
            }
        }
    }

    #[test]
    fn test_last_band_absorbs_remainder() {
        // 64 bins over 5 bands: 12 each, last gets 12 + 4
        let layout = BandLayout::new(128, 5);
        let widths: Vec<usize> = layout.ranges().iter().map(|r| r.len()).collect();
        assert_eq!(widths, vec![12, 12, 12, 12, 16]);
        assert_eq!(layout.band_of(63), Some(4));
        assert_eq!(layout.band_of(0), Some(0));
        assert_eq!(layout.band_of(64), None);
    }

    #[test]
    fn test_reduce_sums_squared_magnitude() {
        let layout = BandLayout::new(8, 2);
        let (bands, _) = layout.reduce(&spectrum(vec![1.0, 2.0, 3.0, 4.0], 1.0));
        assert_eq!(bands, vec![5.0, 25.0]);
    }

    #[test]
    fn test_band_vector_length_matches_config() {
        let layout = BandLayout::new(512, 16);
        let (bands, _) = layout.reduce(&spectrum(vec![0.1; 256], 1.953125));
        assert_eq!(bands.len(), 16);
    }

    #[test]
    fn test_all_zero_gives_zero_peak_and_rms() {
        let layout = BandLayout::new(128, 8);
        let (bands, peak_hz) = layout.reduce(&spectrum(vec![0.0; 64], 7.8125));
        assert_eq!(peak_hz, 0.0);
        assert!(bands.iter().all(|&b| b == 0.0));
        assert_eq!(rms(&Window::zeroed(128)), 0.0);
    }

    #[test]
    fn test_peak_tie_prefers_lowest_index() {
        let mut mags = vec![0.0; 16];
        mags[5] = 2.0;
        mags[9] = 2.0;
        assert_eq!(peak_bin(&spectrum(mags, 1.0)), 5);
    }

    #[test]
    fn test_peak_ignores_dc_bin() {
        let mut mags = vec![0.0; 16];
        mags[0] = 10.0;
        mags[3] = 1.0;
        let layout = BandLayout::new(32, 4);
        let (_, peak_hz) = layout.reduce(&spectrum(mags, 2.5));
        assert_eq!(peak_hz, 7.5);
    }

    #[test]
    fn test_rms_of_constant_and_square_wave() {
        let window = Window::from_samples(vec![2.0; 64]);
        assert!((rms(&window) - 2.0).abs() < 1e-12);

        let square: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((rms(&Window::from_samples(square)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_band_range_hz() {
        let layout = BandLayout::new(512, 16);
        let (lo, hi) = layout.band_range_hz(1, 1000.0 / 512.0).unwrap();
        assert!((lo - 31.25).abs() < 1e-9);
        assert!((hi - 62.5).abs() < 1e-9);
        assert!(layout.band_range_hz(16, 1.0).is_none());
    }

    #[test]
    fn test_edges_follow_uneven_partition() {
        // 64 bins of 7.8125 Hz over 5 bands: 12, 12, 12, 12, 16 bins
        let edges = BandLayout::new(128, 5).edges_hz(1000.0 / 128.0);
        assert_eq!(edges.low, vec![0.0, 93.75, 187.5, 281.25, 375.0]);
        assert_eq!(edges.high, vec![93.75, 187.5, 281.25, 375.0, 500.0]);
        assert_eq!(edges.center[4], 437.5);
        assert!(edges.low[1..].iter().zip(&edges.high).all(|(l, h)| l == h));
    }
}
