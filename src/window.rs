//! Fixed-capacity ring of debiased samples with overlapping windows

/// One analysis window: `fft_samples` debiased samples in chronological order
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    samples: Vec<f32>,
}

impl Window {
    /// A zero-filled window of the given length
    pub fn zeroed(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Minimum and maximum sample value, `(0, 0)` when empty
    pub fn min_max(&self) -> (f32, f32) {
        if self.samples.is_empty() {
            return (0.0, 0.0);
        }
        self.samples
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            })
    }
}

/// Circular buffer holding the most recent `capacity` samples
///
/// Storage is allocated once. `pending` counts the new samples still needed
/// before the next window is ready: `capacity` after a reset, the hop size
/// after each `advance`.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    data: Vec<f32>,
    head: usize,
    len: usize,
    pending: usize,
}

impl WindowBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be positive");
        Self {
            data: vec![0.0; capacity],
            head: 0,
            len: 0,
            pending: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid samples held (saturates at capacity)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one sample, overwriting the oldest once full
    pub fn push(&mut self, sample: f32) {
        let capacity = self.data.len();
        self.data[self.head] = sample;
        self.head = (self.head + 1) % capacity;
        self.len = (self.len + 1).min(capacity);
        self.pending = self.pending.saturating_sub(1);
    }

    /// A complete window is ready for analysis
    pub fn is_full(&self) -> bool {
        self.pending == 0 && self.len == self.data.len()
    }

    /// Copy the most recent window into a new `Window`
    pub fn snapshot(&self) -> Window {
        let mut window = Window::zeroed(self.data.len());
        self.snapshot_into(&mut window);
        window
    }

    /// Copy the most recent window into `window`, reusing its storage
    pub fn snapshot_into(&self, window: &mut Window) {
        let capacity = self.data.len();
        window.samples.resize(capacity, 0.0);
        // Once full, `head` points at the oldest sample.
        let (newer, older) = self.data.split_at(self.head);
        window.samples[..older.len()].copy_from_slice(older);
        window.samples[older.len()..].copy_from_slice(newer);
    }

    /// Slide the window forward by `hop` samples
    ///
    /// `hop == 0` or `hop >= capacity` waits for a fully fresh window.
    pub fn advance(&mut self, hop: usize) {
        let capacity = self.data.len();
        self.pending = if hop == 0 { capacity } else { hop.min(capacity) };
    }

    /// Discard all samples
    pub fn reset(&mut self) {
        self.data.iter_mut().for_each(|x| *x = 0.0);
        self.head = 0;
        self.len = 0;
        self.pending = self.data.len();
    }
}
