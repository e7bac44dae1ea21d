//! Outlier-rejecting smoothing filter.
//!
//! A sliding window of the last [`WINDOW`] raw samples. Once the window is
//! full, every new sample produces an output: the mean of the samples
//! lying within `max_deviation` of the window median. A single glitch moves
//! the median by at most one rank, so it cannot drag the output, while the
//! mean of the survivors keeps sub-sample resolution.

/// Window length. Odd so the median is a sample.
pub const WINDOW: usize = 7;

const _: () = assert!(WINDOW % 2 == 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Filling,
    SteadyState,
}

#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    window: [i32; WINDOW],
    fill_count: usize,
    phase: Phase,
    max_deviation: i32,
    last_value: i32,
    valid: bool,
}

impl SmoothingFilter {
    pub fn new(max_deviation: i32) -> Self {
        Self {
            window: [0; WINDOW],
            fill_count: 0,
            phase: Phase::Filling,
            max_deviation,
            last_value: 0,
            valid: false,
        }
    }

    /// Feed one raw sample and return the updated output.
    pub fn push(&mut self, value: i32) -> Option<i32> {
        match self.phase {
            Phase::Filling => {
                self.window[self.fill_count] = value;
                self.fill_count += 1;
                if self.fill_count == WINDOW {
                    self.phase = Phase::SteadyState;
                    self.evaluate();
                }
            }
            Phase::SteadyState => {
                self.window.copy_within(1.., 0);
                self.window[WINDOW - 1] = value;
                self.evaluate();
            }
        }
        self.value()
    }

    fn evaluate(&mut self) {
        let mut sorted = self.window;
        sorted.sort_unstable();
        let median = sorted[WINDOW / 2];

        let (sum, count) = self
            .window
            .iter()
            .filter(|&&v| (v - median).abs() < self.max_deviation)
            .fold((0i64, 0i64), |(s, c), &v| (s + i64::from(v), c + 1));

        self.valid = count > 0;
        if self.valid {
            self.last_value = (sum / count) as i32;
        }
    }

    /// The smoothed value, or `None` while filling or when every sample was
    /// rejected.
    pub fn value(&self) -> Option<i32> {
        self.valid.then_some(self.last_value)
    }

    /// Last computed value, even if it is no longer valid.
    pub fn last_value(&self) -> i32 {
        self.last_value
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.max_deviation);
    }
}
