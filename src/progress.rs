//! Progress estimation from the textual markers the setup script prints.

use regex::Regex;

lazy_static::lazy_static! {
    static ref STEP_MARKER: Regex = Regex::new(r"^Step (\d+):").expect("valid step regex");
    static ref DOWNLOAD_MARKER: Regex =
        Regex::new(r"Downloading Windows (?:10|11): (\d{1,3})%").expect("valid download regex");
}

/// Steps above this all map to the same percentage
const LAST_MAPPED_STEP: u32 = 8;
const PERCENT_PER_STEP: f64 = 12.5;
const STEP_CEILING: f64 = (LAST_MAPPED_STEP - 1) as f64 * PERCENT_PER_STEP;

/// The Windows download occupies this slice of the overall bar
const DOWNLOAD_RANGE: (f64, f64) = (37.0, 50.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Step(u32),
    Download(u8),
}

impl Marker {
    /// Overall percentage this marker stands for
    pub fn percent(self) -> f64 {
        match self {
            Marker::Step(n) if n <= 1 => 0.0,
            Marker::Step(n) if n <= LAST_MAPPED_STEP => (n - 1) as f64 * PERCENT_PER_STEP,
            Marker::Step(_) => STEP_CEILING,
            Marker::Download(p) => {
                let (lo, hi) = DOWNLOAD_RANGE;
                lo + (hi - lo) * p as f64 / 100.0
            }
        }
    }
}

type Matcher = fn(&str) -> Option<Marker>;

fn match_step(plain: &str) -> Option<Marker> {
    let caps = STEP_MARKER.captures(plain)?;
    // Too many digits for u32 is still "a step past the last one"
    let n = caps[1].parse::<u32>().unwrap_or(u32::MAX);
    Some(Marker::Step(n))
}

fn match_download(plain: &str) -> Option<Marker> {
    let caps = DOWNLOAD_MARKER.captures(plain)?;
    let p = caps[1].parse::<u16>().ok()?.min(100) as u8;
    Some(Marker::Download(p))
}

/// Tried in order, first hit wins. Lines matching none are display-only.
const MATCHERS: &[Matcher] = &[match_step, match_download];

/// Classify a line that already had its ANSI styling stripped
pub fn classify(plain: &str) -> Option<Marker> {
    MATCHERS.iter().find_map(|m| m(plain))
}

/// Progress of one install session, in percent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressState {
    percent: f64,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Apply a marker. Progress never moves backwards inside a session.
    pub fn observe(&mut self, marker: Marker) -> bool {
        let next = marker.percent().clamp(0.0, 100.0);
        if next > self.percent {
            self.percent = next;
            true
        } else {
            false
        }
    }

    /// Only a clean exit completes the bar
    pub fn finish(&mut self, exit_code: i32) {
        if exit_code == 0 {
            self.percent = 100.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percent_after(lines: &[&str]) -> f64 {
        let mut state = ProgressState::new();
        for line in lines {
            if let Some(marker) = classify(line) {
                state.observe(marker);
            }
        }
        state.percent()
    }

    #[test]
    fn steps_map_to_eighths() {
        assert_eq!(Marker::Step(1).percent(), 0.0);
        for n in 2..=8u32 {
            assert_eq!(Marker::Step(n).percent(), (n - 1) as f64 * 12.5);
        }
        assert_eq!(percent_after(&["Step 5: Installing"]), 50.0);
    }

    #[test]
    fn steps_past_eight_clamp() {
        for n in [9u32, 10, 42, 1000] {
            assert_eq!(Marker::Step(n).percent(), 87.5);
        }
        assert_eq!(percent_after(&["Step 99999999999999: x"]), 87.5);
    }

    #[test]
    fn download_percent_maps_into_window() {
        assert_eq!(Marker::Download(0).percent(), 37.0);
        assert_eq!(Marker::Download(50).percent(), 43.5);
        assert_eq!(Marker::Download(100).percent(), 50.0);
        assert_eq!(classify("Downloading Windows 11: 50%"), Some(Marker::Download(50)));
        assert_eq!(classify("  Downloading Windows 10: 7% (1.2 GB)"), Some(Marker::Download(7)));
        assert_eq!(classify("Downloading Windows 12: 50%"), None);
    }

    #[test]
    fn step_marker_must_start_the_line() {
        assert_eq!(classify("Step 3: Pulling"), Some(Marker::Step(3)));
        assert_eq!(classify(" Step 3: Pulling"), None);
        assert_eq!(classify("Step three: Pulling"), None);
        assert_eq!(classify("plain output"), None);
    }

    #[test]
    fn progress_never_decreases() {
        let mut state = ProgressState::new();
        assert!(state.observe(Marker::Step(5)));
        assert!(!state.observe(Marker::Download(100)));
        assert!(!state.observe(Marker::Step(1)));
        assert_eq!(state.percent(), 50.0);
    }

    #[test]
    fn only_clean_exit_completes() {
        let mut state = ProgressState::new();
        state.observe(Marker::Step(12));
        state.finish(1);
        assert_eq!(state.percent(), 87.5);
        state.finish(0);
        assert_eq!(state.percent(), 100.0);
    }
}
