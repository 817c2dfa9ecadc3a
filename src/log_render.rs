//! Turns raw output of the setup script into display lines.
//!
//! Two views of every line are produced: a styled one for the log view and a
//! plain one (ANSI sequences removed) that marker matching and error tracking
//! work on. Styling never leaks into the plain text.

use crate::progress::{classify, Marker};
use regex::Regex;

lazy_static::lazy_static! {
    static ref ANSI_SGR: Regex = Regex::new(r"\x1b\[([0-9;]*)m").expect("valid ANSI regex");
}

/// Lines starting with one of these are shown emphasized
const EMPHASIS_KEYWORDS: &[&str] = &["Step", "INFO:", "ERROR:", "SUCCESS:"];

/// The colors the setup script uses. Anything else is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogColor {
    Default,
    Red,
    Green,
    Amber,
}

impl LogColor {
    fn from_sgr(code: &str) -> Option<Self> {
        match code {
            "" | "0" => Some(LogColor::Default),
            "31" | "0;31" => Some(LogColor::Red),
            "32" | "0;32" => Some(LogColor::Green),
            "33" | "0;33" | "1;33" => Some(LogColor::Amber),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub color: LogColor,
}

/// A rendered line: colored spans plus an emphasis flag for the whole line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayLine {
    pub spans: Vec<Span>,
    pub emphasized: bool,
}

impl DisplayLine {
    /// Text of all spans joined, equal to `strip` of the source line
    #[cfg(test)]
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
    Success,
    Plain,
}

impl Severity {
    fn of(plain: &str) -> Self {
        let text = plain.trim_start();
        if text.starts_with("ERROR:") {
            Severity::Error
        } else if text.starts_with("SUCCESS:") {
            Severity::Success
        } else if text.starts_with("INFO:") || text.starts_with("Step") {
            Severity::Info
        } else {
            Severity::Plain
        }
    }
}

/// One line of child output together with everything derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    /// Exact bytes as received, without the line terminator
    pub raw: Vec<u8>,
    /// Raw bytes decoded lossily, trailing whitespace removed
    pub text: String,
    /// `text` with ANSI sequences removed
    pub plain: String,
    pub severity: Severity,
    pub marker: Option<Marker>,
}

impl LogLine {
    pub fn new(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw).trim_end().to_string();
        let plain = strip(&text);
        Self {
            raw: raw.to_vec(),
            severity: Severity::of(&plain),
            marker: classify(&plain),
            text,
            plain,
        }
    }

    pub fn render(&self) -> DisplayLine {
        render(&self.text)
    }

    /// An `ERROR:` report from the script itself, as opposed to indented detail
    pub fn reports_error(&self) -> bool {
        self.plain.starts_with("ERROR:")
    }
}

/// Remove every SGR escape sequence
pub fn strip(raw: &str) -> String {
    ANSI_SGR.replace_all(raw, "").into_owned()
}

/// Split a line into colored spans, dropping escape codes outside the supported set
pub fn render(raw: &str) -> DisplayLine {
    let mut spans: Vec<Span> = Vec::new();
    let mut color = LogColor::Default;
    let mut last = 0;

    let push = |spans: &mut Vec<Span>, text: &str, color: LogColor| {
        if text.is_empty() {
            return;
        }
        match spans.last_mut() {
            Some(prev) if prev.color == color => prev.text.push_str(text),
            _ => spans.push(Span {
                text: text.to_string(),
                color,
            }),
        }
    };

    for caps in ANSI_SGR.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        push(&mut spans, &raw[last..whole.start()], color);
        if let Some(next) = LogColor::from_sgr(&caps[1]) {
            color = next;
        }
        last = whole.end();
    }
    push(&mut spans, &raw[last..], color);

    let plain: String = spans.iter().map(|s| s.text.as_str()).collect();
    let lead = plain.trim_start();
    let emphasized = EMPHASIS_KEYWORDS.iter().any(|k| lead.starts_with(k));

    DisplayLine { spans, emphasized }
}
