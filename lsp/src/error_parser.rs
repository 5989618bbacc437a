//! Turn the compiler's textual failure output into [`ParsedError`] records.
//!
//! A raw result is `"<file>\n<trace...>"`. The trace is free-form; the only
//! structure relied on is a `Line <N>, col <M>:` marker and, when present, a
//! caret underline (`^~~~`) beneath the offending source line. Output that
//! matches neither still produces an error, pinned to the start of the file.

use std::sync::LazyLock;

use regex::Regex;
use tactls_types::{ParsedError, Severity};

/// Message used when the compiler failed without saying anything.
pub const COMPILATION_FAILED: &str = "compilation failed";

static POSITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Line ([0-9]+), col ([0-9]+):").expect("valid position regex"));

static CARET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s|>0-9]*\s(\^~*)\s*$").expect("valid caret regex"));

fn position_in(line: &str) -> Option<(u32, u32)> {
    let captures = POSITION.captures(line)?;
    let line_no = captures[1].parse().ok()?;
    let column = captures[2].parse().ok()?;
    Some((line_no, column))
}

fn underline_width(trace: &[&str]) -> Option<u32> {
    trace.iter().find_map(|line| {
        let caret = CARET.captures(line)?.get(1)?;
        u32::try_from(caret.as_str().chars().count()).ok()
    })
}

/// Parse one raw compile result.
///
/// Returns `None` for an empty (successful) result. Anything else yields
/// exactly one error.
#[must_use]
pub fn parse_raw_result(raw: &str) -> Option<ParsedError> {
    if raw.trim().is_empty() {
        return None;
    }

    let lines: Vec<&str> = raw.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let file = lines[0];

    match lines.as_slice() {
        [_] => return Some(ParsedError::at_file_start(file, COMPILATION_FAILED)),
        [_, message] if !message.trim().is_empty() => {
            return Some(ParsedError::at_file_start(file, *message));
        }
        [_, _] => return Some(ParsedError::at_file_start(file, COMPILATION_FAILED)),
        _ => {}
    }

    let trace = &lines[1..];
    let (line, column) = position_in(trace[0])
        .or_else(|| trace[1..].iter().find_map(|l| position_in(l)))
        .unwrap_or((1, 1));

    let meaningful: Vec<&str> = {
        let end = trace
            .iter()
            .rposition(|l| !l.trim().is_empty())
            .map_or(0, |i| i + 1);
        trace[..end].to_vec()
    };
    let message = match meaningful.as_slice() {
        [] => COMPILATION_FAILED.to_string(),
        [only] => (*only).to_string(),
        [.., second_last, last] => format!("{last}\n{second_last}"),
    };

    let error = ParsedError::new(file, Severity::Error, line, column, message);
    Some(match underline_width(trace) {
        Some(width) => error.with_length(width),
        None => error,
    })
}
