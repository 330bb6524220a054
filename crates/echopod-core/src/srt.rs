//! SubRip (`.srt`) subtitle parsing.
//!
//! Courses are uploaded with an SRT file; each cue becomes one sentence-level
//! listening exercise. The parser accepts the common dialect: numbered blocks
//! separated by blank lines, `HH:MM:SS,mmm --> HH:MM:SS,mmm` timing lines
//! (a dot before the milliseconds is tolerated), CRLF line endings, and
//! multi-line cue text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A parsed subtitle cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    /// Cue number as written in the file.
    pub index: u32,
    /// Start of the cue in seconds from the beginning of the audio.
    pub start_seconds: f64,
    /// End of the cue in seconds from the beginning of the audio.
    pub end_seconds: f64,
    /// Cue text; multi-line cues are joined with `\n`.
    pub text: String,
}

/// Errors raised while parsing an SRT document.
#[derive(Debug, thiserror::Error)]
pub enum SrtError {
    /// The document contains no cues at all.
    #[error("subtitle file contains no cues")]
    Empty,

    /// A block does not start with a numeric cue index.
    #[error("cue {position}: invalid index line '{line}'")]
    InvalidIndex {
        /// 1-based block position in the file.
        position: usize,
        /// The offending line.
        line: String,
    },

    /// A block is missing or has a malformed timing line.
    #[error("cue {position}: invalid timing line '{line}'")]
    InvalidTiming {
        /// 1-based block position in the file.
        position: usize,
        /// The offending line.
        line: String,
    },
}

static TIMING_RE: Lazy<Regex> = Lazy::new(|| {
    // The pattern is a constant; a failure here is a programming error.
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(
        r"^(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})",
    )
    .unwrap();
    re
});

/// Parses an SRT document into its cues.
///
/// # Errors
///
/// Returns [`SrtError`] when the document has no cues or a block has a
/// malformed index or timing line. A parse failure is not fatal to callers:
/// course upload logs it and proceeds without sentence records.
pub fn parse(content: &str) -> Result<Vec<Subtitle>, SrtError> {
    let normalized = content.replace("\r\n", "\n");
    let mut subtitles = Vec::new();

    for (position, block) in normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .enumerate()
    {
        subtitles.push(parse_block(position + 1, block)?);
    }

    if subtitles.is_empty() {
        return Err(SrtError::Empty);
    }
    Ok(subtitles)
}

/// Parses one `index / timing / text...` block.
fn parse_block(position: usize, block: &str) -> Result<Subtitle, SrtError> {
    let mut lines = block.lines();

    let index_line = lines.next().unwrap_or_default().trim();
    let index: u32 = index_line
        .parse()
        .map_err(|_| SrtError::InvalidIndex {
            position,
            line: index_line.to_string(),
        })?;

    let timing_line = lines.next().unwrap_or_default().trim();
    let caps = TIMING_RE
        .captures(timing_line)
        .ok_or_else(|| SrtError::InvalidTiming {
            position,
            line: timing_line.to_string(),
        })?;

    let start_seconds = timestamp_seconds(&caps, 1);
    let end_seconds = timestamp_seconds(&caps, 5);

    let text = lines.collect::<Vec<_>>().join("\n").trim().to_string();

    Ok(Subtitle {
        index,
        start_seconds,
        end_seconds,
        text,
    })
}

/// Converts four capture groups starting at `base` into seconds.
fn timestamp_seconds(caps: &regex::Captures<'_>, base: usize) -> f64 {
    let part = |i: usize| -> f64 {
        caps.get(base + i)
            .map(|m| m.as_str().parse::<f64>().unwrap_or(0.0))
            .unwrap_or(0.0)
    };
    // Millisecond group may be 1-3 digits wide.
    let millis_width = caps
        .get(base + 3)
        .map_or(3, |m| u32::try_from(m.as_str().len()).unwrap_or(3));
    let millis_scale = f64::from(10_u32.saturating_pow(millis_width));

    part(0) * 3600.0 + part(1) * 60.0 + part(2) + part(3) / millis_scale
}
