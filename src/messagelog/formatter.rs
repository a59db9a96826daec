//! Text layout helpers for log entries.
//!
//! Handles line wrapping for attached content, the inline-vs-attachment size
//! decision, and the date and mention formats shared by every report.

use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, UserId};

/// Column width used when wrapping attached content.
pub const LINE_LENGTH: usize = 45;

/// Longest content shown inline when a report carries one message body.
pub const SINGLE_MESSAGE_LIMIT: usize = 1900;

/// Longest content shown inline per side when a report carries two bodies.
pub const DUAL_MESSAGE_LIMIT: usize = 950;

/// Where a piece of message content ends up in a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Shown in the entry's text body.
    Inline,
    /// Uploaded as a separate markdown file.
    Attached,
}

/// Decide whether `content` fits inline under `limit` characters.
pub fn placement(content: &str, limit: usize) -> Placement {
    if content.chars().count() <= limit {
        Placement::Inline
    } else {
        Placement::Attached
    }
}

/// Split a line into segments of one word plus the whitespace that follows it.
///
/// Leading whitespace forms its own segment. Concatenating the segments gives
/// back the original line.
fn segments(line: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_space = false;

    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            in_space = true;
        } else if in_space {
            out.push(&line[start..i]);
            start = i;
            in_space = false;
        }
    }

    if start < line.len() {
        out.push(&line[start..]);
    }

    out
}

/// Wrap a single line so no piece is longer than `width` characters.
///
/// Breaks happen after whitespace; a word longer than `width` is split hard.
/// Joining the returned pieces without separators yields the input.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);

    if line.chars().count() <= width {
        return vec![line.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for segment in segments(line) {
        let segment_len = segment.chars().count();

        if current_len + segment_len <= width {
            current.push_str(segment);
            current_len += segment_len;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if segment_len <= width {
            current.push_str(segment);
            current_len = segment_len;
            continue;
        }

        // Word longer than a whole line
        let chars: Vec<char> = segment.chars().collect();
        for chunk in chars.chunks(width) {
            if chunk.len() == width {
                lines.push(chunk.iter().collect());
            } else {
                current = chunk.iter().collect();
                current_len = chunk.len();
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Wrap every over-long line of `content` at [`LINE_LENGTH`] columns.
///
/// Lines at or under the width are left alone and line order is kept.
pub fn split_content(content: &str) -> String {
    content
        .split('\n')
        .map(|line| {
            if line.chars().count() > LINE_LENGTH {
                wrap_line(line, LINE_LENGTH).join("\n")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a timestamp the way log entries show dates, e.g.
/// `Jul 10, 2021, 3:04:05 PM (UTC)`.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    format!("{} (UTC)", timestamp.format("%b %-d, %Y, %-I:%M:%S %p"))
}

pub fn channel_mention(channel_id: ChannelId) -> String {
    format!("<#{}>", channel_id)
}

pub fn user_mention(user_id: UserId) -> String {
    format!("<@{}>", user_id)
}
