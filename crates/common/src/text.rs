//! Message chunking and Discord name sanitization.
//!
//! Discord caps messages at 2000 code points, thread names at 100, and
//! channel names at 100 lowercase `[a-z0-9_-]` characters.

/// Maximum code points per Discord message.
pub const MESSAGE_LIMIT: usize = 2000;

/// Maximum code points in a thread name.
pub const THREAD_NAME_LIMIT: usize = 100;

/// Room reserved per chunk for the `(i/n) ` counter when a post is split.
const COUNTER_RESERVE: usize = 12;

/// Split `text` into postable chunks of at most [`MESSAGE_LIMIT`] code
/// points.
///
/// A text that fits is returned as a single chunk, unmodified. Longer texts
/// are split preferring line breaks, then spaces, over mid-word cuts — a
/// break point is only taken when it lies in the second half of the chunk
/// budget. Each chunk of a split post is prefixed with a `(i/n) ` counter.
/// Concatenating the chunks minus their counters reproduces `text` exactly;
/// no chunk is empty.
pub fn split_message(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= MESSAGE_LIMIT {
        return vec![text.to_string()];
    }

    let budget = MESSAGE_LIMIT - COUNTER_RESERVE;
    let mut parts: Vec<String> = Vec::new();
    let mut rest: &[char] = &chars;

    while rest.len() > budget {
        let window = &rest[..budget];
        let cut = break_point(window).unwrap_or(budget);
        parts.push(rest[..cut].iter().collect());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        parts.push(rest.iter().collect());
    }

    let n = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("({}/{}) {}", i + 1, n, chunk))
        .collect()
}

/// Find the best break point inside `window`: the last newline, else the
/// last space, but only when it falls in the second half of the window.
/// The break character stays with the left chunk.
fn break_point(window: &[char]) -> Option<usize> {
    let half = window.len() / 2;
    window
        .iter()
        .rposition(|&c| c == '\n')
        .filter(|&i| i >= half)
        .or_else(|| {
            window
                .iter()
                .rposition(|&c| c == ' ')
                .filter(|&i| i >= half)
        })
        .map(|i| i + 1)
}

/// Truncate `name` to at most [`THREAD_NAME_LIMIT`] code points.
pub fn truncate_thread_name(name: &str) -> String {
    name.chars().take(THREAD_NAME_LIMIT).collect()
}

/// Sanitize a channel name: lowercase, non `[a-z0-9_]` collapsed to `-`,
/// runs of `-` collapsed, edges trimmed, capped at 100 code points.
pub fn sanitize_channel_name(name: &str) -> String {
    let mut out = String::new();
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    trimmed.chars().take(100).collect()
}
