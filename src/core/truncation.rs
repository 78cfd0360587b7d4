// src/core/truncation.rs — Command output truncation
//
// Keeps NL prompts and chat replies bounded. The tail is kept rather than
// the head: the end of a build or test log is where the verdict lives.

/// Result of a truncation operation.
#[derive(Debug, Clone)]
pub struct Truncated {
    pub content: String,
    pub was_truncated: bool,
    pub original_bytes: usize,
}

/// Truncate `content` to at most `cap_bytes` of its tail. When truncation
/// occurs, a marker line is prepended so it is never silent.
pub fn truncate_tail(content: &str, cap_bytes: usize) -> Truncated {
    let original_bytes = content.len();
    if original_bytes <= cap_bytes {
        return Truncated {
            content: content.to_string(),
            was_truncated: false,
            original_bytes,
        };
    }

    // Find a char boundary at or after the byte cut point.
    let mut start = original_bytes - cap_bytes;
    while start < original_bytes && !content.is_char_boundary(start) {
        start += 1;
    }
    let tail = &content[start..];

    // Drop a leading partial line so the excerpt starts clean.
    let tail = match tail.find('\n') {
        Some(idx) if idx + 1 < tail.len() => &tail[idx + 1..],
        _ => tail,
    };

    let marker = format!(
        "[output truncated: showing last {} of {} bytes]\n",
        tail.len(),
        original_bytes
    );

    Truncated {
        content: format!("{marker}{tail}"),
        was_truncated: true,
        original_bytes,
    }
}
