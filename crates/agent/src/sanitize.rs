//! Cleanup of tool output before it enters the conversation.
//!
//! Commands like `cargo` and `git` colour their output; the escape codes are
//! noise to a model and can corrupt a terminal when echoed back.

use std::sync::LazyLock;

use regex_lite::Regex;

/// CSI sequences (`ESC [ ... final`), OSC sequences terminated by BEL or
/// `ESC \`, charset designations and two-byte escapes.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?|\x1b[()#][0-9A-Za-z]|\x1b[@-Z\\-_]")
        .expect("ANSI escape pattern compiles")
});

/// Strip escape sequences and NUL bytes, then cap at `max_chars` characters.
pub fn sanitize_output(text: &str, max_chars: usize) -> String {
    let stripped = ANSI_ESCAPE.replace_all(text, "");
    let cleaned: String = stripped
        .chars()
        .filter(|c| *c != '\0' && *c != '\x1b')
        .collect();
    truncate(cleaned, max_chars)
}

/// Cap `text` at `max_chars` characters, appending a marker with the number
/// of bytes removed. Never splits a UTF-8 character.
pub fn truncate(mut text: String, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text;
    };
    let removed = text.len() - cut;
    text.truncate(cut);
    text.push_str(&format!("\n[... truncated {removed} bytes]"));
    text
}
