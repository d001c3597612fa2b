use std::sync::OnceLock;

use regex::Regex;

/// Splits on lines that consist only of `GO` (any case). Pieces are trimmed
/// and empty pieces dropped.
pub fn split_on_go(script: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in script.lines() {
        if line.trim().eq_ignore_ascii_case("GO") {
            flush(&mut current, &mut pieces);
        } else {
            current.push(line);
        }
    }
    flush(&mut current, &mut pieces);

    pieces
}

fn flush(current: &mut Vec<&str>, pieces: &mut Vec<String>) {
    let piece = current.join("\n").trim().to_string();
    if !piece.is_empty() {
        pieces.push(piece);
    }
    current.clear();
}

fn create_view_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bCREATE\s+(?:OR\s+ALTER\s+)?VIEW\b").expect("valid regex"))
}

fn allowed_preamble_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(SET\s+ANSI_NULLS\s+(ON|OFF)\s*;?)?\s*(SET\s+QUOTED_IDENTIFIER\s+(ON|OFF)\s*;?)?\s*$",
        )
        .expect("valid regex")
    })
}

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"))
}

fn line_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)--.*$").expect("valid regex"))
}

fn strip_comments(text: &str) -> String {
    let without_blocks = block_comment_re().replace_all(text, "");
    line_comment_re().replace_all(&without_blocks, "").into_owned()
}

/// `CREATE VIEW` must be the first statement of its batch. Splits a batch so
/// that anything other than `SET ANSI_NULLS` / `SET QUOTED_IDENTIFIER` (and
/// comments) ahead of the view lands in its own batch.
fn isolate_view(batch: String) -> Vec<String> {
    let Some(found) = create_view_re().find(&batch) else {
        return vec![batch];
    };
    let pre = batch[..found.start()].trim();
    if pre.is_empty() || allowed_preamble_re().is_match(&strip_comments(pre)) {
        return vec![batch];
    }
    let post = batch[found.start()..].trim();
    vec![pre.to_string(), post.to_string()]
}

/// Splits a script into executable batches in execution order.
pub fn split_batches(script: &str) -> Vec<String> {
    split_on_go(script).into_iter().flat_map(isolate_view).collect()
}
