//! Byte-level helpers that keep string literals, comments and delimited
//! identifiers from being mistaken for structure.

/// Returns a copy of `text` with identical byte offsets in which comment and
/// string-literal bytes are blanked and delimited identifiers are filled with
/// `x`. Line breaks are preserved so line-based rules still apply.
pub fn mask(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match b {
            b'\'' => {
                let end = skip_delimited(bytes, i, b'\'');
                out.push(b'\'');
                blank(&bytes[i + 1..end], b' ', &mut out);
                i = end;
            }
            b'[' | b'"' => {
                let close = if b == b'[' { b']' } else { b'"' };
                let end = skip_delimited(bytes, i, close);
                out.push(b);
                blank(&bytes[i + 1..end], b'x', &mut out);
                i = end;
            }
            b'-' if next == Some(b'-') => {
                let end = bytes[i..]
                    .iter()
                    .position(|&c| c == b'\n')
                    .map(|p| i + p)
                    .unwrap_or(bytes.len());
                blank(&bytes[i..end], b' ', &mut out);
                i = end;
            }
            b'/' if next == Some(b'*') => {
                let end = bytes[i + 2..]
                    .windows(2)
                    .position(|w| w == b"*/")
                    .map(|p| i + 2 + p + 2)
                    .unwrap_or(bytes.len());
                blank(&bytes[i..end], b' ', &mut out);
                i = end;
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Index just past the closing delimiter of the literal opened at `open`.
/// A doubled closing delimiter is an escape.
pub fn skip_delimited(bytes: &[u8], open: usize, close: u8) -> usize {
    let mut j = open + 1;
    while j < bytes.len() {
        if bytes[j] == close {
            if bytes.get(j + 1) == Some(&close) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    bytes.len()
}

fn blank(region: &[u8], fill: u8, out: &mut Vec<u8>) {
    for (idx, &c) in region.iter().enumerate() {
        let last = idx + 1 == region.len();
        // keep the closing delimiter of literals and identifiers visible
        if c == b'\n' || (last && matches!(c, b'\'' | b']' | b'"')) {
            out.push(c);
        } else {
            out.push(fill);
        }
    }
}

/// Index of the parenthesis closing the one at `open` in masked text.
pub fn matching_paren(masked: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, b) in masked.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte offsets of commas at parenthesis depth zero in masked text.
pub fn top_level_commas(masked: &str) -> Vec<usize> {
    let mut depth = 0i32;
    let mut commas = Vec::new();
    for (i, b) in masked.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b',' if depth == 0 => commas.push(i),
            _ => {}
        }
    }
    commas
}

const STATEMENT_STARTS: &[&str] = &[
    "GO", "CREATE", "ALTER", "DROP", "INSERT", "UPDATE", "DELETE", "SELECT", "EXEC", "EXECUTE",
    "PRINT", "SET", "DECLARE", "IF", "BEGIN", "END", "MERGE", "TRUNCATE", "GRANT", "REVOKE",
    "DENY", "USE", "RETURN",
];

fn starts_statement(line: &str) -> bool {
    let word = line
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("");
    !word.is_empty()
        && STATEMENT_STARTS
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(word))
}

/// End of the statement that continues at `from` in masked text: just past a
/// top-level `;`, or just before a line that begins another statement.
pub fn statement_end(masked: &str, from: usize) -> usize {
    let bytes = masked.as_bytes();
    let mut depth = 0i32;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b';' if depth <= 0 => return i + 1,
            b'\n' if depth <= 0 => {
                let rest = &masked[i + 1..];
                let line = rest.split('\n').next().unwrap_or("");
                if starts_statement(line) {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}
