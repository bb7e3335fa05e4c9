/// `-- ` needs trailing whitespace (or end of input) to start a comment; `#` always does.
pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    match bytes.get(idx) {
        Some(b'#') => true,
        Some(b'-') => {
            bytes.get(idx + 1) == Some(&b'-')
                && bytes
                    .get(idx + 2)
                    .is_none_or(|b| b.is_ascii_whitespace())
        }
        _ => false,
    }
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

/// Whether the quote at `idx` is doubled (`''`, `""`, ` `` `), i.e. escaped.
pub(super) fn is_doubled(bytes: &[u8], idx: usize, quote: u8) -> bool {
    bytes.get(idx + 1) == Some(&quote)
}
