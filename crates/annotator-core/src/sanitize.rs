use std::borrow::Cow;

/// Control characters that xlsx cells cannot hold: 0x00–0x08, 0x0B–0x0C
/// and 0x0E–0x1F. Tab, line feed and carriage return are allowed.
pub fn is_illegal_cell_char(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}'..='\u{0C}' | '\u{0E}'..='\u{1F}')
}

/// Strip characters that xlsx cells reject.
///
/// Borrows the input when nothing needs removing. Idempotent.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if text.chars().any(is_illegal_cell_char) {
        Cow::Owned(text.chars().filter(|c| !is_illegal_cell_char(*c)).collect())
    } else {
        Cow::Borrowed(text)
    }
}
