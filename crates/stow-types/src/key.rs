//! Key-ordering helpers.
//!
//! Keys compare ordinally. A prefix scan over `prefix` is the half-open range
//! `[prefix, increment(prefix))`.

/// The smallest string strictly greater than every string that starts with
/// `prefix`.
///
/// The last character is advanced to the next Unicode scalar value. A last
/// character that cannot be advanced (`char::MAX`) is dropped and the carry
/// moves to the previous character. Returns `None` when nothing can be
/// advanced, meaning the range has no upper bound.
pub fn increment(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = next_char(last) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// The smallest string strictly greater than `key`.
pub fn successor(key: &str) -> String {
    let mut next = String::with_capacity(key.len() + 1);
    next.push_str(key);
    next.push('\0');
    next
}

/// Returns `true` if `key` lies in the half-open range `[min, max)`.
/// A `None` bound is unbounded on that side.
pub fn in_range(key: &str, min: Option<&str>, max: Option<&str>) -> bool {
    min.map_or(true, |min| key >= min) && max.map_or(true, |max| key < max)
}

fn next_char(c: char) -> Option<char> {
    match c {
        char::MAX => None,
        // Skip the surrogate gap.
        '\u{D7FF}' => Some('\u{E000}'),
        _ => char::from_u32(c as u32 + 1),
    }
}
