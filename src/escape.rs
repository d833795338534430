//! Data-link-escape (DLE) codec.
//!
//! The protocol marks control characters by prefixing them with DLE. A
//! literal DLE inside frame bodies is doubled so the byte after it is never
//! mistaken for a control character. Both transformations are pure and
//! total; `unescape_dle(escape_dle(x)) == x` for every byte sequence `x`.

use crate::protocol::DLE;

/// Escape a byte sequence: every DLE becomes `DLE DLE`.
///
/// # Example
///
/// ```
/// use serwire::escape::escape_dle;
///
/// assert_eq!(escape_dle(&[0x10, 0x41]), vec![0x10, 0x10, 0x41]);
/// ```
pub fn escape_dle(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len());

    for &b in data {
        if b == DLE {
            escaped.push(DLE);
        }
        escaped.push(b);
    }

    escaped
}

/// Unescape a byte sequence: a DLE toggles the escape state and emits
/// nothing; any other byte (or an escaped DLE) is emitted verbatim.
pub fn unescape_dle(data: &[u8]) -> Vec<u8> {
    let mut unescaped = Vec::with_capacity(data.len());
    let mut is_escaped = false;

    for &b in data {
        if !is_escaped && b == DLE {
            is_escaped = true;
            continue;
        }

        is_escaped = false;
        unescaped.push(b);
    }

    unescaped
}
