//! Header key canonicalization.

/// Canonical form of a header key: the first letter and every letter
/// following a hyphen are upper case, the rest lower case.
///
/// Keys containing a byte that is not a valid token byte (spaces, colons,
/// non-ASCII) are returned unchanged.
pub fn canonical_header_key(raw: &[u8]) -> String {
    if !raw.iter().copied().all(is_token_byte) {
        return String::from_utf8_lossy(raw).into_owned();
    }

    let mut key = String::with_capacity(raw.len());
    let mut upper = true;
    for &byte in raw {
        let byte = if upper {
            byte.to_ascii_uppercase()
        } else {
            byte.to_ascii_lowercase()
        };
        key.push(char::from(byte));
        upper = byte == b'-';
    }
    key
}

/// `tchar` from RFC 9110.
fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}
