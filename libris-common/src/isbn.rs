//! ISBN normalization and conversion
//!
//! Stored ISBNs are compact: no hyphens or spaces, upper-case `X`.
//! Check digits are not verified on input (catalogue data from CSV exports
//! frequently carries bad ones), but conversions always compute a correct one.

use crate::{Error, Result};

/// Strip separators and upper-case the ISBN-10 check character
pub fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Normalize an ISBN-13 field; blank input yields `None`
pub fn normalize_isbn13(raw: &str) -> Result<Option<String>> {
    let isbn = compact(raw);
    if isbn.is_empty() {
        return Ok(None);
    }
    if isbn.len() != 13 || !isbn.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation(format!(
            "isbn13 must be 13 digits, got {:?}",
            raw.trim()
        )));
    }
    Ok(Some(isbn))
}

/// Normalize an ISBN-10 field; blank input yields `None`
pub fn normalize_isbn10(raw: &str) -> Result<Option<String>> {
    let isbn = compact(raw);
    if isbn.is_empty() {
        return Ok(None);
    }
    if !is_isbn10_shape(&isbn) {
        return Err(Error::validation(format!(
            "isbn10 must be 9 digits followed by a digit or X, got {:?}",
            raw.trim()
        )));
    }
    Ok(Some(isbn))
}

fn is_isbn10_shape(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    bytes.len() == 10
        && bytes[..9].iter().all(u8::is_ascii_digit)
        && (bytes[9].is_ascii_digit() || bytes[9] == b'X')
}

/// Convert an ISBN-10 to its 978-prefixed ISBN-13 form
pub fn isbn10_to_13(isbn10: &str) -> Option<String> {
    let isbn10 = compact(isbn10);
    if !is_isbn10_shape(&isbn10) {
        return None;
    }
    let body = format!("978{}", &isbn10[..9]);
    let sum: u32 = body
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 0 {
                digit
            } else {
                digit * 3
            }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    Some(format!("{}{}", body, check))
}

/// Convert a 978-prefixed ISBN-13 to its ISBN-10 form
///
/// 979-prefixed ISBNs have no ISBN-10 equivalent.
pub fn isbn13_to_10(isbn13: &str) -> Option<String> {
    let isbn13 = compact(isbn13);
    if isbn13.len() != 13 || !isbn13.starts_with("978") {
        return None;
    }
    if !isbn13.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let body = &isbn13[3..12];
    let sum: u32 = body
        .bytes()
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * (10 - i as u32))
        .sum();
    let check = (11 - sum % 11) % 11;
    let check = if check == 10 {
        'X'
    } else {
        char::from(b'0' + check as u8)
    };
    Some(format!("{}{}", body, check))
}

/// Every compact form a scanned code may be stored under
///
/// A scanned 13-digit barcode also matches the ISBN-10 of the same book and
/// the other way round.
pub fn lookup_keys(raw: &str) -> Vec<String> {
    let isbn = compact(raw);
    let mut keys = Vec::new();
    if isbn.is_empty() {
        return keys;
    }
    if let Some(converted) = isbn13_to_10(&isbn).or_else(|| isbn10_to_13(&isbn)) {
        keys.push(converted);
    }
    keys.insert(0, isbn);
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_strips_separators() {
        assert_eq!(compact(" 978-0-306-40615-7 "), "9780306406157");
        assert_eq!(compact("0-8044-2957-x"), "080442957X");
    }

    #[test]
    fn test_normalize_isbn13() {
        assert_eq!(
            normalize_isbn13("978-0-306-40615-7").unwrap(),
            Some("9780306406157".to_string())
        );
        assert_eq!(normalize_isbn13("   ").unwrap(), None);
        assert!(normalize_isbn13("97803064061").is_err());
        assert!(normalize_isbn13("978030640615X").is_err());
    }

    #[test]
    fn test_normalize_isbn10() {
        assert_eq!(
            normalize_isbn10("0-8044-2957-x").unwrap(),
            Some("080442957X".to_string())
        );
        assert!(normalize_isbn10("X804429570").is_err());
        assert!(normalize_isbn10("12345").is_err());
    }

    #[test]
    fn test_isbn10_to_13() {
        assert_eq!(isbn10_to_13("0306406152").as_deref(), Some("9780306406157"));
        assert_eq!(isbn10_to_13("080442957X").as_deref(), Some("9780804429573"));
        assert_eq!(isbn10_to_13("bogus"), None);
    }

    #[test]
    fn test_isbn13_to_10() {
        assert_eq!(isbn13_to_10("9780306406157").as_deref(), Some("0306406152"));
        assert_eq!(isbn13_to_10("9780804429573").as_deref(), Some("080442957X"));
        assert_eq!(isbn13_to_10("9791234567896"), None);
    }

    #[test]
    fn test_lookup_keys_include_both_forms() {
        assert_eq!(
            lookup_keys("978-0-306-40615-7"),
            vec!["9780306406157".to_string(), "0306406152".to_string()]
        );
        assert_eq!(
            lookup_keys("0306406152"),
            vec!["0306406152".to_string(), "9780306406157".to_string()]
        );
        assert!(lookup_keys("  ").is_empty());
    }
}
