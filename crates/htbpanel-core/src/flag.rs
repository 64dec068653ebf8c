//! Flag token validation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Longest flag the platform issues.
pub const MAX_FLAG_LEN: usize = 32;

static FLAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("static regex is valid"));

/// Check a flag before it is sent anywhere, returning it trimmed.
pub fn validate_flag(raw: &str) -> Result<&str> {
    let flag = raw.trim();
    if flag.is_empty() {
        return Err(Error::Validation("flag is empty".into()));
    }
    if flag.len() > MAX_FLAG_LEN {
        return Err(Error::Validation(format!(
            "flag is {} characters, at most {MAX_FLAG_LEN} allowed",
            flag.len()
        )));
    }
    if !FLAG_RE.is_match(flag) {
        return Err(Error::Validation(
            "flag may only contain letters and digits".into(),
        ));
    }
    Ok(flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hex_flag() {
        assert_eq!(
            validate_flag("0123456789abcdef0123456789ABCDEF").unwrap(),
            "0123456789abcdef0123456789ABCDEF"
        );
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(validate_flag("  deadbeef\n").unwrap(), "deadbeef");
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(validate_flag("   "), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_too_long() {
        let long = "a".repeat(MAX_FLAG_LEN + 1);
        assert!(matches!(validate_flag(&long), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_symbols() {
        assert!(matches!(validate_flag("HTB{flag}"), Err(Error::Validation(_))));
        assert!(matches!(validate_flag("abc def"), Err(Error::Validation(_))));
    }
}
