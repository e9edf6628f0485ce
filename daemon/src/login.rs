//! Case-insensitive login keys.
//!
//! Logins are matched case-insensitively everywhere: in the runtime
//! registry, the desktop assignment map, and against process command
//! lines. Every map keyed by login stores this normalized form.

/// Normalizes a login for use as a map key: trimmed and lowercased.
pub fn key(login: &str) -> String {
    login.trim().to_lowercase()
}

/// Case-insensitive login equality.
pub fn eq(a: &str, b: &str) -> bool {
    key(a) == key(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_lowercases() {
        assert_eq!(key("MainChar"), "mainchar");
    }

    #[test]
    fn key_trims_whitespace() {
        assert_eq!(key("  main \t"), "main");
    }

    #[test]
    fn key_of_blank_is_empty() {
        assert_eq!(key("   "), "");
        assert_eq!(key(""), "");
    }

    #[test]
    fn eq_ignores_case_and_whitespace() {
        assert!(eq("Main", "main"));
        assert!(eq(" MAIN ", "main"));
        assert!(!eq("main", "alt"));
    }
}
