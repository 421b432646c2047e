//! Redacting wrapper for token material
//!
//! Access tokens, refresh tokens and passwords travel through tracing spans
//! and `Debug` output all over the session code. Wrapping them keeps the raw
//! value out of logs; callers reach it only through `expose()`.

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value. Redacted in Debug/Display, zeroized on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the raw value (for building headers and persisting to disk).
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Whether the wrapped string is empty. Empty tokens count as absent.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_redacted_in_debug_and_display() {
        let token = Secret::from("eyJhbGciOiJIUzI1NiJ9.e30.sig");
        assert_eq!(format!("{token:?}"), "[REDACTED]");
        assert_eq!(format!("{token}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_raw_token() {
        let token = Secret::new(String::from("rt_abc"));
        assert_eq!(token.expose(), "rt_abc");
    }

    #[test]
    fn empty_token_detected() {
        assert!(Secret::from("").is_empty());
        assert!(!Secret::from("at").is_empty());
    }

    #[test]
    fn redaction_survives_nesting() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Pair {
            access: Secret<String>,
        }
        let pair = Pair {
            access: Secret::from("at_visible?"),
        };
        let debug = format!("{pair:?}");
        assert!(!debug.contains("at_visible?"), "got: {debug}");
    }
}
