//! # Fallback Strategies
//!
//! Degrade gracefully when an operation whose result is always needed
//! fails: the caller supplies a fallback derived from the error, and
//! learns which path produced the value.

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, warn};

/// Result of a fallback operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackResult<T, E> {
    /// The primary operation succeeded
    Primary(T),
    /// The primary operation failed and the fallback value was used
    Fallback {
        value: T,
        error: E,
    },
}

impl<T, E> FallbackResult<T, E> {
    /// Returns true if the result used a fallback
    pub fn is_fallback(&self) -> bool {
        matches!(self, FallbackResult::Fallback { .. })
    }

    /// Returns true if the result is from the primary operation
    pub fn is_primary(&self) -> bool {
        matches!(self, FallbackResult::Primary(_))
    }

    /// The primary error, if the fallback was used
    pub fn error(&self) -> Option<&E> {
        match self {
            FallbackResult::Primary(_) => None,
            FallbackResult::Fallback { error, .. } => Some(error),
        }
    }

    /// Gets the value regardless of source
    pub fn into_value(self) -> T {
        match self {
            FallbackResult::Primary(value) | FallbackResult::Fallback { value, .. } => value,
        }
    }

    /// Splits into the value and the primary error, if any
    pub fn into_parts(self) -> (T, Option<E>) {
        match self {
            FallbackResult::Primary(value) => (value, None),
            FallbackResult::Fallback { value, error } => (value, Some(error)),
        }
    }
}

/// Awaits `primary`; on error, builds the value with `fallback`.
///
/// The fallback is synchronous and infallible, so a value is always
/// produced.
pub async fn with_fallback<Fut, T, E, FB>(operation_name: &str, primary: Fut, fallback: FB) -> FallbackResult<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    FB: FnOnce(&E) -> T,
{
    match primary.await {
        Ok(value) => {
            debug!(operation = %operation_name, "Primary operation succeeded");
            FallbackResult::Primary(value)
        }
        Err(error) => {
            warn!(
                operation = %operation_name,
                error = %error,
                "Primary operation failed, using fallback"
            );
            let value = fallback(&error);
            FallbackResult::Fallback { value, error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Error, ErrorKind};

    #[test]
    fn test_primary_success() {
        let result = tokio_test::block_on(with_fallback(
            "analysis",
            async { Ok::<_, Error>("llm text".to_string()) },
            |_| "fallback".to_string(),
        ));

        assert!(result.is_primary());
        assert!(result.error().is_none());
        assert_eq!(result.into_value(), "llm text");
    }

    #[test]
    fn test_fallback_receives_error() {
        let result = tokio_test::block_on(with_fallback(
            "analysis",
            async { Err::<String, _>(Error::new(ErrorKind::AnalysisFailure, "503")) },
            |e| format!("unavailable ({})", e.message),
        ));

        assert!(result.is_fallback());
        let (value, error) = result.into_parts();
        assert_eq!(value, "unavailable (503)");
        assert_eq!(error.map(|e| e.kind), Some(ErrorKind::AnalysisFailure));
    }

    #[test]
    fn test_plain_string_errors() {
        let result: FallbackResult<u32, String> = tokio_test::block_on(with_fallback(
            "count",
            async { Err("boom".to_string()) },
            |_| 0,
        ));

        assert_eq!(result, FallbackResult::Fallback { value: 0, error: "boom".to_string() });
    }
}
