//! Error record domain type

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;

/// A captured pipeline failure, as stored in the metrics tree
///
/// `backtrace` holds one line per link of the error's cause chain, outermost
/// first, so the record stays meaningful after the original error is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub backtrace: Vec<String>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>, backtrace: Vec<String>) -> Self {
        Self {
            message: message.into(),
            backtrace,
        }
    }

    /// Captures an error and its whole `source()` chain
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut backtrace = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = Some(error);
        while let Some(err) = current {
            backtrace.push(err.to_string());
            current = err.source();
        }

        Self {
            message: error.to_string(),
            backtrace,
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Leaf;

    impl std::fmt::Display for Leaf {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "unexpected symbol near '}}'")
        }
    }

    impl StdError for Leaf {}

    #[derive(Debug)]
    struct Wrapper(Leaf);

    impl std::fmt::Display for Wrapper {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "failed to evaluate pipeline definition")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_from_error_walks_chain() {
        let record = ErrorRecord::from_error(&Wrapper(Leaf));

        assert_eq!(record.message, "failed to evaluate pipeline definition");
        assert_eq!(
            record.backtrace,
            vec![
                "failed to evaluate pipeline definition".to_string(),
                "unexpected symbol near '}'".to_string(),
            ]
        );
    }

    #[test]
    fn test_from_error_single_link() {
        let record = ErrorRecord::from_error(&Leaf);
        assert_eq!(record.backtrace.len(), 1);
        assert!(!record.message.is_empty());
    }
}
