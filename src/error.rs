//! Error types for repository checks and notification delivery
//!
//! Configuration and persistence failures use `anyhow` with context, like the
//! rest of the application plumbing. The errors here are the ones callers
//! need to match on: per-repository check failures and per-channel send
//! failures.

use thiserror::Error;

/// Failure of a single repository check. Never aborts the cycle.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The slug is not of the form `owner/name`
    #[error("invalid identifier format: {0}")]
    InvalidSlug(String),

    /// The release source could not produce a tag
    #[error("error fetching release for {slug}: {source}")]
    Fetch {
        slug: String,
        #[source]
        source: FetchError,
    },

    /// The check (fetch plus notification) exceeded the configured timeout
    #[error("check for {slug} timed out after {seconds}s")]
    TimedOut { slug: String, seconds: u64 },
}

impl CheckError {
    /// Slug of the repository the error belongs to
    pub fn slug(&self) -> &str {
        match self {
            CheckError::InvalidSlug(slug) => slug,
            CheckError::Fetch { slug, .. } => slug,
            CheckError::TimedOut { slug, .. } => slug,
        }
    }
}

/// Failure reported by a release source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no published release found for {0}")]
    NotFound(String),

    #[error("release source request failed: {0}")]
    Transport(String),
}

/// Failure to deliver one notification to one channel
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("unsupported notification service: {0}")]
    UnsupportedService(String),

    #[error("invalid notification url: {0}")]
    InvalidUrl(String),

    /// Built from a `reqwest::Error` stripped of its URL
    #[error("notification request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("notification endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_error_carries_slug() {
        let invalid = CheckError::InvalidSlug("no-slash".to_string());
        assert_eq!(invalid.slug(), "no-slash");
        assert_eq!(invalid.to_string(), "invalid identifier format: no-slash");

        let fetch = CheckError::Fetch {
            slug: "octocat/Hello-World".to_string(),
            source: FetchError::NotFound("octocat/Hello-World".to_string()),
        };
        assert_eq!(fetch.slug(), "octocat/Hello-World");
        assert!(fetch.to_string().contains("error fetching release for octocat/Hello-World"));
        assert!(fetch.to_string().contains("no published release found"));

        let timed_out = CheckError::TimedOut {
            slug: "rust-lang/rust".to_string(),
            seconds: 5,
        };
        assert_eq!(timed_out.slug(), "rust-lang/rust");
        assert_eq!(timed_out.to_string(), "check for rust-lang/rust timed out after 5s");
    }

    #[test]
    fn test_fetch_error_is_exposed_as_source() {
        use std::error::Error as _;

        let err = CheckError::Fetch {
            slug: "a/b".to_string(),
            source: FetchError::Transport("connection reset".to_string()),
        };
        let source = err.source().expect("fetch errors expose their cause");
        assert_eq!(source.to_string(), "release source request failed: connection reset");
    }
}
