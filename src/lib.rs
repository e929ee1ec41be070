//! ReleaseSentry - GitHub Release Monitor
//!
//! ReleaseSentry keeps a list of GitHub repositories together with the last
//! release tag seen for each, polls for the latest release, and announces
//! every change to a set of notification channels. The YAML configuration
//! file doubles as the state store: observed tags are written back to it.
//!
//! ## Core Features
//!
//! - **Concurrent Checks**: Bounded parallel release lookups with per-check timeouts
//! - **Notification Channels**: Webhooks, Discord and Power Automate adaptive cards
//! - **Authentication**: Config token, `GITHUB_TOKEN`, or anonymous access
//! - **Daemon Mode**: Interval polling with graceful SIGINT/SIGTERM shutdown
//!
//! ## Modules
//!
//! - [`config`]: Configuration and persisted state
//! - [`github`]: Release source backed by the GitHub API
//! - [`notify`]: Message formatting and delivery
//! - [`check`]: Single-repository release check
//! - [`monitor`]: Concurrent check cycle
//! - [`daemon`]: Scheduling, shutdown and persistence

pub mod check;
pub mod config;
pub mod daemon;
pub mod error;
pub mod github;
pub mod monitor;
pub mod notify;

pub use check::{check_repository, CheckOutcome};
pub use config::{Config, NotificationChannel, RepositoryEntry};
pub use daemon::{Daemon, DaemonState, DaemonStatus, RunMode};
pub use error::{CheckError, FetchError, NotifyError};
pub use github::{GitHubClient, ReleaseSource, RepoSlug};
pub use monitor::{CheckSummary, ReleaseMonitor};
pub use notify::{HttpTransport, NotificationTransport, Notifier, ReleaseEvent};
