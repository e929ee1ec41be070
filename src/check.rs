use tracing::{debug, info};

use crate::config::{NotificationChannel, RepositoryEntry};
use crate::error::CheckError;
use crate::github::{ReleaseSource, RepoSlug};
use crate::notify::{DispatchReport, Notifier, ReleaseEvent};

/// Result of checking one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Latest release matches the stored tag
    Unchanged { tag: String },
    /// A new tag was recorded and announced
    Updated {
        previous: String,
        current: String,
        report: DispatchReport,
    },
}

/// Check one repository for a new release.
///
/// The stored tag is replaced before notifications go out, so a failed send
/// does not cause the same release to be announced again on the next cycle.
/// An empty stored tag counts as a change: the first check of a newly added
/// repository always announces its current release.
pub async fn check_repository(
    entry: &mut RepositoryEntry,
    source: &dyn ReleaseSource,
    notifier: &Notifier,
    channels: &[NotificationChannel],
) -> Result<CheckOutcome, CheckError> {
    let slug = RepoSlug::parse(&entry.slug)?;

    let tag = source
        .latest_release_tag(&slug)
        .await
        .map_err(|source| CheckError::Fetch {
            slug: entry.slug.clone(),
            source,
        })?;

    if entry.current_release_tag == tag {
        debug!("No new release for {} (still {})", entry.slug, tag);
        return Ok(CheckOutcome::Unchanged { tag });
    }

    let previous = std::mem::replace(&mut entry.current_release_tag, tag.clone());
    if previous.is_empty() {
        info!("First release observed for {}: {}", entry.slug, tag);
    } else {
        info!("Release changed for {}: {} -> {}", entry.slug, previous, tag);
    }

    let event = ReleaseEvent::new(entry.slug.clone(), tag.clone());
    let report = notifier.notify(&event, channels).await;

    Ok(CheckOutcome::Updated {
        previous,
        current: tag,
        report,
    })
}
