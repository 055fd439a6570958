//! Review maintenance commands.
//!
//! # Usage
//!
//! ```bash
//! # See how many reviews would flip without touching anything
//! bazaar reviews reconcile --dry-run
//!
//! # Flip at most 1000, fetching 200 at a time
//! bazaar reviews reconcile --limit 1000 --batch-size 200 --yes
//! ```
//!
//! The pass only ever sets `is_verified`; running it twice changes nothing
//! the second time.

use bazaar_storefront::db::PgStore;
use bazaar_storefront::services::{ReconcileOptions, ReconcileReport, ReviewService};

use super::{CliError, connect};

/// Re-check unverified reviews against purchase history.
pub async fn reconcile(
    options: ReconcileOptions,
    confirmed: bool,
) -> Result<ReconcileReport, CliError> {
    if !options.dry_run && !confirmed {
        return Err(CliError::Unconfirmed("reviews reconcile"));
    }

    let store = PgStore::new(connect().await?);

    tracing::info!(
        dry_run = options.dry_run,
        limit = ?options.limit,
        batch_size = options.batch_size,
        "Reconciling review verification..."
    );
    let report = ReviewService::new(&store).reconcile(options).await?;

    tracing::info!(
        scanned = report.scanned,
        matched = report.matched,
        updated = report.updated,
        failed = report.failed,
        "Review reconciliation complete"
    );
    if options.dry_run {
        tracing::info!("Dry run: {} reviews would be marked verified", report.matched);
    }
    if report.failed > 0 {
        tracing::warn!("{} reviews could not be checked; see errors above", report.failed);
    }

    Ok(report)
}
