//! Status reporting surface.
//!
//! The render coordinator hands every finished pass to a [`StatusReporter`].
//! No status schema is written back onto instances yet; the only reporter logs.

use crate::render::PassReport;
use async_trait::async_trait;
use stackhook_core::{Instance, Result};
use tracing::{info, warn};

#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, instance: &Instance, report: &PassReport) -> Result<()>;
}

/// Logs the pass outcome instead of writing instance status.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusReporter;

#[async_trait]
impl StatusReporter for LogStatusReporter {
    async fn report(&self, instance: &Instance, report: &PassReport) -> Result<()> {
        let failed = report.failed_hooks().count();
        if failed > 0 {
            warn!(
                kind = instance.kind(),
                key = %instance.key(),
                outcome = %report.outcome,
                failed,
                submitted = report.submitted().count(),
                "status not written; pass had failures"
            );
        } else {
            info!(
                kind = instance.kind(),
                key = %instance.key(),
                outcome = %report.outcome,
                submitted = report.submitted().count(),
                "status not written"
            );
        }
        Ok(())
    }
}
