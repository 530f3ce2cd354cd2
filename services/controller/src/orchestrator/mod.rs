//! Reconciliation orchestrators.
//!
//! One pass per invocation, no state kept between passes beyond what lives
//! in the store:
//!
//! `FetchParent -> (NotFound: done | Found: FetchObserved) -> Plan ->
//! ApplyActions -> UpdateStatus -> done`
//!
//! Components return errors unmodified; [`Outcome::from_result`] is the only
//! place that decides between requeue and terminal reporting.

mod child;
mod fleet;

pub use child::ChildReconciler;
pub use fleet::FleetReconciler;

use fleet_reconcile::ReconcileError;
use tracing::{debug, error, warn};

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the next event or resync.
    Done,

    /// Run another pass after a backoff.
    Requeue { reason: String },
}

impl Outcome {
    /// Classifies the result of a pass.
    ///
    /// Configuration errors are expected to have been reported already and
    /// end the pass; retrying them at a tight interval cannot help.
    pub fn from_result(result: Result<(), ReconcileError>) -> Self {
        match result {
            Ok(()) => Outcome::Done,
            Err(err) if err.is_benign() => {
                debug!(error = %err, "object vanished mid-pass");
                Outcome::Done
            }
            Err(err) if err.is_transient() => {
                warn!(error = %err, "transient failure, requeueing");
                Outcome::Requeue {
                    reason: err.to_string(),
                }
            }
            Err(ReconcileError::Configuration(message)) => {
                warn!(error = %message, "configuration error");
                Outcome::Done
            }
            Err(err) => {
                error!(error = %err, "reconciliation failed");
                Outcome::Requeue {
                    reason: err.to_string(),
                }
            }
        }
    }

    pub fn is_requeue(&self) -> bool {
        matches!(self, Outcome::Requeue { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ok(Ok(()), false)]
    #[case::not_found(Err(ReconcileError::NotFound("fleet".into())), false)]
    #[case::conflict(Err(ReconcileError::Conflict("v1".into())), true)]
    #[case::unavailable(Err(ReconcileError::StoreUnavailable("down".into())), true)]
    #[case::configuration(Err(ReconcileError::Configuration("no address".into())), false)]
    #[case::internal(Err(ReconcileError::Internal("bug".into())), true)]
    fn test_outcome_classification(
        #[case] result: Result<(), ReconcileError>,
        #[case] requeue: bool,
    ) {
        assert_eq!(Outcome::from_result(result).is_requeue(), requeue);
    }
}
