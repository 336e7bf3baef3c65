//! crates/consultation_core/src/ledger.rs
//!
//! Derives the platform/agronomist revenue split and tracks payout
//! collection for completed consultations.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{CommissionSplit, Consultation};
use crate::ports::{CasOutcome, Clock, ConsultationStore, EngineError, EngineResult};

/// Platform share of the consultation price.
const PLATFORM_RATE: f64 = 0.30;
/// Agronomist share of the consultation price.
const AGRONOMIST_RATE: f64 = 0.70;

/// Splits `amount` 30/70 between the platform and the agronomist.
///
/// Each share is rounded half-up independently, so the two shares may sum to
/// `amount` plus or minus one unit of currency. That residual is accepted,
/// not corrected.
pub fn commission_split(amount: i64) -> CommissionSplit {
    CommissionSplit {
        platform_share: (amount as f64 * PLATFORM_RATE).round() as i64,
        agronomist_share: (amount as f64 * AGRONOMIST_RATE).round() as i64,
    }
}

/// Settlement and payout-collection operations over the store.
#[derive(Clone)]
pub struct CommissionLedger {
    store: Arc<dyn ConsultationStore>,
    clock: Arc<dyn Clock>,
}

impl CommissionLedger {
    pub fn new(store: Arc<dyn ConsultationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The split recorded on a consultation. The shares were computed when
    /// `amount` was set, never at completion time.
    pub fn settle(&self, consultation: &Consultation) -> CommissionSplit {
        CommissionSplit {
            platform_share: consultation.platform_share,
            agronomist_share: consultation.agronomist_share,
        }
    }

    /// Marks the agronomist's share as collected. Allowed only once the
    /// consultation is `completed`; calling it again is a no-op success and
    /// leaves the original `collected_at` untouched.
    pub async fn mark_collected(&self, id: Uuid) -> EngineResult<Consultation> {
        match self.store.mark_collected(id, self.clock.now()).await? {
            CasOutcome::Applied(consultation) => Ok(consultation),
            CasOutcome::Rejected(current) => Err(EngineError::InvalidTransition {
                id,
                status: current.status,
            }),
        }
    }
}
