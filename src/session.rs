use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::BatchOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionTotals {
    pub attempted: usize,
    pub success: usize,
    pub failed: usize,
}

pub fn calculate_totals(batches: &[BatchOutcome]) -> SessionTotals {
    batches
        .iter()
        .fold(SessionTotals::default(), |totals, batch| SessionTotals {
            attempted: totals.attempted + batch.attempted,
            success: totals.success + batch.success,
            failed: totals.failed + batch.failed,
        })
}

/// Collects batch outcomes while a run is in progress.
#[derive(Debug)]
pub struct SessionRecorder {
    started_at: DateTime<Local>,
    batches: Vec<BatchOutcome>,
}

impl SessionRecorder {
    pub fn start() -> Self {
        Self::started_at(Local::now())
    }

    pub fn started_at(started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            batches: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: BatchOutcome) {
        self.batches.push(outcome);
    }

    pub fn finish(self) -> SessionOutcome {
        self.finish_at(Local::now())
    }

    pub fn finish_at(self, finished_at: DateTime<Local>) -> SessionOutcome {
        SessionOutcome {
            totals: calculate_totals(&self.batches),
            started_at: self.started_at,
            finished_at,
            batches: self.batches,
        }
    }
}

/// A finished run. Totals are computed once from the batches.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub batches: Vec<BatchOutcome>,
    pub totals: SessionTotals,
}

impl SessionOutcome {
    pub fn duration_secs(&self) -> u64 {
        (self.finished_at - self.started_at).num_seconds().max(0) as u64
    }

    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0
    }
}
