//! Modality health tracking
//!
//! Folds every resolved modality attempt into a per-modality summary that
//! `getContext` reports to hosts. Health is observational: it never changes
//! which modalities the controller attempts.
//!
//! ```text
//! last attempt succeeded        → Full
//! 1-2 failures since a success  → Partial
//! 3+ failures since a success   → Unavailable
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::modality::{Modality, ModalityResult};

/// Failures in a row before a modality is reported unavailable
const UNAVAILABLE_AFTER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Full,
    Partial,
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// What the recent attempts of one modality looked like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalityHealth {
    pub modality: Modality,
    pub level: DegradationLevel,
    pub attempts: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    /// Duration of the most recent attempt, successful or not
    pub last_duration_ms: u64,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl ModalityHealth {
    fn new(modality: Modality) -> Self {
        Self {
            modality,
            level: DegradationLevel::Full,
            attempts: 0,
            failures: 0,
            consecutive_failures: 0,
            last_duration_ms: 0,
            last_error: None,
            last_success_at: None,
        }
    }

    fn observe(&mut self, result: &ModalityResult) {
        self.attempts += 1;
        self.last_duration_ms = result.duration_ms;

        match &result.error {
            None => {
                self.consecutive_failures = 0;
                self.last_error = None;
                self.last_success_at = Some(Utc::now());
            }
            Some(error) => {
                self.failures += 1;
                self.consecutive_failures += 1;
                self.last_error = Some(error.clone());
            }
        }

        self.level = match self.consecutive_failures {
            0 => DegradationLevel::Full,
            n if n < UNAVAILABLE_AFTER => DegradationLevel::Partial,
            _ => DegradationLevel::Unavailable,
        };
    }
}

/// Health of every modality that has been attempted
#[derive(Debug, Clone, Default)]
pub struct HealthBoard {
    entries: BTreeMap<Modality, ModalityHealth>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &ModalityResult) {
        self.entries
            .entry(result.modality)
            .or_insert_with(|| ModalityHealth::new(result.modality))
            .observe(result);
    }

    /// Entries in modality order
    pub fn snapshot(&self) -> Vec<ModalityHealth> {
        self.entries.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(board: &HealthBoard, modality: Modality) -> ModalityHealth {
        board
            .snapshot()
            .into_iter()
            .find(|h| h.modality == modality)
            .unwrap()
    }

    #[test]
    fn test_failures_degrade_then_one_success_restores() {
        let mut board = HealthBoard::new();
        board.record(&ModalityResult::failure(Modality::Vision, "CUDA out of memory", 40));
        assert_eq!(entry(&board, Modality::Vision).level, DegradationLevel::Partial);

        board.record(&ModalityResult::failure(Modality::Vision, "vision call timed out after 30000ms", 30_000));
        board.record(&ModalityResult::failure(Modality::Vision, "bad gateway", 12));
        let vision = entry(&board, Modality::Vision);
        assert_eq!(vision.level, DegradationLevel::Unavailable);
        assert_eq!(vision.consecutive_failures, 3);
        assert_eq!(vision.last_error.as_deref(), Some("bad gateway"));
        assert!(vision.last_success_at.is_none());

        board.record(&ModalityResult::success(Modality::Vision, "a chart", 800));
        let vision = entry(&board, Modality::Vision);
        assert_eq!(vision.level, DegradationLevel::Full);
        assert_eq!(vision.attempts, 4);
        assert_eq!(vision.failures, 3);
        assert_eq!(vision.last_duration_ms, 800);
        assert!(vision.last_error.is_none());
        assert!(vision.last_success_at.is_some());
    }

    #[test]
    fn test_board_lists_only_attempted_modalities() {
        let mut board = HealthBoard::new();
        assert!(board.snapshot().is_empty());

        board.record(&ModalityResult::success(Modality::Voice, "hi", 5));
        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].modality, Modality::Voice);
    }

    #[test]
    fn test_health_serializes_camel_case() {
        let mut board = HealthBoard::new();
        board.record(&ModalityResult::failure(Modality::Voice, "mic", 3));
        let value = serde_json::to_value(board.snapshot()).unwrap();
        assert_eq!(value[0]["consecutiveFailures"], 1);
        assert_eq!(value[0]["level"], "partial");
        assert_eq!(DegradationLevel::Unavailable.to_string(), "unavailable");
    }
}
