//! Per-session processing context
//!
//! Holds the caller's current modality selection and the ordered history of
//! modality results. The controller is the only writer; processors receive
//! a snapshot and use it to ground prompts in earlier results (for example a
//! voice follow-up that refers to a screenshot analysed a moment ago).

use serde::{Deserialize, Serialize};

use crate::modality::{Modality, ModalityResult, ModalitySelection};

/// Maximum characters of a prior result quoted in a grounding prompt
const GROUNDING_PREVIEW_CHARS: usize = 400;

/// Per-session state for cross-modal grounding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingContext {
    current_modality: ModalitySelection,
    history: Vec<ModalityResult>,
    #[serde(default)]
    history_limit: usize,
}

impl ProcessingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that keeps at most `limit` history entries (0 = unbounded)
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history_limit: limit,
            ..Self::default()
        }
    }

    pub fn current_modality(&self) -> ModalitySelection {
        self.current_modality
    }

    pub fn history(&self) -> &[ModalityResult] {
        &self.history
    }

    /// Replace the current selection, returning the previous one
    pub(crate) fn switch_modality(&mut self, to: ModalitySelection) -> ModalitySelection {
        std::mem::replace(&mut self.current_modality, to)
    }

    /// Append a resolved attempt, evicting the oldest entry past the limit
    pub(crate) fn record(&mut self, result: ModalityResult) {
        self.history.push(result);
        if self.history_limit > 0 && self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            self.history.drain(..excess);
        }
    }

    /// Clear history and return to automatic selection
    pub(crate) fn reset(&mut self) {
        self.current_modality = ModalitySelection::Auto;
        self.history.clear();
    }

    /// Most recent successful result, optionally restricted to one modality
    pub fn last_success(&self, modality: Option<Modality>) -> Option<&ModalityResult> {
        self.history
            .iter()
            .rev()
            .filter(|r| r.success)
            .find(|r| modality.map_or(true, |m| r.modality == m))
    }

    /// Summary of earlier results from modalities other than `for_modality`,
    /// newest first, one per modality. Empty when nothing is worth quoting.
    pub fn grounding_summary(&self, for_modality: Modality) -> String {
        let mut lines = Vec::new();
        for modality in Modality::ALL {
            if modality == for_modality {
                continue;
            }
            if let Some(result) = self.last_success(Some(modality)) {
                lines.push(format!("[{}] {}", modality, preview(&result.text)));
            }
        }

        if lines.is_empty() {
            String::new()
        } else {
            format!("Earlier in this session:\n{}", lines.join("\n"))
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > GROUNDING_PREVIEW_CHARS {
        let cut: String = text.chars().take(GROUNDING_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_in_order() {
        let mut ctx = ProcessingContext::new();
        ctx.record(ModalityResult::failure(Modality::Vision, "boom", 5));
        ctx.record(ModalityResult::success(Modality::Voice, "hello", 7));

        assert_eq!(ctx.history().len(), 2);
        assert_eq!(ctx.history()[0].modality, Modality::Vision);
        assert_eq!(ctx.history()[1].text, "hello");
    }

    #[test]
    fn test_history_limit_evicts_oldest() {
        let mut ctx = ProcessingContext::with_history_limit(2);
        for i in 0..4 {
            ctx.record(ModalityResult::success(Modality::Voice, format!("t{}", i), 1));
        }
        let texts: Vec<_> = ctx.history().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["t2", "t3"]);
    }

    #[test]
    fn test_switch_and_reset() {
        let mut ctx = ProcessingContext::new();
        assert_eq!(
            ctx.switch_modality(ModalitySelection::Vision),
            ModalitySelection::Auto
        );
        ctx.record(ModalityResult::success(Modality::Vision, "x", 1));
        ctx.reset();
        assert_eq!(ctx.current_modality(), ModalitySelection::Auto);
        assert!(ctx.history().is_empty());
    }

    #[test]
    fn test_grounding_summary_quotes_other_modalities() {
        let mut ctx = ProcessingContext::new();
        assert_eq!(ctx.grounding_summary(Modality::Voice), "");

        ctx.record(ModalityResult::success(Modality::Vision, "UI with login form", 3));
        ctx.record(ModalityResult::failure(Modality::Vision, "later failure", 3));
        ctx.record(ModalityResult::success(Modality::Voice, "click submit", 3));

        let summary = ctx.grounding_summary(Modality::Voice);
        assert!(summary.contains("[vision] UI with login form"));
        assert!(!summary.contains("click submit"));

        let summary = ctx.grounding_summary(Modality::Vision);
        assert!(summary.contains("[voice] click submit"));
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "a".repeat(GROUNDING_PREVIEW_CHARS + 10);
        let mut ctx = ProcessingContext::new();
        ctx.record(ModalityResult::success(Modality::Vision, long, 1));
        let summary = ctx.grounding_summary(Modality::Voice);
        assert!(summary.ends_with("..."));
    }
}
