//! Completion-notes gates shared by every reconciliation path (§4.5).
//!
//! An executor that reports `complete` is not trusted blindly: the notes must
//! clear a minimum length, and are scanned for phrases that indicate the
//! executor gave up but reported success anyway. Both checks run against a
//! Unicode-normalized copy of the text so a curly apostrophe doesn't let
//! `"couldn't find"` slip past the scan.

use crate::constants::{FAILURE_INDICATORS, MIN_COMPLETION_NOTES_LEN, MIN_IDEA_TASK_OUTPUT_LEN};
use crate::{CoreError, Result};

/// Lowercases and folds curly quotes to straight ones so indicator matching
/// is resilient to whatever quoting style an executor's model output used.
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' => '"',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

/// Returns the first failure indicator found in `text`, if any.
pub fn find_failure_indicator(text: &str) -> Option<&'static str> {
    let normalized = normalize(text);
    FAILURE_INDICATORS
        .iter()
        .find(|indicator| normalized.contains(*indicator))
        .copied()
}

/// Outcome of running completion notes through the semantic-completion scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Notes cleared both the minimum-length gate and the indicator scan.
    Genuine,
    /// Notes cleared the length gate but read as a disguised failure; the
    /// caller should downgrade the transition to `quarantined` rather than
    /// `completed`, carrying the matched phrase as the reason.
    SemanticFailure { indicator: &'static str },
}

/// Validates `/api/tasks/:id/complete` and `/workflow-callback` completion
/// notes: rejects notes under [`MIN_COMPLETION_NOTES_LEN`] outright, then
/// scans the rest for failure indicators.
pub fn evaluate_completion_notes(notes: &str) -> Result<CompletionOutcome> {
    let trimmed = notes.trim();
    if trimmed.len() < MIN_COMPLETION_NOTES_LEN {
        return Err(CoreError::validation(format!(
            "completion notes must be at least {MIN_COMPLETION_NOTES_LEN} characters, got {}",
            trimmed.len()
        )));
    }
    match find_failure_indicator(trimmed) {
        Some(indicator) => Ok(CompletionOutcome::SemanticFailure { indicator }),
        None => Ok(CompletionOutcome::Genuine),
    }
}

/// Validates an idea-task's completion `result`: a higher bar than a task's
/// completion notes since idea-task output stands in for a work product, not
/// a human-readable summary.
pub fn evaluate_idea_task_output(output: &str) -> Result<CompletionOutcome> {
    let trimmed = output.trim();
    if trimmed.len() < MIN_IDEA_TASK_OUTPUT_LEN {
        return Err(CoreError::validation(format!(
            "idea task output must be at least {MIN_IDEA_TASK_OUTPUT_LEN} characters, got {}",
            trimmed.len()
        )));
    }
    match find_failure_indicator(trimmed) {
        Some(indicator) => Ok(CompletionOutcome::SemanticFailure { indicator }),
        None => Ok(CompletionOutcome::Genuine),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_under_minimum_length_are_rejected() {
        let result = evaluate_completion_notes("done");
        assert!(result.is_err());
    }

    #[test]
    fn genuine_completion_notes_pass() {
        let notes = "Implemented the login flow, added integration tests, and verified \
                      the session cookie is set on successful auth.";
        assert_eq!(
            evaluate_completion_notes(notes).unwrap(),
            CompletionOutcome::Genuine
        );
    }

    #[test]
    fn disguised_failure_is_flagged() {
        let notes = "I went looking for the referenced file across the whole repository \
                      but it doesn't exist, so I could not complete the requested change.";
        match evaluate_completion_notes(notes).unwrap() {
            CompletionOutcome::SemanticFailure { indicator } => {
                assert_eq!(indicator, "doesn't exist");
            }
            other => panic!("expected semantic failure, got {other:?}"),
        }
    }

    #[test]
    fn curly_quotes_are_normalized_before_scanning() {
        let notes = "I searched thoroughly for the module but couldn\u{2019}t find any trace \
                      of it anywhere in the codebase after an extensive search.";
        match evaluate_completion_notes(notes).unwrap() {
            CompletionOutcome::SemanticFailure { indicator } => {
                assert_eq!(indicator, "couldn't find");
            }
            other => panic!("expected semantic failure, got {other:?}"),
        }
    }

    #[test]
    fn indicator_scan_is_case_insensitive() {
        let notes = "UNABLE TO locate the requested configuration file after searching \
                      every directory in the project tree exhaustively.";
        assert!(matches!(
            evaluate_completion_notes(notes).unwrap(),
            CompletionOutcome::SemanticFailure { .. }
        ));
    }

    #[test]
    fn idea_task_output_has_a_higher_length_bar() {
        let short_but_clears_notes_bar = "x".repeat(60);
        assert!(evaluate_completion_notes(&short_but_clears_notes_bar).is_ok());
        assert!(evaluate_idea_task_output(&short_but_clears_notes_bar).is_err());
    }
}
