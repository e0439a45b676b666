//! Step-output matching.

use serde::Serialize;

use crate::types::LessonStep;

/// The outcome of checking observed terminal output against a step's
/// expectation. On mismatch both normalized forms are carried for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputCheck {
    /// Whether the output matched (or no expectation was set).
    pub valid: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Normalized expected output, present on mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Normalized observed output, present on mismatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

/// Compare observed output with the step's expectation.
///
/// Both sides are trimmed before comparison. A step without an expectation
/// always matches; an empty expectation counts as no expectation.
#[must_use]
pub fn check_output(step: &LessonStep, observed: &str) -> OutputCheck {
    let expected = step
        .expected
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let Some(normalized_expected) = expected else {
        return OutputCheck {
            valid: true,
            message: "No expected output for this step".to_string(),
            expected: None,
            received: None,
        };
    };

    let normalized_observed = observed.trim();

    if normalized_expected == normalized_observed {
        OutputCheck {
            valid: true,
            message: "Step completed successfully".to_string(),
            expected: None,
            received: None,
        }
    } else {
        OutputCheck {
            valid: false,
            message: "Output does not match expected result".to_string(),
            expected: Some(normalized_expected.to_string()),
            received: Some(normalized_observed.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LessonStep;

    fn step_expecting(expected: &str) -> LessonStep {
        let mut step = LessonStep::new("step-a");
        step.commands = vec!["echo 'Hello, World!'".to_string()];
        step.expected = Some(expected.to_string());
        step
    }

    #[test]
    fn trailing_newline_in_expectation_matches() {
        let step = step_expecting("Hello, World!\n");
        let check = check_output(&step, "Hello, World!");
        assert!(check.valid);
        assert!(check.expected.is_none());
    }

    #[test]
    fn mismatch_carries_both_forms() {
        let step = step_expecting("Hello, World!\n");
        let check = check_output(&step, "Hello");
        assert!(!check.valid);
        assert_eq!(check.expected.as_deref(), Some("Hello, World!"));
        assert_eq!(check.received.as_deref(), Some("Hello"));
    }

    #[test]
    fn no_expectation_always_matches() {
        let step = LessonStep::new("step-a");
        let check = check_output(&step, "anything at all");
        assert!(check.valid);
    }

    #[test]
    fn empty_expectation_always_matches() {
        let check = check_output(&step_expecting(""), "anything at all");
        assert!(check.valid);

        let check = check_output(&step_expecting("  \n  "), "anything at all");
        assert!(check.valid);
    }

    #[test]
    fn surrounding_whitespace_ignored_on_both_sides() {
        let step = step_expecting("  ok  ");
        assert!(check_output(&step, "\nok\n").valid);
    }
}
