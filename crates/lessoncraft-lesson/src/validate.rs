//! Lesson validation applied on create and update.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::safety::{validate_command, CommandViolation, SafetyPolicy};
use crate::types::Lesson;

const MAX_TITLE_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_STEPS: usize = 50;
const MAX_CONTENT_LEN: usize = 5000;
const MAX_COMMANDS: usize = 10;
const MAX_COMMAND_LEN: usize = 500;
const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Why a lesson was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The title is empty.
    #[error("lesson title is required")]
    TitleRequired,
    /// The title exceeds 100 characters.
    #[error("lesson title must be at most {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    /// The description is empty.
    #[error("lesson description is required")]
    DescriptionRequired,
    /// The description exceeds 500 characters.
    #[error("lesson description must be at most {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
    /// The lesson has no steps.
    #[error("lesson must have at least one step")]
    NoSteps,
    /// The lesson has more than 50 steps.
    #[error("lesson cannot have more than {MAX_STEPS} steps")]
    TooManySteps,
    /// A step has an empty ID.
    #[error("step {step} ID is required")]
    StepIdRequired {
        /// One-based step number.
        step: usize,
    },
    /// Two steps share an ID.
    #[error("duplicate step ID: {id}")]
    DuplicateStepId {
        /// The repeated ID.
        id: String,
    },
    /// A step has no content.
    #[error("step {step} content is required")]
    ContentRequired {
        /// One-based step number.
        step: usize,
    },
    /// A step's content exceeds 5000 characters.
    #[error("step {step} content must be at most {MAX_CONTENT_LEN} characters")]
    ContentTooLong {
        /// One-based step number.
        step: usize,
    },
    /// A step declares an expected output but no commands.
    #[error("step {step} has expected output but no commands")]
    ExpectedWithoutCommands {
        /// One-based step number.
        step: usize,
    },
    /// A step has more than 10 commands.
    #[error("step {step} cannot have more than {MAX_COMMANDS} commands")]
    TooManyCommands {
        /// One-based step number.
        step: usize,
    },
    /// A command exceeds 500 characters.
    #[error("step {step} command {command} must be at most {MAX_COMMAND_LEN} characters")]
    CommandTooLong {
        /// One-based step number.
        step: usize,
        /// One-based command number.
        command: usize,
    },
    /// A command failed the safety filter.
    #[error("step {step} command {command} rejected: {violation}")]
    UnsafeCommand {
        /// One-based step number.
        step: usize,
        /// One-based command number.
        command: usize,
        /// The specific violation.
        violation: CommandViolation,
    },
    /// A step's timeout is outside `[0, 1h]`.
    #[error("step {step} timeout must be between 0 and 1 hour")]
    InvalidTimeout {
        /// One-based step number.
        step: usize,
    },
}

/// Validate a lesson against the authoring rules.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found, in document order.
pub fn validate_lesson(lesson: &Lesson, policy: SafetyPolicy) -> Result<(), ValidationError> {
    if lesson.title.is_empty() {
        return Err(ValidationError::TitleRequired);
    }
    if lesson.title.len() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong);
    }
    if lesson.description.is_empty() {
        return Err(ValidationError::DescriptionRequired);
    }
    if lesson.description.len() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::DescriptionTooLong);
    }
    if lesson.steps.is_empty() {
        return Err(ValidationError::NoSteps);
    }
    if lesson.steps.len() > MAX_STEPS {
        return Err(ValidationError::TooManySteps);
    }

    let mut seen_ids = HashSet::new();
    for (i, step) in lesson.steps.iter().enumerate() {
        let number = i + 1;

        if step.id.is_empty() {
            return Err(ValidationError::StepIdRequired { step: number });
        }
        if !seen_ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId {
                id: step.id.clone(),
            });
        }

        if step.content.is_empty() {
            return Err(ValidationError::ContentRequired { step: number });
        }
        if step.content.len() > MAX_CONTENT_LEN {
            return Err(ValidationError::ContentTooLong { step: number });
        }

        if step.expected.is_some() && step.commands.is_empty() {
            return Err(ValidationError::ExpectedWithoutCommands { step: number });
        }
        if step.commands.len() > MAX_COMMANDS {
            return Err(ValidationError::TooManyCommands { step: number });
        }

        for (j, command) in step.commands.iter().enumerate() {
            if command.len() > MAX_COMMAND_LEN {
                return Err(ValidationError::CommandTooLong {
                    step: number,
                    command: j + 1,
                });
            }
            validate_command(command, policy).map_err(|violation| {
                ValidationError::UnsafeCommand {
                    step: number,
                    command: j + 1,
                    violation,
                }
            })?;
        }

        if step.timeout > MAX_TIMEOUT {
            return Err(ValidationError::InvalidTimeout { step: number });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lesson, LessonStep};

    fn valid_lesson() -> Lesson {
        let mut lesson = Lesson::new("T", "D");
        let mut step = LessonStep::new("step-a");
        step.content = "Run the command.".to_string();
        step.commands = vec!["echo hi".to_string()];
        step.expected = Some("hi".to_string());
        lesson.steps.push(step);
        lesson
    }

    #[test]
    fn accepts_valid_lesson() {
        assert!(validate_lesson(&valid_lesson(), SafetyPolicy::Strict).is_ok());
    }

    #[test]
    fn rejects_missing_title() {
        let mut lesson = valid_lesson();
        lesson.title = String::new();
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::TitleRequired)
        );
    }

    #[test]
    fn rejects_long_title() {
        let mut lesson = valid_lesson();
        lesson.title = "t".repeat(101);
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::TitleTooLong)
        );
    }

    #[test]
    fn rejects_long_description() {
        let mut lesson = valid_lesson();
        lesson.description = "d".repeat(501);
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::DescriptionTooLong)
        );
    }

    #[test]
    fn rejects_no_steps() {
        let mut lesson = valid_lesson();
        lesson.steps.clear();
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::NoSteps)
        );
    }

    #[test]
    fn rejects_too_many_steps() {
        let mut lesson = valid_lesson();
        for n in 0..51 {
            let mut step = LessonStep::new(format!("s{n}"));
            step.content = "c".to_string();
            lesson.steps.push(step);
        }
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::TooManySteps)
        );
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let mut lesson = valid_lesson();
        let mut dup = LessonStep::new("step-a");
        dup.content = "again".to_string();
        lesson.steps.push(dup);
        assert!(matches!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::DuplicateStepId { .. })
        ));
    }

    #[test]
    fn rejects_expected_without_commands() {
        let mut lesson = valid_lesson();
        lesson.steps[0].commands.clear();
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::ExpectedWithoutCommands { step: 1 })
        );
    }

    #[test]
    fn rejects_too_many_commands() {
        let mut lesson = valid_lesson();
        lesson.steps[0].commands = (0..11).map(|n| format!("echo {n}")).collect();
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::TooManyCommands { step: 1 })
        );
    }

    #[test]
    fn rejects_long_command() {
        let mut lesson = valid_lesson();
        lesson.steps[0].commands = vec![format!("echo {}", "x".repeat(500))];
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::CommandTooLong {
                step: 1,
                command: 1
            })
        );
    }

    #[test]
    fn rejects_unsafe_command() {
        let mut lesson = valid_lesson();
        lesson.steps[0].commands = vec!["rm -rf /".to_string()];
        assert!(matches!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::UnsafeCommand {
                step: 1,
                command: 1,
                ..
            })
        ));
    }

    #[test]
    fn policy_reaches_command_filter() {
        let mut lesson = valid_lesson();
        lesson.steps[0].commands = vec!["curl http://mirror/pkg".to_string()];
        assert!(validate_lesson(&lesson, SafetyPolicy::Strict).is_err());
        assert!(validate_lesson(&lesson, SafetyPolicy::Permissive).is_ok());
    }

    #[test]
    fn rejects_excessive_timeout() {
        let mut lesson = valid_lesson();
        lesson.steps[0].timeout = Duration::from_secs(3601);
        assert_eq!(
            validate_lesson(&lesson, SafetyPolicy::Strict),
            Err(ValidationError::InvalidTimeout { step: 1 })
        );
    }
}
