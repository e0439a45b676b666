//! Markdown lesson parser and canonical serializer.
//!
//! Recognized elements:
//!
//! - the first H1 heading becomes the title
//! - the first paragraph after the title becomes the description
//! - fenced code blocks tagged `docker`, `expect`, or `question` build steps
//!
//! A `docker` block starts a new step unless the previous step is still
//! open (no expectation and no question yet), in which case its commands are
//! appended. `expect` and `question` blocks close the current step. The
//! parser is tolerant: malformed or unclosed fences yield whatever structure
//! was recognized, never an error.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};

use crate::types::{Lesson, LessonStep};

/// Generate a step ID for the given zero-based index: `step-a`, `step-b`, …
/// with a numeric fallback past `z`.
fn step_id(index: usize) -> String {
    u32::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .and_then(|i| char::from_u32(u32::from('a') + i))
        .map_or_else(
            || format!("step-{}", index + 1),
            |letter| format!("step-{letter}"),
        )
}

/// Extract non-empty trimmed lines as commands.
fn parse_commands(block: &str) -> Vec<String> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Title,
    Description,
    Block(BlockKind),
    OtherBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Docker,
    Expect,
    Question,
}

/// Parse a markdown document into a [`Lesson`].
///
/// The returned lesson carries a freshly generated ID and current
/// timestamps; the store overwrites both on create.
#[must_use]
pub fn parse(input: &str) -> Lesson {
    let mut lesson = Lesson::new("", "");
    let mut capture = Capture::None;
    let mut buffer = String::new();
    let mut title_seen = false;
    let mut description_seen = false;

    for event in Parser::new(input) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) if !title_seen => {
                capture = Capture::Title;
                buffer.clear();
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if capture == Capture::Title => {
                lesson.title = buffer.trim().to_string();
                title_seen = true;
                capture = Capture::None;
            }
            Event::Start(Tag::Paragraph) if title_seen && !description_seen => {
                capture = Capture::Description;
                buffer.clear();
            }
            Event::End(TagEnd::Paragraph) if capture == Capture::Description => {
                let text = buffer.trim();
                if text.is_empty() {
                    // Keep looking for the first non-empty paragraph.
                } else {
                    lesson.description = text.to_string();
                    description_seen = true;
                }
                capture = Capture::None;
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                // The description paragraph ends at the first fenced block.
                description_seen = true;
                capture = match kind {
                    CodeBlockKind::Fenced(lang) => match lang.as_ref() {
                        "docker" => Capture::Block(BlockKind::Docker),
                        "expect" => Capture::Block(BlockKind::Expect),
                        "question" => Capture::Block(BlockKind::Question),
                        _ => Capture::OtherBlock,
                    },
                    CodeBlockKind::Indented => Capture::OtherBlock,
                };
                buffer.clear();
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Capture::Block(kind) = capture {
                    apply_block(&mut lesson, kind, &buffer);
                }
                capture = Capture::None;
            }
            Event::Text(text) => {
                if capture != Capture::None {
                    buffer.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if capture == Capture::Description {
                    buffer.push(' ');
                }
            }
            _ => {}
        }
    }

    lesson
}

fn apply_block(lesson: &mut Lesson, kind: BlockKind, content: &str) {
    match kind {
        BlockKind::Docker => {
            let commands = parse_commands(content);
            if let Some(last) = lesson.steps.last_mut() {
                if last.is_open() {
                    last.commands.extend(commands);
                    return;
                }
            }
            let mut step = LessonStep::new(step_id(lesson.steps.len()));
            step.commands = commands;
            lesson.steps.push(step);
        }
        BlockKind::Expect => {
            if let Some(last) = lesson.steps.last_mut() {
                if last.is_open() {
                    last.expected = Some(content.trim().to_string());
                }
            }
        }
        BlockKind::Question => {
            if let Some(last) = lesson.steps.last_mut() {
                if last.is_open() {
                    last.question = Some(content.trim().to_string());
                }
            }
        }
    }
}

/// Serialize a lesson back to its canonical markdown form.
///
/// Only the elements the parser recognizes are emitted (title, description,
/// and the step blocks), so `parse(to_markdown(lesson))` reproduces the
/// structural lesson for any parser-produced input.
#[must_use]
pub fn to_markdown(lesson: &Lesson) -> String {
    let mut out = String::new();

    if !lesson.title.is_empty() {
        out.push_str("# ");
        out.push_str(&lesson.title);
        out.push_str("\n\n");
    }

    if !lesson.description.is_empty() {
        out.push_str(&lesson.description);
        out.push_str("\n\n");
    }

    for step in &lesson.steps {
        if !step.commands.is_empty() {
            out.push_str("```docker\n");
            for command in &step.commands {
                out.push_str(command);
                out.push('\n');
            }
            out.push_str("```\n\n");
        }
        if let Some(expected) = &step.expected {
            out.push_str("```expect\n");
            out.push_str(expected);
            out.push_str("\n```\n\n");
        }
        if let Some(question) = &step.question {
            out.push_str("```question\n");
            out.push_str(question);
            out.push_str("\n```\n\n");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_STEP_TIMEOUT;

    #[test]
    fn parse_minimal_lesson() {
        let input = "# Basics\n\nLearn echo.\n\n```docker\necho hi\n```\n\n```expect\nhi\n```\n";
        let lesson = parse(input);

        assert_eq!(lesson.title, "Basics");
        assert_eq!(lesson.description, "Learn echo.");
        assert_eq!(lesson.steps.len(), 1);

        let step = &lesson.steps[0];
        assert_eq!(step.id, "step-a");
        assert_eq!(step.commands, vec!["echo hi".to_string()]);
        assert_eq!(step.expected.as_deref(), Some("hi"));
        assert_eq!(step.timeout, DEFAULT_STEP_TIMEOUT);
    }

    #[test]
    fn consecutive_docker_blocks_merge_into_open_step() {
        let input = "# T\n\nD\n\n```docker\necho one\n```\n\n```docker\necho two\n```\n";
        let lesson = parse(input);

        assert_eq!(lesson.steps.len(), 1);
        assert_eq!(
            lesson.steps[0].commands,
            vec!["echo one".to_string(), "echo two".to_string()]
        );
    }

    #[test]
    fn expect_closes_step() {
        let input = "# T\n\nD\n\n```docker\necho one\n```\n\n```expect\none\n```\n\n```docker\necho two\n```\n";
        let lesson = parse(input);

        assert_eq!(lesson.steps.len(), 2);
        assert_eq!(lesson.steps[0].expected.as_deref(), Some("one"));
        assert_eq!(lesson.steps[1].id, "step-b");
        assert_eq!(lesson.steps[1].commands, vec!["echo two".to_string()]);
        assert!(lesson.steps[1].expected.is_none());
    }

    #[test]
    fn question_closes_step() {
        let input =
            "# T\n\nD\n\n```docker\nls /\n```\n\n```question\nWhat did you see?\n```\n";
        let lesson = parse(input);

        assert_eq!(lesson.steps.len(), 1);
        assert_eq!(
            lesson.steps[0].question.as_deref(),
            Some("What did you see?")
        );
    }

    #[test]
    fn multiline_description_joined() {
        let input = "# T\n\nFirst line\ncontinued line.\n\n```docker\necho hi\n```\n";
        let lesson = parse(input);
        assert_eq!(lesson.description, "First line continued line.");
    }

    #[test]
    fn description_stops_at_code_block() {
        let input = "# T\n\nThe description.\n\n```docker\necho hi\n```\n\nTrailing prose.\n";
        let lesson = parse(input);
        assert_eq!(lesson.description, "The description.");
    }

    #[test]
    fn other_languages_ignored() {
        let input = "# T\n\nD\n\n```bash\nnot a step\n```\n\n```docker\necho hi\n```\n";
        let lesson = parse(input);
        assert_eq!(lesson.steps.len(), 1);
        assert_eq!(lesson.steps[0].commands, vec!["echo hi".to_string()]);
    }

    #[test]
    fn unclosed_fence_is_tolerated() {
        let input = "# T\n\nD\n\n```docker\necho hi\n";
        let lesson = parse(input);

        assert_eq!(lesson.title, "T");
        assert_eq!(lesson.steps.len(), 1);
        assert_eq!(lesson.steps[0].commands, vec!["echo hi".to_string()]);
    }

    #[test]
    fn empty_input_yields_empty_lesson() {
        let lesson = parse("");
        assert!(lesson.title.is_empty());
        assert!(lesson.steps.is_empty());
    }

    #[test]
    fn blank_lines_in_docker_block_skipped() {
        let input = "# T\n\nD\n\n```docker\necho one\n\n  echo two  \n```\n";
        let lesson = parse(input);
        assert_eq!(
            lesson.steps[0].commands,
            vec!["echo one".to_string(), "echo two".to_string()]
        );
    }

    #[test]
    fn step_ids_advance_alphabetically() {
        let mut input = String::from("# T\n\nD\n\n");
        for n in 0..3 {
            input.push_str(&format!("```docker\necho {n}\n```\n\n```expect\n{n}\n```\n\n"));
        }
        let lesson = parse(&input);
        let ids: Vec<_> = lesson.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["step-a", "step-b", "step-c"]);
    }

    #[test]
    fn serialize_reparse_is_structurally_identical() {
        let input = "# Swarm Basics\n\nLearn swarm init.\n\n```docker\ndocker swarm init\n```\n\n```expect\nSwarm initialized\n```\n\n```docker\ndocker node ls\n```\n\n```question\nHow many managers?\n```\n";
        let first = parse(input);
        let second = parse(&to_markdown(&first));

        assert_eq!(first.title, second.title);
        assert_eq!(first.description, second.description);
        assert_eq!(first.steps.len(), second.steps.len());
        for (a, b) in first.steps.iter().zip(second.steps.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.commands, b.commands);
            assert_eq!(a.expected, b.expected);
            assert_eq!(a.question, b.question);
            assert_eq!(a.timeout, b.timeout);
        }
    }

    #[test]
    fn step_id_numeric_fallback() {
        assert_eq!(step_id(0), "step-a");
        assert_eq!(step_id(25), "step-z");
        assert_eq!(step_id(26), "step-27");
    }
}
