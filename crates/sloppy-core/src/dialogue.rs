//! Two-speaker dialogue validation.
//!
//! The research agent is asked for a debate between two hosts written one
//! line per turn as `[S1] text` / `[S2] text`. Anything else is rejected
//! before it reaches the store.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    S1,
    S2,
}

impl Speaker {
    fn tag(self) -> &'static str {
        match self {
            Speaker::S1 => "[S1]",
            Speaker::S2 => "[S2]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueLine {
    pub speaker: Speaker,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialogue {
    lines: Vec<DialogueLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialogueError {
    #[error("generated script does not contain required [S1]/[S2] format")]
    MissingSpeakers,
    #[error("generated script too short: only {found} lines (need {required})")]
    TooShort { found: usize, required: usize },
}

impl Dialogue {
    /// Parse `text`, requiring both speakers and at least `min_lines` turns.
    pub fn parse(text: &str, min_lines: usize) -> Result<Self, DialogueError> {
        if !text.contains(Speaker::S1.tag()) || !text.contains(Speaker::S2.tag()) {
            return Err(DialogueError::MissingSpeakers);
        }

        let lines: Vec<DialogueLine> = text
            .lines()
            .filter_map(|raw| {
                let raw = raw.trim();
                [Speaker::S1, Speaker::S2].into_iter().find_map(|speaker| {
                    let content = raw.strip_prefix(speaker.tag())?.trim();
                    (!content.is_empty()).then(|| DialogueLine {
                        speaker,
                        content: content.to_owned(),
                    })
                })
            })
            .collect();

        if lines.len() < min_lines {
            return Err(DialogueError::TooShort {
                found: lines.len(),
                required: min_lines,
            });
        }
        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[DialogueLine] {
        &self.lines
    }
}

impl fmt::Display for Dialogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{} {}", line.speaker.tag(), line.content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debate(turns: usize) -> String {
        (0..turns)
            .map(|i| {
                if i % 2 == 0 {
                    format!("[S1] point {i}")
                } else {
                    format!("[S2] counterpoint {i}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn accepts_a_full_debate_and_normalises_it() {
        let text = format!("Here is your script:\n\n{}\n\nEnjoy!", debate(10));
        let dialogue = Dialogue::parse(&text, 10).expect("valid dialogue");
        assert_eq!(dialogue.lines().len(), 10);
        assert_eq!(dialogue.lines()[1].speaker, Speaker::S2);
        assert_eq!(dialogue.to_string(), debate(10));
    }

    #[test]
    fn empty_turns_do_not_count() {
        let text = format!("{}\n[S1]\n[S2]   ", debate(9));
        let err = Dialogue::parse(&text, 10).unwrap_err();
        assert_eq!(err, DialogueError::TooShort { found: 9, required: 10 });
    }

    #[test]
    fn single_speaker_is_rejected() {
        let text = "[S1] a\n[S1] b\n[S1] c";
        assert_eq!(Dialogue::parse(text, 1), Err(DialogueError::MissingSpeakers));
    }
}
