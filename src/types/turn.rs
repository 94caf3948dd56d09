//! Turn model
//!
//! - TurnState = who holds the floor right now
//! - TranscriptLine = one final transcript from one speaker
//! - TranscriptHistory = bounded per-session history used by planning and the rubric

use std::collections::VecDeque;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Who holds the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    User,
    Prospect,
    Idle,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TurnState::User => "USER",
            TurnState::Prospect => "PROSPECT",
            TurnState::Idle => "IDLE",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Prospect,
}

/// Event from the transcript source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub speaker: Speaker,
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: Speaker::User,
            is_final: true,
        }
    }

    pub fn prospect(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker: Speaker::Prospect,
            is_final: true,
        }
    }
}

/// A single final transcript line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
    /// When this line was recorded (not serialized)
    #[serde(skip)]
    pub timestamp: Option<Instant>,
}

impl TranscriptLine {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Some(Instant::now()),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Bounded transcript for one call
#[derive(Debug)]
pub struct TranscriptHistory {
    lines: VecDeque<TranscriptLine>,
    max_lines: usize,
    user_words: usize,
    prospect_words: usize,
}

impl Default for TranscriptHistory {
    fn default() -> Self {
        Self::new(200)
    }
}

impl TranscriptHistory {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            user_words: 0,
            prospect_words: 0,
        }
    }

    /// Add a line, evicting the oldest past the cap
    ///
    /// Word totals cover the whole call, including evicted lines.
    pub fn add_line(&mut self, line: TranscriptLine) {
        match line.speaker {
            Speaker::User => self.user_words += line.word_count(),
            Speaker::Prospect => self.prospect_words += line.word_count(),
        }
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// All retained lines (oldest first)
    pub fn lines(&self) -> impl Iterator<Item = &TranscriptLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Most recent line from `speaker`
    pub fn last_from(&self, speaker: Speaker) -> Option<&TranscriptLine> {
        self.lines.iter().rev().find(|l| l.speaker == speaker)
    }

    /// Share of all spoken words that came from the user (0.5 when silent)
    pub fn talk_ratio(&self) -> f64 {
        let total = self.user_words + self.prospect_words;
        if total == 0 {
            return 0.5;
        }
        self.user_words as f64 / total as f64
    }

    /// Render for the generation / planning services
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|l| {
                let who = match l.speaker {
                    Speaker::User => "Rep",
                    Speaker::Prospect => "Prospect",
                };
                format!("{}: {}", who, l.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// =============================================================================
// TESTS
// =============================================================================
