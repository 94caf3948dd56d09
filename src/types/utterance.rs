//! Candidate utterances: things the prospect could say next

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::CANDIDATE_EXPIRY_MS;

/// Vocal tone hint for the speak callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Neutral,
    Warm,
    Guarded,
    Curt,
    Hesitant,
    Firm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakingSpeed {
    Slow,
    Normal,
    Fast,
}

impl SpeakingSpeed {
    /// Approximate words per second, used to simulate playback
    pub fn words_per_second(&self) -> f64 {
        match self {
            SpeakingSpeed::Slow => 2.0,
            SpeakingSpeed::Normal => 2.6,
            SpeakingSpeed::Fast => 3.2,
        }
    }
}

/// Manner parameters handed to the speak callback
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeakOptions {
    pub pre_delay_ms: u64,
    pub tone: Tone,
    pub speaking_speed: SpeakingSpeed,
}

/// A generated but not-yet-spoken prospect response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateUtterance {
    pub text: String,
    /// 0.0 - 1.0, higher speaks first
    pub priority: f64,
    /// Stamped by the queue on push (not serialized)
    #[serde(skip)]
    pub created_at: Option<Instant>,
    pub expires_after_ms: u64,
    /// Stamped by the queue on push
    pub context_version: u64,
    /// May the user talk over it without it being a barge-in
    pub interruptible: bool,
    /// May a closing gate cut it off mid-sentence
    pub abortable: bool,
    /// Hesitation before speaking
    pub pre_delay_ms: u64,
    pub tone: Tone,
    pub speaking_speed: SpeakingSpeed,
}

impl CandidateUtterance {
    /// New candidate with default manner
    pub fn new(text: impl Into<String>, priority: f64) -> Self {
        Self {
            text: text.into(),
            priority: priority.clamp(0.0, 1.0),
            created_at: None,
            expires_after_ms: CANDIDATE_EXPIRY_MS,
            context_version: 0,
            interruptible: true,
            abortable: true,
            pre_delay_ms: 0,
            tone: Tone::Neutral,
            speaking_speed: SpeakingSpeed::Normal,
        }
    }

    pub fn with_expiry_ms(mut self, ms: u64) -> Self {
        self.expires_after_ms = ms;
        self
    }

    pub fn with_pre_delay_ms(mut self, ms: u64) -> Self {
        self.pre_delay_ms = ms;
        self
    }

    pub fn with_abortable(mut self, abortable: bool) -> Self {
        self.abortable = abortable;
        self
    }

    pub fn with_interruptible(mut self, interruptible: bool) -> Self {
        self.interruptible = interruptible;
        self
    }

    pub fn with_manner(mut self, tone: Tone, speed: SpeakingSpeed) -> Self {
        self.tone = tone;
        self.speaking_speed = speed;
        self
    }

    /// Age in milliseconds at `now` (0 if never stamped)
    pub fn age_ms_at(&self, now: Instant) -> u64 {
        self.created_at
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0)
    }

    /// Older than its lifetime
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.age_ms_at(now) > self.expires_after_ms
    }

    pub fn speak_options(&self) -> SpeakOptions {
        SpeakOptions {
            pre_delay_ms: self.pre_delay_ms,
            tone: self.tone,
            speaking_speed: self.speaking_speed,
        }
    }

    /// Simulated playback length for `text` at this speed
    pub fn estimated_duration_ms(&self) -> u64 {
        let words = self.text.split_whitespace().count() as f64;
        (words / self.speaking_speed.words_per_second() * 1000.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_priority_clamped() {
        assert_eq!(CandidateUtterance::new("hi", 1.7).priority, 1.0);
        assert_eq!(CandidateUtterance::new("hi", -0.2).priority, 0.0);
    }

    #[test]
    fn test_unstamped_never_expires() {
        let c = CandidateUtterance::new("hi", 0.5).with_expiry_ms(0);
        assert!(!c.is_expired_at(Instant::now()));
    }

    #[test]
    fn test_expiry_is_strictly_older() {
        let start = Instant::now();
        let mut c = CandidateUtterance::new("hi", 0.5).with_expiry_ms(100);
        c.created_at = Some(start);
        assert!(!c.is_expired_at(start + Duration::from_millis(100)));
        assert!(c.is_expired_at(start + Duration::from_millis(101)));
    }

    #[test]
    fn test_estimated_duration_scales_with_speed() {
        let slow = CandidateUtterance::new("one two three four", 0.5)
            .with_manner(Tone::Neutral, SpeakingSpeed::Slow);
        let fast = slow.clone().with_manner(Tone::Neutral, SpeakingSpeed::Fast);
        assert!(slow.estimated_duration_ms() > fast.estimated_duration_ms());
    }
}
