//! "Four Requirements" craft checklist: for every ~750-word window of prose,
//! at least one of character-specific thought, precise sensory observation,
//! a musical sentence, or an expectation break must be present.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::rules::word_count as rules_word_count;

static SENTENCE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").unwrap());
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z'’-]+").unwrap());

static CHARACTER_THOUGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(he|she|i|they)\b[^.!?]{0,40}\b(thought|wondered|remembered|realized|knew|hoped|feared)\b")
        .unwrap()
});

const SENSORY_NOUNS: &[&str] = &[
    "smell", "scent", "sound", "taste", "touch", "texture", "light", "shadow", "warmth", "cold",
    "noise", "fragrance", "echo", "glare", "chill", "static", "hum", "grit", "ash", "rust",
];

static CLAUSE_BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,;]").unwrap());

/// Boolean checklist for one ~750-word window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FourRequirements {
    pub character_specific_thought: bool,
    pub precise_observation: bool,
    pub musical_sentence: bool,
    pub expectation_break: bool,
}

impl FourRequirements {
    #[must_use]
    pub fn any_met(&self) -> bool {
        self.character_specific_thought
            || self.precise_observation
            || self.musical_sentence
            || self.expectation_break
    }
}

/// Split `text` into roughly 750-word windows, merging a trailing remainder
/// of fewer than 100 words into the previous window rather than leaving a
/// window too small to fairly judge.
pub(super) fn chunk_windows(text: &str) -> Vec<String> {
    const WINDOW: usize = 750;
    const MIN_TAIL: usize = 100;

    let words: Vec<&str> = WORD_RE.find_iter(text).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return Vec::new();
    }

    let sentences: Vec<&str> = SENTENCE_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut windows: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;
    for sentence in sentences {
        let sentence_words = rules_word_count(sentence) as usize;
        current.push(sentence);
        current_words += sentence_words;
        if current_words >= WINDOW {
            windows.push(std::mem::take(&mut current));
            current_words = 0;
        }
    }
    if !current.is_empty() {
        let tail_words: usize = current.iter().map(|s| rules_word_count(s) as usize).sum();
        if tail_words < MIN_TAIL && !windows.is_empty() {
            windows.last_mut().unwrap().extend(current);
        } else {
            windows.push(current);
        }
    }

    windows
        .into_iter()
        .map(|sentences| sentences.join(" "))
        .collect()
}

/// Evaluate the four requirements against one window of text.
#[must_use]
pub fn check(window: &str) -> FourRequirements {
    let sentences: Vec<&str> = SENTENCE_SPLIT_RE
        .split(window)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let character_specific_thought = CHARACTER_THOUGHT_RE.is_match(window);

    let precise_observation = sentences.iter().any(|s| {
        let lowered = s.to_lowercase();
        SENSORY_NOUNS
            .iter()
            .filter(|noun| lowered.contains(*noun))
            .count()
            >= 2
    });

    let lengths: Vec<usize> = sentences.iter().map(|s| rules_word_count(s) as usize).collect();
    let musical_sentence = sentences.iter().enumerate().any(|(i, s)| {
        let clauses = CLAUSE_BOUNDARY_RE.find_iter(s).count() + 1;
        if clauses < 4 {
            return false;
        }
        let this_len = lengths[i];
        let neighbour_delta = [
            i.checked_sub(1).map(|j| lengths[j]),
            lengths.get(i + 1).copied(),
        ]
        .into_iter()
        .flatten()
        .any(|n| this_len.abs_diff(n) >= 15);
        neighbour_delta
    });

    let expectation_break = lengths
        .windows(2)
        .any(|pair| pair[0] > 25 && pair[1] < 10);

    FourRequirements {
        character_specific_thought,
        precise_observation,
        musical_sentence,
        expectation_break,
    }
}

/// Evaluate every window in `windows` (used by `lint()`'s aggregate stats).
#[must_use]
pub fn four_requirements_for_windows(windows: &[String]) -> Vec<FourRequirements> {
    windows.iter().map(|w| check(w)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_character_specific_thought() {
        let r = check("She walked to the window. She thought of her mother, gone three years now.");
        assert!(r.character_specific_thought);
    }

    #[test]
    fn detects_precise_sensory_observation() {
        let r = check("The scent of rust and ash clung to the warehouse floor.");
        assert!(r.precise_observation);
    }

    #[test]
    fn detects_expectation_break() {
        let r = check(
            "The long column of refugees stretched past the ridge, past the burnt-out trucks, past the silence of the empty farmhouses. He stopped.",
        );
        assert!(r.expectation_break);
    }

    #[test]
    fn merges_small_tail_into_previous_window() {
        let long_sentence = "word ".repeat(760);
        let short_tail = "word ".repeat(40);
        let text = format!("{long_sentence}. {short_tail}.");
        let windows = chunk_windows(&text);
        assert_eq!(windows.len(), 1);
    }
}
