//! Chimera stitching (§4.G steps 3-4): segment each candidate draft into
//! paragraphs, keep only candidates near the modal paragraph count, ask a
//! judge model to pick the best paragraph at each position (labels
//! shuffled to avoid position bias), then smooth the transition between
//! adjacent paragraphs written by different agents.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use tracing::{info, instrument, warn};

use crate::llm::{CallOptions, LlmClient};

use super::Candidate;

/// Minimum number of paragraph-aligned candidates required to run
/// per-position judging; below this the whole-output fallback applies.
const MIN_CANDIDATES_FOR_POSITION_JUDGING: usize = 3;

/// Result of stitching a roster's candidates into one draft.
#[derive(Clone, Debug)]
pub struct StitchOutcome {
    pub text: String,
    /// `true` if fewer than [`MIN_CANDIDATES_FOR_POSITION_JUDGING`] candidates
    /// survived paragraph-count alignment and the judge instead picked one
    /// whole candidate rather than stitching per position.
    pub used_whole_output_fallback: bool,
    /// The source agent for each paragraph position in `text`, in order
    /// (single entry if `used_whole_output_fallback`).
    pub source_agents: Vec<String>,
}

fn paragraphs_of(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// The most common paragraph count across `counts`; ties broken toward the
/// smallest count so normalization merges rather than invents paragraphs.
fn modal_count(counts: &[usize]) -> usize {
    let mut frequency: HashMap<usize, usize> = HashMap::new();
    for &c in counts {
        *frequency.entry(c).or_insert(0) += 1;
    }
    frequency
        .into_iter()
        .max_by(|(a_count, a_freq), (b_count, b_freq)| a_freq.cmp(b_freq).then(b_count.cmp(a_count)))
        .map(|(count, _)| count)
        .unwrap_or(0)
}

/// Normalize `paragraphs` to exactly `target` paragraphs: merge the trailing
/// excess into one when there are too many, or split the last paragraph at
/// its midpoint sentence when there's exactly one too few (the only gap the
/// ±1 alignment window in `stitch` lets through). Either way every sentence
/// is preserved.
fn normalize_to_target(mut paragraphs: Vec<String>, target: usize) -> Vec<String> {
    if target == 0 {
        return paragraphs;
    }
    if paragraphs.len() > target {
        let tail: Vec<String> = paragraphs.split_off(target - 1);
        paragraphs.push(tail.join("\n\n"));
        return paragraphs;
    }
    if paragraphs.len() < target {
        if let Some(last) = paragraphs.pop() {
            let sentences: Vec<&str> = last
                .split_inclusive(['.', '!', '?'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            if sentences.len() >= 2 {
                let mid = sentences.len() / 2;
                paragraphs.push(sentences[..mid].join(" "));
                paragraphs.push(sentences[mid..].join(" "));
            } else {
                paragraphs.push(last);
            }
        }
    }
    paragraphs
}

/// Keep only candidates within ±1 paragraph of `target`, normalize each to
/// exactly `target` paragraphs, and drop the rare candidate that still
/// can't be normalized (a target-1 candidate whose final paragraph is a
/// single sentence that can't be split).
fn align_candidates(per_candidate: Vec<(String, Vec<String>)>, target: usize) -> Vec<(String, Vec<String>)> {
    per_candidate
        .into_iter()
        .filter(|(_, paragraphs)| paragraphs.len() + 1 >= target && paragraphs.len() <= target + 1)
        .map(|(name, paragraphs)| (name, normalize_to_target(paragraphs, target)))
        .filter(|(_, paragraphs)| paragraphs.len() == target)
        .collect()
}

#[instrument(skip(llm, candidates), fields(candidate_count = candidates.len()))]
pub async fn stitch(llm: &LlmClient, candidates: Vec<Candidate>) -> StitchOutcome {
    let per_candidate: Vec<(String, Vec<String>)> = candidates
        .iter()
        .map(|c| (c.agent_name.clone(), paragraphs_of(&c.text)))
        .collect();

    let counts: Vec<usize> = per_candidate.iter().map(|(_, p)| p.len()).collect();
    let target = modal_count(&counts);

    let aligned = align_candidates(per_candidate, target);

    if aligned.len() < MIN_CANDIDATES_FOR_POSITION_JUDGING || target == 0 {
        warn!(
            aligned = aligned.len(),
            target, "too few paragraph-aligned candidates, falling back to whole-output judging"
        );
        return whole_output_fallback(llm, candidates).await;
    }

    let mut winning_paragraphs = Vec::with_capacity(target);
    let mut source_agents = Vec::with_capacity(target);

    for position in 0..target {
        let options: Vec<(String, String)> = aligned
            .iter()
            .map(|(name, paragraphs)| (name.clone(), paragraphs[position].clone()))
            .collect();
        let (winner_name, winner_text) = judge_position(llm, position, options).await;
        winning_paragraphs.push(winner_text);
        source_agents.push(winner_name);
    }

    let smoothed = smooth_transitions(llm, winning_paragraphs, &source_agents).await;
    info!(target, "chimera stitched from per-position judging");
    StitchOutcome {
        text: smoothed.join("\n\n"),
        used_whole_output_fallback: false,
        source_agents,
    }
}

async fn whole_output_fallback(llm: &LlmClient, candidates: Vec<Candidate>) -> StitchOutcome {
    if candidates.len() == 1 {
        let only = candidates.into_iter().next().unwrap();
        return StitchOutcome {
            text: only.text,
            used_whole_output_fallback: true,
            source_agents: vec![only.agent_name],
        };
    }

    let mut labeled: Vec<(String, Candidate)> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| (label_for(i), c))
        .collect();
    labeled.shuffle(&mut rand::rng());

    let system = "You are a judge comparing full draft candidates for the same scene. \
        Choose the single best candidate for prose quality, voice consistency, and craft. \
        Respond with only the candidate's letter label, nothing else.";
    let mut user = String::from("Candidates:\n\n");
    for (label, candidate) in &labeled {
        user.push_str(&format!("[{label}]\n{}\n\n", candidate.text));
    }

    let response = llm
        .call(system, &user, CallOptions { max_tokens: 8, temperature: 0.0 })
        .await
        .unwrap_or_default();
    let winner = pick_label(&response, &labeled.iter().map(|(l, _)| l.clone()).collect::<Vec<_>>())
        .unwrap_or_else(|| labeled[0].0.clone());

    let (_, chosen) = labeled.into_iter().find(|(l, _)| *l == winner).expect("winner label exists");
    StitchOutcome {
        text: chosen.text,
        used_whole_output_fallback: true,
        source_agents: vec![chosen.agent_name],
    }
}

async fn judge_position(llm: &LlmClient, position: usize, options: Vec<(String, String)>) -> (String, String) {
    let mut labeled: Vec<(String, (String, String))> = options
        .into_iter()
        .enumerate()
        .map(|(i, opt)| (label_for(i), opt))
        .collect();
    labeled.shuffle(&mut rand::rng());

    let system = "You are a judge comparing candidate paragraphs meant to occupy the same \
        position in a stitched draft. Pick the single best paragraph for prose quality and \
        continuity. Respond with only the candidate's letter label, nothing else.";
    let mut user = format!("Paragraph position {position}:\n\n");
    for (label, (_, text)) in &labeled {
        user.push_str(&format!("[{label}]\n{text}\n\n"));
    }

    let response = llm
        .call(system, &user, CallOptions { max_tokens: 8, temperature: 0.0 })
        .await
        .unwrap_or_default();
    let labels: Vec<String> = labeled.iter().map(|(l, _)| l.clone()).collect();
    let winner = pick_label(&response, &labels).unwrap_or_else(|| labels[0].clone());

    let (_, (name, text)) = labeled.into_iter().find(|(l, _)| *l == winner).expect("winner label exists");
    (name, text)
}

fn label_for(i: usize) -> String {
    ((b'A' + (i % 26) as u8) as char).to_string()
}

fn pick_label(response: &str, labels: &[String]) -> Option<String> {
    let upper = response.to_uppercase();
    labels.iter().find(|l| upper.contains(l.as_str())).cloned()
}

/// Rewrite the junction sentence at each boundary between paragraphs
/// sourced from different agents (§4.G step 4). Paragraphs from the same
/// agent are left untouched.
async fn smooth_transitions(llm: &LlmClient, paragraphs: Vec<String>, source_agents: &[String]) -> Vec<String> {
    let mut result = paragraphs;
    for i in 0..result.len().saturating_sub(1) {
        if source_agents[i] == source_agents[i + 1] {
            continue;
        }
        let system = "You smooth the transition between two paragraphs written by different \
            authors. Rewrite only the last sentence of the first paragraph and the first \
            sentence of the second paragraph so they read as one continuous voice. Respond \
            with exactly two lines: the rewritten last sentence, then the rewritten first \
            sentence. Do not add commentary.";
        let user = format!(
            "End of paragraph A:\n...{}\n\nStart of paragraph B:\n{}...",
            last_sentence(&result[i]),
            first_sentence(&result[i + 1]),
        );
        let response = llm
            .call(system, &user, CallOptions { max_tokens: 128, temperature: 0.5 })
            .await
            .unwrap_or_default();
        let mut lines = response.lines().filter(|l| !l.trim().is_empty());
        if let (Some(new_last), Some(new_first)) = (lines.next(), lines.next()) {
            result[i] = replace_last_sentence(&result[i], new_last.trim());
            result[i + 1] = replace_first_sentence(&result[i + 1], new_first.trim());
        }
    }
    result
}

fn last_sentence(paragraph: &str) -> &str {
    paragraph
        .rsplit(['.', '!', '?'])
        .find(|s| !s.trim().is_empty())
        .unwrap_or(paragraph)
        .trim()
}

fn first_sentence(paragraph: &str) -> &str {
    paragraph
        .split(['.', '!', '?'])
        .find(|s| !s.trim().is_empty())
        .unwrap_or(paragraph)
        .trim()
}

fn replace_last_sentence(paragraph: &str, replacement: &str) -> String {
    match paragraph.rfind(['.', '!', '?']) {
        Some(pos) if pos + 1 < paragraph.len() => {
            format!("{} {replacement}", &paragraph[..pos])
        }
        _ => replacement.to_string(),
    }
}

fn replace_first_sentence(paragraph: &str, replacement: &str) -> String {
    match paragraph.find(['.', '!', '?']) {
        Some(pos) => format!("{replacement} {}", &paragraph[pos + 1..].trim_start()),
        None => replacement.to_string(),
    }
}
