//! Individual deterministic checks that make up `lint()`.

use std::sync::LazyLock;

use regex::Regex;

use super::{DefectKind, LintDefect, Severity};

const WAY_EXCLUSIONS: &[&str] = &["home", "back", "out", "forward", "there", "to"];

struct BannedPhrase {
    label: &'static str,
    re: LazyLock<Regex>,
}

macro_rules! banned {
    ($label:literal, $pattern:literal) => {
        BannedPhrase {
            label: $label,
            re: LazyLock::new(|| Regex::new($pattern).unwrap()),
        }
    };
}

static BANNED_PHRASES: &[BannedPhrase] = &[
    banned!(
        "found himself/herself/themselves",
        r"(?i)\bfound (himself|herself|themselves)\b"
    ),
    banned!("voice was", r"(?i)\bvoice was\b"),
    banned!("seemed to", r"(?i)\bseemed to\b"),
    banned!("began to", r"(?i)\bbegan to\b"),
    banned!("started to", r"(?i)\bstarted to\b"),
    banned!("something", r"(?i)\bsomething\b"),
    banned!("somehow", r"(?i)\bsomehow\b"),
    banned!("for a long moment", r"(?i)\bfor a long moment\b"),
    banned!("meanwhile", r"(?i)\bmeanwhile\b"),
];

static THE_WAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bthe way\b\s*(\w+)?").unwrap());

static FINALLY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bfinally\b").unwrap());
static AT_LAST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bat last\b").unwrap());
static HIS_EYES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bhis eyes\b").unwrap());
static HER_EYES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bher eyes\b").unwrap());
static GAZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bgaze\b").unwrap());
static THROAT_TIGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bthroat (?:went |grew |was )?tight\b").unwrap());

static TRICOLON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[\w']+,\s*[\w']+,?\s+and\s+[\w']+\b").unwrap());

static SENTENCE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").unwrap());
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z'’-]+").unwrap());

static ABSTRACT_COPULA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(hope|fear|grief|silence|truth|time|love|loss|fate|regret)\b.{0,15}\b(was|is|were|are)\b")
        .unwrap()
});
static IRONIC_CONJUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(but|yet|still|and yet)\b").unwrap());

static NUMBER_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d+(?:\.\d+)?\s*(years?|months?|weeks?|days?|hours?|minutes?|seconds?|miles?|feet|pounds?|dollars?|percent|%)\b",
    )
    .unwrap()
});
static ACCORDING_TO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\baccording to (documents|records|archives|files|reports)\b").unwrap());

const FILTER_WORDS: &[&str] = &[
    "just", "very", "really", "suddenly", "quite", "basically", "actually", "literally", "somewhat",
];

pub(super) fn banned_phrases(text: &str) -> Vec<LintDefect> {
    let mut defects = Vec::new();
    for phrase in BANNED_PHRASES {
        for m in phrase.re.find_iter(text) {
            defects.push(LintDefect {
                kind: DefectKind::BannedPhrase {
                    phrase: phrase.label.to_string(),
                },
                severity: Severity::Hard,
                text: m.as_str().to_string(),
                position: m.start(),
            });
        }
    }
    for caps in THE_WAY_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let next_word = caps.get(1).map(|m| m.as_str().to_lowercase());
        let excluded = next_word
            .as_deref()
            .is_some_and(|w| WAY_EXCLUSIONS.contains(&w));
        if !excluded {
            defects.push(LintDefect {
                kind: DefectKind::BannedPhrase {
                    phrase: "the way (connector)".to_string(),
                },
                severity: Severity::Hard,
                text: whole.as_str().trim().to_string(),
                position: whole.start(),
            });
        }
    }
    defects
}

struct Budget {
    phrase: &'static str,
    limit: u32,
    re: &'static LazyLock<Regex>,
}

fn budgets() -> Vec<Budget> {
    vec![
        Budget { phrase: "finally", limit: 2, re: &FINALLY_RE },
        Budget { phrase: "at last", limit: 1, re: &AT_LAST_RE },
        Budget { phrase: "his eyes", limit: 3, re: &HIS_EYES_RE },
        Budget { phrase: "her eyes", limit: 3, re: &HER_EYES_RE },
        Budget { phrase: "gaze", limit: 3, re: &GAZE_RE },
        Budget { phrase: "throat tight", limit: 1, re: &THROAT_TIGHT_RE },
    ]
}

pub(super) fn budget_violations(text: &str) -> Vec<LintDefect> {
    let mut defects = Vec::new();
    for budget in budgets() {
        let matches: Vec<_> = budget.re.find_iter(text).collect();
        if matches.len() as u32 > budget.limit {
            for m in matches.into_iter().skip(budget.limit as usize) {
                defects.push(LintDefect {
                    kind: DefectKind::Budget {
                        phrase: budget.phrase.to_string(),
                        limit: budget.limit,
                        count: 0, // filled below
                    },
                    severity: Severity::Medium,
                    text: m.as_str().to_string(),
                    position: m.start(),
                });
            }
        }
    }
    let total = defects.len() as u32;
    for d in &mut defects {
        if let DefectKind::Budget { count, .. } = &mut d.kind {
            *count = total;
        }
    }
    defects
}

pub(super) fn tricolon_count(text: &str) -> u32 {
    TRICOLON_RE.find_iter(text).count() as u32
}

pub(super) fn tricolon_defects(text: &str, count: u32) -> Vec<LintDefect> {
    let words = word_count(text).max(1);
    let limit = (words / 750).max(1);
    if count <= limit {
        return Vec::new();
    }
    TRICOLON_RE
        .find_iter(text)
        .skip(limit as usize)
        .map(|m| LintDefect {
            kind: DefectKind::TricolonOveruse { limit, count },
            severity: Severity::Medium,
            text: m.as_str().to_string(),
            position: m.start(),
        })
        .collect()
}

/// Split `text` into paragraphs on blank lines.
pub(super) fn paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn sentences(paragraph: &str) -> Vec<&str> {
    SENTENCE_SPLIT_RE
        .split(paragraph)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub(super) fn word_count(text: &str) -> u32 {
    WORD_RE.find_iter(text).count() as u32
}

fn is_kicker(paragraph: &str) -> bool {
    let para_words = word_count(paragraph);
    if para_words <= 30 {
        return false;
    }
    let Some(last) = sentences(paragraph).last().copied() else {
        return false;
    };
    let last_words = word_count(last);
    if last_words < 10 {
        return true;
    }
    if ABSTRACT_COPULA_RE.is_match(last) {
        return true;
    }
    IRONIC_CONJUNCTION_RE.is_match(last)
}

pub(super) fn kicker_density_pct(paragraphs: &[&str]) -> u32 {
    if paragraphs.is_empty() {
        return 0;
    }
    let kickers = paragraphs.iter().filter(|p| is_kicker(p)).count();
    ((kickers as f64 / paragraphs.len() as f64) * 100.0).round() as u32
}

pub(super) fn kicker_defect(density_pct: u32) -> Vec<LintDefect> {
    if density_pct > 30 {
        vec![LintDefect {
            kind: DefectKind::KickerDensity { density_pct },
            severity: Severity::Medium,
            text: String::new(),
            position: 0,
        }]
    } else {
        Vec::new()
    }
}

pub(super) fn paragraph_word_count_stddev(paragraphs: &[&str]) -> f64 {
    if paragraphs.len() < 2 {
        return f64::NAN;
    }
    let counts: Vec<f64> = paragraphs.iter().map(|p| word_count(p) as f64).collect();
    stddev(&counts)
}

pub(super) fn paragraph_variance_defect(stddev: f64, paragraph_count: usize) -> Vec<LintDefect> {
    if paragraph_count < 2 || stddev.is_nan() {
        return Vec::new();
    }
    if stddev < 15.0 {
        vec![LintDefect {
            kind: DefectKind::ParagraphVariance { stddev },
            severity: Severity::Medium,
            text: String::new(),
            position: 0,
        }]
    } else {
        Vec::new()
    }
}

pub(super) fn fabricated_precision(text: &str) -> Vec<LintDefect> {
    let mut defects = Vec::new();
    for m in NUMBER_UNIT_RE.find_iter(text) {
        defects.push(LintDefect {
            kind: DefectKind::FabricatedPrecision,
            severity: Severity::Soft,
            text: m.as_str().to_string(),
            position: m.start(),
        });
    }
    for m in ACCORDING_TO_RE.find_iter(text) {
        defects.push(LintDefect {
            kind: DefectKind::FabricatedPrecision,
            severity: Severity::Soft,
            text: m.as_str().to_string(),
            position: m.start(),
        });
    }
    defects
}

pub(super) fn sentence_length_stddev(text: &str) -> f64 {
    let lengths: Vec<f64> = paragraphs(text)
        .iter()
        .flat_map(|p| sentences(p))
        .map(|s| word_count(s) as f64)
        .collect();
    if lengths.len() < 2 {
        return 0.0;
    }
    stddev(&lengths)
}

pub(super) fn short_sentence_pct(text: &str) -> u32 {
    let lens: Vec<u32> = paragraphs(text)
        .iter()
        .flat_map(|p| sentences(p))
        .map(word_count)
        .collect();
    if lens.is_empty() {
        return 0;
    }
    let short = lens.iter().filter(|&&n| n < 8).count();
    ((short as f64 / lens.len() as f64) * 100.0).round() as u32
}

pub(super) fn filter_word_count(text: &str) -> u32 {
    let lowered = text.to_lowercase();
    FILTER_WORDS
        .iter()
        .map(|w| lowered.matches(w).count() as u32)
        .sum()
}

fn stddev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
