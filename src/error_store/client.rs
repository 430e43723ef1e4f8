use std::collections::BTreeSet;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::Utc;

use crate::scorer::{AiPattern, Issue, ScoreReview};

use super::backend::{ErrorStoreBackend, InMemoryErrorStoreBackend};
use super::types::{ErrorPattern, ErrorStoreStats, NegativePromptOptions, RecordContext};

pub use super::backend::{ErrorStoreError, Result};

/// Cross-session learning store: records scorer issues and AI patterns as
/// fingerprinted, frequency-weighted [`ErrorPattern`]s and turns the
/// accumulated set into a negative prompt for future generation (§4.C).
pub struct ErrorStore {
    backend: Arc<dyn ErrorStoreBackend>,
    /// Tracks `(session_key, fingerprint)` pairs already credited with a
    /// frequency increment this process lifetime, enforcing Invariant 4.
    contributed: Mutex<HashSet<(String, String)>>,
}

impl Default for ErrorStore {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryErrorStoreBackend::new()))
    }
}

impl ErrorStore {
    #[must_use]
    pub fn new(backend: Arc<dyn ErrorStoreBackend>) -> Self {
        Self {
            backend,
            contributed: Mutex::new(HashSet::new()),
        }
    }

    /// Fold every issue and AI pattern in `review` into the store. Each
    /// `(session_key, fingerprint)` pair increments frequency at most once,
    /// no matter how many times this chunk or session calls `record`.
    pub async fn record(&self, review: &ScoreReview, ctx: &RecordContext) -> Result<()> {
        for issue in &review.issues {
            self.record_one(
                issue.category.clone(),
                issue.text.clone().unwrap_or_default(),
                issue.problem.clone(),
                issue.severity,
                issue.estimated_impact,
                ctx,
            )
            .await?;
        }
        for pattern in &review.ai_patterns {
            self.record_ai_pattern(pattern, ctx).await?;
        }
        Ok(())
    }

    async fn record_ai_pattern(&self, pattern: &AiPattern, ctx: &RecordContext) -> Result<()> {
        let example = pattern.examples.first().cloned().unwrap_or_default();
        self.record_one(
            pattern.pattern.clone(),
            example,
            pattern.pattern.clone(),
            crate::scorer::IssueSeverity::Medium,
            pattern.estimated_impact,
            ctx,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_one(
        &self,
        category: String,
        text: String,
        problem: String,
        severity: crate::scorer::IssueSeverity,
        estimated_impact: f64,
        ctx: &RecordContext,
    ) -> Result<()> {
        let fingerprint = fingerprint(&category, &text);
        let key = (ctx.session_key.clone(), fingerprint.clone());
        let already_contributed = {
            let mut contributed = self.contributed.lock().unwrap();
            !contributed.insert(key)
        };

        let now = Utc::now();
        let mut pattern = self
            .backend
            .get(&fingerprint)
            .await?
            .unwrap_or_else(|| ErrorPattern {
                id: uuid::Uuid::new_v4().to_string(),
                fingerprint: fingerprint.clone(),
                category: category.clone(),
                text: text.clone(),
                problem: problem.clone(),
                severity,
                estimated_impact,
                frequency: 0,
                first_seen_at: now,
                last_seen_at: now,
                dismissed: false,
                projects: BTreeSet::new(),
                sessions_seen: BTreeSet::new(),
            });

        if !already_contributed {
            pattern.frequency += 1;
        }
        pattern.last_seen_at = now;
        pattern.sessions_seen.insert(ctx.session_key.clone());
        if let Some(project_id) = &ctx.project_id {
            pattern.projects.insert(project_id.clone());
        }

        self.backend.upsert(pattern).await
    }

    /// Format the highest-ranked, non-dismissed patterns into a negative
    /// prompt fragment, most corrosive first (§4.C).
    pub async fn build_negative_prompt(&self, opts: &NegativePromptOptions) -> Result<String> {
        let mut patterns: Vec<_> = self
            .backend
            .list_all()
            .await?
            .into_iter()
            .filter(|p| !p.dismissed && p.frequency >= opts.min_frequency)
            .collect();
        patterns.sort_by(|a, b| b.rank_score().partial_cmp(&a.rank_score()).unwrap());
        patterns.truncate(opts.max_patterns);

        if patterns.is_empty() {
            return Ok(String::new());
        }

        let mut prompt = String::from("Avoid these recurring issues from past sessions:\n");
        for pattern in patterns {
            prompt.push_str(&format!(
                "- [{}] {} (seen {}x): {}\n",
                pattern.category, pattern.text, pattern.frequency, pattern.problem
            ));
        }
        Ok(prompt)
    }

    pub async fn dismiss(&self, fingerprint: &str) -> Result<()> {
        if let Some(mut pattern) = self.backend.get(fingerprint).await? {
            pattern.dismissed = true;
            self.backend.upsert(pattern).await?;
        }
        Ok(())
    }

    pub async fn restore(&self, fingerprint: &str) -> Result<()> {
        if let Some(mut pattern) = self.backend.get(fingerprint).await? {
            pattern.dismissed = false;
            self.backend.upsert(pattern).await?;
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.contributed.lock().unwrap().clear();
        self.backend.clear_all().await
    }

    pub async fn stats(&self) -> Result<ErrorStoreStats> {
        let patterns = self.backend.list_all().await?;
        let dismissed_count = patterns.iter().filter(|p| p.dismissed).count();
        let total_occurrences = patterns.iter().map(|p| u64::from(p.frequency)).sum();

        let mut category_counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
        let mut projects: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
        for pattern in &patterns {
            *category_counts.entry(pattern.category.clone()).or_insert(0) += 1;
            projects.extend(pattern.projects.iter().map(String::as_str));
        }

        Ok(ErrorStoreStats {
            total_patterns: patterns.len(),
            dismissed_count,
            total_occurrences,
            category_counts,
            project_count: projects.len(),
        })
    }

    /// Merge any patterns that ended up sharing a fingerprint (should not
    /// normally happen since `upsert` keys on it, but guards against
    /// backend migrations or manual edits producing duplicates).
    pub async fn dedupe(&self) -> Result<usize> {
        let patterns = self.backend.list_all().await?;
        let mut by_fingerprint: std::collections::HashMap<String, ErrorPattern> =
            std::collections::HashMap::new();
        let mut merged = 0usize;
        for pattern in patterns {
            by_fingerprint
                .entry(pattern.fingerprint.clone())
                .and_modify(|existing| {
                    existing.frequency += pattern.frequency;
                    existing.sessions_seen.extend(pattern.sessions_seen.clone());
                    existing.projects.extend(pattern.projects.clone());
                    if pattern.last_seen_at > existing.last_seen_at {
                        existing.last_seen_at = pattern.last_seen_at;
                    }
                    merged += 1;
                })
                .or_insert(pattern);
        }
        for pattern in by_fingerprint.into_values() {
            self.backend.upsert(pattern).await?;
        }
        Ok(merged)
    }
}

/// Content fingerprint for an issue/pattern: category plus a normalized
/// text excerpt, so the same AI tic phrased identically twice dedupes but
/// different tics in the same category don't collide.
fn fingerprint(category: &str, text: &str) -> String {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{category}:{normalized}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::{Issue, IssueSeverity};

    fn review_with_issue(category: &str, text: &str) -> ScoreReview {
        ScoreReview {
            issues: vec![Issue {
                severity: IssueSeverity::Medium,
                category: category.to_string(),
                text: Some(text.to_string()),
                problem: "overused".to_string(),
                estimated_impact: 2.0,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn record_increments_frequency_once_per_session_fingerprint() {
        let store = ErrorStore::default();
        let ctx = RecordContext {
            session_key: "s1".to_string(),
            ..Default::default()
        };
        let review = review_with_issue("tic", "found himself");
        store.record(&review, &ctx).await.unwrap();
        store.record(&review, &ctx).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_patterns, 1);
        assert_eq!(stats.total_occurrences, 1);
        assert_eq!(stats.category_counts.get("tic"), Some(&1));
    }

    #[tokio::test]
    async fn record_from_different_sessions_increments_twice() {
        let store = ErrorStore::default();
        let review = review_with_issue("tic", "found himself");
        store
            .record(
                &review,
                &RecordContext {
                    session_key: "s1".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .record(
                &review,
                &RecordContext {
                    session_key: "s2".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_occurrences, 2);
    }

    #[tokio::test]
    async fn stats_count_distinct_projects_across_patterns() {
        let store = ErrorStore::default();
        store
            .record(
                &review_with_issue("tic", "found himself"),
                &RecordContext {
                    session_key: "s1".to_string(),
                    project_id: Some("proj-a".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .record(
                &review_with_issue("cliche", "dark and stormy"),
                &RecordContext {
                    session_key: "s2".to_string(),
                    project_id: Some("proj-b".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.project_count, 2);
        assert_eq!(stats.category_counts.len(), 2);
    }

    #[tokio::test]
    async fn dismissed_patterns_excluded_from_negative_prompt() {
        let store = ErrorStore::default();
        let review = review_with_issue("tic", "found himself");
        let ctx = RecordContext {
            session_key: "s1".to_string(),
            ..Default::default()
        };
        store.record(&review, &ctx).await.unwrap();
        let fp = fingerprint("tic", "found himself");
        store.dismiss(&fp).await.unwrap();

        let prompt = store
            .build_negative_prompt(&NegativePromptOptions::default())
            .await
            .unwrap();
        assert!(prompt.is_empty());
    }
}
