//! Optional re-ranking of search results.
//!
//! Ranking is a read-side concern only; ingestion never consults it.

use crate::models::{CandidateRecord, ScoredRecord};

pub trait Ranker: Send + Sync {
    fn score(&self, record: &CandidateRecord, query: &str) -> f32;
}

/// Case-insensitive substring matching on title, abstract and first category.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRanker {
    pub title_weight: f32,
    pub summary_weight: f32,
    pub category_weight: f32,
}

impl Default for KeywordRanker {
    fn default() -> Self {
        Self {
            title_weight: 10.0,
            summary_weight: 5.0,
            category_weight: 3.0,
        }
    }
}

impl Ranker for KeywordRanker {
    fn score(&self, record: &CandidateRecord, query: &str) -> f32 {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return 0.0;
        }
        let matches = |field: &str| field.to_lowercase().contains(&query);

        let mut score = 0.0;
        if matches(&record.title) {
            score += self.title_weight;
        }
        if matches(&record.summary) {
            score += self.summary_weight;
        }
        if record.categories.first().is_some_and(|c| matches(c)) {
            score += self.category_weight;
        }
        score
    }
}

/// Replace each result's score with the ranker's and sort descending.
///
/// The sort is stable, so ties keep the vector store's order.
pub fn rerank(ranker: &dyn Ranker, query: &str, results: &mut [ScoredRecord]) {
    for result in results.iter_mut() {
        result.score = ranker.score(&result.record, query);
    }
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, summary: &str, category: &str) -> CandidateRecord {
        CandidateRecord::new(id, summary)
            .with_title(title)
            .with_categories(vec![category.to_string()])
    }

    #[test]
    fn test_keyword_weights() {
        let ranker = KeywordRanker::default();
        let r = record("a", "Quantum Advantage", "quantum computing advances", "quant-ph");

        assert_eq!(ranker.score(&r, "QUANTUM"), 15.0);
        assert_eq!(ranker.score(&r, "quant"), 18.0);
        assert_eq!(ranker.score(&r, "advances"), 5.0);
        assert_eq!(ranker.score(&r, "biology"), 0.0);
        assert_eq!(ranker.score(&r, "  "), 0.0);
    }

    #[test]
    fn test_only_first_category_counts() {
        let ranker = KeywordRanker::default();
        let r = CandidateRecord::new("a", "text")
            .with_categories(vec!["cs.LG".to_string(), "quant-ph".to_string()]);
        assert_eq!(ranker.score(&r, "quant-ph"), 0.0);
        assert_eq!(ranker.score(&r, "cs.lg"), 3.0);
    }

    #[test]
    fn test_rerank_orders_by_score() {
        let mut results = vec![
            ScoredRecord {
                record: record("low", "Other", "nothing", "math.CO"),
                score: 0.9,
            },
            ScoredRecord {
                record: record("high", "Graph networks", "graph learning", "cs.LG"),
                score: 0.5,
            },
            ScoredRecord {
                record: record("mid", "Other", "graph theory", "math.CO"),
                score: 0.7,
            },
        ];

        rerank(&KeywordRanker::default(), "graph", &mut results);

        let ids: Vec<_> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);
        assert_eq!(results[0].score, 15.0);
    }
}
