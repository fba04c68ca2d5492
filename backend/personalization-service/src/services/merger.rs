//! Article merger
//!
//! Combines the per-feed candidate batches into one deduplicated, bounded
//! candidate list for the scoring oracle.

use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Article, FeedCategory};

/// Articles returned by one upstream feed. A failed feed contributes an
/// empty batch.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub category: FeedCategory,
    pub articles: Vec<Article>,
}

impl SourceBatch {
    pub fn new(category: FeedCategory, articles: Vec<Article>) -> Self {
        Self { category, articles }
    }

    pub fn empty(category: FeedCategory) -> Self {
        Self::new(category, Vec::new())
    }
}

/// Deduplication key for an article URL: trimmed, without fragment or
/// trailing slash.
pub fn canonical_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = match trimmed.find('#') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    without_fragment.trim_end_matches('/').to_string()
}

/// Stable article id derived from the canonical URL.
pub fn article_id_for(url: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, canonical_url(url).as_bytes()).to_string()
}

/// Merge batches in feed priority order (primary, popular, wire), keeping
/// the first occurrence of each canonical URL, then truncate to `cap`.
///
/// Deduplication runs over the full concatenation before truncating.
pub fn merge_batches(mut batches: Vec<SourceBatch>, cap: usize) -> Vec<Article> {
    // Stable sort keeps the per-feed relevance order intact.
    batches.sort_by_key(|batch| {
        FeedCategory::PRIORITY
            .iter()
            .position(|category| *category == batch.category)
    });

    let total: usize = batches.iter().map(|b| b.articles.len()).sum();
    let mut seen = HashSet::with_capacity(total);
    let mut merged = Vec::with_capacity(total.min(cap));
    let mut duplicates = 0usize;

    for article in batches.into_iter().flat_map(|batch| batch.articles) {
        let key = canonical_url(&article.url);
        if key.is_empty() {
            continue;
        }
        if seen.insert(key) {
            merged.push(article);
        } else {
            duplicates += 1;
        }
    }

    let unique = merged.len();
    merged.truncate(cap);

    debug!(
        total,
        unique,
        duplicates,
        returned = merged.len(),
        "Merged candidate batches"
    );

    merged
}
