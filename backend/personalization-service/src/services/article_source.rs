//! Upstream article feeds
//!
//! `ArticleSource` returns raw candidates per feed category. The NYT client
//! serves the primary feed from Top Stories (home section), the popularity
//! feed from Most Popular (viewed) and the wire feed from Top Stories over
//! several sections fetched concurrently. `fetch_all_batches` fans out over
//! every category and turns a failed feed into an empty batch.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::metrics;
use crate::models::{lenient_list, Article, FeedCategory, MediaVariant};
use crate::services::merger::{article_id_for, SourceBatch};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("All {0} wire sections failed")]
    AllSectionsFailed(usize),
}

#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch(&self, category: FeedCategory) -> Result<Vec<Article>, SourceError>;
}

/// Fetch every feed concurrently. Never fails: a feed error becomes an
/// empty batch for that category.
pub async fn fetch_all_batches(source: &dyn ArticleSource) -> Vec<SourceBatch> {
    let fetches = FeedCategory::PRIORITY.iter().map(|&category| async move {
        match source.fetch(category).await {
            Ok(articles) => {
                metrics::record_source_fetch(category.as_str(), "success");
                debug!(category = category.as_str(), count = articles.len(), "Feed fetched");
                SourceBatch::new(category, articles)
            }
            Err(e) => {
                metrics::record_source_fetch(category.as_str(), "error");
                warn!(category = category.as_str(), error = %e, "Feed fetch failed, using empty batch");
                SourceBatch::empty(category)
            }
        }
    });

    join_all(fetches).await
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    results: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "abstract")]
    summary: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    byline: String,
    #[serde(default)]
    published_date: String,
    #[serde(default)]
    section: String,
    #[serde(default)]
    subsection: Option<String>,
    #[serde(default)]
    multimedia: Option<Vec<RawMedia>>,
    #[serde(default, deserialize_with = "lenient_list")]
    des_facet: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    org_facet: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    per_facet: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    geo_facet: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(default)]
    url: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    caption: Option<String>,
}

impl From<RawArticle> for Article {
    fn from(raw: RawArticle) -> Self {
        Article {
            id: article_id_for(&raw.url),
            title: raw.title,
            summary: raw.summary,
            url: raw.url,
            byline: raw.byline,
            published_date: raw.published_date,
            section: raw.section,
            subsection: raw.subsection.filter(|s| !s.is_empty()),
            multimedia: raw
                .multimedia
                .unwrap_or_default()
                .into_iter()
                .filter(|media| !media.url.is_empty())
                .map(|media| MediaVariant {
                    format: media.format,
                    url: media.url,
                    caption: media.caption.filter(|c| !c.is_empty()),
                })
                .collect(),
            des_facet: raw.des_facet,
            org_facet: raw.org_facet,
            per_facet: raw.per_facet,
            geo_facet: raw.geo_facet,
        }
    }
}

pub struct NytArticleSource {
    client: HttpClient,
    base_url: String,
    api_key: String,
    home_section: String,
    popular_period: String,
    wire_sections: Vec<String>,
}

impl NytArticleSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        if config.api_key.is_empty() {
            warn!("SOURCE_API_KEY is not set; upstream feeds will likely reject requests");
        }

        let client = HttpClient::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            home_section: config.home_section.clone(),
            popular_period: config.popular_period.clone(),
            wire_sections: config.wire_sections.clone(),
        })
    }

    async fn get_feed(&self, endpoint: &str) -> Result<Vec<Article>, SourceError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .query(&[("api-key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let feed: FeedResponse = response.json().await?;
        Ok(feed.results.into_iter().map(Article::from).collect())
    }

    async fn top_stories(&self, section: &str) -> Result<Vec<Article>, SourceError> {
        self.get_feed(&format!("/topstories/v2/{}.json", section))
            .await
    }

    async fn most_popular(&self) -> Result<Vec<Article>, SourceError> {
        self.get_feed(&format!("/mostpopular/v2/viewed/{}.json", self.popular_period))
            .await
    }

    /// Sections in configured order; failed sections are dropped.
    async fn wire(&self) -> Result<Vec<Article>, SourceError> {
        let results = join_all(
            self.wire_sections
                .iter()
                .map(|section| self.top_stories(section)),
        )
        .await;

        let mut articles = Vec::new();
        let mut failed = 0usize;
        for (section, result) in self.wire_sections.iter().zip(results) {
            match result {
                Ok(batch) => articles.extend(batch),
                Err(e) => {
                    failed += 1;
                    warn!(section = %section, error = %e, "Wire section fetch failed");
                }
            }
        }

        if failed > 0 && failed == self.wire_sections.len() {
            return Err(SourceError::AllSectionsFailed(failed));
        }
        Ok(articles)
    }
}

#[async_trait]
impl ArticleSource for NytArticleSource {
    async fn fetch(&self, category: FeedCategory) -> Result<Vec<Article>, SourceError> {
        match category {
            FeedCategory::Primary => self.top_stories(&self.home_section).await,
            FeedCategory::Popular => self.most_popular().await,
            FeedCategory::Wire => self.wire().await,
        }
    }
}
