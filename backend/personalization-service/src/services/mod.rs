pub mod article_source;
pub mod merger;
pub mod personalization;
pub mod ranking_cache;
pub mod ranking_log;
pub mod scoring;
pub mod user_vector;

pub use article_source::{fetch_all_batches, ArticleSource, NytArticleSource, SourceError};
pub use merger::{article_id_for, canonical_url, merge_batches, SourceBatch};
pub use personalization::{
    FeedbackEvent, PersonalizationService, RankingRequest, RankingResponse, ANONYMOUS_USER,
};
pub use ranking_cache::RankingCache;
pub use ranking_log::{ExportFormat, RankingLogStore};
pub use scoring::{
    HttpScoringOracle, RankRequest, RankResponse, ScoringError, ScoringGateway, ScoringOracle,
};
pub use user_vector::{UserVectorStore, VectorMutation};
