#![forbid(unsafe_code)]

//! # pairwise-survey
//!
//! Scoring engine for a two-phase pairwise-comparison survey.
//!
//! A participant first weighs keyword pairs on a signed 1..7 scale, then picks
//! the preferred image of each image pair once per keyword while the response
//! time is measured. Both signals become reciprocal comparison matrices; each
//! matrix yields a priority vector by the geometric-mean method, and the image
//! priorities are combined, weighted by keyword priority, into one score per
//! image.
//!
//! ```text
//! judgments -> comparison matrix -> priority vector
//! keyword priorities x per-keyword image priorities -> image scores
//! ```

pub mod aggregate;
pub mod combinations;
pub mod config;
pub mod keywords;
pub mod matrix;
pub mod normalize;
pub mod priority;
pub mod scoring;
pub mod session;
pub mod store;

pub use aggregate::{aggregate_scores, rank_scores};
pub use combinations::{generate_combinations, ordered_combinations};
pub use config::{ConfigError, SurveyConfig};
pub use keywords::parse_keyword_list;
pub use matrix::{
    build_comparison_matrix, build_comparison_matrix_with_scale, ComparisonMatrix,
    DiscardReason, DiscardedJudgment, ItemSet, ItemSetError, Judgment, JudgmentKind,
    MatrixBuild, PairwiseRecord,
};
pub use normalize::{normalize_response_times, normalize_with_scale, IntensityScale};
pub use priority::{consistency, solve_priorities, solve_priority_vector, ConsistencyReport};
pub use scoring::{score_snapshot, score_snapshot_with_scale, KeywordWeightRow, ScoringReport};
pub use session::{
    Checkpoint, ImageResponse, KeywordWeight, Phase, Prompt, SessionError, SessionSnapshot, Side,
    SurveySession,
};
pub use store::{SessionStore, SqliteSessionStore, StoreError};
