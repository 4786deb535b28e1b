//! Full scoring pass over a session snapshot.
//!
//! keyword weights -> keyword matrix -> keyword priorities
//! image responses (per keyword) -> image matrix -> image priorities
//! keyword priorities x image priorities -> image scores

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{aggregate_scores, rank_scores};
use crate::matrix::{
    build_comparison_matrix_with_scale, DiscardedJudgment, ItemSet, JudgmentKind, PairwiseRecord,
};
use crate::normalize::IntensityScale;
use crate::priority::{consistency, solve_priorities, ConsistencyReport};
use crate::session::{ImageResponse, KeywordWeight, SessionSnapshot};

/// One solved comparison matrix with its diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixSummary {
    pub labels: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
    pub priorities: Vec<f64>,
    pub consistency: ConsistencyReport,
    pub judgments_applied: usize,
    pub discarded: Vec<DiscardedJudgment>,
    pub repaired_cells: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordImageSummary {
    pub keyword: String,
    pub response_count: usize,
    #[serde(flatten)]
    pub summary: MatrixSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordContribution {
    pub keyword: String,
    pub image_priority: f64,
    pub keyword_priority: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageScore {
    pub rank: usize,
    pub image: String,
    pub score: f64,
    pub contributions: Vec<KeywordContribution>,
}

/// One recorded keyword answer with the ratio credited to each side.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordWeightRow {
    pub keyword1: String,
    pub keyword2: String,
    pub weight: i32,
    pub k1_weight: f64,
    pub k2_weight: f64,
}

impl From<&KeywordWeight> for KeywordWeightRow {
    fn from(w: &KeywordWeight) -> Self {
        Self {
            keyword1: w.keyword1.clone(),
            keyword2: w.keyword2.clone(),
            weight: w.weight,
            k1_weight: w.k1_weight(),
            k2_weight: w.k2_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoringReport {
    pub session_id: Uuid,
    pub snapshot_hash: String,
    pub keyword_weights: Vec<KeywordWeightRow>,
    pub keyword_matrix: MatrixSummary,
    pub image_matrices: Vec<KeywordImageSummary>,
    /// Keywords with no recorded image responses; they contribute zero.
    pub keywords_without_responses: Vec<String>,
    /// Responses whose keyword is not in the keyword set.
    pub unmatched_responses: usize,
    /// Aggregate score per image, in image-set order.
    pub scores: Vec<f64>,
    pub ranking: Vec<ImageScore>,
}

/// Score a snapshot with the default intensity scale.
pub fn score_snapshot(snapshot: &SessionSnapshot) -> ScoringReport {
    score_snapshot_with_scale(snapshot, IntensityScale::default())
}

pub fn score_snapshot_with_scale(snapshot: &SessionSnapshot, scale: IntensityScale) -> ScoringReport {
    if snapshot.keywords.is_empty() {
        warn!(session_id = %snapshot.session_id, "snapshot has no keywords");
    }
    if snapshot.keyword_weights.is_empty() {
        warn!(session_id = %snapshot.session_id, "snapshot has no keyword weights");
    }

    let keyword_matrix = summarize(
        &snapshot.keywords,
        &snapshot.keyword_weights,
        JudgmentKind::ExplicitWeight,
        scale,
    );

    let mut image_matrices = Vec::new();
    let mut image_vectors = Vec::with_capacity(snapshot.keywords.len());
    let mut keywords_without_responses = Vec::new();
    for keyword in snapshot.keywords.labels() {
        let responses: Vec<&ImageResponse> = snapshot
            .image_responses
            .iter()
            .filter(|r| &r.keyword == keyword)
            .collect();
        if responses.is_empty() {
            keywords_without_responses.push(keyword.clone());
            image_vectors.push(Vec::new());
            continue;
        }
        let summary = summarize(&snapshot.images, &responses, JudgmentKind::ResponseTime, scale);
        image_vectors.push(summary.priorities.clone());
        image_matrices.push(KeywordImageSummary {
            keyword: keyword.clone(),
            response_count: responses.len(),
            summary,
        });
    }

    let unmatched_responses = snapshot
        .image_responses
        .iter()
        .filter(|r| snapshot.keywords.index_of(&r.keyword).is_none())
        .count();
    if unmatched_responses > 0 {
        warn!(
            session_id = %snapshot.session_id,
            unmatched_responses,
            "image responses reference unknown keywords"
        );
    }

    let mut scores = aggregate_scores(&keyword_matrix.priorities, &image_vectors);
    scores.resize(snapshot.images.len(), 0.0);

    let ranking = rank_scores(snapshot.images.labels(), &scores)
        .into_iter()
        .enumerate()
        .map(|(pos, (image, score))| {
            let img_idx = snapshot.images.index_of(&image).unwrap_or(usize::MAX);
            let contributions = snapshot
                .keywords
                .labels()
                .iter()
                .enumerate()
                .map(|(k, keyword)| KeywordContribution {
                    keyword: keyword.clone(),
                    image_priority: image_vectors
                        .get(k)
                        .and_then(|v| v.get(img_idx))
                        .copied()
                        .unwrap_or(0.0),
                    keyword_priority: keyword_matrix.priorities.get(k).copied().unwrap_or(0.0),
                })
                .collect();
            ImageScore {
                rank: pos + 1,
                image,
                score,
                contributions,
            }
        })
        .collect();

    info!(
        session_id = %snapshot.session_id,
        keywords = snapshot.keywords.len(),
        images = snapshot.images.len(),
        "scoring pass complete"
    );

    ScoringReport {
        session_id: snapshot.session_id,
        snapshot_hash: snapshot.content_hash(),
        keyword_weights: snapshot.keyword_weights.iter().map(KeywordWeightRow::from).collect(),
        keyword_matrix,
        image_matrices,
        keywords_without_responses,
        unmatched_responses,
        scores,
        ranking,
    }
}

fn summarize<R: PairwiseRecord>(
    items: &ItemSet,
    records: &[R],
    kind: JudgmentKind,
    scale: IntensityScale,
) -> MatrixSummary {
    let build = build_comparison_matrix_with_scale(items, records, kind, scale);
    let solution = solve_priorities(&build.matrix);
    let consistency = consistency(&build.matrix, &solution.priorities);
    MatrixSummary {
        labels: items.labels().to_vec(),
        matrix: build.matrix.to_rows(),
        priorities: solution.priorities,
        consistency,
        judgments_applied: build.applied,
        discarded: build.discarded,
        repaired_cells: solution.repaired_cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Phase;
    use chrono::Utc;

    fn snapshot(
        keywords: &[&str],
        images: &[&str],
        weights: Vec<KeywordWeight>,
        responses: Vec<ImageResponse>,
    ) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Uuid::nil(),
            created_at: Utc::now(),
            phase: Phase::Complete,
            keywords: ItemSet::new(keywords.iter().copied()).unwrap(),
            images: ItemSet::new(images.iter().copied()).unwrap(),
            keyword_weights: weights,
            image_responses: responses,
        }
    }

    fn response(left: &str, right: &str, selected: &str, secs: f64, keyword: &str) -> ImageResponse {
        ImageResponse {
            response_time_secs: secs,
            left_image: left.to_string(),
            right_image: right.to_string(),
            selected_image: selected.to_string(),
            keyword: keyword.to_string(),
        }
    }

    #[test]
    fn report_lists_keyword_weights_with_side_ratios() {
        let snap = snapshot(
            &["A", "B", "C"],
            &["I1"],
            vec![KeywordWeight::new("A", "B", 4), KeywordWeight::new("A", "C", -5)],
            vec![],
        );
        let report = score_snapshot(&snap);
        assert_eq!(report.keyword_weights.len(), 2);
        let first = &report.keyword_weights[0];
        assert_eq!((first.keyword1.as_str(), first.keyword2.as_str()), ("A", "B"));
        assert!((first.k1_weight - 0.25).abs() < 1e-12);
        assert_eq!(first.k2_weight, 4.0);
        let second = &report.keyword_weights[1];
        assert_eq!(second.weight, -5);
        assert_eq!(second.k1_weight, 5.0);
        assert!((second.k2_weight - 0.2).abs() < 1e-12);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["keyword_weights"][1]["k1_weight"], 5.0);
    }

    #[test]
    fn keyword_without_responses_contributes_zero() {
        let snap = snapshot(
            &["A", "B"],
            &["I1", "I2"],
            vec![KeywordWeight::new("A", "B", 3)],
            vec![response("I1", "I2", "I1", 1.0, "A")],
        );
        let report = score_snapshot(&snap);
        assert_eq!(report.keywords_without_responses, vec!["B".to_string()]);
        // Only keyword A (priority 0.25) carries image signal: [0.5, 0.5] * 0.25.
        assert!((report.scores[0] - 0.125).abs() < 1e-12);
        assert!((report.scores[1] - 0.125).abs() < 1e-12);
    }

    #[test]
    fn ranking_carries_contributions() {
        let snap = snapshot(
            &["A", "B"],
            &["I1", "I2"],
            vec![KeywordWeight::new("A", "B", -1)],
            vec![
                response("I1", "I2", "I2", 1.0, "A"),
                response("I1", "I2", "I2", 1.0, "B"),
                response("I1", "I2", "I1", 2.0, "B"),
            ],
        );
        let report = score_snapshot(&snap);
        assert_eq!(report.ranking.len(), 2);
        assert_eq!(report.ranking[0].rank, 1);
        let top = &report.ranking[0];
        let total: f64 = top
            .contributions
            .iter()
            .map(|c| c.image_priority * c.keyword_priority)
            .sum();
        assert!((total - top.score).abs() < 1e-12);
        assert_eq!(report.snapshot_hash.len(), 64);
    }

    #[test]
    fn unknown_keyword_responses_are_counted() {
        let snap = snapshot(
            &["A"],
            &["I1", "I2"],
            vec![],
            vec![response("I1", "I2", "I1", 1.0, "Z")],
        );
        let report = score_snapshot(&snap);
        assert_eq!(report.unmatched_responses, 1);
        assert_eq!(report.scores, vec![0.0, 0.0]);
    }
}
