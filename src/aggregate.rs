//! Weighted combination of per-keyword image priorities.

/// `score[img] = sum_k image_priorities[k][img] * keyword_priorities[k]`.
///
/// The result is a relative ranking score and is not renormalized. A keyword
/// without image data, a short image vector, or a non-finite term contributes
/// zero. The output length is the longest image vector.
pub fn aggregate_scores(keyword_priorities: &[f64], image_priorities: &[Vec<f64>]) -> Vec<f64> {
    let image_count = image_priorities.iter().map(Vec::len).max().unwrap_or(0);
    let mut scores = vec![0.0; image_count];
    for (k, keyword_weight) in keyword_priorities.iter().enumerate() {
        let Some(images) = image_priorities.get(k) else {
            continue;
        };
        for (img, score) in scores.iter_mut().enumerate() {
            let term = images.get(img).copied().unwrap_or(0.0) * keyword_weight;
            if term.is_finite() {
                *score += term;
            }
        }
    }
    scores
}

/// Pair labels with scores, highest first. Ties keep label order; a NaN score
/// sorts above every number instead of breaking the order.
pub fn rank_scores(labels: &[String], scores: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.clone(), scores.get(i).copied().unwrap_or(0.0)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_sum_across_keywords() {
        let scores = aggregate_scores(&[0.5, 0.5], &[vec![0.25, 0.75], vec![0.6, 0.4]]);
        assert!((scores[0] - 0.425).abs() < 1e-12);
        assert!((scores[1] - 0.575).abs() < 1e-12);
    }

    #[test]
    fn missing_keyword_data_contributes_zero() {
        let scores = aggregate_scores(&[0.2, 0.3, 0.5], &[vec![0.5, 0.5], vec![], vec![1.0]]);
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - (0.1 + 0.5)).abs() < 1e-12);
        assert!((scores[1] - 0.1).abs() < 1e-12);

        let scores = aggregate_scores(&[0.5, 0.5], &[vec![0.4, 0.6]]);
        assert!((scores[0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn scores_are_not_renormalized() {
        let scores = aggregate_scores(&[0.5], &[vec![0.5, 0.5]]);
        assert!((scores.iter().sum::<f64>() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn non_finite_terms_are_dropped() {
        let scores = aggregate_scores(&[1.0, f64::NAN], &[vec![0.3, 0.7], vec![0.9, 0.1]]);
        assert!((scores[0] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ranked = rank_scores(&labels, &[0.2, 0.5, 0.2]);
        let order: Vec<&str> = ranked.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn nan_score_does_not_break_the_ordering() {
        let labels: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let ranked = rank_scores(&labels, &[0.1, f64::NAN.copysign(1.0), 0.4, 0.3]);
        let order: Vec<&str> = ranked.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "d", "a"]);
    }
}
