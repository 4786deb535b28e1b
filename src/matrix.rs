//! Reciprocal pairwise-comparison matrices built from judgment records.
//!
//! Placement convention: the preferred item owns the row. A judgment that picks
//! `selected` over `other` with intensity `x` sets
//! `m[selected][other] = x` and `m[other][selected] = 1 / x`.
//!
//! Malformed judgments never fail a build. They are skipped, reported in
//! [`MatrixBuild::discarded`], and logged at `warn`.

use std::collections::HashMap;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::normalize::{normalize_with_scale, IntensityScale};

/// Ordered set of unique labels. Position is the matrix index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ItemSet {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemSetError {
    #[error("duplicate item label: {label}")]
    DuplicateLabel { label: String },
}

impl ItemSet {
    pub fn new<I, S>(labels: I) -> Result<Self, ItemSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Self::default();
        for label in labels {
            let label = label.into();
            if out.index.contains_key(&label) {
                return Err(ItemSetError::DuplicateLabel { label });
            }
            out.index.insert(label.clone(), out.labels.len());
            out.labels.push(label);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl TryFrom<Vec<String>> for ItemSet {
    type Error = ItemSetError;

    fn try_from(labels: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(labels)
    }
}

impl From<ItemSet> for Vec<String> {
    fn from(set: ItemSet) -> Self {
        set.labels
    }
}

/// Which scoring rule turns a record's raw intensity into a matrix cell value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentKind {
    /// The intensity is an explicit magnitude chosen by the participant.
    ExplicitWeight,
    /// The intensity is a measured response time, min-max normalized within
    /// its group before use.
    ResponseTime,
}

/// Field accessors shared by every kind of pairwise record.
pub trait PairwiseRecord {
    fn left(&self) -> &str;
    fn right(&self) -> &str;
    /// Label of the preferred item. Must equal `left()` or `right()`.
    fn selected(&self) -> &str;
    /// Raw intensity before the kind's scoring rule is applied.
    fn intensity(&self) -> f64;
    /// Normalization group for response-time records.
    fn group(&self) -> Option<&str> {
        None
    }
}

/// Generic pairwise judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub left: String,
    pub right: String,
    pub selected: String,
    pub intensity: f64,
    #[serde(default)]
    pub group: Option<String>,
}

impl Judgment {
    pub fn new(left: &str, right: &str, selected: &str, intensity: f64) -> Self {
        Self {
            left: left.to_string(),
            right: right.to_string(),
            selected: selected.to_string(),
            intensity,
            group: None,
        }
    }

    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }
}

impl PairwiseRecord for Judgment {
    fn left(&self) -> &str {
        &self.left
    }

    fn right(&self) -> &str {
        &self.right
    }

    fn selected(&self) -> &str {
        &self.selected
    }

    fn intensity(&self) -> f64 {
        self.intensity
    }

    fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }
}

impl<R: PairwiseRecord + ?Sized> PairwiseRecord for &R {
    fn left(&self) -> &str {
        (**self).left()
    }

    fn right(&self) -> &str {
        (**self).right()
    }

    fn selected(&self) -> &str {
        (**self).selected()
    }

    fn intensity(&self) -> f64 {
        (**self).intensity()
    }

    fn group(&self) -> Option<&str> {
        (**self).group()
    }
}

/// Why a judgment was skipped during a build.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscardReason {
    #[error("unknown item label: {label}")]
    UnknownItem { label: String },
    #[error("item compared with itself: {label}")]
    SelfComparison { label: String },
    #[error("selected item {selected} is not part of the pair")]
    SelectionNotInPair { selected: String },
    #[error("invalid intensity: {value}")]
    InvalidIntensity { value: f64 },
}

/// One skipped judgment, identified by its position in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardedJudgment {
    pub index: usize,
    #[serde(flatten)]
    pub reason: DiscardReason,
}

/// Square matrix of positive reals; cell `(i, j)` is how strongly item `i` is
/// preferred over item `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonMatrix {
    values: DMatrix<f64>,
}

impl ComparisonMatrix {
    /// The indifference matrix: every cell is 1.
    pub fn indifferent(n: usize) -> Self {
        Self {
            values: DMatrix::from_element(n, n, 1.0),
        }
    }

    /// Build from row-major rows. Returns `None` if the rows are not square.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let n = rows.len();
        if rows.iter().any(|r| r.len() != n) {
            return None;
        }
        Some(Self {
            values: DMatrix::from_fn(n, n, |i, j| rows[i][j]),
        })
    }

    pub fn size(&self) -> usize {
        self.values.nrows()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[(i, j)]
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        let n = self.size();
        (0..n)
            .map(|i| (0..n).map(|j| self.values[(i, j)]).collect())
            .collect()
    }

    /// Checks unit diagonal and `m[i][j] * m[j][i] == 1` within `tol`.
    pub fn is_reciprocal(&self, tol: f64) -> bool {
        let n = self.size();
        for i in 0..n {
            if (self.values[(i, i)] - 1.0).abs() > tol {
                return false;
            }
            for j in (i + 1)..n {
                if (self.values[(i, j)] * self.values[(j, i)] - 1.0).abs() > tol {
                    return false;
                }
            }
        }
        true
    }

    fn set_preference(&mut self, preferred: usize, other: usize, intensity: f64) {
        self.values[(preferred, other)] = intensity;
        self.values[(other, preferred)] = 1.0 / intensity;
    }
}

/// Result of one matrix build.
#[derive(Debug, Clone)]
pub struct MatrixBuild {
    pub matrix: ComparisonMatrix,
    pub applied: usize,
    pub discarded: Vec<DiscardedJudgment>,
}

struct Resolved<'a> {
    index: usize,
    preferred: usize,
    other: usize,
    raw: f64,
    group: Option<&'a str>,
}

/// Build a comparison matrix over `items` using the default intensity scale.
pub fn build_comparison_matrix<R: PairwiseRecord>(
    items: &ItemSet,
    records: &[R],
    kind: JudgmentKind,
) -> MatrixBuild {
    build_comparison_matrix_with_scale(items, records, kind, IntensityScale::default())
}

/// Build a comparison matrix over `items`.
///
/// Records are applied in input order; a later record for the same pair
/// overwrites an earlier one.
pub fn build_comparison_matrix_with_scale<R: PairwiseRecord>(
    items: &ItemSet,
    records: &[R],
    kind: JudgmentKind,
    scale: IntensityScale,
) -> MatrixBuild {
    let mut matrix = ComparisonMatrix::indifferent(items.len());
    let mut discarded = Vec::new();

    let mut resolved = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match resolve(items, record, kind) {
            Ok((preferred, other)) => resolved.push(Resolved {
                index,
                preferred,
                other,
                raw: record.intensity(),
                group: record.group(),
            }),
            Err(reason) => discarded.push(DiscardedJudgment { index, reason }),
        }
    }

    let intensities = match kind {
        JudgmentKind::ExplicitWeight => resolved.iter().map(|r| r.raw).collect(),
        JudgmentKind::ResponseTime => grouped_intensities(&resolved, scale),
    };

    let mut applied = 0;
    for (r, intensity) in resolved.iter().zip(intensities) {
        if !intensity.is_finite() || intensity <= 0.0 {
            discarded.push(DiscardedJudgment {
                index: r.index,
                reason: DiscardReason::InvalidIntensity { value: intensity },
            });
            continue;
        }
        matrix.set_preference(r.preferred, r.other, intensity);
        applied += 1;
    }

    discarded.sort_by_key(|d| d.index);
    for d in &discarded {
        warn!(index = d.index, ?kind, "discarding judgment: {}", d.reason);
    }
    debug!(
        items = items.len(),
        applied,
        discarded = discarded.len(),
        ?kind,
        "built comparison matrix"
    );

    MatrixBuild {
        matrix,
        applied,
        discarded,
    }
}

fn resolve<R: PairwiseRecord>(
    items: &ItemSet,
    record: &R,
    kind: JudgmentKind,
) -> Result<(usize, usize), DiscardReason> {
    let i = items
        .index_of(record.left())
        .ok_or_else(|| DiscardReason::UnknownItem {
            label: record.left().to_string(),
        })?;
    let j = items
        .index_of(record.right())
        .ok_or_else(|| DiscardReason::UnknownItem {
            label: record.right().to_string(),
        })?;
    if i == j {
        return Err(DiscardReason::SelfComparison {
            label: record.left().to_string(),
        });
    }
    let selected = record.selected();
    let pair = if selected == record.left() {
        (i, j)
    } else if selected == record.right() {
        (j, i)
    } else {
        return Err(DiscardReason::SelectionNotInPair {
            selected: selected.to_string(),
        });
    };
    // Measurements outside the normalizer's domain would skew the group's range.
    if kind == JudgmentKind::ResponseTime {
        let raw = record.intensity();
        if !raw.is_finite() || raw <= 0.0 {
            return Err(DiscardReason::InvalidIntensity { value: raw });
        }
    }
    Ok(pair)
}

fn grouped_intensities(resolved: &[Resolved<'_>], scale: IntensityScale) -> Vec<f64> {
    let mut order: Vec<Option<&str>> = Vec::new();
    let mut members: HashMap<Option<&str>, Vec<usize>> = HashMap::new();
    for (pos, r) in resolved.iter().enumerate() {
        members
            .entry(r.group)
            .or_insert_with(|| {
                order.push(r.group);
                Vec::new()
            })
            .push(pos);
    }

    let mut out = vec![f64::NAN; resolved.len()];
    for group in order {
        let positions = &members[&group];
        let times: Vec<f64> = positions.iter().map(|&p| resolved[p].raw).collect();
        for (&p, v) in positions.iter().zip(normalize_with_scale(&times, scale)) {
            out[p] = v;
        }
    }
    out
}
