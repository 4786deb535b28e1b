//! Interactive survey state.
//!
//! A [`SurveySession`] owns everything collected while a participant answers
//! prompts. Exactly one prompt is outstanding at a time; answering it appends
//! to the judgment log and advances to the next prompt. Phase boundaries yield
//! a [`Checkpoint`] so the caller can persist a [`SessionSnapshot`].

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::combinations::generate_combinations;
use crate::matrix::{ItemSet, PairwiseRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    KeywordComparison,
    ImageComparison,
    Complete,
}

/// Which side of the displayed pair the participant picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    KeywordsComplete,
    ImagesComplete,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::KeywordsComplete => "keywords_complete",
            Checkpoint::ImagesComplete => "images_complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keywords_complete" => Some(Checkpoint::KeywordsComplete),
            "images_complete" => Some(Checkpoint::ImagesComplete),
            _ => None,
        }
    }
}

/// The prompt currently awaiting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    Keyword {
        index: usize,
        total: usize,
        left: String,
        right: String,
    },
    Image {
        keyword: String,
        round: usize,
        index: usize,
        total: usize,
        left: String,
        right: String,
    },
}

/// Keyword importance judgment on the signed scale.
///
/// A positive weight prefers `keyword2`, a negative weight prefers `keyword1`;
/// the magnitude is the intensity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordWeight {
    pub keyword1: String,
    pub keyword2: String,
    pub weight: i32,
}

impl KeywordWeight {
    pub fn new(keyword1: &str, keyword2: &str, weight: i32) -> Self {
        Self {
            keyword1: keyword1.to_string(),
            keyword2: keyword2.to_string(),
            weight,
        }
    }

    /// Ratio credited to `keyword1`: `|w|` if it is preferred, else `1/|w|`.
    pub fn k1_weight(&self) -> f64 {
        let magnitude = self.weight.unsigned_abs() as f64;
        if self.weight < 0 {
            magnitude
        } else {
            1.0 / magnitude
        }
    }

    /// Ratio credited to `keyword2`; always the reciprocal of `k1_weight`.
    pub fn k2_weight(&self) -> f64 {
        1.0 / self.k1_weight()
    }
}

impl PairwiseRecord for KeywordWeight {
    fn left(&self) -> &str {
        &self.keyword1
    }

    fn right(&self) -> &str {
        &self.keyword2
    }

    fn selected(&self) -> &str {
        if self.weight > 0 {
            &self.keyword2
        } else {
            &self.keyword1
        }
    }

    fn intensity(&self) -> f64 {
        self.weight.unsigned_abs() as f64
    }
}

/// One image choice, timed from prompt display to click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub response_time_secs: f64,
    pub left_image: String,
    pub right_image: String,
    pub selected_image: String,
    pub keyword: String,
}

impl PairwiseRecord for ImageResponse {
    fn left(&self) -> &str {
        &self.left_image
    }

    fn right(&self) -> &str {
        &self.right_image
    }

    fn selected(&self) -> &str {
        &self.selected_image
    }

    fn intensity(&self) -> f64 {
        self.response_time_secs
    }

    fn group(&self) -> Option<&str> {
        Some(&self.keyword)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("survey needs at least one keyword")]
    NoKeywords,
    #[error("expected phase {expected:?}, session is in {actual:?}")]
    WrongPhase { expected: Phase, actual: Phase },
    #[error("keyword weight {weight} outside ±1..=±{max}")]
    WeightOutOfRange { weight: i32, max: u32 },
    #[error("invalid response time: {secs}")]
    InvalidResponseTime { secs: f64 },
}

/// Persisted form of a session's judgment log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub phase: Phase,
    pub keywords: ItemSet,
    pub images: ItemSet,
    #[serde(default)]
    pub keyword_weights: Vec<KeywordWeight>,
    #[serde(default)]
    pub image_responses: Vec<ImageResponse>,
}

impl SessionSnapshot {
    /// blake3 hex digest of the snapshot's JSON form.
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct SurveySession {
    id: Uuid,
    created_at: DateTime<Utc>,
    keywords: ItemSet,
    images: ItemSet,
    keyword_pairs: Vec<(String, String)>,
    image_pairs: Vec<(String, String)>,
    max_keyword_weight: u32,
    phase: Phase,
    pair_index: usize,
    round: usize,
    keyword_weights: Vec<KeywordWeight>,
    image_responses: Vec<ImageResponse>,
}

impl SurveySession {
    /// Start a session. Keyword pairs and image pairs are shuffled once with
    /// `rng`; the same image order is reused for every keyword round.
    ///
    /// A phase with no pairs is skipped here, so its checkpoint is never
    /// returned by a `record_*` call. Use [`SurveySession::reached_checkpoint`]
    /// to persist such a session.
    pub fn new<R: Rng + ?Sized>(
        keywords: ItemSet,
        images: ItemSet,
        max_keyword_weight: u32,
        rng: &mut R,
    ) -> Result<Self, SessionError> {
        if keywords.is_empty() {
            return Err(SessionError::NoKeywords);
        }
        let keyword_pairs = generate_combinations(keywords.labels(), rng);
        let image_pairs = generate_combinations(images.labels(), rng);
        let phase = if !keyword_pairs.is_empty() {
            Phase::KeywordComparison
        } else if !image_pairs.is_empty() {
            Phase::ImageComparison
        } else {
            Phase::Complete
        };
        let id = Uuid::new_v4();
        info!(
            session_id = %id,
            keywords = keywords.len(),
            images = images.len(),
            keyword_pairs = keyword_pairs.len(),
            image_pairs = image_pairs.len(),
            "survey session started"
        );
        Ok(Self {
            id,
            created_at: Utc::now(),
            keywords,
            images,
            keyword_pairs,
            image_pairs,
            max_keyword_weight,
            phase,
            pair_index: 0,
            round: 0,
            keyword_weights: Vec::new(),
            image_responses: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Latest phase boundary this session has passed, whether by answering or
    /// because the phase had no prompts.
    pub fn reached_checkpoint(&self) -> Option<Checkpoint> {
        match self.phase {
            Phase::KeywordComparison => None,
            Phase::ImageComparison => Some(Checkpoint::KeywordsComplete),
            Phase::Complete => Some(Checkpoint::ImagesComplete),
        }
    }

    pub fn keyword_weights(&self) -> &[KeywordWeight] {
        &self.keyword_weights
    }

    pub fn image_responses(&self) -> &[ImageResponse] {
        &self.image_responses
    }

    /// Total number of prompts over both phases.
    pub fn prompt_count(&self) -> usize {
        let image_rounds = if self.image_pairs.is_empty() {
            0
        } else {
            self.keywords.len()
        };
        self.keyword_pairs.len() + image_rounds * self.image_pairs.len()
    }

    pub fn current_prompt(&self) -> Option<Prompt> {
        match self.phase {
            Phase::KeywordComparison => {
                let (left, right) = self.keyword_pairs.get(self.pair_index)?;
                Some(Prompt::Keyword {
                    index: self.pair_index,
                    total: self.keyword_pairs.len(),
                    left: left.clone(),
                    right: right.clone(),
                })
            }
            Phase::ImageComparison => {
                let (left, right) = self.image_pairs.get(self.pair_index)?;
                Some(Prompt::Image {
                    keyword: self.keywords.get(self.round)?.to_string(),
                    round: self.round,
                    index: self.pair_index,
                    total: self.image_pairs.len(),
                    left: left.clone(),
                    right: right.clone(),
                })
            }
            Phase::Complete => None,
        }
    }

    /// Answer the current keyword prompt.
    pub fn record_keyword_weight(&mut self, weight: i32) -> Result<Option<Checkpoint>, SessionError> {
        self.expect_phase(Phase::KeywordComparison)?;
        if weight == 0 || weight.unsigned_abs() > self.max_keyword_weight {
            return Err(SessionError::WeightOutOfRange {
                weight,
                max: self.max_keyword_weight,
            });
        }
        let (keyword1, keyword2) = &self.keyword_pairs[self.pair_index];
        let record = KeywordWeight::new(keyword1, keyword2, weight);
        debug!(
            session_id = %self.id,
            keyword1 = %record.keyword1,
            keyword2 = %record.keyword2,
            weight,
            "keyword weight recorded"
        );
        self.keyword_weights.push(record);

        self.pair_index += 1;
        if self.pair_index < self.keyword_pairs.len() {
            return Ok(None);
        }
        self.pair_index = 0;
        self.phase = if self.image_pairs.is_empty() {
            Phase::Complete
        } else {
            Phase::ImageComparison
        };
        info!(session_id = %self.id, answered = self.keyword_weights.len(), "keyword phase complete");
        Ok(Some(Checkpoint::KeywordsComplete))
    }

    /// Answer the current image prompt.
    pub fn record_image_choice(
        &mut self,
        side: Side,
        elapsed_secs: f64,
    ) -> Result<Option<Checkpoint>, SessionError> {
        self.expect_phase(Phase::ImageComparison)?;
        if !elapsed_secs.is_finite() || elapsed_secs <= 0.0 {
            return Err(SessionError::InvalidResponseTime { secs: elapsed_secs });
        }
        let (left, right) = &self.image_pairs[self.pair_index];
        let selected = match side {
            Side::Left => left,
            Side::Right => right,
        };
        let keyword = self.keywords.get(self.round).unwrap_or_default();
        let record = ImageResponse {
            response_time_secs: elapsed_secs,
            left_image: left.clone(),
            right_image: right.clone(),
            selected_image: selected.clone(),
            keyword: keyword.to_string(),
        };
        debug!(
            session_id = %self.id,
            keyword = %record.keyword,
            selected = %record.selected_image,
            elapsed_secs,
            "image choice recorded"
        );
        self.image_responses.push(record);

        if self.pair_index + 1 < self.image_pairs.len() {
            self.pair_index += 1;
            return Ok(None);
        }
        if self.round + 1 < self.keywords.len() {
            self.round += 1;
            self.pair_index = 0;
            return Ok(None);
        }
        self.phase = Phase::Complete;
        info!(session_id = %self.id, answered = self.image_responses.len(), "image phase complete");
        Ok(Some(Checkpoint::ImagesComplete))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            created_at: self.created_at,
            phase: self.phase,
            keywords: self.keywords.clone(),
            images: self.images.clone(),
            keyword_weights: self.keyword_weights.clone(),
            image_responses: self.image_responses.clone(),
        }
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), SessionError> {
        if self.phase != expected {
            return Err(SessionError::WrongPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session(keywords: &[&str], images: &[&str]) -> SurveySession {
        let mut rng = StdRng::seed_from_u64(11);
        SurveySession::new(
            ItemSet::new(keywords.iter().copied()).unwrap(),
            ItemSet::new(images.iter().copied()).unwrap(),
            7,
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn keyword_weight_sides() {
        let w = KeywordWeight::new("A", "B", 3);
        assert_eq!(w.selected(), "B");
        assert_eq!(w.intensity(), 3.0);
        assert!((w.k1_weight() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(w.k2_weight(), 3.0);

        let w = KeywordWeight::new("A", "B", -5);
        assert_eq!(w.selected(), "A");
        assert_eq!(w.k1_weight(), 5.0);
        assert!((w.k2_weight() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn walks_both_phases_with_checkpoints() {
        let mut s = session(&["k1", "k2", "k3"], &["i1", "i2", "i3"]);
        assert_eq!(s.prompt_count(), 3 + 3 * 3);
        assert_eq!(s.phase(), Phase::KeywordComparison);

        assert_eq!(s.record_keyword_weight(2).unwrap(), None);
        assert_eq!(s.record_keyword_weight(-4).unwrap(), None);
        assert_eq!(
            s.record_keyword_weight(7).unwrap(),
            Some(Checkpoint::KeywordsComplete)
        );
        assert_eq!(s.phase(), Phase::ImageComparison);

        let mut checkpoints = Vec::new();
        for step in 0..9 {
            let prompt = s.current_prompt().unwrap();
            match prompt {
                Prompt::Image { round, .. } => assert_eq!(round, step / 3),
                other => panic!("unexpected prompt {other:?}"),
            }
            let side = if step % 2 == 0 { Side::Left } else { Side::Right };
            if let Some(cp) = s.record_image_choice(side, 0.5 + step as f64).unwrap() {
                checkpoints.push(cp);
            }
        }
        assert_eq!(checkpoints, vec![Checkpoint::ImagesComplete]);
        assert_eq!(s.phase(), Phase::Complete);
        assert!(s.current_prompt().is_none());

        let snap = s.snapshot();
        assert_eq!(snap.keyword_weights.len(), 3);
        assert_eq!(snap.image_responses.len(), 9);
        let per_keyword = snap
            .image_responses
            .iter()
            .filter(|r| r.keyword == "k2")
            .count();
        assert_eq!(per_keyword, 3);
    }

    #[test]
    fn skipped_phases_still_report_their_boundary() {
        let s = session(&["only"], &["i1", "i2"]);
        assert_eq!(s.phase(), Phase::ImageComparison);
        assert_eq!(s.reached_checkpoint(), Some(Checkpoint::KeywordsComplete));

        let s = session(&["only"], &["i1"]);
        assert_eq!(s.phase(), Phase::Complete);
        assert!(s.current_prompt().is_none());
        assert_eq!(s.reached_checkpoint(), Some(Checkpoint::ImagesComplete));

        let mut s = session(&["k1", "k2"], &["i1", "i2"]);
        assert_eq!(s.reached_checkpoint(), None);
        s.record_keyword_weight(2).unwrap();
        assert_eq!(s.reached_checkpoint(), Some(Checkpoint::KeywordsComplete));
    }

    #[test]
    fn answers_are_checked_against_phase_and_range() {
        let mut s = session(&["k1", "k2"], &["i1", "i2"]);
        assert_eq!(
            s.record_image_choice(Side::Left, 1.0),
            Err(SessionError::WrongPhase {
                expected: Phase::ImageComparison,
                actual: Phase::KeywordComparison
            })
        );
        assert!(matches!(
            s.record_keyword_weight(0),
            Err(SessionError::WeightOutOfRange { .. })
        ));
        assert!(matches!(
            s.record_keyword_weight(-8),
            Err(SessionError::WeightOutOfRange { .. })
        ));
        assert!(s.keyword_weights().is_empty());

        s.record_keyword_weight(1).unwrap();
        assert!(matches!(
            s.record_image_choice(Side::Left, f64::NAN),
            Err(SessionError::InvalidResponseTime { .. })
        ));
        assert!(matches!(
            s.record_image_choice(Side::Left, -0.1),
            Err(SessionError::InvalidResponseTime { .. })
        ));
        assert!(matches!(
            s.record_image_choice(Side::Left, 0.0),
            Err(SessionError::InvalidResponseTime { .. })
        ));
        assert!(s.image_responses().is_empty());
        assert_eq!(s.phase(), Phase::ImageComparison);
    }

    #[test]
    fn selected_side_maps_to_image_label() {
        let mut s = session(&["only"], &["i1", "i2"]);
        assert_eq!(s.phase(), Phase::ImageComparison);
        let Some(Prompt::Image { left, right, .. }) = s.current_prompt() else {
            panic!("expected image prompt");
        };
        s.record_image_choice(Side::Right, 1.2).unwrap();
        let r = &s.image_responses()[0];
        assert_eq!(r.left_image, left);
        assert_eq!(r.right_image, right);
        assert_eq!(r.selected_image, right);
        assert_eq!(r.keyword, "only");
    }

    #[test]
    fn degenerate_sessions() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            SurveySession::new(ItemSet::default(), ItemSet::default(), 7, &mut rng).unwrap_err(),
            SessionError::NoKeywords
        );

        let mut s = session(&["k1", "k2"], &["i1"]);
        assert_eq!(s.prompt_count(), 1);
        assert_eq!(
            s.record_keyword_weight(3).unwrap(),
            Some(Checkpoint::KeywordsComplete)
        );
        assert_eq!(s.phase(), Phase::Complete);

        let s = session(&["k1"], &[]);
        assert_eq!(s.phase(), Phase::Complete);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut s = session(&["k1", "k2"], &["i1", "i2"]);
        s.record_keyword_weight(-2).unwrap();
        let snap = s.snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
