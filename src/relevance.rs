//! Relevance labels and the per-session average shown by the chat client.

use std::fmt;

/// Coarse relevance label for a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceBucket {
    /// Score of 0.5 or less.
    Low,
    /// Score in `(0.5, 0.7]`.
    Medium,
    /// Score above 0.7.
    High,
}

impl RelevanceBucket {
    /// Classify a similarity score. The thresholds themselves fall into the lower bucket.
    pub fn classify(score: f32) -> Self {
        if score > 0.7 {
            Self::High
        } else if score > 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for RelevanceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Running mean of per-answer relevance across a chat session.
///
/// Only the previous mean and the question count are kept:
/// `avg_n = (avg_{n-1} * (n - 1) + x_n) / n`, where `n` counts every question asked.
/// A question answered without sources bumps `n` but leaves the average unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionRelevance {
    average: f32,
    questions: u32,
}

impl SessionRelevance {
    /// Fold in one answer's source scores.
    ///
    /// Returns the mean score of this answer, if it had any sources.
    pub fn record(&mut self, scores: &[f32]) -> Option<f32> {
        self.questions += 1;
        if scores.is_empty() {
            return None;
        }
        let answer_mean = scores.iter().sum::<f32>() / scores.len() as f32;
        let n = self.questions as f32;
        self.average = (self.average * (n - 1.0) + answer_mean) / n;
        Some(answer_mean)
    }

    /// Current session average, or `None` before the first question.
    pub fn average(&self) -> Option<f32> {
        (self.questions > 0).then_some(self.average)
    }

    /// Number of questions asked so far.
    pub fn questions(&self) -> u32 {
        self.questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_fall_into_the_lower_bucket() {
        assert_eq!(RelevanceBucket::classify(0.95), RelevanceBucket::High);
        assert_eq!(RelevanceBucket::classify(0.7001), RelevanceBucket::High);
        assert_eq!(RelevanceBucket::classify(0.7), RelevanceBucket::Medium);
        assert_eq!(RelevanceBucket::classify(0.6), RelevanceBucket::Medium);
        assert_eq!(RelevanceBucket::classify(0.5), RelevanceBucket::Low);
        assert_eq!(RelevanceBucket::classify(0.3), RelevanceBucket::Low);
    }

    #[test]
    fn running_mean_matches_mean_of_answer_means() {
        let mut session = SessionRelevance::default();
        assert_eq!(session.average(), None);

        let first = session.record(&[0.8, 0.6]).expect("mean");
        assert!((first - 0.7).abs() < 1e-6);
        session.record(&[0.4]);
        session.record(&[0.9, 0.9, 0.9]);

        assert_eq!(session.questions(), 3);
        let expected = (0.7 + 0.4 + 0.9) / 3.0;
        assert!((session.average().expect("average") - expected).abs() < 1e-6);
    }

    #[test]
    fn sourceless_answers_count_as_questions_only() {
        let mut session = SessionRelevance::default();
        assert_eq!(session.record(&[]), None);
        assert_eq!(session.average(), Some(0.0));

        session.record(&[0.8]);
        assert_eq!(session.questions(), 2);
        assert!((session.average().expect("average") - 0.4).abs() < 1e-6);
    }
}
