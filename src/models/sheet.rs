use crate::models::IdentityCode;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Number of options per question
pub const OPTION_COUNT: usize = 5;

/// Option label of a bubble within its question
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionLabel {
    /// First option
    A,
    /// Second option
    B,
    /// Third option
    C,
    /// Fourth option
    D,
    /// Fifth option
    E,
}

impl OptionLabel {
    /// All labels in printed order
    pub const ALL: [OptionLabel; OPTION_COUNT] = [
        OptionLabel::A,
        OptionLabel::B,
        OptionLabel::C,
        OptionLabel::D,
        OptionLabel::E,
    ];

    /// Label for the option at `index` (0 = A)
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Position within the question (A = 0)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Printed letter
    pub fn as_str(self) -> &'static str {
        match self {
            OptionLabel::A => "A",
            OptionLabel::B => "B",
            OptionLabel::C => "C",
            OptionLabel::D => "D",
            OptionLabel::E => "E",
        }
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Darkness measured for one bubble
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BubbleSample {
    /// Question number, 1-based
    pub question: u16,
    /// Which option this bubble is
    pub label: OptionLabel,
    /// Percentage of dark pixels in the sampling window, 0..=100
    pub darkness: f32,
}

impl BubbleSample {
    /// Create a sample, clamping darkness to `0..=100`
    pub fn new(question: u16, label: OptionLabel, darkness: f32) -> Self {
        Self {
            question,
            label,
            darkness: darkness.clamp(0.0, 100.0),
        }
    }
}

/// Outcome of classifying one question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Classification {
    /// A single option was marked
    Answer(OptionLabel),
    /// Nothing was marked
    Blank,
    /// Two or more options were marked with comparable confidence
    Double,
}

impl Classification {
    /// Wire form used by service wrappers: the letter, `None` for blank, `"X"` for double
    pub fn as_answer(self) -> Option<&'static str> {
        match self {
            Classification::Answer(label) => Some(label.as_str()),
            Classification::Blank => None,
            Classification::Double => Some("X"),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Answer(label) => write!(f, "{label}"),
            Classification::Blank => f.write_str("BLANK"),
            Classification::Double => f.write_str("DOUBLE"),
        }
    }
}

impl From<Classification> for String {
    fn from(value: Classification) -> Self {
        value.to_string()
    }
}

/// Classification of one question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuestionResult {
    /// Question number, 1-based
    pub question: u16,
    /// Resolved answer
    pub classification: Classification,
}

/// Aggregate counts over a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SheetCounts {
    /// Questions with a single letter
    pub answered: usize,
    /// Questions left blank
    pub blank: usize,
    /// Questions marked more than once
    pub double: usize,
}

impl SheetCounts {
    /// Tally a set of question results
    pub fn tally(questions: &[QuestionResult]) -> Self {
        let mut counts = Self::default();
        for q in questions {
            match q.classification {
                Classification::Answer(_) => counts.answered += 1,
                Classification::Blank => counts.blank += 1,
                Classification::Double => counts.double += 1,
            }
        }
        counts
    }

    /// `answered + blank + double`
    pub fn total(&self) -> usize {
        self.answered + self.blank + self.double
    }
}

/// Which localization strategy produced the samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Circle detection with structural validation
    Detected,
    /// Nominal template coordinates with local search
    Fixed,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Detected => f.write_str("detected"),
            StrategyKind::Fixed => f.write_str("fixed"),
        }
    }
}

/// Recognized answer sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetResult {
    /// One result per question, ordered by question number
    pub questions: Vec<QuestionResult>,
    /// Aggregate counts, always summing to `questions.len()`
    pub counts: SheetCounts,
    /// Decoded identity code, absent when no attempt decoded anything
    pub identity: Option<IdentityCode>,
    /// Wall-clock time spent recognizing
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Strategy whose samples were classified
    pub strategy: StrategyKind,
    /// Whether the fiducial markers were used for rectification
    pub aligned_by_markers: bool,
    /// Non-fatal anomalies noticed while processing
    pub warnings: Vec<String>,
}

impl SheetResult {
    /// Assemble a result, ordering questions by number and tallying counts
    pub fn new(
        mut questions: Vec<QuestionResult>,
        identity: Option<IdentityCode>,
        strategy: StrategyKind,
        aligned_by_markers: bool,
    ) -> Self {
        questions.sort_by_key(|q| q.question);
        let counts = SheetCounts::tally(&questions);
        Self {
            questions,
            counts,
            identity,
            elapsed: Duration::ZERO,
            strategy,
            aligned_by_markers,
            warnings: Vec::new(),
        }
    }

    /// Answers in question order: letter, `None` for blank, `"X"` for double
    pub fn answers(&self) -> Vec<Option<&'static str>> {
        self.questions
            .iter()
            .map(|q| q.classification.as_answer())
            .collect()
    }

    /// Classification for a 1-based question number
    pub fn question(&self, number: u16) -> Option<Classification> {
        self.questions
            .binary_search_by_key(&number, |q| q.question)
            .ok()
            .map(|i| self.questions[i].classification)
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(question: u16, classification: Classification) -> QuestionResult {
        QuestionResult {
            question,
            classification,
        }
    }

    #[test]
    fn test_counts_and_ordering() {
        let result = SheetResult::new(
            vec![
                q(3, Classification::Double),
                q(1, Classification::Answer(OptionLabel::C)),
                q(2, Classification::Blank),
            ],
            None,
            StrategyKind::Fixed,
            true,
        );
        assert_eq!(
            result.questions.iter().map(|q| q.question).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(result.counts.total(), 3);
        assert_eq!(result.answers(), vec![Some("C"), None, Some("X")]);
        assert_eq!(result.question(3), Some(Classification::Double));
        assert_eq!(result.question(4), None);
    }

    #[test]
    fn test_classification_serializes_as_string() {
        let json = serde_json::to_string(&q(7, Classification::Answer(OptionLabel::E))).unwrap();
        assert_eq!(json, r#"{"question":7,"classification":"E"}"#);
        let json = serde_json::to_string(&Classification::Blank).unwrap();
        assert_eq!(json, r#""BLANK""#);
    }

    #[test]
    fn test_sample_darkness_is_clamped() {
        assert_eq!(BubbleSample::new(1, OptionLabel::A, 140.0).darkness, 100.0);
        assert_eq!(BubbleSample::new(1, OptionLabel::A, -3.0).darkness, 0.0);
    }
}
