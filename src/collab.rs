//! Interfaces of the services around the recognizer.
//!
//! The recognizer never performs I/O itself. Person lookup, result storage
//! and identity-code issuing live behind these traits and are invoked by the
//! caller before or after recognition.

use crate::models::{IdentityCode, IdentityFormat, SheetCounts, SheetResult};
use serde::Serialize;

/// Person metadata attached to an identity code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonRecord {
    /// Full name
    pub name: String,
    /// Class or group, when known
    pub class_name: Option<String>,
    /// School, when known
    pub school: Option<String>,
}

/// Lookup of the person a sheet was issued to
pub trait PersonDirectory {
    /// Backend error
    type Error: std::error::Error + Send + Sync + 'static;

    /// Find the person for `code`; `Ok(None)` when the code is unknown
    fn lookup(&self, code: &IdentityCode) -> Result<Option<PersonRecord>, Self::Error>;
}

/// What a sink receives for one graded sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRecord<'a> {
    /// Identity the sheet was issued under
    pub identity: &'a IdentityCode,
    /// Answers in question order: letter, `None` for blank, `"X"` for double
    pub answers: Vec<Option<&'static str>>,
    /// Aggregate counts
    pub counts: SheetCounts,
}

/// Persistence of graded sheets
pub trait ResultSink {
    /// Backend error
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store one sheet
    fn persist(&mut self, record: &SheetRecord<'_>) -> Result<(), Self::Error>;
}

/// Issuer of unique identity codes for sheet generation
pub trait CodeRegistry {
    /// True if `code` was already issued
    fn contains(&self, code: &str) -> bool;

    /// Record `code` as issued
    fn insert(&mut self, code: String);
}

/// Errors from [`deliver`] and [`register_code`]
#[derive(Debug, thiserror::Error)]
pub enum CollabError<E: std::error::Error + 'static> {
    /// The sheet has no decoded identity and cannot be attributed
    #[error("sheet has no identity code")]
    MissingIdentity,
    /// A code does not follow the identity format
    #[error("identity code {0:?} does not match the expected format")]
    InvalidCode(String),
    /// A code was already issued
    #[error("identity code {0:?} is already registered")]
    Collision(String),
    /// The backend failed
    #[error("result sink failed: {0}")]
    Sink(#[source] E),
}

/// Hand a recognized sheet to `sink`. Sheets without an identity are refused
/// rather than stored under a default.
pub fn deliver<S: ResultSink>(result: &SheetResult, sink: &mut S) -> Result<(), CollabError<S::Error>> {
    let identity = result.identity.as_ref().ok_or(CollabError::MissingIdentity)?;
    let record = SheetRecord {
        identity,
        answers: result.answers(),
        counts: result.counts,
    };
    sink.persist(&record).map_err(CollabError::Sink)
}

/// Validate a candidate code part and record its composed form in `registry`
pub fn register_code<R: CodeRegistry>(
    registry: &mut R,
    format: &IdentityFormat,
    code: &str,
) -> Result<String, CollabError<std::convert::Infallible>> {
    let composed = format.compose(code);
    if !format.is_valid(&composed) {
        return Err(CollabError::InvalidCode(composed));
    }
    if registry.contains(&composed) {
        return Err(CollabError::Collision(composed));
    }
    registry.insert(composed.clone());
    Ok(composed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Classification, DecodeAttempt, OptionLabel, QuestionResult, StrategyKind,
    };
    use std::collections::HashSet;

    #[derive(Default)]
    struct MemorySink {
        stored: Vec<(String, Vec<Option<&'static str>>)>,
    }

    impl ResultSink for MemorySink {
        type Error = std::io::Error;

        fn persist(&mut self, record: &SheetRecord<'_>) -> Result<(), Self::Error> {
            self.stored.push((record.identity.text.clone(), record.answers.clone()));
            Ok(())
        }
    }

    impl CodeRegistry for HashSet<String> {
        fn contains(&self, code: &str) -> bool {
            HashSet::contains(self, code)
        }

        fn insert(&mut self, code: String) {
            HashSet::insert(self, code);
        }
    }

    fn sheet(identity: Option<IdentityCode>) -> SheetResult {
        let questions = vec![
            QuestionResult {
                question: 2,
                classification: Classification::Double,
            },
            QuestionResult {
                question: 1,
                classification: Classification::Answer(OptionLabel::C),
            },
        ];
        SheetResult::new(questions, identity, StrategyKind::Fixed, true)
    }

    #[test]
    fn test_deliver_requires_identity() {
        let mut sink = MemorySink::default();
        let err = deliver(&sheet(None), &mut sink).unwrap_err();
        assert!(matches!(err, CollabError::MissingIdentity));
        assert!(sink.stored.is_empty());
    }

    #[test]
    fn test_deliver_passes_ordered_answers() {
        let format = IdentityFormat::default();
        let attempt = DecodeAttempt::default_order()[0];
        let code = IdentityCode::new("XTRI-A7B3C9", &format, &attempt);
        let mut sink = MemorySink::default();
        deliver(&sheet(Some(code)), &mut sink).unwrap();
        assert_eq!(sink.stored, vec![("XTRI-A7B3C9".to_string(), vec![Some("C"), Some("X")])]);
    }

    #[test]
    fn test_register_code_checks_format_and_collisions() {
        let format = IdentityFormat::default();
        let mut registry: HashSet<String> = HashSet::new();
        assert_eq!(register_code(&mut registry, &format, "K9P2QZ").unwrap(), "XTRI-K9P2QZ");
        assert!(matches!(
            register_code(&mut registry, &format, "K9P2QZ"),
            Err(CollabError::Collision(_))
        ));
        assert!(matches!(
            register_code(&mut registry, &format, "K9P0QZ"),
            Err(CollabError::InvalidCode(_))
        ));
    }
}
