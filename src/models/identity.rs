use serde::{Deserialize, Serialize};
use std::fmt;

/// Part of the raster an identity attempt looks at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSelector {
    /// Template region where the code is printed
    Roi,
    /// Whole raster
    Full,
}

/// Preprocessing applied to the selected region before decoding
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocess {
    /// Decode the pixels as they are
    None,
    /// Local contrast enhancement
    Enhance,
    /// Adaptive (local mean) binarization
    Binarize,
    /// Resample by the given factor
    Scale(f32),
}

/// One step of the identity decode fallback list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodeAttempt {
    /// Where to look
    pub region: RegionSelector,
    /// How to prepare the pixels
    pub preprocess: Preprocess,
}

impl DecodeAttempt {
    /// Pair a region with a preprocessing step
    pub const fn new(region: RegionSelector, preprocess: Preprocess) -> Self {
        Self { region, preprocess }
    }

    /// Default ordered attempt list
    pub fn default_order() -> Vec<DecodeAttempt> {
        use Preprocess as P;
        use RegionSelector as R;
        vec![
            Self::new(R::Roi, P::None),
            Self::new(R::Full, P::None),
            Self::new(R::Full, P::Enhance),
            Self::new(R::Full, P::Binarize),
            Self::new(R::Full, P::Scale(0.5)),
            Self::new(R::Full, P::Scale(0.75)),
        ]
    }
}

impl fmt::Display for DecodeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.region, self.preprocess) {
            (RegionSelector::Roi, Preprocess::None) => f.write_str("roi"),
            (RegionSelector::Full, Preprocess::None) => f.write_str("full"),
            (RegionSelector::Full, Preprocess::Enhance) => f.write_str("enhanced"),
            (RegionSelector::Full, Preprocess::Binarize) => f.write_str("binary"),
            (RegionSelector::Full, Preprocess::Scale(s)) => {
                write!(f, "scaled_{}", (s * 100.0).round() as i32)
            }
            (RegionSelector::Roi, Preprocess::Enhance) => f.write_str("roi_enhanced"),
            (RegionSelector::Roi, Preprocess::Binarize) => f.write_str("roi_binary"),
            (RegionSelector::Roi, Preprocess::Scale(s)) => {
                write!(f, "roi_scaled_{}", (s * 100.0).round() as i32)
            }
        }
    }
}

/// Structural pattern identity codes must follow: `PREFIX` `SEP` `code`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityFormat {
    /// Fixed leading literal
    pub prefix: String,
    /// Separator between prefix and code
    pub separator: char,
    /// Exact length of the code part
    pub code_length: usize,
    /// Characters the code part may use
    pub alphabet: String,
}

impl Default for IdentityFormat {
    fn default() -> Self {
        Self {
            prefix: "XTRI".to_string(),
            separator: '-',
            code_length: 6,
            alphabet: "ABCDEFGHIJKLMNOPQRSTUVWXYZ23456789".to_string(),
        }
    }
}

impl IdentityFormat {
    /// True if `text` matches the pattern exactly
    pub fn is_valid(&self, text: &str) -> bool {
        let Some(rest) = text.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        let Some(code) = rest.strip_prefix(self.separator) else {
            return false;
        };
        code.chars().count() == self.code_length && code.chars().all(|c| self.alphabet.contains(c))
    }

    /// Format a code part with the prefix and separator
    pub fn compose(&self, code: &str) -> String {
        format!("{}{}{}", self.prefix, self.separator, code)
    }
}

/// Decoded identity code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityCode {
    /// Decoded text, trimmed
    pub text: String,
    /// Whether `text` matches the identity format
    pub valid: bool,
    /// Name of the attempt that decoded it
    pub method: String,
}

impl IdentityCode {
    /// Validate `text` once against `format`
    pub fn new(text: impl Into<String>, format: &IdentityFormat, attempt: &DecodeAttempt) -> Self {
        let text = text.into().trim().to_string();
        let valid = format.is_valid(&text);
        Self {
            text,
            valid,
            method: attempt.to_string(),
        }
    }
}
