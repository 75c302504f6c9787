use serde::Serialize;
use std::fmt;

/// Why a localization strategy could not produce a full grid
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GridFailure {
    /// Circle detection found too few candidates
    #[error("found {found} circles, need at least {required}")]
    TooFewCircles {
        /// Circles inside the grid rectangle
        found: usize,
        /// Minimum accepted
        required: usize,
    },
    /// Candidates did not group into the expected number of rows
    #[error("circles form {found} rows, expected {expected}")]
    RowCount {
        /// Rows formed
        found: usize,
        /// Rows on the template
        expected: usize,
    },
    /// A row did not hold exactly one circle per option per column
    #[error("row {row} holds {found} circles, expected {expected}")]
    RowSize {
        /// Zero-based row index
        row: usize,
        /// Circles in that row
        found: usize,
        /// Circles the template prints per row
        expected: usize,
    },
    /// Nominal bubble positions land outside the raster
    #[error("grid falls outside the raster")]
    OutOfBounds,
    /// Raster proportions are too far from the template to trust
    #[error("raster aspect ratio diverges {:.0}% from the template", .divergence * 100.0)]
    AspectRatio {
        /// Relative divergence, 0.5 = 50 %
        divergence: f32,
    },
}

/// Errors returned by [`crate::recognize`]
#[derive(thiserror::Error, Debug)]
pub enum RecognitionError {
    /// Fewer than four quadrants held a marker and the fallback is disabled
    #[error("calibration markers not found ({found} of 4 quadrants)")]
    MarkersNotFound {
        /// Quadrants that did hold a candidate
        found: usize,
    },
    /// Every localization strategy failed; carries the last failure
    #[error("bubble grid mismatch: {0}")]
    GridMismatch(GridFailure),
    /// A raster side is below the configured minimum
    #[error("image too small: {width}x{height}, minimum side is {min}")]
    ImageTooSmall {
        /// Raster width
        width: u32,
        /// Raster height
        height: u32,
        /// Configured minimum side
        min: u32,
    },
    /// Input bytes could not be decoded as an image
    #[error("cannot decode image: {0}")]
    DecodeFailure(#[from] image::ImageError),
}

/// Coarse error category callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The four fiducial markers were not all found
    MarkersNotFound,
    /// No localization strategy produced a valid grid
    GridMismatch,
    /// The raster is below the minimum size
    ImageTooSmall,
    /// The input bytes are not a decodable image
    DecodeFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::MarkersNotFound => "MARKERS_NOT_FOUND",
            ErrorKind::GridMismatch => "GRID_MISMATCH",
            ErrorKind::ImageTooSmall => "IMAGE_TOO_SMALL",
            ErrorKind::DecodeFailure => "DECODE_FAILURE",
        })
    }
}

impl RecognitionError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecognitionError::MarkersNotFound { .. } => ErrorKind::MarkersNotFound,
            RecognitionError::GridMismatch(_) => ErrorKind::GridMismatch,
            RecognitionError::ImageTooSmall { .. } => ErrorKind::ImageTooSmall,
            RecognitionError::DecodeFailure(_) => ErrorKind::DecodeFailure,
        }
    }
}

impl From<GridFailure> for RecognitionError {
    fn from(failure: GridFailure) -> Self {
        RecognitionError::GridMismatch(failure)
    }
}

/// Render an error and its `source()` chain on one line
pub fn fmt_error_chain(mut err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    while let Some(source) = err.source() {
        out.push_str(": ");
        out.push_str(&source.to_string());
        err = source;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err = RecognitionError::MarkersNotFound { found: 2 };
        assert_eq!(err.kind(), ErrorKind::MarkersNotFound);
        assert_eq!(err.to_string(), "calibration markers not found (2 of 4 quadrants)");

        let err: RecognitionError = GridFailure::RowCount {
            found: 14,
            expected: 15,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::GridMismatch);
        assert_eq!(err.kind().to_string(), "GRID_MISMATCH");
    }

    #[test]
    fn test_kind_serializes_in_wire_form() {
        let json = serde_json::to_string(&ErrorKind::ImageTooSmall).unwrap();
        assert_eq!(json, r#""IMAGE_TOO_SMALL""#);
    }

    #[test]
    fn test_aspect_message() {
        let failure = GridFailure::AspectRatio { divergence: 0.62 };
        assert_eq!(
            failure.to_string(),
            "raster aspect ratio diverges 62% from the template"
        );
    }
}
