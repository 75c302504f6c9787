pub mod identity;
pub mod matrix;
pub mod point;
pub mod raster;
pub mod sheet;

pub use identity::{DecodeAttempt, IdentityCode, IdentityFormat, Preprocess, RegionSelector};
pub use matrix::BitMatrix;
pub use point::{Point, Rect};
pub use raster::RasterImage;
pub use sheet::{
    BubbleSample, Classification, OPTION_COUNT, OptionLabel, QuestionResult, SheetCounts,
    SheetResult, StrategyKind,
};
