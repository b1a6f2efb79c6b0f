mod annotate;
mod background;
mod extract;
mod preprocess;
mod regions;
mod result;

pub use annotate::{
    annotate, Overlay, BOX_COLOR, BOX_THICKNESS, TEXT_COLOR, TEXT_SCALE, TIMESTAMP_FORMAT,
};
pub use background::{Accumulator, BackgroundModel, BackgroundStrategy, RUNNING_AVERAGE_ALPHA};
pub use extract::{extract, Extraction, DILATE_ITERATIONS, FOREGROUND};
pub use preprocess::{preprocess, DegradedCondition, KernelSize, Preprocessed};
pub use result::{normalized, FrameResult, Region};
