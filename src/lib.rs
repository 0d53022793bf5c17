pub mod agent;
pub mod config;
pub mod error;
pub mod jobfile;
pub mod log;
pub mod orchestration;
pub mod palette;
pub mod preview;
pub mod quantize;
pub mod util;

pub use error::{Error, Result};
pub use palette::{Palette, Rgb, Subset};
pub use quantize::{PlacementJob, QuantizationResult, Quantizer};
