//! Client side of CartoonMe: prepares a photo, resolves the theme's prompt and
//! parameters, and hands the request to one of the stylization back ends.

pub mod config;
pub mod detect;
pub mod imaging;
pub mod processor;
pub mod providers;
mod util;

pub use config::{ApiKey, PollSettings, ProcessorConfig, MAX_PIXEL_COUNT};
pub use detect::{FixedDetector, PersonDetector};
pub use imaging::PreparedImage;
pub use processor::{
    new_run_id, ImageProcessor, InFlightGuard, StylizedImage, DEFAULT_PROVIDER,
    GENERIC_FAILURE_MESSAGE,
};
pub use providers::{ImageBytes, StylizeRequest, Stylizer, StylizerRegistry, STYLIZER_NAMES};
pub use util::error_chain_text;
