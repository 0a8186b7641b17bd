mod local;
mod replicate;
mod stability;
#[cfg(test)]
mod stub_server;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use cartoonme_contracts::events::EventWriter;
use cartoonme_contracts::params::CartoonThemeParameters;
use cartoonme_contracts::prompts::Subject;

use crate::config::{ApiKey, ProcessorConfig};
use crate::imaging::PreparedImage;

pub use local::{apply_local_effect, local_effect_for_theme, LocalEffect, LocalStylizer};
pub use replicate::{
    build_prediction_payload, classify_status, first_output_url, poll_until_terminal,
    PredictionState, ReplicateStylizer,
};
pub use stability::{decode_structure_response, StabilityStylizer, StructureControlForm};

/// Names of the back ends [`default_stylizer_registry`] registers.
pub const STYLIZER_NAMES: [&str; 3] = ["stability", "replicate", "local"];

/// One stylization attempt, fully resolved before it reaches a back end.
#[derive(Debug, Clone)]
pub struct StylizeRequest {
    pub theme: String,
    pub prompt: String,
    pub params: CartoonThemeParameters,
    pub control_strength: f64,
    pub subject: Option<Subject>,
    pub image: PreparedImage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

pub trait Stylizer: Send + Sync {
    fn name(&self) -> &str;

    /// Credential sent with the request, if the back end is remote.
    fn api_key(&self) -> Option<&ApiKey> {
        None
    }

    fn stylize(&self, request: &StylizeRequest, events: &EventWriter) -> Result<ImageBytes>;
}

#[derive(Default, Clone)]
pub struct StylizerRegistry {
    stylizers: BTreeMap<String, Arc<dyn Stylizer>>,
}

impl StylizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: Stylizer + 'static>(&mut self, stylizer: S) {
        self.stylizers
            .insert(stylizer.name().to_string(), Arc::new(stylizer));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Stylizer>> {
        self.stylizers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.stylizers.keys().cloned().collect()
    }
}

pub fn default_stylizer_registry(config: &ProcessorConfig) -> Result<StylizerRegistry> {
    let mut stylizers = StylizerRegistry::new();
    stylizers.register(StabilityStylizer::new(config)?);
    stylizers.register(ReplicateStylizer::new(config)?);
    stylizers.register(LocalStylizer::new(config.jpeg_quality));
    Ok(stylizers)
}
