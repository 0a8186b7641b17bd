use std::env;
use std::fmt;
use std::time::Duration;

pub const MAX_PIXEL_COUNT: u64 = 4 * 1024 * 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const FALLBACK_API_KEY: &str = "YOUR_FALLBACK_API_KEY";

pub const DEFAULT_STABILITY_API_BASE: &str = "https://api.stability.ai";
pub const STRUCTURE_CONTROL_PATH: &str = "v2beta/stable-image/control/structure";
pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_REPLICATE_MODEL: &str = "catacolabs/cartoonify";

const DEFAULT_POLL_INTERVAL_S: f64 = 1.0;

/// A bearer token plus where it came from.
///
/// Missing keys are replaced by [`FALLBACK_API_KEY`] rather than rejected up
/// front. The placeholder fails remotely, and the processor logs a warning
/// whenever it is about to be sent.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    value: String,
    source: Option<&'static str>,
}

impl ApiKey {
    pub fn new(value: impl Into<String>, source: &'static str) -> Self {
        Self {
            value: value.into(),
            source: Some(source),
        }
    }

    pub fn placeholder() -> Self {
        Self {
            value: FALLBACK_API_KEY.to_string(),
            source: None,
        }
    }

    fn resolve(lookup: &impl Fn(&str) -> Option<String>, names: &[&'static str]) -> Self {
        names
            .iter()
            .copied()
            .find_map(|name| lookup(name).map(|value| Self::new(value, name)))
            .unwrap_or_else(Self::placeholder)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> Option<&'static str> {
        self.source
    }

    pub fn is_fallback(&self) -> bool {
        self.source.is_none()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    /// `None` polls until the prediction reaches a terminal status.
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_S),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub stability_api_base: String,
    pub stability_api_key: ApiKey,
    pub replicate_api_base: String,
    pub replicate_api_key: ApiKey,
    pub replicate_model: String,
    pub max_pixel_count: u64,
    pub jpeg_quality: u8,
    pub poll: PollSettings,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            stability_api_base: DEFAULT_STABILITY_API_BASE.to_string(),
            stability_api_key: ApiKey::placeholder(),
            replicate_api_base: DEFAULT_REPLICATE_API_BASE.to_string(),
            replicate_api_key: ApiKey::placeholder(),
            replicate_model: DEFAULT_REPLICATE_MODEL.to_string(),
            max_pixel_count: MAX_PIXEL_COUNT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            poll: PollSettings::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds a config from any key/value source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let poll_interval = lookup("CARTOONME_POLL_INTERVAL")
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .map(|value| Duration::from_secs_f64(value.clamp(0.2, 5.0)))
            .unwrap_or(defaults.poll.interval);
        let poll_timeout = lookup("CARTOONME_POLL_TIMEOUT")
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .map(Duration::from_secs_f64);

        Self {
            stability_api_base: lookup("STABILITY_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.stability_api_base),
            stability_api_key: ApiKey::resolve(&lookup, &["STABILITY_API_KEY"]),
            replicate_api_base: lookup("REPLICATE_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.replicate_api_base),
            replicate_api_key: ApiKey::resolve(
                &lookup,
                &["REPLICATE_API_TOKEN", "REPLICATE_API_KEY"],
            ),
            replicate_model: lookup("REPLICATE_MODEL").unwrap_or(defaults.replicate_model),
            max_pixel_count: lookup("CARTOONME_MAX_PIXELS")
                .and_then(|raw| raw.parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_pixel_count),
            jpeg_quality: lookup("CARTOONME_JPEG_QUALITY")
                .and_then(|raw| raw.parse::<u8>().ok())
                .map(|value| value.clamp(1, 100))
                .unwrap_or(defaults.jpeg_quality),
            poll: PollSettings {
                interval: poll_interval,
                timeout: poll_timeout,
            },
        }
    }

    pub fn structure_control_endpoint(&self) -> String {
        format!("{}/{}", self.stability_api_base, STRUCTURE_CONTROL_PATH)
    }

    pub fn predictions_endpoint(&self) -> String {
        format!("{}/predictions", self.replicate_api_base)
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
