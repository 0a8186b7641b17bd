use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use cartoonme_contracts::events::{EventPayload, EventWriter};
use cartoonme_contracts::params::{
    default_theme_parameters, effective_control_strength, format_control_strength,
    lookup_theme_parameters,
};
use cartoonme_contracts::prompts::{compose_prompt, Subject};
use image::{DynamicImage, GenericImageView};
use serde_json::{json, Value};

use crate::config::ProcessorConfig;
use crate::detect::PersonDetector;
use crate::imaging::{decode_image, prepare_image, sniff_mime_type};
use crate::providers::{default_stylizer_registry, StylizeRequest, Stylizer, StylizerRegistry};
use crate::util::{error_chain_text, map_object};

/// The one message shown to the user for every kind of failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to process the image. Please try again.";

pub const DEFAULT_PROVIDER: &str = "stability";

#[derive(Debug, Clone)]
pub struct StylizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub provider: String,
    pub theme: String,
    pub subject: Option<Subject>,
}

impl StylizedImage {
    pub fn extension(&self) -> &'static str {
        let lowered = self.mime_type.to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            return "jpg";
        }
        if lowered.contains("webp") {
            return "webp";
        }
        "png"
    }
}

/// Allows one stylization at a time per processor and its clones.
#[derive(Debug, Clone, Default)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
}

pub struct InFlightTicket {
    busy: Arc<AtomicBool>,
}

impl InFlightGuard {
    pub fn try_acquire(&self) -> Option<InFlightTicket> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightTicket {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Turns a photo plus a theme name into a stylized image.
///
/// Clones share the stylizers, the detector, the event log and the
/// in-flight guard.
#[derive(Clone)]
pub struct ImageProcessor {
    config: ProcessorConfig,
    stylizers: StylizerRegistry,
    provider: String,
    detector: Option<Arc<dyn PersonDetector>>,
    events: EventWriter,
    in_flight: InFlightGuard,
}

impl ImageProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        let stylizers = default_stylizer_registry(&config)?;
        Ok(Self::with_registry(config, stylizers))
    }

    pub fn with_registry(config: ProcessorConfig, stylizers: StylizerRegistry) -> Self {
        Self {
            config,
            stylizers,
            provider: DEFAULT_PROVIDER.to_string(),
            detector: None,
            events: EventWriter::disabled(new_run_id()),
            in_flight: InFlightGuard::default(),
        }
    }

    pub fn with_provider(mut self, name: &str) -> Result<Self> {
        let name = name.trim().to_ascii_lowercase();
        if self.stylizers.get(&name).is_none() {
            bail!(
                "unknown provider '{name}' (available: {})",
                self.stylizers.names().join(", ")
            );
        }
        self.provider = name;
        Ok(self)
    }

    pub fn with_stylizer<S: Stylizer + 'static>(mut self, stylizer: S) -> Self {
        self.stylizers.register(stylizer);
        self
    }

    pub fn with_detector<D: PersonDetector + 'static>(mut self, detector: D) -> Self {
        self.detector = Some(Arc::new(detector));
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_busy()
    }

    /// Runs one stylization and collapses every failure to `None` after
    /// logging it.
    pub fn cartoonify(
        &self,
        image_bytes: &[u8],
        theme: &str,
        strength_override: Option<f64>,
    ) -> Option<StylizedImage> {
        match self.try_cartoonify(image_bytes, theme, strength_override) {
            Ok(result) => Some(result),
            Err(err) => {
                self.log(
                    "stylize_failed",
                    map_object(json!({
                        "theme": theme,
                        "provider": self.provider,
                        "error": error_chain_text(&err, 2048),
                    })),
                );
                None
            }
        }
    }

    /// Runs [`ImageProcessor::cartoonify`] on a worker thread and hands the
    /// result to `on_done` there.
    pub fn cartoonify_in_background<F>(
        &self,
        image_bytes: Vec<u8>,
        theme: String,
        strength_override: Option<f64>,
        on_done: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Option<StylizedImage>) + Send + 'static,
    {
        let processor = self.clone();
        thread::spawn(move || {
            let result = processor.cartoonify(&image_bytes, &theme, strength_override);
            on_done(result);
        })
    }

    pub fn try_cartoonify(
        &self,
        image_bytes: &[u8],
        theme: &str,
        strength_override: Option<f64>,
    ) -> Result<StylizedImage> {
        let Some(_ticket) = self.in_flight.try_acquire() else {
            bail!("a stylization request is already in flight");
        };
        let stylizer = self
            .stylizers
            .get(&self.provider)
            .with_context(|| format!("provider '{}' is not registered", self.provider))?;

        self.log(
            "stylize_started",
            map_object(json!({
                "theme": theme,
                "provider": self.provider,
                "source_bytes": image_bytes.len(),
                "strength_override": strength_override,
            })),
        );
        if let Some(key) = stylizer.api_key().filter(|key| key.is_fallback()) {
            self.log(
                "api_key_fallback",
                map_object(json!({
                    "provider": stylizer.name(),
                    "message": format!(
                        "No API key configured for {}; sending placeholder '{}'.",
                        stylizer.name(),
                        key.value()
                    ),
                })),
            );
        }

        let source = decode_image(image_bytes).context("source image is invalid")?;
        let subject = self.detect_subject(&source);
        let image = prepare_image(&source, self.config.max_pixel_count, self.config.jpeg_quality)
            .context("failed preparing upload")?;

        let params = match lookup_theme_parameters(theme) {
            Some(params) => params,
            None => {
                self.log(
                    "theme_fallback",
                    map_object(json!({
                        "theme": theme,
                        "message": format!(
                            "Theme '{theme}' not explicitly defined; using default cartoon parameters."
                        ),
                    })),
                );
                default_theme_parameters()
            }
        };
        let control_strength = effective_control_strength(&params, strength_override);
        let prompt = compose_prompt(subject, &params);
        let request = StylizeRequest {
            theme: theme.to_string(),
            prompt,
            params,
            control_strength,
            subject,
            image,
        };

        let output = stylizer.stylize(&request, &self.events)?;
        let decoded =
            decode_image(&output.bytes).context("stylized image bytes could not be decoded")?;
        let (width, height) = decoded.dimensions();
        let mime_type = sniff_mime_type(&output.bytes)
            .map(str::to_string)
            .or(output.mime_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        self.log(
            "stylize_succeeded",
            map_object(json!({
                "theme": theme,
                "provider": stylizer.name(),
                "subject": subject.map(|subject| subject.as_str()),
                "control_strength": format_control_strength(control_strength),
                "width": width,
                "height": height,
                "mime_type": mime_type,
                "bytes": output.bytes.len(),
            })),
        );

        Ok(StylizedImage {
            bytes: output.bytes,
            mime_type,
            width,
            height,
            provider: stylizer.name().to_string(),
            theme: theme.to_string(),
            subject,
        })
    }

    /// Detector failures count as "no person", matching a negative detection.
    fn detect_subject(&self, image: &DynamicImage) -> Option<Subject> {
        let detector = self.detector.as_ref()?;
        let mut payload = EventPayload::new();
        let present = match detector.detect(image) {
            Ok(present) => present,
            Err(err) => {
                payload.insert(
                    "error".to_string(),
                    Value::String(error_chain_text(&err, 512)),
                );
                false
            }
        };
        let subject = Subject::from_detection(present);
        payload.insert("person_present".to_string(), Value::Bool(present));
        payload.insert(
            "subject".to_string(),
            Value::String(subject.as_str().to_string()),
        );
        self.log("person_detection", payload);
        Some(subject)
    }

    /// Event log writes never decide the outcome of a stylization.
    fn log(&self, event_type: &str, payload: EventPayload) {
        let _ = self.events.emit(event_type, payload);
    }
}

/// Fresh id for one processor's event log.
pub fn new_run_id() -> String {
    format!("cartoonme-{}", uuid::Uuid::new_v4().simple())
}
