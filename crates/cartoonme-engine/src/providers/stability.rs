use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cartoonme_contracts::events::EventWriter;
use cartoonme_contracts::params::{format_control_strength, OutputFormat};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::ACCEPT;
use serde_json::{json, Map, Value};

use super::{ImageBytes, StylizeRequest, Stylizer};
use crate::config::{ApiKey, ProcessorConfig};
use crate::imaging::sniff_mime_type;
use crate::util::{map_object, truncate_text};

const CONTROL_IMAGE_FILE_NAME: &str = "control_image.jpg";

/// Stability AI structure-control client. One multipart POST per attempt,
/// answered synchronously with a JSON body carrying a base64 image.
pub struct StabilityStylizer {
    endpoint: String,
    api_key: ApiKey,
    http: HttpClient,
}

impl StabilityStylizer {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None)
            .build()
            .context("failed to build Stability HTTP client")?;
        Ok(Self::with_client(config, http))
    }

    pub fn with_client(config: &ProcessorConfig, http: HttpClient) -> Self {
        Self {
            endpoint: config.structure_control_endpoint(),
            api_key: config.stability_api_key.clone(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Text fields plus the control image for a structure-control request.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureControlForm {
    pub prompt: String,
    pub control_strength: String,
    pub output_format: OutputFormat,
    pub negative_prompt: Option<String>,
    pub image: Vec<u8>,
}

impl StructureControlForm {
    pub fn from_request(request: &StylizeRequest) -> Self {
        let negative_prompt = Some(request.params.negative_prompt.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Self {
            prompt: request.prompt.clone(),
            control_strength: format_control_strength(request.control_strength),
            output_format: request.params.output_format,
            negative_prompt,
            image: request.image.jpeg.clone(),
        }
    }

    /// Field names in the order they are sent.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = vec!["prompt", "image", "control_strength", "output_format"];
        if self.negative_prompt.is_some() {
            names.push("negative_prompt");
        }
        names
    }

    /// Loggable view of the form; the image is summarized by size.
    pub fn manifest(&self) -> Map<String, Value> {
        let mut manifest = map_object(json!({
            "prompt": self.prompt,
            "image": {
                "file_name": CONTROL_IMAGE_FILE_NAME,
                "content_type": "image/jpeg",
                "bytes": self.image.len(),
            },
            "control_strength": self.control_strength,
            "output_format": self.output_format.as_str(),
        }));
        if let Some(negative_prompt) = &self.negative_prompt {
            manifest.insert(
                "negative_prompt".to_string(),
                Value::String(negative_prompt.clone()),
            );
        }
        manifest
    }

    pub fn into_multipart(self) -> Result<MultipartForm> {
        let image = MultipartPart::bytes(self.image)
            .file_name(CONTROL_IMAGE_FILE_NAME)
            .mime_str("image/jpeg")
            .context("invalid control image content type")?;
        let mut form = MultipartForm::new()
            .text("prompt", self.prompt)
            .part("image", image)
            .text("control_strength", self.control_strength)
            .text("output_format", self.output_format.as_str());
        if let Some(negative_prompt) = self.negative_prompt {
            form = form.text("negative_prompt", negative_prompt);
        }
        Ok(form)
    }
}

/// Interprets a structure-control response.
///
/// Only a 200 whose JSON object carries a decodable base64 `image` succeeds.
pub fn decode_structure_response(status: u16, body: &[u8]) -> Result<ImageBytes> {
    if status != 200 {
        let detail = serde_json::from_slice::<Value>(body)
            .ok()
            .filter(Value::is_object)
            .map(|payload| describe_api_error(&payload))
            .unwrap_or_else(|| truncate_text(&String::from_utf8_lossy(body), 512));
        bail!("Stability request failed ({status}): {detail}");
    }

    let payload: Value =
        serde_json::from_slice(body).context("Stability returned invalid JSON payload")?;
    let Some(object) = payload.as_object() else {
        bail!("Stability response is not a JSON object");
    };

    let decoded = object
        .get("image")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|encoded| BASE64.decode(encoded.as_bytes()).ok())
        .and_then(|bytes| sniff_mime_type(&bytes).map(|mime| (bytes, mime)));
    if let Some((bytes, mime)) = decoded {
        return Ok(ImageBytes {
            bytes,
            mime_type: Some(mime.to_string()),
        });
    }

    if let Some(reason) = object
        .get("finish_reason")
        .and_then(Value::as_str)
        .filter(|reason| *reason != "SUCCESS")
    {
        let errors = error_messages(&payload);
        if errors.is_empty() {
            bail!("Stability generation not successful (finish_reason {reason})");
        }
        bail!(
            "Stability generation not successful (finish_reason {reason}): {}",
            errors.join(", ")
        );
    }

    bail!(
        "Stability response missing decodable 'image' field: {}",
        truncate_text(&String::from_utf8_lossy(body), 512)
    );
}

fn describe_api_error(payload: &Value) -> String {
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Unknown Error");
    let message = error_messages(payload)
        .into_iter()
        .next()
        .unwrap_or_else(|| "No specific message.".to_string());
    format!("[{name}] {message}")
}

fn error_messages(payload: &Value) -> Vec<String> {
    payload
        .get("errors")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Stylizer for StabilityStylizer {
    fn name(&self) -> &str {
        "stability"
    }

    fn api_key(&self) -> Option<&ApiKey> {
        Some(&self.api_key)
    }

    fn stylize(&self, request: &StylizeRequest, events: &EventWriter) -> Result<ImageBytes> {
        let form = StructureControlForm::from_request(request);
        let mut payload = form.manifest();
        payload.insert(
            "endpoint".to_string(),
            Value::String(self.endpoint.clone()),
        );
        payload.insert(
            "theme".to_string(),
            Value::String(request.theme.clone()),
        );
        let _ = events.emit("stylize_request", payload);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.value())
            .header(ACCEPT, "application/json")
            .multipart(form.into_multipart()?)
            .send()
            .with_context(|| format!("Stability request failed ({})", self.endpoint))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .context("failed reading Stability response body")?;
        let _ = events.emit(
            "stylize_response",
            map_object(json!({
                "provider": "stability",
                "status": status,
                "bytes": body.len(),
            })),
        );
        decode_structure_response(status, &body)
    }
}
