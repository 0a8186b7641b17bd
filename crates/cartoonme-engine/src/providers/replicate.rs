use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cartoonme_contracts::events::EventWriter;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};

use super::{ImageBytes, StylizeRequest, Stylizer};
use crate::config::{ApiKey, PollSettings, ProcessorConfig};
use crate::util::{json_body, map_object, truncate_text};

/// Replicate prediction client: submit, then poll the prediction until it
/// settles and download the first output.
pub struct ReplicateStylizer {
    predictions_endpoint: String,
    api_key: ApiKey,
    model: String,
    poll: PollSettings,
    http: HttpClient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionState {
    Succeeded,
    Failed,
    Pending(String),
}

/// Only `succeeded` and `failed` end polling; every other status keeps it going.
pub fn classify_status(status: &str) -> PredictionState {
    let normalized = status.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "succeeded" => PredictionState::Succeeded,
        "failed" => PredictionState::Failed,
        _ => PredictionState::Pending(normalized),
    }
}

fn prediction_status(payload: &Value) -> String {
    payload
        .get("status")
        .and_then(Value::as_str)
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn failure_detail(payload: &Value) -> String {
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| truncate_text(&payload.to_string(), 512))
}

/// Re-fetches the prediction every `settings.interval` until it reaches a
/// terminal status. With no timeout configured this never gives up on a
/// prediction that stays pending.
pub fn poll_until_terminal<F, S, O>(
    mut fetch: F,
    mut sleep: S,
    mut on_poll: O,
    settings: PollSettings,
) -> Result<Value>
where
    F: FnMut() -> Result<Value>,
    S: FnMut(Duration),
    O: FnMut(u64, &str) -> Result<()>,
{
    let started = Instant::now();
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        let payload = fetch()?;
        let status = prediction_status(&payload);
        on_poll(attempt, &status)?;
        match classify_status(&status) {
            PredictionState::Succeeded => return Ok(payload),
            PredictionState::Failed => {
                bail!("Replicate prediction failed: {}", failure_detail(&payload))
            }
            PredictionState::Pending(_) => {}
        }
        if let Some(timeout) = settings.timeout {
            if started.elapsed() >= timeout {
                bail!(
                    "Replicate polling timed out after {:.1}s (last status '{status}')",
                    timeout.as_secs_f64()
                );
            }
        }
        sleep(settings.interval);
    }
}

fn model_field(model: &str) -> &'static str {
    if model.contains('/') && !model.contains(':') {
        "model"
    } else {
        "version"
    }
}

pub fn build_prediction_payload(model: &str, request: &StylizeRequest) -> Value {
    let image_url = format!("data:image/jpeg;base64,{}", BASE64.encode(&request.image.jpeg));
    let mut input = map_object(json!({
        "image": image_url,
        "prompt": request.prompt,
        "control_strength": (request.control_strength * 100.0).round() / 100.0,
        "output_format": request.params.output_format.as_str(),
    }));
    let negative_prompt = request.params.negative_prompt.trim();
    if !negative_prompt.is_empty() {
        input.insert(
            "negative_prompt".to_string(),
            Value::String(negative_prompt.to_string()),
        );
    }
    let mut payload = Map::new();
    payload.insert(
        model_field(model).to_string(),
        Value::String(model.trim().to_string()),
    );
    payload.insert("input".to_string(), Value::Object(input));
    Value::Object(payload)
}

/// First `http(s)` URL in `output`, which is either one URL or a list of them.
pub fn first_output_url(prediction: &Value) -> Option<String> {
    let candidates: Vec<&Value> = match prediction.get("output")? {
        Value::Array(rows) => rows.iter().collect(),
        single => vec![single],
    };
    candidates
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|url| url.starts_with("http"))
        .map(str::to_string)
}

impl ReplicateStylizer {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None)
            .build()
            .context("failed to build Replicate HTTP client")?;
        Ok(Self::with_client(config, http))
    }

    pub fn with_client(config: &ProcessorConfig, http: HttpClient) -> Self {
        Self {
            predictions_endpoint: config.predictions_endpoint(),
            api_key: config.replicate_api_key.clone(),
            model: config.replicate_model.clone(),
            poll: config.poll,
            http,
        }
    }

    fn poll_url(&self, prediction: &Value) -> Result<String> {
        if let Some(url) = prediction
            .get("urls")
            .and_then(Value::as_object)
            .and_then(|obj| obj.get("get"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Ok(url.to_string());
        }
        let id = prediction
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Replicate prediction missing id and poll URL"))?;
        Ok(format!("{}/{id}", self.predictions_endpoint))
    }

    fn fetch_prediction(&self, poll_url: &str) -> Result<Value> {
        let response = self
            .http
            .get(poll_url)
            .bearer_auth(self.api_key.value())
            .send()
            .with_context(|| format!("Replicate poll request failed ({poll_url})"))?;
        json_body("Replicate poll", response)
    }

    fn download_image(&self, url: &str) -> Result<ImageBytes> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("failed downloading Replicate output ({url})"))?;
        let status = response.status();
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .context("failed reading Replicate output bytes")?;
        if !status.is_success() {
            bail!(
                "Replicate output download failed ({}): {}",
                status.as_u16(),
                truncate_text(&String::from_utf8_lossy(&body), 512)
            );
        }
        Ok(ImageBytes {
            bytes: body.to_vec(),
            mime_type,
        })
    }
}

impl Stylizer for ReplicateStylizer {
    fn name(&self) -> &str {
        "replicate"
    }

    fn api_key(&self) -> Option<&ApiKey> {
        Some(&self.api_key)
    }

    fn stylize(&self, request: &StylizeRequest, events: &EventWriter) -> Result<ImageBytes> {
        let endpoint = &self.predictions_endpoint;
        let payload = build_prediction_payload(&self.model, request);
        let _ = events.emit(
            "stylize_request",
            map_object(json!({
                "endpoint": endpoint,
                "theme": request.theme,
                "model": self.model,
                "prompt": request.prompt,
                "negative_prompt": payload["input"].get("negative_prompt"),
                "control_strength": payload["input"]["control_strength"],
                "output_format": request.params.output_format.as_str(),
                "image_bytes": request.image.jpeg.len(),
            })),
        );

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(self.api_key.value())
            .json(&payload)
            .send()
            .with_context(|| format!("Replicate request failed ({endpoint})"))?;
        let submitted = json_body("Replicate", response)?;
        let prediction_id = submitted
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let prediction = match classify_status(&prediction_status(&submitted)) {
            PredictionState::Succeeded => submitted,
            PredictionState::Failed => {
                bail!("Replicate prediction failed: {}", failure_detail(&submitted))
            }
            PredictionState::Pending(_) => {
                let poll_url = self.poll_url(&submitted)?;
                poll_until_terminal(
                    || self.fetch_prediction(&poll_url),
                    thread::sleep,
                    |attempt, status| {
                        let _ = events.emit(
                            "prediction_polled",
                            map_object(json!({
                                "prediction_id": prediction_id,
                                "attempt": attempt,
                                "status": status,
                            })),
                        );
                        Ok(())
                    },
                    self.poll,
                )?
            }
        };

        let url = first_output_url(&prediction)
            .ok_or_else(|| anyhow::anyhow!("Replicate prediction returned no output URL"))?;
        self.download_image(&url)
    }
}
