use anyhow::{bail, Context, Result};
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

/// Reads a JSON body, turning non-2xx statuses into errors labelled `label`.
pub(crate) fn json_body(label: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{label} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{label} request failed ({}): {}",
            status.as_u16(),
            truncate_text(&body, 512)
        );
    }
    serde_json::from_str(&body).with_context(|| format!("{label} returned invalid JSON payload"))
}

/// Flattens an error and its causes into one line for event logs.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for text in err.chain().map(|cause| cause.to_string()) {
        let text = text.trim();
        if text.is_empty() || parts.last().is_some_and(|last| last == text) {
            continue;
        }
        parts.push(text.to_string());
    }
    let joined = if parts.is_empty() {
        err.to_string()
    } else {
        parts.join(" | caused by: ")
    };
    truncate_text(&joined, max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &value[..cut]),
        None => value.to_string(),
    }
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_json::json;

    use super::{error_chain_text, map_object, truncate_text};

    #[test]
    fn error_chain_text_preserves_nested_contexts() {
        let Err(err) = std::fs::read("/definitely/not/here.jpg")
            .context("failed reading source image")
            .context("stylization failed")
        else {
            panic!("expected an error");
        };
        let text = error_chain_text(&err, 2048);
        assert!(text.starts_with("stylization failed | caused by: failed reading source image"));
    }

    #[test]
    fn error_chain_text_skips_repeated_messages() {
        let err = anyhow::anyhow!("boom").context("boom").context("outer");
        assert_eq!(error_chain_text(&err, 256), "outer | caused by: boom");
    }

    #[test]
    fn truncate_text_counts_characters() {
        assert_eq!(truncate_text("héllo", 10), "héllo");
        assert_eq!(truncate_text("héllo", 2), "hé…");
    }

    #[test]
    fn map_object_drops_non_objects() {
        assert!(map_object(json!([1, 2])).is_empty());
        assert_eq!(map_object(json!({"a": 1})).len(), 1);
    }
}
