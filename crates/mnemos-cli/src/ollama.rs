//! Ollama discovery: lists locally pulled models via `/api/tags`.

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("Ollama unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Ollama returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to parse Ollama response: {0}")]
    Parse(#[source] reqwest::Error),
}

/// A single model entry returned by `/api/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

fn tags_url(base_url: &str) -> String {
    format!("{}/api/tags", base_url.trim_end_matches('/'))
}

/// Ask the Ollama server at `base_url` which models it has.
pub fn fetch_models(base_url: &str) -> Result<Vec<OllamaModel>, OllamaError> {
    let url = tags_url(base_url);
    let response = reqwest::blocking::get(&url)
        .map_err(|source| OllamaError::Unreachable { url, source })?;

    if !response.status().is_success() {
        return Err(OllamaError::Status(response.status()));
    }

    let tags: TagsResponse = response.json().map_err(OllamaError::Parse)?;
    Ok(tags.models)
}
