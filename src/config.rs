use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// GROBID collaborator settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_grobid_url")]
    pub grobid_url: String,
    /// Full-text processing of a large thesis can be slow; default 300s.
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            grobid_url: default_grobid_url(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

fn default_grobid_url() -> String {
    "http://localhost:8070".to_string()
}
fn default_extraction_timeout() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_chars: default_chunk_size(),
            overlap_chars: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}

/// Section classifier tuning.
///
/// The acceptance threshold and body-preview confidence are inherited
/// defaults without a documented derivation; they are exposed here rather
/// than hard-coded so they can be calibrated against a labeled heading set
/// without a redeploy.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    #[serde(default = "default_body_confidence")]
    pub body_confidence: f64,
    #[serde(default = "default_body_preview_chars")]
    pub body_preview_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            accept_threshold: default_accept_threshold(),
            body_confidence: default_body_confidence(),
            body_preview_chars: default_body_preview_chars(),
        }
    }
}

fn default_accept_threshold() -> f64 {
    0.6
}
fn default_body_confidence() -> f64 {
    0.7
}
fn default_body_preview_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// ANN candidates fetched per requested result. Filtering discards most
    /// candidates, so this must stay comfortably above 1; values of 5–10
    /// work well in this domain. A too-small factor can return fewer than
    /// `top_k` hits even when matches exist deeper in the ranking — that is
    /// an accepted degradation, not a bug.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: default_overfetch_factor(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_overfetch_factor() -> usize {
    10
}
fn default_final_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size_chars == 0 {
        anyhow::bail!("chunking.chunk_size_chars must be > 0");
    }

    if !(0.0..=1.0).contains(&config.classifier.accept_threshold) {
        anyhow::bail!("classifier.accept_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.classifier.body_confidence) {
        anyhow::bail!("classifier.body_confidence must be in [0.0, 1.0]");
    }

    if config.retrieval.overfetch_factor < 1 {
        anyhow::bail!("retrieval.overfetch_factor must be >= 1");
    }
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let f = write_config("[db]\npath = \"/tmp/t.sqlite\"\n");
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.chunking.chunk_size_chars, 512);
        assert_eq!(cfg.chunking.overlap_chars, 50);
        assert_eq!(cfg.classifier.accept_threshold, 0.6);
        assert_eq!(cfg.retrieval.overfetch_factor, 10);
        assert_eq!(cfg.extraction.grobid_url, "http://localhost:8070");
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let f = write_config("[db]\npath = \"/tmp/t.sqlite\"\n[chunking]\nchunk_size_chars = 0\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let f = write_config(
            "[db]\npath = \"/tmp/t.sqlite\"\n[classifier]\naccept_threshold = 1.5\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let f = write_config("[db]\npath = \"/tmp/t.sqlite\"\n[embedding]\nprovider = \"ollama\"\n");
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let f = write_config(
            "[db]\npath = \"/tmp/t.sqlite\"\n[embedding]\nprovider = \"sbert\"\nmodel = \"m\"\ndims = 384\n",
        );
        assert!(load_config(f.path()).is_err());
    }
}
