//! GROBID extraction client.
//!
//! The PDF-to-structured-text step is delegated entirely to a GROBID server;
//! this module only moves bytes across that boundary and validates that the
//! response looks like TEI XML. No retries happen here — a failed extraction
//! surfaces to the caller with the collaborator and operation named, and
//! retry policy stays with the caller.

use std::time::Duration;

use crate::config::ExtractionConfig;

/// Extraction failure at the GROBID boundary.
#[derive(Debug)]
pub enum ExtractError {
    /// The server could not be reached or the request timed out.
    Unreachable(String),
    /// Non-2xx status from the server, with the leading response text.
    Status(u16, String),
    /// 2xx response whose body is empty or does not parse as XML.
    MalformedOutput(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Unreachable(e) => write!(f, "GROBID unreachable: {}", e),
            ExtractError::Status(code, body) => {
                write!(f, "GROBID processFulltextDocument failed: HTTP {}: {}", code, body)
            }
            ExtractError::MalformedOutput(reason) => {
                write!(f, "GROBID returned malformed output: {}", reason)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// HTTP client for a GROBID server.
pub struct GrobidClient {
    base_url: String,
    client: reqwest::Client,
}

impl GrobidClient {
    pub fn new(config: &ExtractionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.grobid_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Health check against `GET /api/isalive`.
    pub async fn is_alive(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/isalive", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Run full-text processing on one PDF and return the TEI XML body.
    pub async fn process_fulltext(
        &self,
        pdf_bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, ExtractError> {
        let part = reqwest::multipart::Part::bytes(pdf_bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| ExtractError::MalformedOutput(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("input", part);

        let resp = self
            .client
            .post(format!("{}/api/processFulltextDocument", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ExtractError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ExtractError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(ExtractError::Status(status.as_u16(), snippet));
        }

        validate_xml(&body)?;
        Ok(body)
    }
}

/// Cheap sanity check before handing the body to the TEI parser: non-empty
/// and starting with an XML declaration or element.
fn validate_xml(body: &str) -> Result<(), ExtractError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::MalformedOutput("empty body".to_string()));
    }
    if !trimmed.starts_with("<?xml") && !trimmed.starts_with('<') {
        let snippet: String = trimmed.chars().take(100).collect();
        return Err(ExtractError::MalformedOutput(format!(
            "body does not look like XML: {}",
            snippet
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_malformed() {
        assert!(matches!(
            validate_xml("   \n "),
            Err(ExtractError::MalformedOutput(_))
        ));
    }

    #[test]
    fn html_error_page_is_malformed() {
        // Leading non-tag text, e.g. a proxy error message.
        assert!(validate_xml("503 Service Unavailable").is_err());
    }

    #[test]
    fn tei_declaration_passes() {
        assert!(validate_xml("<?xml version=\"1.0\"?><TEI/>").is_ok());
        assert!(validate_xml("<TEI xmlns=\"http://www.tei-c.org/ns/1.0\"/>").is_ok());
    }

    #[test]
    fn errors_name_the_collaborator_and_operation() {
        let err = ExtractError::Status(500, "oops".to_string());
        let msg = err.to_string();
        assert!(msg.contains("GROBID"));
        assert!(msg.contains("processFulltextDocument"));
    }
}
