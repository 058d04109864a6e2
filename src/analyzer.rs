//! DeepSeek API client for multi-step document analysis.
//!
//! The analysis runs as six fixed steps (structure, claims, evidence,
//! critique, context, final summary), one chat-completions request per
//! step, and returns a `step1..step6 -> text` mapping. The step output
//! is free-form markdown-ish text; no schema is enforced.
//!
//! No retries and no partial results: the first failing step fails the
//! whole analysis.

use crate::error::{Error, Result};
use crate::text;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document text beyond this is cut (at a UTF-8 boundary) before it is
/// sent upstream, to stay inside the model context window.
const MAX_DOC_BYTES: usize = 60_000;

const MAX_TOKENS: u32 = 1500;

/// The fixed analysis sequence. Labels are the keys of the result map.
const ANALYSIS_STEPS: [(&str, &str); 6] = [
    ("step1", "Describe the structure of this document: its type, main sections, and how the argument is organized."),
    ("step2", "List the key claims and findings of this document, one per line."),
    ("step3", "Summarize the evidence and data the document uses to support its claims, and note claims that lack support."),
    ("step4", "Critically assess the document: weaknesses, gaps, questionable assumptions, and possible counterarguments."),
    ("step5", "Place the document in context: what field it belongs to, what prior work or debates it relates to, and who the intended audience is."),
    ("step6", "Give a final overall summary of the document in a few paragraphs, including a one-sentence verdict on its quality."),
];

/// Capability interface for the external analysis service, so the
/// server can swap in a stub for tests.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Run the full analysis over `text`, returning step label -> text.
    async fn analyze(&self, text: &str) -> Result<BTreeMap<String, String>>;
}

/// Chat API message format (OpenAI-compatible, used by DeepSeek)
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// DeepSeek-backed analyzer over the OpenAI-compatible
/// `/chat/completions` endpoint.
pub struct DeepSeekAnalyzer {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl DeepSeekAnalyzer {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_url,
            model,
        }
    }

    async fn run_step(&self, instruction: &str, document: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: 0.3,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You analyze documents. Answer in the language of the document. Be specific and concise.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("{}\n\nDOCUMENT:\n{}", instruction, document),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Analysis(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Analysis(format!("API error {}: {}", status, body)));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Analysis(format!("failed to parse response: {}", e)))?;

        extract_content(api_response)
    }
}

#[async_trait]
impl Analyzer for DeepSeekAnalyzer {
    async fn analyze(&self, text: &str) -> Result<BTreeMap<String, String>> {
        if text.trim().is_empty() {
            return Err(Error::Analysis("no text to analyze".to_string()));
        }

        let document = text::safe_truncate(text, MAX_DOC_BYTES);
        let mut results = BTreeMap::new();

        for (label, instruction) in ANALYSIS_STEPS {
            println!("[Analyze] Running {} ({} bytes of text)", label, document.len());
            let answer = self.run_step(instruction, document).await?;
            results.insert(label.to_string(), answer);
        }

        Ok(results)
    }
}

fn extract_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| Error::Analysis("empty response from API".to_string()))
}
