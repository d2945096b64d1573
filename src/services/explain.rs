//! Passage explanations from a Gemini `generateContent` model, paired with
//! related records found by similarity search.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::embedding::{Embedder, normalize_model};
use super::vector_store::VectorStore;
use crate::error::{AppError, GenerationError};
use crate::models::{ExplainConfig, ScoredRecord};

/// Default system instruction. A custom prompt replaces it entirely.
pub const SYSTEM_PROMPT: &str = "You are a helpful academic assistant. \
Your task is to explain the given text from a research paper.
Provide a clear, concise explanation that:
1. Summarizes the key points or concepts in the text
2. Explains any technical terms or jargon
3. Places the text in the broader context of the research field
4. Highlights the significance or implications of the content

Keep your explanation focused, accurate, and helpful for someone trying to understand this research.";

/// A passage to explain, with optional context.
#[derive(Debug, Clone, Default)]
pub struct ExplainRequest {
    pub selected_text: String,
    pub paper_title: String,
    pub search_query: Option<String>,
    pub custom_prompt: Option<String>,
}

impl ExplainRequest {
    pub fn new(selected_text: impl Into<String>) -> Self {
        Self {
            selected_text: selected_text.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.paper_title = title.into();
        self
    }

    pub fn with_search_query(mut self, query: Option<String>) -> Self {
        self.search_query = query;
        self
    }

    pub fn with_custom_prompt(mut self, prompt: Option<String>) -> Self {
        self.custom_prompt = prompt;
        self
    }

    /// Text used to find related records: the search query if set, else the passage.
    pub fn search_text(&self) -> &str {
        self.search_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(self.selected_text.as_str())
    }

    fn custom_prompt(&self) -> Option<&str> {
        self.custom_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }

    pub fn system_prompt(&self) -> &str {
        self.custom_prompt().unwrap_or(SYSTEM_PROMPT)
    }

    pub fn user_prompt(&self) -> String {
        let mut prompt = format!(
            "The following text is from a research paper titled '{}':\n\n{}",
            self.paper_title, self.selected_text
        );
        if self.custom_prompt().is_none() {
            prompt.push_str("\n\nPlease explain this text.");
        }
        prompt
    }
}

#[async_trait]
pub trait Explainer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn explain(&self, request: &ExplainRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiExplainer {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiExplainer {
    pub fn new(config: &ExplainConfig, api_key: Option<&str>) -> Result<Self, GenerationError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::MissingApiKey(
                    "set GEMINI_API_KEY or embedding.api_key".to_string(),
                )
            })?
            .to_string();

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerationError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: normalize_model(&config.model),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl Explainer for GeminiExplainer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn explain(&self, request: &ExplainRequest) -> Result<String, GenerationError> {
        if request.selected_text.trim().is_empty() {
            return Err(GenerationError::EmptyInput);
        }

        let user_prompt = request.user_prompt();
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: request.system_prompt(),
                }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: &user_prompt }],
            }],
        };

        debug!(model = %self.model, "requesting explanation");
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let body = response.text().await.map_err(map_send_error)?;
        parse_generation(&body)
    }
}

fn map_send_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else if e.is_connect() {
        GenerationError::ConnectionError(e.to_string())
    } else {
        GenerationError::RequestError(e)
    }
}

/// Concatenated text parts of the first candidate.
fn parse_generation(body: &str) -> Result<String, GenerationError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

/// An explanation together with the records most similar to the search text.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub model: String,
    pub explanation: String,
    pub related: Vec<ScoredRecord>,
}

/// Explain a passage and find related records concurrently.
///
/// Either half failing fails the whole analysis.
pub async fn analyze(
    explainer: &dyn Explainer,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    request: &ExplainRequest,
    limit: u64,
) -> Result<Analysis, AppError> {
    if request.selected_text.trim().is_empty() {
        return Err(GenerationError::EmptyInput.into());
    }

    let related = async {
        let vector = embedder.embed_query(request.search_text()).await?;
        Ok::<_, AppError>(store.search(vector, limit, None).await?)
    };
    let (explanation, related) = tokio::join!(explainer.explain(request), related);
    let explanation = explanation?;
    let related = related?;

    info!(
        model = explainer.model_name(),
        related = related.len(),
        "passage explained"
    );
    Ok(Analysis {
        model: explainer.model_name().to_string(),
        explanation,
        related,
    })
}
