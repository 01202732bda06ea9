//! Personal shopper backed by the Gemini `generateContent` API.
//!
//! The model is given the store persona, the catalog (id, name, and
//! description only), and the visitor's request, and must answer with
//! `{"productIds": [..]}`. Suggested ids are resolved against the catalog.

use std::sync::Arc;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use naxstore_core::{Product, ProductId};

use crate::config::GeminiConfig;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const SHOPPER_PROMPT: &str = "\
You are a witty and helpful AI personal shopper for 'NaxStore', a modern, space-themed apparel and accessories store.
Your goal is to help users find the perfect products based on their descriptions.
Analyze the user's request and compare it against the provided list of available products.
You must respond ONLY with a JSON object that strictly follows the provided schema.
The 'productIds' array should contain the IDs of the products that are the best match for the user's request.
Return an empty array if no products are a good match.
Do not include any other text, explanations, or introductory phrases in your response.";

/// Errors that can occur when asking the shopper model for suggestions.
#[derive(Debug, Error)]
pub enum ShopperError {
    /// No model API key is configured.
    #[error("personal shopper is not configured")]
    NotConfigured,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The model API returned an error.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the model API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The response or its JSON payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The model returned no text.
    #[error("empty response")]
    EmptyResponse,
}

impl ShopperError {
    /// Message shown to the visitor for any shopper failure.
    pub const CLIENT_MESSAGE: &'static str =
        "Sorry, I had trouble finding suggestions. Please try again.";
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Suggestion {
    #[serde(default)]
    product_ids: Vec<i64>,
}

#[derive(Serialize)]
struct CatalogEntry<'a> {
    id: ProductId,
    name: &'a str,
    description: &'a str,
}

fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "productIds": {
                "type": "ARRAY",
                "items": { "type": "INTEGER" }
            }
        },
        "required": ["productIds"]
    })
}

/// Full prompt for `query` over `catalog`.
///
/// # Errors
///
/// Returns `ShopperError::Parse` if the catalog cannot be serialized.
fn build_prompt(catalog: &[Product], query: &str) -> Result<String, ShopperError> {
    let entries: Vec<CatalogEntry<'_>> = catalog
        .iter()
        .map(|p| CatalogEntry {
            id: p.id,
            name: &p.name,
            description: &p.description,
        })
        .collect();
    let catalog_json =
        serde_json::to_string(&entries).map_err(|e| ShopperError::Parse(e.to_string()))?;
    Ok(format!(
        "{SHOPPER_PROMPT}\nAvailable products:\n{catalog_json}\n\nUser's request: \"{query}\""
    ))
}

/// Extract suggested product ids from a `generateContent` response body.
fn parse_suggestion(body: &str) -> Result<Vec<ProductId>, ShopperError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ShopperError::Parse(format!("Failed to parse response: {e}")))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(ShopperError::EmptyResponse);
    }

    let suggestion: Suggestion = serde_json::from_str(text)
        .map_err(|e| ShopperError::Parse(format!("Model did not return JSON: {e}")))?;
    Ok(suggestion.product_ids.into_iter().map(ProductId::new).collect())
}

/// Catalog products whose ids were suggested, in catalog order.
#[must_use]
pub fn pick_suggested(catalog: &[Product], ids: &[ProductId]) -> Vec<Product> {
    catalog
        .iter()
        .filter(|p| ids.contains(&p.id))
        .cloned()
        .collect()
}

/// Client for the shopper model.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct ShopperClient {
    inner: Arc<ShopperClientInner>,
}

struct ShopperClientInner {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl ShopperClient {
    #[must_use]
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            inner: Arc::new(ShopperClientInner {
                client: reqwest::Client::new(),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
            }),
        }
    }

    /// Suggest products from `catalog` matching `query`.
    ///
    /// A blank query yields no suggestions without calling the model.
    ///
    /// # Errors
    ///
    /// Returns `ShopperError` if the call fails or the answer cannot be parsed.
    #[instrument(skip(self, catalog, query), fields(model = %self.inner.model, catalog_len = catalog.len()))]
    pub async fn suggest(
        &self,
        catalog: &[Product],
        query: &str,
    ) -> Result<Vec<Product>, ShopperError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(build_prompt(catalog, query)?),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        let url = format!("{GEMINI_API_URL}/{}:generateContent", self.inner.model);
        let response = self
            .inner
            .client
            .post(url)
            .header("x-goog-api-key", self.inner.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(ShopperError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            return Err(ShopperError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let ids = parse_suggestion(&body)?;
        let picked = pick_suggested(catalog, &ids);
        tracing::info!(suggested = ids.len(), matched = picked.len(), "Shopper suggestions");
        Ok(picked)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::product;

    fn response_with_text(text: &str) -> String {
        serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }], "role": "model" },
                "finishReason": "STOP"
            }]
        })
        .to_string()
    }

    #[test]
    fn test_parse_suggestion() {
        let ids = parse_suggestion(&response_with_text(" {\"productIds\": [3, 1]} ")).unwrap();
        assert_eq!(ids, vec![ProductId::new(3), ProductId::new(1)]);
    }

    #[test]
    fn test_parse_missing_ids_is_empty() {
        let ids = parse_suggestion(&response_with_text("{}")).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(matches!(
            parse_suggestion(r#"{"candidates": []}"#),
            Err(ShopperError::EmptyResponse)
        ));
        assert!(matches!(
            parse_suggestion(&response_with_text("Here are some hoodies!")),
            Err(ShopperError::Parse(_))
        ));
        assert!(matches!(
            parse_suggestion("<html>"),
            Err(ShopperError::Parse(_))
        ));
    }

    #[test]
    fn test_pick_suggested_keeps_catalog_order() {
        let catalog = vec![
            product(1, "Nebula Hoodie", 60),
            product(2, "Comet Cap", 25),
            product(3, "Star Map", 15),
        ];
        let picked = pick_suggested(
            &catalog,
            &[ProductId::new(3), ProductId::new(99), ProductId::new(1)],
        );
        let names: Vec<_> = picked.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Nebula Hoodie", "Star Map"]);
    }

    #[test]
    fn test_prompt_lists_only_public_fields() {
        let catalog = vec![product(1, "Nebula Hoodie", 60)];
        let prompt = build_prompt(&catalog, "something warm").unwrap();
        assert!(prompt.starts_with("You are a witty"));
        assert!(prompt.contains(r#"[{"id":1,"name":"Nebula Hoodie","description":"Nebula Hoodie description"}]"#));
        assert!(prompt.ends_with("User's request: \"something warm\""));
        assert!(!prompt.contains("price"));
    }

    #[tokio::test]
    async fn test_blank_query_makes_no_call() {
        let client = ShopperClient::new(&GeminiConfig {
            api_key: SecretString::from("test-key"),
            model: "gemini-2.5-flash".to_string(),
        });
        let picked = client
            .suggest(&[product(1, "Nebula Hoodie", 60)], "   ")
            .await
            .unwrap();
        assert!(picked.is_empty());
    }

    #[test]
    fn test_client_message() {
        assert_eq!(
            ShopperError::CLIENT_MESSAGE,
            "Sorry, I had trouble finding suggestions. Please try again."
        );
    }
}
