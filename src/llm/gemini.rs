use super::*;
use std::time::Instant;

/// Gemini `generateContent` endpoint used as a round evaluator
pub struct GeminiProvider {
    endpoint: String,
    api_key: String,
    temperature: f32,
    timeout: Duration,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// `endpoint` is the full generateContent URL of the model
    pub fn new(
        endpoint: String,
        api_key: String,
        temperature: f32,
        timeout: Duration,
    ) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_key,
            temperature,
            timeout,
            client,
        })
    }

    async fn generate(&self, instructions: &str, payload: serde_json::Value) -> LlmResult<String> {
        let start = Instant::now();

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: format!("{}\n\nINPUT:\n{}", instructions, payload),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "application/json",
            },
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(self.timeout))?
        .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::ApiError(format!(
                "Gemini API returned status: {}",
                response.status()
            )));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| LlmError::ParseError("No candidate text in response".to_string()))?;

        tracing::debug!("Gemini answered in {}ms", start.elapsed().as_millis());
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl RemoteEvaluator for GeminiProvider {
    async fn evaluate(&self, request: &EvaluationRequest) -> LlmResult<RemoteEvaluation> {
        let text = self.generate(EVALUATION_PROMPT, request.payload()).await?;
        parse::parse_evaluation(&text)
    }

    async fn choose_secret(&self, request: &SecretRequest) -> LlmResult<RemoteSecret> {
        let text = self.generate(SECRET_PROMPT, request.payload()).await?;
        parse::parse_secret(&text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: "hello".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let parsed: GeminiResponse = serde_json::from_str(r#"{"candidates":[{}]}"#).unwrap();
        assert!(parsed.candidates[0].content.is_none());

        let parsed: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }
}
