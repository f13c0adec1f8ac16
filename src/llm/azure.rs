use super::*;
use async_openai::{
    config::AzureConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use std::time::Instant;

/// Azure OpenAI chat deployment used as a round evaluator
pub struct AzureProvider {
    client: Client<AzureConfig>,
    deployment: String,
    temperature: f32,
    timeout: Duration,
}

impl AzureProvider {
    pub fn new(
        endpoint: String,
        deployment: String,
        api_key: String,
        api_version: String,
        temperature: f32,
        timeout: Duration,
    ) -> Self {
        let config = AzureConfig::new()
            .with_api_base(endpoint)
            .with_api_version(api_version)
            .with_deployment_id(deployment.clone())
            .with_api_key(api_key);
        let client = Client::with_config(config);

        Self {
            client,
            deployment,
            temperature,
            timeout,
        }
    }

    /// Send one system + user exchange and return the raw completion text
    async fn complete(&self, system: &str, payload: serde_json::Value) -> LlmResult<String> {
        let start = Instant::now();

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.deployment)
            .temperature(self.temperature)
            .response_format(ResponseFormat::JsonObject)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(|e| LlmError::ApiError(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(payload.to_string())
                    .build()
                    .map_err(|e| LlmError::ApiError(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(chat_request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))?
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::ParseError("No content in response".to_string()))?;

        tracing::debug!(
            "Azure deployment {} answered in {}ms",
            self.deployment,
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}

#[async_trait]
impl RemoteEvaluator for AzureProvider {
    async fn evaluate(&self, request: &EvaluationRequest) -> LlmResult<RemoteEvaluation> {
        let text = self.complete(EVALUATION_PROMPT, request.payload()).await?;
        parse::parse_evaluation(&text)
    }

    async fn choose_secret(&self, request: &SecretRequest) -> LlmResult<RemoteSecret> {
        let text = self.complete(SECRET_PROMPT, request.payload()).await?;
        parse::parse_secret(&text)
    }

    fn name(&self) -> &str {
        "azure"
    }
}
