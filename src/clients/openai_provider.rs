//! OpenAI 兼容出题服务 - 客户端层
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::clients::provider::{
    parse_json_response, GeneratedQuestion, ProviderRequest, QualityReviewer, QuestionProvider,
    ReviewReport,
};
use crate::config::Config;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::{CandidateQuestion, Difficulty};

const REVIEW_SYSTEM_PROMPT: &str = "你是一名严谨的学科审题专家。你需要检查题目是否存在科学性或概念性错误，并评估题目的实际难度。只返回 JSON。";

/// OpenAI 兼容出题服务
///
/// 职责：
/// - 调用 LLM API 生成单道题目
/// - 调用 LLM API 审查单道题目
/// - 把 API 错误归类为临时 / 永久失败
/// - 不关心配额、缓存、重试
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
    model_name: String,
    max_tokens: u32,
}

impl OpenAiProvider {
    /// 创建新的出题服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            provider_name: config.provider_kind.clone(),
            model_name: config.llm_model_name.clone(),
            max_tokens: config.llm_max_tokens,
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// 返回 LLM 的响应内容（字符串）
    async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: &str,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", user_message.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(build_error)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(build_error)?;

        let messages = vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ];

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build()
            .map_err(build_error)?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_error(&e)
        })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::Malformed, "LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }

    fn build_review_prompt(candidate: &CandidateQuestion, requested: Difficulty) -> String {
        let choices = if candidate.choices.is_empty() {
            "（非选择题）".to_string()
        } else {
            candidate
                .choices
                .iter()
                .enumerate()
                .map(|(i, c)| format!("  {}. {}", i, c))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"请审查下面的题目。

题干：{}
选项：
{}
标注的正确选项：{:?}
参考答案：{}
要求难度：{}

【审查要求】
1. 检查题干、选项、答案是否存在科学性或概念性错误
2. 评估题目的实际难度（easy / medium / hard）
3. 列出发现的问题，没有问题则返回空数组

返回 JSON：{{"accuracy": 0到1之间的小数, "estimated_difficulty": "easy|medium|hard", "issues": ["..."]}}"#,
            candidate.text,
            choices,
            candidate.correct_choice,
            candidate.answer.as_deref().unwrap_or("无"),
            requested.as_str()
        )
    }
}

impl QuestionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model_name
    }

    fn generate<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> BoxFuture<'a, Result<GeneratedQuestion, ProviderError>> {
        async move {
            let content = self
                .send_to_llm(
                    &request.prompt,
                    &request.system_prompt,
                    &request.model,
                    request.max_tokens,
                    request.temperature,
                )
                .await?;
            parse_json_response(&content)
        }
        .boxed()
    }
}

impl QualityReviewer for OpenAiProvider {
    fn review<'a>(
        &'a self,
        candidate: &'a CandidateQuestion,
        requested: Difficulty,
    ) -> BoxFuture<'a, Result<ReviewReport, ProviderError>> {
        async move {
            let prompt = Self::build_review_prompt(candidate, requested);
            let content = self
                .send_to_llm(
                    &prompt,
                    REVIEW_SYSTEM_PROMPT,
                    &self.model_name,
                    self.max_tokens,
                    0.0,
                )
                .await?;
            let mut report: ReviewReport = parse_json_response(&content)?;
            report.accuracy = report.accuracy.clamp(0.0, 1.0);
            Ok(report)
        }
        .boxed()
    }
}

fn build_error(e: OpenAIError) -> ProviderError {
    ProviderError::new(ProviderErrorKind::BadRequest, format!("请求构建失败: {}", e))
}

/// 把 API 错误归类为临时 / 永久失败
fn classify_error(err: &OpenAIError) -> ProviderError {
    let message = err.to_string();
    let kind = match err {
        OpenAIError::ApiError(_) => classify_api_message(&message),
        _ => classify_transport_message(&message),
    };
    ProviderError::new(kind, message)
}

fn classify_api_message(message: &str) -> ProviderErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("content_policy") || lower.contains("content policy") || lower.contains("safety") {
        ProviderErrorKind::ContentPolicy
    } else if lower.contains("rate limit")
        || lower.contains("overloaded")
        || lower.contains("server_error")
        || lower.contains("server error")
        || lower.contains("internal error")
        || lower.contains("bad gateway")
        || lower.contains("unavailable")
    {
        ProviderErrorKind::Server
    } else {
        ProviderErrorKind::BadRequest
    }
}

fn classify_transport_message(message: &str) -> ProviderErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        ProviderErrorKind::Timeout
    } else if lower.contains("json") || lower.contains("deserialize") || lower.contains("decode") {
        ProviderErrorKind::Malformed
    } else {
        ProviderErrorKind::Server
    }
}
