//! 出题服务能力定义
//!
//! 只约定"请求进、题目出、失败类型"，具体服务由适配器实现

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;

use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::{CandidateQuestion, Difficulty};

/// 出题请求
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// 出题服务返回的结构化题目
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedQuestion {
    #[serde(alias = "question", alias = "stem")]
    pub text: String,
    #[serde(default, alias = "options")]
    pub choices: Vec<String>,
    #[serde(default, alias = "correct_answer", alias = "answer_index")]
    pub correct_choice: Option<usize>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    /// 服务自评的难度
    #[serde(default, deserialize_with = "deserialize_difficulty")]
    pub difficulty: Option<Difficulty>,
}

fn deserialize_difficulty<'de, D>(deserializer: D) -> Result<Option<Difficulty>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Difficulty::find))
}

/// LLM 质检报告
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewReport {
    /// 科学性得分 0-1
    pub accuracy: f64,
    #[serde(default, deserialize_with = "deserialize_difficulty")]
    pub estimated_difficulty: Option<Difficulty>,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// 出题服务
///
/// 不同服务（不同厂商、不同模型）各自实现，由配置选择
pub trait QuestionProvider: Send + Sync {
    /// 服务标识（配额按此统计）
    fn name(&self) -> &str;

    /// 模型名称（参与指纹计算）
    fn model(&self) -> &str;

    fn generate<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> BoxFuture<'a, Result<GeneratedQuestion, ProviderError>>;
}

/// 质检服务（科学性与难度评估）
pub trait QualityReviewer: Send + Sync {
    fn review<'a>(
        &'a self,
        candidate: &'a CandidateQuestion,
        requested: Difficulty,
    ) -> BoxFuture<'a, Result<ReviewReport, ProviderError>>;
}

/// 从 LLM 文本响应中提取并解析 JSON 对象
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    content: &str,
) -> Result<T, ProviderError> {
    let content = content.trim();
    // ```json ... ``` 代码块，或第一个完整的 {...}
    let re = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```|(\{.*\})").map_err(|e| {
        ProviderError::new(ProviderErrorKind::Malformed, format!("正则构建失败: {}", e))
    })?;
    let json_text = re
        .captures(content)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::Malformed,
                format!("响应中没有 JSON 对象: {}", crate::utils::truncate_text(content, 80)),
            )
        })?;

    serde_json::from_str(json_text).map_err(|e| {
        ProviderError::new(ProviderErrorKind::Malformed, format!("JSON解析失败: {}", e))
    })
}
