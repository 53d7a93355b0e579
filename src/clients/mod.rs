//! 外部协作方
//!
//! - `provider` - 出题服务 / 质检服务能力定义
//! - `openai_provider` - OpenAI 兼容接口的适配器
//! - `question_bank` - 题库访问约定与内存实现

pub mod openai_provider;
pub mod provider;
pub mod question_bank;

use std::sync::Arc;

use crate::config::Config;
use crate::error::ConfigError;

pub use openai_provider::OpenAiProvider;
pub use provider::{
    parse_json_response, GeneratedQuestion, ProviderRequest, QualityReviewer, QuestionProvider,
    ReviewReport,
};
pub use question_bank::{InMemoryQuestionBank, QuestionBank};

/// 按配置选择出题服务
pub fn build_provider(config: &Config) -> Result<Arc<dyn QuestionProvider>, ConfigError> {
    match config.provider_kind.to_lowercase().as_str() {
        "openai" | "openai_compatible" => {
            if config.llm_api_key.trim().is_empty() {
                return Err(ConfigError::Missing("LLM_API_KEY".to_string()));
            }
            Ok(Arc::new(OpenAiProvider::new(config)))
        }
        other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
}

/// 按配置选择质检服务，未启用时返回 `None`
pub fn build_reviewer(config: &Config) -> Result<Option<Arc<dyn QualityReviewer>>, ConfigError> {
    if !config.llm_review_enabled {
        return Ok(None);
    }
    match config.provider_kind.to_lowercase().as_str() {
        "openai" | "openai_compatible" => {
            if config.llm_api_key.trim().is_empty() {
                return Err(ConfigError::Missing("LLM_API_KEY".to_string()));
            }
            Ok(Some(Arc::new(OpenAiProvider::new(config))))
        }
        other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
}
