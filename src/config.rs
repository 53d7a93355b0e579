use std::time::Duration;

use crate::error::ConfigError;
use crate::models::exam::MAX_POINTS_PRECISION;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    // --- 批量运行配置 ---
    /// 同时组卷的请求数量
    pub max_concurrent_exams: usize,
    /// 单张试卷内同时处理的槽位数量
    pub max_concurrent_slots: usize,
    /// 组卷请求 TOML 存放目录
    pub request_folder: String,
    /// 题库 TOML 文件
    pub bank_file: String,
    /// 组卷结果输出目录
    pub output_folder: String,
    /// 未满足槽位记录文件
    pub warn_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- 出题服务配置 ---
    /// 出题服务类型（目前支持 openai 兼容接口）
    pub provider_kind: String,
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    /// 单次调用超时（秒）
    pub request_timeout_secs: u64,
    /// 是否启用 LLM 质检（科学性与难度评估）
    pub llm_review_enabled: bool,
    // --- 配额与重试 ---
    pub rate_limit_per_minute: u32,
    pub daily_quota: u32,
    /// 每个槽位的最大尝试次数（含质检重出）
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter_ms: u64,
    /// 生成结果缓存时间（秒）
    pub cache_ttl_secs: u64,
    /// 批量出题的请求间隔（毫秒）
    pub batch_delay_ms: u64,
    /// 批量出题的最大并发（1 表示严格串行）
    pub batch_concurrency: usize,
    // --- 质检与组卷 ---
    pub quality_threshold: f64,
    /// 质检维度权重: 科学性, 选项质量, 难度匹配
    pub quality_weights: (f64, f64, f64),
    /// 题库题目是否也参与质检
    pub validate_pool_questions: bool,
    /// 题库不足时是否调用出题服务
    pub allow_generation: bool,
    /// 是否把通过质检的生成题保存回题库
    pub persist_generated: bool,
    /// 分值精度（小数位数）
    pub points_precision: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_exams: 4,
            max_concurrent_slots: 8,
            request_folder: "exam_requests".to_string(),
            bank_file: "question_bank.toml".to_string(),
            output_folder: "output_exams".to_string(),
            warn_file: "warn.txt".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            provider_kind: "openai".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_max_tokens: 1024,
            llm_temperature: 0.7,
            request_timeout_secs: 30,
            llm_review_enabled: false,
            rate_limit_per_minute: 60,
            daily_quota: 1000,
            max_attempts: 5,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 4000,
            retry_jitter_ms: 250,
            cache_ttl_secs: 3600,
            batch_delay_ms: 1000,
            batch_concurrency: 1,
            quality_threshold: 0.6,
            quality_weights: (1.0, 1.0, 1.0),
            validate_pool_questions: false,
            allow_generation: true,
            persist_generated: false,
            points_precision: 2,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

/// 解析 "1,1,1" 形式的权重
fn parse_weights(value: &str) -> Option<(f64, f64, f64)> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [a, b, c] => Some((*a, *b, *c)),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_exams: env_parse("MAX_CONCURRENT_EXAMS", default.max_concurrent_exams),
            max_concurrent_slots: env_parse("MAX_CONCURRENT_SLOTS", default.max_concurrent_slots),
            request_folder: env_string("REQUEST_FOLDER", default.request_folder),
            bank_file: env_string("BANK_FILE", default.bank_file),
            output_folder: env_string("OUTPUT_FOLDER", default.output_folder),
            warn_file: env_string("WARN_FILE", default.warn_file),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
            output_log_file: env_string("OUTPUT_LOG_FILE", default.output_log_file),
            provider_kind: env_string("PROVIDER_KIND", default.provider_kind),
            llm_api_key: env_string("LLM_API_KEY", default.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL", default.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME", default.llm_model_name),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", default.llm_max_tokens),
            llm_temperature: env_parse("LLM_TEMPERATURE", default.llm_temperature),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", default.request_timeout_secs),
            llm_review_enabled: env_parse("LLM_REVIEW_ENABLED", default.llm_review_enabled),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", default.rate_limit_per_minute),
            daily_quota: env_parse("DAILY_QUOTA", default.daily_quota),
            max_attempts: env_parse("MAX_ATTEMPTS", default.max_attempts),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", default.retry_base_delay_ms),
            retry_max_delay_ms: env_parse("RETRY_MAX_DELAY_MS", default.retry_max_delay_ms),
            retry_jitter_ms: env_parse("RETRY_JITTER_MS", default.retry_jitter_ms),
            cache_ttl_secs: env_parse("CACHE_TTL_SECS", default.cache_ttl_secs),
            batch_delay_ms: env_parse("BATCH_DELAY_MS", default.batch_delay_ms),
            batch_concurrency: env_parse("BATCH_CONCURRENCY", default.batch_concurrency),
            quality_threshold: env_parse("QUALITY_THRESHOLD", default.quality_threshold),
            quality_weights: std::env::var("QUALITY_WEIGHTS")
                .ok()
                .and_then(|v| parse_weights(&v))
                .unwrap_or(default.quality_weights),
            validate_pool_questions: env_parse(
                "VALIDATE_POOL_QUESTIONS",
                default.validate_pool_questions,
            ),
            allow_generation: env_parse("ALLOW_GENERATION", default.allow_generation),
            persist_generated: env_parse("PERSIST_GENERATED", default.persist_generated),
            points_precision: env_parse("POINTS_PRECISION", default.points_precision),
        }
    }

    /// 检查配置是否合法
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "必须大于 0"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(invalid("quality_threshold", "必须在 0 到 1 之间"));
        }
        let (a, b, c) = self.quality_weights;
        if a < 0.0 || b < 0.0 || c < 0.0 || a + b + c <= 0.0 {
            return Err(invalid("quality_weights", "权重不能为负且总和必须大于 0"));
        }
        if self.points_precision > MAX_POINTS_PRECISION {
            return Err(invalid("points_precision", "最多 6 位小数"));
        }
        if self.max_concurrent_slots == 0 || self.max_concurrent_exams == 0 {
            return Err(invalid("max_concurrent_*", "并发数必须大于 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "必须大于 0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
