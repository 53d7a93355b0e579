use thiserror::Error;

use crate::models::Difficulty;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 组卷规划错误（致命，在任何外部调用之前报告）
    #[error("规划错误: {0}")]
    Plan(#[from] PlanError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 出题服务整体不可用（没有任何槽位被填充，且全部为永久性失败）
    #[error("出题服务不可用: {unmet} 个槽位全部失败, 最后错误: {last_error}")]
    ProviderUnavailable { unmet: usize, last_error: String },
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 组卷规划错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// 难度比例之和不等于 100
    #[error("难度比例之和必须为 100 (简单 {easy} + 中等 {medium} + 困难 {hard} = {sum})")]
    InvalidDistribution {
        easy: u32,
        medium: u32,
        hard: u32,
        sum: u64,
    },
    /// 章节题量不大于 0
    #[error("章节 {chapter_id} 的题量必须大于 0 (当前: {question_count})")]
    EmptyRequirement { chapter_id: u32, question_count: i64 },
    /// 章节列表为空
    #[error("章节列表不能为空")]
    NoChapters,
}

/// 出题服务失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// 调用超时
    Timeout,
    /// 服务端错误（5xx 或网络中断）
    Server,
    /// 返回内容无法解析
    Malformed,
    /// 请求被拒绝（参数错误、鉴权失败等）
    BadRequest,
    /// 触发内容安全策略
    ContentPolicy,
}

impl ProviderErrorKind {
    /// 是否为可重试的临时性失败
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Timeout | ProviderErrorKind::Server | ProviderErrorKind::Malformed
        )
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderErrorKind::Timeout => "超时",
            ProviderErrorKind::Server => "服务端错误",
            ProviderErrorKind::Malformed => "响应格式错误",
            ProviderErrorKind::BadRequest => "请求错误",
            ProviderErrorKind::ContentPolicy => "内容策略拦截",
        };
        f.write_str(name)
    }
}

/// 出题服务单次调用失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// 出题编排错误
///
/// 需要 `Clone`：同一指纹的等待者共享领头调用的结果
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// 每分钟请求数已达上限
    #[error("出题服务 {provider} 请求频率限制, 建议等待 {retry_after_secs} 秒")]
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },
    /// 当日配额已用尽
    #[error("出题服务 {provider} 当日配额已用尽 ({used}/{quota})")]
    QuotaExceeded {
        provider: String,
        used: u32,
        quota: u32,
    },
    /// 单次调用失败
    #[error("出题服务调用失败: {0}")]
    Provider(#[from] ProviderError),
    /// 尝试次数用尽
    #[error("出题失败: 已尝试 {attempts} 次, 最后错误: {last_error}")]
    GenerationFailed { attempts: u32, last_error: String },
    /// 质检未通过且尝试次数用尽
    #[error("质检未通过: 已尝试 {attempts} 次, 原因: {}", .reasons.join("; "))]
    ValidationRejected { attempts: u32, reasons: Vec<String> },
    /// 组卷已取消，不再发起新的出题
    #[error("组卷已取消")]
    Cancelled,
}

impl GenerationError {
    /// 永久性服务失败（非临时错误），用于判断服务整体不可用
    pub fn is_permanent_provider_failure(&self) -> bool {
        matches!(self, GenerationError::Provider(e) if !e.is_transient())
    }
}

/// 题库访问错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    /// 查询失败
    #[error("题库查询失败 (章节 {chapter_id}, 难度 {difficulty}): {message}")]
    QueryFailed {
        chapter_id: u32,
        difficulty: Difficulty,
        message: String,
    },
    /// 保存失败
    #[error("题目保存失败: {message}")]
    SaveFailed { message: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 配置错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 配置值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 不支持的出题服务
    #[error("不支持的出题服务: {0}")]
    UnknownProvider(String),
    /// 缺少必需的配置
    #[error("缺少配置项 {0}")]
    Missing(String),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON序列化失败: {}", err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
