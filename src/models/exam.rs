use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, ProviderErrorKind};
use crate::models::plan::{ChapterRequirement, DifficultyDistribution, Slot};
use crate::models::question::CandidateQuestion;

/// 出题附加选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// 附加出题要求
    #[serde(default)]
    pub instructions: Option<String>,
    /// 是否要求附带解析
    #[serde(default)]
    pub include_explanation: bool,
}

/// 组卷选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyOptions {
    /// 跨章节轮流排列题目
    #[serde(default)]
    pub balance_topics: bool,
    #[serde(default)]
    pub generation: GenerationOptions,
}

/// 组卷请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamRequest {
    pub name: String,
    /// 考试时长（分钟）
    #[serde(default)]
    pub duration_minutes: u32,
    pub total_points: f64,
    pub distribution: DifficultyDistribution,
    pub chapters: Vec<ChapterRequirement>,
    #[serde(default)]
    pub options: AssemblyOptions,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

impl ExamRequest {
    /// 扩展 ExamRequest 以支持文件路径
    pub fn with_file_path(mut self, file_path: String) -> Self {
        self.file_path = Some(file_path);
        self
    }
}

/// 分值最多保留的小数位数
pub const MAX_POINTS_PRECISION: u32 = 6;

/// 定点分值（最小单位 = 10^-precision，precision 不超过 `MAX_POINTS_PRECISION`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Points {
    pub units: u64,
    pub precision: u32,
}

impl Points {
    pub fn from_units(units: u64, precision: u32) -> Self {
        Self {
            units,
            precision: precision.min(MAX_POINTS_PRECISION),
        }
    }

    /// 从浮点数换算（四舍五入到精度）
    pub fn from_f64(value: f64, precision: u32) -> Self {
        let precision = precision.min(MAX_POINTS_PRECISION);
        let scale = 10f64.powi(precision as i32);
        let units = if value.is_finite() && value > 0.0 {
            (value * scale).round() as u64
        } else {
            0
        };
        Self { units, precision }
    }

    // 反序列化得到的值可能超出上限
    fn digits(&self) -> u32 {
        self.precision.min(MAX_POINTS_PRECISION)
    }

    pub fn scale(&self) -> u64 {
        10u64.pow(self.digits())
    }

    pub fn to_f64(&self) -> f64 {
        self.units as f64 / self.scale() as f64
    }
}

impl std::fmt::Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scale = self.scale();
        let digits = self.digits();
        if digits == 0 {
            return write!(f, "{}", self.units);
        }
        write!(
            f,
            "{}.{:0width$}",
            self.units / scale,
            self.units % scale,
            width = digits as usize
        )
    }
}

/// 未满足的槽位原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnmetReason {
    /// 题库无匹配且未启用生成
    NoPoolMatch,
    RateLimited { retry_after_secs: u64 },
    QuotaExceeded { used: u32, quota: u32 },
    GenerationFailed { attempts: u32, last_error: String },
    ValidationRejected { attempts: u32, reasons: Vec<String> },
    ProviderFailure { kind: ProviderErrorKind, message: String },
    Cancelled,
}

impl UnmetReason {
    /// 永久性服务失败
    pub fn is_permanent_provider_failure(&self) -> bool {
        matches!(self, UnmetReason::ProviderFailure { kind, .. } if !kind.is_transient())
    }
}

impl From<&GenerationError> for UnmetReason {
    fn from(err: &GenerationError) -> Self {
        match err {
            GenerationError::RateLimited {
                retry_after_secs, ..
            } => UnmetReason::RateLimited {
                retry_after_secs: *retry_after_secs,
            },
            GenerationError::QuotaExceeded { used, quota, .. } => UnmetReason::QuotaExceeded {
                used: *used,
                quota: *quota,
            },
            GenerationError::Provider(e) => UnmetReason::ProviderFailure {
                kind: e.kind,
                message: e.message.clone(),
            },
            GenerationError::GenerationFailed {
                attempts,
                last_error,
            } => UnmetReason::GenerationFailed {
                attempts: *attempts,
                last_error: last_error.clone(),
            },
            GenerationError::ValidationRejected { attempts, reasons } => {
                UnmetReason::ValidationRejected {
                    attempts: *attempts,
                    reasons: reasons.clone(),
                }
            }
            GenerationError::Cancelled => UnmetReason::Cancelled,
        }
    }
}

impl std::fmt::Display for UnmetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnmetReason::NoPoolMatch => write!(f, "题库无匹配"),
            UnmetReason::RateLimited { retry_after_secs } => {
                write!(f, "请求频率限制 (建议 {} 秒后重试)", retry_after_secs)
            }
            UnmetReason::QuotaExceeded { used, quota } => {
                write!(f, "当日配额已用尽 ({}/{})", used, quota)
            }
            UnmetReason::GenerationFailed {
                attempts,
                last_error,
            } => write!(f, "出题失败 (尝试 {} 次): {}", attempts, last_error),
            UnmetReason::ValidationRejected { attempts, reasons } => write!(
                f,
                "质检未通过 (尝试 {} 次): {}",
                attempts,
                reasons.join("; ")
            ),
            UnmetReason::ProviderFailure { kind, message } => {
                write!(f, "出题服务失败 ({}): {}", kind, message)
            }
            UnmetReason::Cancelled => write!(f, "组卷已取消"),
        }
    }
}

/// 槽位的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    Filled(CandidateQuestion),
    Unfillable(UnmetReason),
}

/// 试卷中的一道题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamItem {
    /// 题号（从 1 开始）
    pub order: usize,
    pub points: Points,
    pub question: CandidateQuestion,
}

/// 未满足的槽位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmetSlot {
    /// 该槽位在出题顺序中的位置（从 1 开始）
    pub position: usize,
    pub slot: Slot,
    /// 该槽位本应获得的分值
    pub points: Points,
    #[serde(flatten)]
    pub reason: UnmetReason,
}

/// 组卷结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamArtifact {
    pub name: String,
    pub duration_minutes: u32,
    pub total_points: Points,
    pub items: Vec<ExamItem>,
    #[serde(default)]
    pub unmet_slots: Vec<UnmetSlot>,
    #[serde(default)]
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

impl ExamArtifact {
    /// 所有槽位均已填充且未取消
    pub fn is_complete(&self) -> bool {
        self.unmet_slots.is_empty() && !self.cancelled
    }

    /// 已分配分值总和（最小单位）
    pub fn assigned_units(&self) -> u64 {
        self.items.iter().map(|item| item.points.units).sum()
    }

    /// 计划槽位总数
    pub fn slot_count(&self) -> usize {
        self.items.len() + self.unmet_slots.len()
    }
}
