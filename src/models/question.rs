use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::plan::Difficulty;

/// 题库中的题目记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(default)]
    pub id: String,
    pub chapter_id: u32,
    pub difficulty: Difficulty,
    pub text: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_choice: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub topic: String,
    /// 历史使用次数
    #[serde(default)]
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
}

/// 题库自动分配的 id 前缀
pub const BANK_ID_PREFIX: &str = "bank-";

impl QuestionRecord {
    /// `bank-N` 形式 id 中的 N
    pub fn bank_ordinal(&self) -> Option<u64> {
        self.id.strip_prefix(BANK_ID_PREFIX)?.parse().ok()
    }
}

/// 已有记录中最大的 `bank-N` 序号（没有则为 0）
pub fn max_bank_ordinal<'a>(records: impl IntoIterator<Item = &'a QuestionRecord>) -> u64 {
    records
        .into_iter()
        .filter_map(QuestionRecord::bank_ordinal)
        .max()
        .unwrap_or(0)
}

/// 候选题目来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// 来自题库
    Pool,
    /// 由出题服务生成
    Generated,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Pool => write!(f, "题库"),
            SourceKind::Generated => write!(f, "生成"),
        }
    }
}

/// 质量评分（各维度 0-1）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub accuracy: f64,
    pub choice_quality: f64,
    pub difficulty_alignment: f64,
    pub overall: f64,
}

/// 候选题目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuestion {
    pub id: String,
    pub source_kind: SourceKind,
    pub chapter_id: u32,
    pub difficulty: Difficulty,
    pub text: String,
    /// 选项（非选择题为空）
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_choice: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<QualityScore>,
}

impl CandidateQuestion {
    /// 是否为选择题
    pub fn is_multiple_choice(&self) -> bool {
        !self.choices.is_empty()
    }

    /// 附加质量评分
    pub fn with_quality(mut self, score: QualityScore) -> Self {
        self.quality_score = Some(score);
        self
    }

    /// 转换为题库记录（保存生成题目时使用）
    pub fn to_record(&self, created_at: DateTime<Utc>) -> QuestionRecord {
        QuestionRecord {
            id: String::new(),
            chapter_id: self.chapter_id,
            difficulty: self.difficulty,
            text: self.text.clone(),
            choices: self.choices.clone(),
            correct_choice: self.correct_choice,
            answer: self.answer.clone(),
            explanation: self.explanation.clone(),
            topic: self.topic.clone(),
            usage_count: 0,
            created_at,
        }
    }
}

impl From<&QuestionRecord> for CandidateQuestion {
    fn from(record: &QuestionRecord) -> Self {
        Self {
            id: record.id.clone(),
            source_kind: SourceKind::Pool,
            chapter_id: record.chapter_id,
            difficulty: record.difficulty,
            text: record.text.clone(),
            choices: record.choices.clone(),
            correct_choice: record.correct_choice,
            answer: record.answer.clone(),
            explanation: record.explanation.clone(),
            topic: record.topic.clone(),
            quality_score: None,
        }
    }
}

impl std::fmt::Display for CandidateQuestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 截断题干以便显示（最多80个字符）
        let preview = if self.text.chars().count() > 80 {
            self.text.chars().take(80).collect::<String>() + "..."
        } else {
            self.text.clone()
        };

        match self.quality_score {
            Some(score) => write!(
                f,
                "[{}] {} [质量: {:.2}]",
                self.source_kind, preview, score.overall
            ),
            None => write!(f, "[{}] {}", self.source_kind, preview),
        }
    }
}
