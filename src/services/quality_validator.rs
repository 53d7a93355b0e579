//! 质检服务 - 业务能力层
//!
//! 对单道题打分并给出 通过 / 不通过 结论。
//!
//! 三个维度（0-1）：
//! - 科学性：LLM 审查；未启用时用本地结构检查代替
//! - 选项质量：本地检查
//! - 难度匹配：相差 0 级 1.0，1 级 0.5，2 级 0.0

use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::{QualityReviewer, ReviewReport};
use crate::config::Config;
use crate::models::{CandidateQuestion, Difficulty, QualityScore};

/// 干扰项黑名单
const CATCH_ALL_CHOICES: [&str; 8] = [
    "以上都对",
    "以上都不对",
    "以上都是",
    "以上都不是",
    "以上均正确",
    "以上均不正确",
    "all of the above",
    "none of the above",
];

const MAX_CHOICES: usize = 4;
const MIN_STEM_CHARS: usize = 5;

/// 维度权重
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityWeights {
    pub accuracy: f64,
    pub choice_quality: f64,
    pub difficulty_alignment: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            accuracy: 1.0,
            choice_quality: 1.0,
            difficulty_alignment: 1.0,
        }
    }
}

impl From<(f64, f64, f64)> for QualityWeights {
    fn from((accuracy, choice_quality, difficulty_alignment): (f64, f64, f64)) -> Self {
        Self {
            accuracy,
            choice_quality,
            difficulty_alignment,
        }
    }
}

/// 质检结论
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(QualityScore),
    Rejected {
        score: QualityScore,
        reasons: Vec<String>,
    },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }
}

/// 质检服务
#[derive(Clone)]
pub struct QualityValidator {
    weights: QualityWeights,
    threshold: f64,
    reviewer: Option<Arc<dyn QualityReviewer>>,
}

impl QualityValidator {
    pub fn new(weights: QualityWeights, threshold: f64) -> Self {
        Self {
            weights,
            threshold,
            reviewer: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.quality_weights.into(), config.quality_threshold)
    }

    /// 启用 LLM 审查
    pub fn with_reviewer(mut self, reviewer: Arc<dyn QualityReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 对一道题打分
    ///
    /// - `requested`: 槽位要求的难度
    /// - `require_explanation`: 是否要求附带解析
    pub async fn evaluate(
        &self,
        candidate: &CandidateQuestion,
        requested: Difficulty,
        require_explanation: bool,
    ) -> Verdict {
        let mut reasons = Vec::new();

        let choices = score_choices(candidate, &mut reasons);
        let choice_quality = choices.score;

        let report = match &self.reviewer {
            Some(reviewer) => match reviewer.review(candidate, requested).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("⚠️ LLM 质检失败，改用本地检查: {}", e);
                    None
                }
            },
            None => None,
        };

        let (accuracy, estimated) = match report {
            Some(ReviewReport {
                accuracy,
                estimated_difficulty,
                issues,
            }) => {
                reasons.extend(issues);
                (accuracy.clamp(0.0, 1.0), estimated_difficulty.unwrap_or(candidate.difficulty))
            }
            None => (
                score_structure(candidate, require_explanation, &mut reasons),
                candidate.difficulty,
            ),
        };

        let difficulty_alignment = difficulty_alignment(requested, estimated);
        if difficulty_alignment < 1.0 {
            reasons.push(format!(
                "难度不匹配: 要求{}, 实际{}",
                requested.name(),
                estimated.name()
            ));
        }

        let overall = self.combine(accuracy, choice_quality, difficulty_alignment);
        let score = QualityScore {
            accuracy,
            choice_quality,
            difficulty_alignment,
            overall,
        };

        debug!(
            "质检得分: 科学性 {:.2} / 选项 {:.2} / 难度 {:.2} → {:.2} (阈值 {:.2})",
            accuracy, choice_quality, difficulty_alignment, overall, self.threshold
        );

        if choices.fatal {
            Verdict::Rejected { score, reasons }
        } else if overall >= self.threshold {
            Verdict::Accepted(score)
        } else {
            reasons.push(format!(
                "综合得分 {:.2} 低于阈值 {:.2}",
                overall, self.threshold
            ));
            Verdict::Rejected { score, reasons }
        }
    }

    fn combine(&self, accuracy: f64, choice_quality: f64, difficulty_alignment: f64) -> f64 {
        let w = self.weights;
        let total = w.accuracy + w.choice_quality + w.difficulty_alignment;
        if total <= 0.0 {
            return 0.0;
        }
        (accuracy * w.accuracy
            + choice_quality * w.choice_quality
            + difficulty_alignment * w.difficulty_alignment)
            / total
    }
}

/// 难度匹配度
pub fn difficulty_alignment(requested: Difficulty, actual: Difficulty) -> f64 {
    match requested.rank().abs_diff(actual.rank()) {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    }
}

/// 选项检查结果
struct ChoiceCheck {
    score: f64,
    /// 违反硬性要求（无论综合得分多少都不通过）
    fatal: bool,
}

impl ChoiceCheck {
    fn reject(reasons: &mut Vec<String>, reason: String) -> Self {
        reasons.push(reason);
        Self {
            score: 0.0,
            fatal: true,
        }
    }
}

/// 选项质量
///
/// 硬性要求：正确选项有效、2 到 4 个选项、选项互不相同（非选择题要求有答案）
fn score_choices(candidate: &CandidateQuestion, reasons: &mut Vec<String>) -> ChoiceCheck {
    if !candidate.is_multiple_choice() {
        // 非选择题只要求有答案
        return match candidate.answer.as_deref() {
            Some(answer) if !answer.trim().is_empty() => ChoiceCheck {
                score: 1.0,
                fatal: false,
            },
            _ => ChoiceCheck::reject(reasons, "非选择题缺少答案".to_string()),
        };
    }

    let choices = &candidate.choices;
    match candidate.correct_choice {
        Some(index) if index < choices.len() => {}
        _ => return ChoiceCheck::reject(reasons, "没有有效的正确选项".to_string()),
    }

    if !(2..=MAX_CHOICES).contains(&choices.len()) {
        return ChoiceCheck::reject(reasons, format!("选项数量不合理: {}", choices.len()));
    }

    let mut normalized: Vec<String> = choices.iter().map(|c| c.trim().to_lowercase()).collect();
    normalized.sort();
    normalized.dedup();
    if normalized.len() != choices.len() {
        return ChoiceCheck::reject(reasons, "存在重复选项".to_string());
    }

    let mut passed = 0u32;
    let checks = 2u32;

    if choices.iter().all(|c| !c.trim().is_empty()) {
        passed += 1;
    } else {
        reasons.push("存在空选项".to_string());
    }

    let has_catch_all = choices.iter().any(|c| {
        let lower = c.to_lowercase();
        CATCH_ALL_CHOICES.iter().any(|bad| lower.contains(bad))
    });
    if !has_catch_all {
        passed += 1;
    } else {
        reasons.push("存在\"以上都对/都不对\"类选项".to_string());
    }

    ChoiceCheck {
        score: passed as f64 / checks as f64,
        fatal: false,
    }
}

/// 本地结构检查（代替科学性审查）
fn score_structure(
    candidate: &CandidateQuestion,
    require_explanation: bool,
    reasons: &mut Vec<String>,
) -> f64 {
    let mut passed = 0u32;
    let mut checks = 2u32;

    let stem = candidate.text.trim();
    if stem.chars().count() >= MIN_STEM_CHARS {
        passed += 1;
    } else {
        reasons.push("题干过短".to_string());
    }

    let answer_text = match candidate.correct_choice {
        Some(index) if candidate.is_multiple_choice() => candidate.choices.get(index).cloned(),
        _ => candidate.answer.clone(),
    };
    let leaked = answer_text
        .map(|a| a.trim().to_string())
        .filter(|a| a.chars().count() >= 2)
        .is_some_and(|a| stem.contains(&a));
    if !leaked {
        passed += 1;
    } else {
        reasons.push("题干中包含答案".to_string());
    }

    if require_explanation {
        checks += 1;
        if candidate
            .explanation
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
        {
            passed += 1;
        } else {
            reasons.push("缺少解析".to_string());
        }
    }

    passed as f64 / checks as f64
}
