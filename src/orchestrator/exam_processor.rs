//! 单张试卷处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责一张试卷的完整组卷过程，是试卷级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **规划**：调用矩阵规划得到槽位计划（规划错误在任何外部调用之前返回）
//! 2. **并发填充**：每个槽位一个任务，Semaphore 限制并发数
//! 3. **取消**：进行中的调用会完成并写入缓存，不再开始新的尝试，返回部分试卷
//! 4. **拼装**：按出题顺序排列并分配分值
//! 5. **整体失败判定**：没有任何槽位被填充且全部为永久性服务失败时报错

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::{QualityReviewer, QuestionBank, QuestionProvider};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{QuotaSnapshot, QuotaTracker};
use crate::models::{
    Difficulty, ExamArtifact, ExamRequest, GenerationSpec, Points, SlotOutcome, UnmetReason,
};
use crate::orchestrator::exam_assembler;
use crate::services::{matrix_planner, GenerationService, QualityValidator, SelectionLedger};
use crate::workflow::{SlotCtx, SlotFlow};

/// 组卷器
///
/// 持有出题编排服务（缓存、配额共享），可被多张试卷并发使用
#[derive(Clone)]
pub struct ExamBuilder {
    flow: SlotFlow,
    generation: GenerationService,
    max_concurrent_slots: usize,
    points_precision: u32,
}

impl ExamBuilder {
    /// 创建组卷器（不启用 LLM 质检）
    pub fn new(
        bank: Arc<dyn QuestionBank>,
        provider: Arc<dyn QuestionProvider>,
        quota: QuotaTracker,
        config: &Config,
    ) -> Self {
        Self::with_reviewer(bank, provider, None, quota, config)
    }

    /// 创建组卷器，`reviewer` 为 `Some` 时启用 LLM 质检
    pub fn with_reviewer(
        bank: Arc<dyn QuestionBank>,
        provider: Arc<dyn QuestionProvider>,
        reviewer: Option<Arc<dyn QualityReviewer>>,
        quota: QuotaTracker,
        config: &Config,
    ) -> Self {
        let mut validator = QualityValidator::from_config(config);
        if let Some(reviewer) = reviewer {
            validator = validator.with_reviewer(reviewer);
        }
        let generation = GenerationService::new(provider, quota, validator.clone(), config);
        Self::from_parts(bank, generation, validator, config)
    }

    /// 由已有的出题编排服务创建（共享缓存与配额）
    pub fn from_parts(
        bank: Arc<dyn QuestionBank>,
        generation: GenerationService,
        validator: QualityValidator,
        config: &Config,
    ) -> Self {
        Self {
            flow: SlotFlow::new(bank, generation.clone(), validator, config),
            generation,
            max_concurrent_slots: config.max_concurrent_slots.max(1),
            points_precision: config.points_precision,
        }
    }

    pub fn generation(&self) -> &GenerationService {
        &self.generation
    }

    /// 出题服务的配额快照（只读）
    pub fn quota_snapshot(&self) -> QuotaSnapshot {
        self.generation.quota_snapshot()
    }

    /// 组卷
    ///
    /// 部分槽位无法填充仍算成功，未满足的槽位列在 `unmet_slots` 中
    pub async fn assemble(
        &self,
        request: &ExamRequest,
        cancel: &CancellationToken,
    ) -> AppResult<ExamArtifact> {
        let plan = matrix_planner::plan(&request.chapters, &request.distribution)?;
        let total_points = Points::from_f64(request.total_points, self.points_precision);
        let order = exam_assembler::emission_order(&plan, request.options.balance_topics);

        log_exam_start(&request.name, plan.len(), &total_points);

        // 槽位在出题顺序中的位置（仅用于日志）
        let mut positions = vec![0usize; plan.len()];
        for (position, &slot_idx) in order.iter().enumerate() {
            positions[slot_idx] = position + 1;
        }

        // 同章节同难度的槽位依次编号，保证指纹互不相同
        let mut variants: HashMap<(u32, Difficulty), u32> = HashMap::new();
        let specs: Vec<GenerationSpec> = plan
            .slots
            .iter()
            .map(|slot| {
                let mut spec = GenerationSpec::for_slot(slot, &request.options.generation, 0);
                let counter = variants.entry(spec.variant_key()).or_insert(0);
                spec.variant = *counter;
                *counter += 1;
                spec
            })
            .collect();

        let ledger = Arc::new(SelectionLedger::new());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_slots));
        let mut handles = Vec::with_capacity(plan.len());

        for (slot_idx, (slot, spec)) in plan.slots.iter().zip(specs).enumerate() {
            let ctx = SlotCtx::new(request.name.clone(), positions[slot_idx], slot.clone());
            let flow = self.flow.clone();
            let ledger = ledger.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return SlotOutcome::Unfillable(UnmetReason::Cancelled),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return SlotOutcome::Unfillable(UnmetReason::Cancelled),
                    },
                };
                flow.run(&ctx, &spec, &ledger, &cancel).await
            });
            handles.push(handle);
        }

        // 等待所有槽位完成
        let mut outcomes = Vec::with_capacity(handles.len());
        for (slot_idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(
                        "[组卷 {}] [槽位 #{}] 任务执行失败: {}",
                        request.name, positions[slot_idx], e
                    );
                    outcomes.push(SlotOutcome::Unfillable(UnmetReason::GenerationFailed {
                        attempts: 0,
                        last_error: format!("任务执行失败: {}", e),
                    }));
                }
            }
        }

        let cancelled = outcomes
            .iter()
            .any(|o| matches!(o, SlotOutcome::Unfillable(UnmetReason::Cancelled)));

        let artifact = exam_assembler::assemble(
            &request.name,
            request.duration_minutes,
            total_points,
            &plan,
            &order,
            outcomes,
            cancelled,
        );

        check_provider_available(&artifact)?;

        log_exam_complete(&artifact);
        Ok(artifact)
    }
}

/// 没有任何题目且全部为永久性服务失败 → 服务整体不可用
fn check_provider_available(artifact: &ExamArtifact) -> AppResult<()> {
    if !artifact.items.is_empty() || artifact.unmet_slots.is_empty() {
        return Ok(());
    }
    if artifact
        .unmet_slots
        .iter()
        .all(|u| u.reason.is_permanent_provider_failure())
    {
        let last_error = artifact
            .unmet_slots
            .last()
            .map(|u| u.reason.to_string())
            .unwrap_or_default();
        error!(
            "[组卷 {}] ❌ 出题服务不可用，{} 个槽位全部失败",
            artifact.name,
            artifact.unmet_slots.len()
        );
        return Err(AppError::ProviderUnavailable {
            unmet: artifact.unmet_slots.len(),
            last_error,
        });
    }
    Ok(())
}

// ========== 日志辅助函数 ==========

fn log_exam_start(name: &str, slots: usize, total_points: &Points) {
    info!("\n{}", "─".repeat(60));
    info!("📄 开始组卷: {}", name);
    info!("📊 槽位数量: {} | 总分: {}", slots, total_points);
    info!("{}", "─".repeat(60));
}

fn log_exam_complete(artifact: &ExamArtifact) {
    let pool = artifact
        .items
        .iter()
        .filter(|i| i.question.source_kind == crate::models::SourceKind::Pool)
        .count();
    let generated = artifact.items.len() - pool;

    info!("\n{}", "─".repeat(60));
    info!("📊 组卷 {} 统计:", artifact.name);
    info!("  题库题目: {}", pool);
    info!("  生成题目: {}", generated);
    info!("  未满足槽位: {}", artifact.unmet_slots.len());
    if artifact.cancelled {
        warn!("  ⚠️ 组卷已取消，结果不完整");
    }
    if artifact.is_complete() {
        info!("✅ 组卷完成，总分 {}", artifact.total_points);
    } else {
        warn!(
            "⚠️ 组卷部分完成: {}/{} 道",
            artifact.items.len(),
            artifact.slot_count()
        );
    }
    info!("{}", "─".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use crate::models::{Slot, UnmetSlot};
    use chrono::Utc;

    fn unmet(reason: UnmetReason) -> UnmetSlot {
        UnmetSlot {
            position: 1,
            slot: Slot {
                chapter_id: 1,
                difficulty: Difficulty::Easy,
                topic_hint: None,
                weight: 1,
            },
            points: Points::from_units(100, 2),
            reason,
        }
    }

    fn artifact(unmet_slots: Vec<UnmetSlot>) -> ExamArtifact {
        ExamArtifact {
            name: "t".to_string(),
            duration_minutes: 0,
            total_points: Points::from_units(100, 2),
            items: vec![],
            unmet_slots,
            cancelled: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_all_permanent_failures_is_unavailable() {
        let a = artifact(vec![unmet(UnmetReason::ProviderFailure {
            kind: ProviderErrorKind::BadRequest,
            message: "invalid api key".to_string(),
        })]);
        assert!(matches!(
            check_provider_available(&a),
            Err(AppError::ProviderUnavailable { unmet: 1, .. })
        ));
    }

    #[test]
    fn test_mixed_failures_are_partial_success() {
        let a = artifact(vec![
            unmet(UnmetReason::ProviderFailure {
                kind: ProviderErrorKind::ContentPolicy,
                message: "blocked".to_string(),
            }),
            unmet(UnmetReason::QuotaExceeded { used: 5, quota: 5 }),
        ]);
        assert!(check_provider_available(&a).is_ok());
    }
}
