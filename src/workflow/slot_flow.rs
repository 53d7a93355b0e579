//! 槽位处理流程 - 流程层
//!
//! 核心职责：定义"一个槽位"的完整处理流程
//!
//! 流程顺序：
//! 1. 题库选题 →（可选）质检
//! 2. 出题服务生成 → 质检（不通过则重出，次数用尽为止）
//! 3.（可选）生成题保存回题库
//! 4. 都失败则记为未满足槽位

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::QuestionBank;
use crate::config::Config;
use crate::models::{CandidateQuestion, GenerationSpec, SlotOutcome, UnmetReason};
use crate::services::{
    GenerationService, PoolSelector, QualityValidator, SelectionLedger, Verdict,
};
use crate::utils::truncate_text;
use crate::workflow::slot_ctx::SlotCtx;

/// 槽位处理流程
///
/// - 编排完整的槽位处理流程
/// - 决定何时用题库、何时生成、何时放弃
/// - 不持有共享状态，只依赖业务能力（services）
#[derive(Clone)]
pub struct SlotFlow {
    selector: PoolSelector,
    generation: GenerationService,
    validator: QualityValidator,
    bank: Arc<dyn QuestionBank>,
    validate_pool_questions: bool,
    allow_generation: bool,
    persist_generated: bool,
    verbose_logging: bool,
}

impl SlotFlow {
    /// 创建新的槽位处理流程
    pub fn new(
        bank: Arc<dyn QuestionBank>,
        generation: GenerationService,
        validator: QualityValidator,
        config: &Config,
    ) -> Self {
        Self {
            selector: PoolSelector::new(bank.clone()),
            generation,
            validator,
            bank,
            validate_pool_questions: config.validate_pool_questions,
            allow_generation: config.allow_generation,
            persist_generated: config.persist_generated,
            verbose_logging: config.verbose_logging,
        }
    }

    pub async fn run(
        &self,
        ctx: &SlotCtx,
        spec: &GenerationSpec,
        ledger: &SelectionLedger,
        cancel: &CancellationToken,
    ) -> SlotOutcome {
        // ========== 流程 1: 题库选题 ==========
        if let Some(candidate) = self.select_from_pool(ctx, ledger).await {
            return SlotOutcome::Filled(candidate);
        }

        if !self.allow_generation {
            warn!("{} ⚠️ 题库无匹配，且未启用生成", ctx);
            return SlotOutcome::Unfillable(UnmetReason::NoPoolMatch);
        }

        if cancel.is_cancelled() {
            return SlotOutcome::Unfillable(UnmetReason::Cancelled);
        }

        // ========== 流程 2: 生成 ==========
        info!("{} 🤖 题库无匹配，调用出题服务...", ctx);

        match self.generation.generate_validated(spec, cancel).await {
            Ok(candidate) => {
                let candidate = self.persist(ctx, candidate, ledger).await;
                info!(
                    "{} ✓ 生成题已采用: {}",
                    ctx,
                    truncate_text(&candidate.text, 40)
                );
                SlotOutcome::Filled(candidate)
            }
            Err(e) => {
                warn!("{} ⚠️ 槽位无法填充: {}", ctx, e);
                SlotOutcome::Unfillable(UnmetReason::from(&e))
            }
        }
    }

    /// 从题库选题，启用题库质检时跳过不通过的题
    async fn select_from_pool(
        &self,
        ctx: &SlotCtx,
        ledger: &SelectionLedger,
    ) -> Option<CandidateQuestion> {
        loop {
            let candidate = match self.selector.select(&ctx.slot, ledger).await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => return None,
                Err(e) => {
                    error!("{} ⚠️ 题库查询失败，改为生成: {}", ctx, e);
                    return None;
                }
            };

            if self.verbose_logging {
                info!("{} 📚 题库候选: {}", ctx, candidate);
            }

            if !self.validate_pool_questions {
                info!("{} ✓ 使用题库题目 {}", ctx, candidate.id);
                return Some(candidate);
            }

            match self
                .validator
                .evaluate(&candidate, ctx.slot.difficulty, false)
                .await
            {
                Verdict::Accepted(score) => {
                    info!(
                        "{} ✓ 题库题目 {} 通过质检 (得分 {:.2})",
                        ctx, candidate.id, score.overall
                    );
                    return Some(candidate.with_quality(score));
                }
                Verdict::Rejected { score, reasons } => {
                    // 已占用的题不再释放，下一轮自然跳过
                    warn!(
                        "{} ⚠️ 题库题目 {} 未通过质检 (得分 {:.2}): {}",
                        ctx,
                        candidate.id,
                        score.overall,
                        reasons.join("; ")
                    );
                }
            }
        }
    }

    /// 保存生成题，拿到题库分配的 id
    async fn persist(
        &self,
        ctx: &SlotCtx,
        mut candidate: CandidateQuestion,
        ledger: &SelectionLedger,
    ) -> CandidateQuestion {
        if !self.persist_generated {
            return candidate;
        }
        match self.bank.save(candidate.to_record(Utc::now())).await {
            Ok(id) => {
                info!("{} 💾 生成题已保存到题库: {}", ctx, id);
                // 本次组卷的其他槽位不能再从题库选到它
                ledger.claim(&id);
                candidate.id = id;
            }
            Err(e) => {
                // 保存失败不影响本次组卷
                warn!("{} ⚠️ 生成题保存失败: {}", ctx, e);
            }
        }
        candidate
    }
}
