//! 题库选题 - 业务能力层
//!
//! 只负责"为一个槽位从题库挑一道题"，不关心生成与组卷

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::clients::QuestionBank;
use crate::error::BankError;
use crate::models::{CandidateQuestion, QuestionRecord, Slot};

/// 单次组卷内的已选题目集合
///
/// 检查与占用在同一把锁内完成，并发槽位不会拿到同一道题
#[derive(Debug, Default)]
pub struct SelectionLedger {
    claimed: Mutex<HashSet<String>>,
}

impl SelectionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 占用题目，已被占用时返回 false
    pub fn claim(&self, id: &str) -> bool {
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        claimed.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 题库选题服务
///
/// 选题顺序：
/// 1. 知识点完全匹配，其次同章节同难度的任意知识点
/// 2. 使用次数最少的优先，再按创建时间最早、id 升序
#[derive(Clone)]
pub struct PoolSelector {
    bank: Arc<dyn QuestionBank>,
}

impl PoolSelector {
    pub fn new(bank: Arc<dyn QuestionBank>) -> Self {
        Self { bank }
    }

    /// 查询候选题目（已排好序，已排除本次组卷中被选过的题）
    pub async fn find_candidates(
        &self,
        slot: &Slot,
        ledger: &SelectionLedger,
    ) -> Result<Vec<QuestionRecord>, BankError> {
        let mut candidates = Vec::new();

        if let Some(topic) = slot.topic_hint.as_deref() {
            let mut exact = self
                .bank
                .query(slot.chapter_id, slot.difficulty, Some(topic))
                .await?;
            sort_candidates(&mut exact);
            candidates.extend(exact);
        }

        let mut any_topic = self
            .bank
            .query(slot.chapter_id, slot.difficulty, None)
            .await?;
        sort_candidates(&mut any_topic);

        for record in any_topic {
            if !candidates.iter().any(|c: &QuestionRecord| c.id == record.id) {
                candidates.push(record);
            }
        }

        candidates.retain(|r| !ledger.contains(&r.id));
        Ok(candidates)
    }

    /// 为槽位选出一道题并占用
    ///
    /// 返回 `Ok(None)` 表示题库中没有可用的题（不是错误）
    pub async fn select(
        &self,
        slot: &Slot,
        ledger: &SelectionLedger,
    ) -> Result<Option<CandidateQuestion>, BankError> {
        let candidates = self.find_candidates(slot, ledger).await?;

        // 查询与占用之间可能被其他槽位抢先，占用失败就试下一道
        for record in candidates {
            if ledger.claim(&record.id) {
                debug!("题库选中 {} (槽位 {})", record.id, slot);
                return Ok(Some(CandidateQuestion::from(&record)));
            }
        }

        debug!("题库无可用题目 (槽位 {})", slot);
        Ok(None)
    }
}

fn sort_candidates(records: &mut [QuestionRecord]) {
    records.sort_by(|a, b| {
        a.usage_count
            .cmp(&b.usage_count)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}
