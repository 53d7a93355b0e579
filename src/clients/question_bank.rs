//! 题库访问能力
//!
//! 核心只通过 查询 / 保存 两个约定访问题库，持久化细节由协作方负责

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Mutex, MutexGuard};

use crate::error::BankError;
use crate::models::{max_bank_ordinal, Difficulty, QuestionRecord, BANK_ID_PREFIX};

/// 题库
pub trait QuestionBank: Send + Sync {
    /// 按 章节 + 难度（+ 可选知识点）查询
    fn query<'a>(
        &'a self,
        chapter_id: u32,
        difficulty: Difficulty,
        topic: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<QuestionRecord>, BankError>>;

    /// 保存题目，返回题库分配的 id
    fn save(&self, record: QuestionRecord) -> BoxFuture<'_, Result<String, BankError>>;
}

/// 内存题库（从 TOML 加载，也用于测试）
pub struct InMemoryQuestionBank {
    inner: Mutex<BankState>,
}

struct BankState {
    records: Vec<QuestionRecord>,
    /// 下一个分配的 `bank-N` 序号，只增不减
    next_ordinal: u64,
}

impl InMemoryQuestionBank {
    pub fn new(records: Vec<QuestionRecord>) -> Self {
        let next_ordinal = max_bank_ordinal(&records).max(records.len() as u64) + 1;
        Self {
            inner: Mutex::new(BankState {
                records,
                next_ordinal,
            }),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn lock(&self) -> MutexGuard<'_, BankState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// 全部题目的副本
    pub fn snapshot(&self) -> Vec<QuestionRecord> {
        self.lock().records.clone()
    }
}

impl QuestionBank for InMemoryQuestionBank {
    fn query<'a>(
        &'a self,
        chapter_id: u32,
        difficulty: Difficulty,
        topic: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<QuestionRecord>, BankError>> {
        let matches = self
            .lock()
            .records
            .iter()
            .filter(|r| r.chapter_id == chapter_id && r.difficulty == difficulty)
            .filter(|r| topic.map_or(true, |t| r.topic == t))
            .cloned()
            .collect::<Vec<_>>();
        async move { Ok(matches) }.boxed()
    }

    fn save(&self, mut record: QuestionRecord) -> BoxFuture<'_, Result<String, BankError>> {
        let id = {
            let mut state = self.lock();
            let id = format!("{}{}", BANK_ID_PREFIX, state.next_ordinal);
            state.next_ordinal += 1;
            record.id = id.clone();
            state.records.push(record);
            id
        };
        async move { Ok(id) }.boxed()
    }
}
