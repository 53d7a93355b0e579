//! 集成测试公共工具

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use exam_paper_builder::clients::{
    GeneratedQuestion, ProviderRequest, QuestionBank, QuestionProvider,
};
use exam_paper_builder::error::{BankError, ProviderError, ProviderErrorKind};
use exam_paper_builder::models::{
    ChapterRequirement, Difficulty, DifficultyDistribution, ExamRequest, QuestionRecord,
};
use exam_paper_builder::Config;

/// 可编排返回结果的出题服务
///
/// 按顺序消费 `script`，用完后返回默认的合格题目
pub struct ScriptedProvider {
    calls: AtomicUsize,
    delay: Duration,
    script: Mutex<VecDeque<Result<GeneratedQuestion, ProviderError>>>,
    fallback: Mutex<Option<Result<GeneratedQuestion, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用前等待
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 依次返回的结果
    pub fn with_script(self, script: Vec<Result<GeneratedQuestion, ProviderError>>) -> Self {
        *self.script.lock().unwrap() = script.into();
        self
    }

    /// 脚本用完后固定返回的结果
    pub fn always(self, result: Result<GeneratedQuestion, ProviderError>) -> Self {
        *self.fallback.lock().unwrap() = Some(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl QuestionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    fn generate<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> BoxFuture<'a, Result<GeneratedQuestion, ProviderError>> {
        async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.requests.lock().unwrap().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let scripted = self.script.lock().unwrap().pop_front();
            match scripted {
                Some(result) => result,
                None => match self.fallback.lock().unwrap().clone() {
                    Some(result) => result,
                    None => Ok(good_question(n)),
                },
            }
        }
        .boxed()
    }
}

/// 能通过质检的题目
pub fn good_question(n: usize) -> GeneratedQuestion {
    GeneratedQuestion {
        text: format!("第 {} 题：下列关于牛顿第一定律的说法正确的是？", n),
        choices: vec![
            "物体不受力时保持静止或匀速直线运动".to_string(),
            "物体运动需要力来维持".to_string(),
            "物体受力越大速度越大".to_string(),
            "物体的惯性与质量无关".to_string(),
        ],
        correct_choice: Some(0),
        answer: None,
        explanation: Some("惯性定律".to_string()),
        topic: None,
        difficulty: None,
    }
}

/// 必然不通过质检的题目（难度相差两级且正确选项越界）
pub fn bad_question() -> GeneratedQuestion {
    GeneratedQuestion {
        difficulty: Some(Difficulty::Hard),
        correct_choice: Some(9),
        ..good_question(0)
    }
}

pub fn transient(message: &str) -> ProviderError {
    ProviderError::new(ProviderErrorKind::Server, message)
}

pub fn permanent(message: &str) -> ProviderError {
    ProviderError::new(ProviderErrorKind::BadRequest, message)
}

/// 查询或保存总是失败的题库
pub struct FailingBank {
    pub fail_query: bool,
    pub fail_save: bool,
    saves: AtomicUsize,
}

impl FailingBank {
    pub fn new(fail_query: bool, fail_save: bool) -> Self {
        Self {
            fail_query,
            fail_save,
            saves: AtomicUsize::new(0),
        }
    }

    /// 尝试保存的次数（含失败）
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl QuestionBank for FailingBank {
    fn query<'a>(
        &'a self,
        chapter_id: u32,
        difficulty: Difficulty,
        _topic: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<QuestionRecord>, BankError>> {
        let result = if self.fail_query {
            Err(BankError::QueryFailed {
                chapter_id,
                difficulty,
                message: "connection reset".to_string(),
            })
        } else {
            Ok(Vec::new())
        };
        async move { result }.boxed()
    }

    fn save(&self, _record: QuestionRecord) -> BoxFuture<'_, Result<String, BankError>> {
        let n = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        let result = if self.fail_save {
            Err(BankError::SaveFailed {
                message: "disk full".to_string(),
            })
        } else {
            Ok(format!("saved-{}", n))
        };
        async move { result }.boxed()
    }
}

/// 重试间隔极短的配置
pub fn fast_config() -> Config {
    Config {
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 2,
        retry_jitter_ms: 0,
        batch_delay_ms: 0,
        request_timeout_secs: 5,
        ..Config::default()
    }
}

pub fn record(id: &str, chapter_id: u32, difficulty: Difficulty, topic: &str) -> QuestionRecord {
    QuestionRecord {
        id: id.to_string(),
        chapter_id,
        difficulty,
        text: format!("题库题目 {}：下列说法正确的是？", id),
        choices: vec![
            "选项甲".to_string(),
            "选项乙".to_string(),
            "选项丙".to_string(),
            "选项丁".to_string(),
        ],
        correct_choice: Some(1),
        answer: None,
        explanation: None,
        topic: topic.to_string(),
        usage_count: 0,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn request(
    name: &str,
    total_points: f64,
    distribution: (u32, u32, u32),
    chapters: Vec<ChapterRequirement>,
) -> ExamRequest {
    ExamRequest {
        name: name.to_string(),
        duration_minutes: 90,
        total_points,
        distribution: DifficultyDistribution::new(distribution.0, distribution.1, distribution.2),
        chapters,
        options: Default::default(),
        file_path: None,
    }
}
