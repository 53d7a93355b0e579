//! 出题编排服务 - 业务能力层
//!
//! 负责"按要求拿到一道通过质检的生成题"：
//! 1. 计算指纹，缓存命中直接返回（不占配额）
//! 2. 相同指纹已有调用在进行中，等待其结果（成功或失败都复用）
//! 3. 预留配额，被拒绝时直接返回 `RateLimited` / `QuotaExceeded`
//! 4. 带超时调用出题服务，临时失败按退避重试，第 4 次去掉知识点，第 5 次再去掉附加要求
//! 5. 成功后计入用量、写入缓存，再经过质检；不通过则作废缓存并重出
//!
//! 每次外部调用在独立任务中执行：调用方被取消时调用仍会完成并写入缓存

use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clients::{GeneratedQuestion, QuestionProvider};
use crate::config::Config;
use crate::error::{GenerationError, ProviderError, ProviderErrorKind};
use crate::infrastructure::{FlightCache, Lookup, QuotaDenial, QuotaSnapshot, QuotaTracker};
use crate::models::{CandidateQuestion, GenerationSpec, SourceKind};
use crate::services::prompt::{self, PromptSettings};
use crate::services::quality_validator::{QualityValidator, Verdict};
use crate::services::retry::{AttemptState, LastFailure, RetryPolicy};
use crate::utils::truncate_text;

/// 生成题缓存
pub type GenerationCache = FlightCache<CandidateQuestion, GenerationError>;

/// 批量出题参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// 串行模式下相邻请求的间隔
    pub delay: Duration,
    /// 最大并发，1 表示严格串行
    pub concurrency: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            concurrency: 1,
        }
    }
}

/// 出题编排服务
///
/// `Clone` 后共享同一份缓存与配额状态
#[derive(Clone)]
pub struct GenerationService {
    provider: Arc<dyn QuestionProvider>,
    quota: QuotaTracker,
    cache: GenerationCache,
    validator: QualityValidator,
    policy: RetryPolicy,
    prompt_settings: PromptSettings,
    request_timeout: Duration,
    batch: BatchSettings,
    sequence: Arc<AtomicU64>,
}

impl GenerationService {
    pub fn new(
        provider: Arc<dyn QuestionProvider>,
        quota: QuotaTracker,
        validator: QualityValidator,
        config: &Config,
    ) -> Self {
        let prompt_settings = PromptSettings {
            model: provider.model().to_string(),
            max_tokens: config.llm_max_tokens,
            temperature: config.llm_temperature,
        };
        Self {
            provider,
            quota,
            cache: GenerationCache::new(config.cache_ttl()),
            validator,
            policy: RetryPolicy::from_config(config),
            prompt_settings,
            request_timeout: config.request_timeout(),
            batch: BatchSettings {
                delay: config.batch_delay(),
                concurrency: config.batch_concurrency.max(1),
            },
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// 共享已有的缓存（多个编排器共用同一份生成结果）
    pub fn with_cache(mut self, cache: GenerationCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &GenerationCache {
        &self.cache
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// 当前服务的配额快照
    pub fn quota_snapshot(&self) -> QuotaSnapshot {
        self.quota.current_usage(self.provider.name())
    }

    /// 出一道通过质检的题
    pub async fn generate_validated(
        &self,
        spec: &GenerationSpec,
        cancel: &CancellationToken,
    ) -> Result<CandidateQuestion, GenerationError> {
        let mut state = AttemptState::new();

        loop {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }

            let attempt = state.begin();
            let effective = spec.relaxed(self.policy.relaxation(attempt));
            let fingerprint = effective.fingerprint(self.provider.model());

            debug!(
                "出题第 {}/{} 次尝试 (章节 {}, {}, 指纹 {})",
                attempt,
                self.policy.max_attempts,
                effective.chapter_id,
                effective.difficulty.name(),
                &fingerprint[..12]
            );

            match self.generate_once(&effective, &fingerprint, cancel).await {
                Ok(candidate) => {
                    let verdict = self
                        .validator
                        .evaluate(&candidate, spec.difficulty, spec.include_explanation)
                        .await;
                    match verdict {
                        Verdict::Accepted(score) => {
                            info!(
                                "✓ 生成题通过质检 (得分 {:.2}): {}",
                                score.overall,
                                truncate_text(&candidate.text, 40)
                            );
                            return Ok(candidate.with_quality(score));
                        }
                        Verdict::Rejected { score, reasons } => {
                            warn!(
                                "⚠️ 生成题未通过质检 (得分 {:.2}, 第 {} 次): {}",
                                score.overall,
                                attempt,
                                reasons.join("; ")
                            );
                            // 不通过的结果不能再被复用
                            self.cache.invalidate(&fingerprint);
                            state.record_rejection(reasons);
                        }
                    }
                }
                Err(GenerationError::Provider(e)) if e.is_transient() => {
                    warn!("⚠️ 出题调用临时失败 (第 {} 次): {}", attempt, e);
                    state.record_transient(e.to_string());

                    if state.has_remaining(&self.policy) {
                        let delay = self.policy.backoff(attempt);
                        debug!("等待 {:?} 后重试", delay);
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                Err(e) => return Err(e),
            }

            if !state.has_remaining(&self.policy) {
                return Err(exhausted(&state));
            }
        }
    }

    /// 按指纹拿一次结果（缓存 / 等待 / 领头调用）
    ///
    /// 取消时立即返回，已发出的调用留在后台完成并写入缓存
    async fn generate_once(
        &self,
        spec: &GenerationSpec,
        fingerprint: &str,
        cancel: &CancellationToken,
    ) -> Result<CandidateQuestion, GenerationError> {
        loop {
            match self.cache.lookup(fingerprint) {
                Lookup::Hit(candidate) => {
                    debug!("生成缓存命中: {}", &fingerprint[..12]);
                    return Ok(candidate);
                }
                Lookup::Wait(waiter) => {
                    debug!("等待进行中的相同调用: {}", &fingerprint[..12]);
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                        outcome = waiter.wait() => outcome,
                    };
                    match outcome {
                        Some(result) => return result,
                        // 领头调用被放弃，重新查询
                        None => continue,
                    }
                }
                Lookup::Lead(leader) => {
                    let this = self.clone();
                    let spec = spec.clone();
                    let key = leader.key().to_string();
                    let handle = tokio::spawn(async move {
                        let result = this.call_provider(&spec, &key).await;
                        leader.complete(result.clone());
                        result
                    });
                    let joined = tokio::select! {
                        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                        joined = handle => joined,
                    };
                    return match joined {
                        Ok(result) => result,
                        Err(e) => Err(GenerationError::Provider(ProviderError::new(
                            ProviderErrorKind::Server,
                            format!("出题任务异常退出: {}", e),
                        ))),
                    };
                }
            }
        }
    }

    /// 一次实际的外部调用
    async fn call_provider(
        &self,
        spec: &GenerationSpec,
        fingerprint: &str,
    ) -> Result<CandidateQuestion, GenerationError> {
        let provider_name = self.provider.name().to_string();

        let reservation = self
            .quota
            .try_reserve(&provider_name)
            .map_err(|denial| match denial {
                QuotaDenial::RateLimited { retry_after_secs } => GenerationError::RateLimited {
                    provider: provider_name.clone(),
                    retry_after_secs,
                },
                QuotaDenial::QuotaExceeded { used, quota } => GenerationError::QuotaExceeded {
                    provider: provider_name.clone(),
                    used,
                    quota,
                },
            })?;

        let request = prompt::build_request(spec, &self.prompt_settings);
        let generated =
            match tokio::time::timeout(self.request_timeout, self.provider.generate(&request))
                .await
            {
                Ok(Ok(generated)) => generated,
                Ok(Err(e)) => return Err(GenerationError::Provider(e)),
                Err(_) => {
                    return Err(GenerationError::Provider(ProviderError::new(
                        ProviderErrorKind::Timeout,
                        format!("调用超过 {:?} 未返回", self.request_timeout),
                    )))
                }
            };

        // 服务已经返回内容，计入当日用量
        reservation.commit();

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        to_candidate(spec, fingerprint, seq, generated)
    }

    /// 批量出题，结果顺序与输入一致
    ///
    /// - 并发为 1：严格串行，相邻请求之间等待固定间隔
    /// - 并发大于 1：并发数不超过当前频率窗口的剩余名额
    ///
    /// 相同指纹的请求始终通过单飞缓存串行化
    pub async fn generate_batch(
        &self,
        specs: &[GenerationSpec],
        cancel: &CancellationToken,
    ) -> Vec<Result<CandidateQuestion, GenerationError>> {
        if self.batch.concurrency <= 1 {
            let mut results = Vec::with_capacity(specs.len());
            for (i, spec) in specs.iter().enumerate() {
                if i > 0 && !self.batch.delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.batch.delay) => {}
                    }
                }
                results.push(self.generate_validated(spec, cancel).await);
            }
            return results;
        }

        // 并发不超过本分钟和当日的剩余额度
        let quota = self.quota_snapshot();
        let headroom = quota
            .remaining_this_minute()
            .min(quota.remaining_today())
            .max(1) as usize;
        let concurrency = self.batch.concurrency.min(headroom);
        debug!(
            "批量出题: {} 道, 并发 {} (本分钟余量 {}, 今日余量 {})",
            specs.len(),
            concurrency,
            quota.remaining_this_minute(),
            quota.remaining_today()
        );

        stream::iter(specs.iter())
            .map(|spec| self.generate_validated(spec, cancel))
            .buffered(concurrency)
            .collect()
            .await
    }
}

/// 尝试次数用尽时的最终错误
fn exhausted(state: &AttemptState) -> GenerationError {
    match &state.last_failure {
        Some(LastFailure::Rejected(reasons)) => GenerationError::ValidationRejected {
            attempts: state.attempts,
            reasons: reasons.clone(),
        },
        Some(LastFailure::Transient(message)) => GenerationError::GenerationFailed {
            attempts: state.attempts,
            last_error: message.clone(),
        },
        None => GenerationError::GenerationFailed {
            attempts: state.attempts,
            last_error: "未知错误".to_string(),
        },
    }
}

/// 服务返回内容 → 候选题
fn to_candidate(
    spec: &GenerationSpec,
    fingerprint: &str,
    seq: u64,
    generated: GeneratedQuestion,
) -> Result<CandidateQuestion, GenerationError> {
    if generated.text.trim().is_empty() {
        return Err(GenerationError::Provider(ProviderError::new(
            ProviderErrorKind::Malformed,
            "返回的题干为空",
        )));
    }

    Ok(CandidateQuestion {
        id: format!("gen-{}-{}", &fingerprint[..12], seq),
        source_kind: SourceKind::Generated,
        chapter_id: spec.chapter_id,
        difficulty: generated.difficulty.unwrap_or(spec.difficulty),
        text: generated.text.trim().to_string(),
        choices: generated.choices,
        correct_choice: generated.correct_choice,
        answer: generated.answer,
        explanation: generated.explanation,
        topic: generated
            .topic
            .or_else(|| spec.topic.clone())
            .unwrap_or_default(),
        quality_score: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;

    fn generated(text: &str) -> GeneratedQuestion {
        GeneratedQuestion {
            text: text.to_string(),
            choices: vec!["A".into(), "B".into()],
            correct_choice: Some(1),
            answer: None,
            explanation: None,
            topic: None,
            difficulty: None,
        }
    }

    #[test]
    fn test_to_candidate_fills_defaults() {
        let spec = GenerationSpec::new(2, Difficulty::Medium).with_topic("电路");
        let fp = spec.fingerprint("m");
        let candidate = to_candidate(&spec, &fp, 7, generated("  串联电路中电流处处相等吗？ ")).unwrap();

        assert_eq!(candidate.source_kind, SourceKind::Generated);
        assert_eq!(candidate.difficulty, Difficulty::Medium);
        assert_eq!(candidate.topic, "电路");
        assert_eq!(candidate.text, "串联电路中电流处处相等吗？");
        assert!(candidate.id.ends_with("-7"));
    }

    #[test]
    fn test_empty_stem_is_malformed() {
        let spec = GenerationSpec::new(2, Difficulty::Medium);
        let fp = spec.fingerprint("m");
        let err = to_candidate(&spec, &fp, 1, generated("   ")).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Provider(ProviderError { kind: ProviderErrorKind::Malformed, .. })
        ));
    }

    #[test]
    fn test_exhausted_reports_last_failure() {
        let mut state = AttemptState::new();
        for _ in 0..5 {
            state.begin();
        }
        state.record_transient("timeout");
        state.record_rejection(vec!["难度不匹配".to_string()]);
        assert_eq!(
            exhausted(&state),
            GenerationError::ValidationRejected {
                attempts: 5,
                reasons: vec!["难度不匹配".to_string()]
            }
        );

        state.record_transient("timeout");
        assert!(matches!(
            exhausted(&state),
            GenerationError::GenerationFailed { attempts: 5, .. }
        ));
    }
}
