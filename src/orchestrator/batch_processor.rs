//! 批量组卷处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量组卷请求的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：初始化日志文件、选择出题服务、加载题库、创建配额跟踪器
//! 2. **批量加载**：扫描并加载所有组卷请求（`Vec<ExamRequest>`）
//! 3. **并发控制**：使用 Semaphore 限制同时组卷的数量
//! 4. **分批处理**：将请求分批次处理，每批完成后再开始下一批
//! 5. **结果输出**：试卷写入 JSON，未满足槽位写入 warn.txt
//! 6. **全局统计**：汇总所有请求的处理结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单张试卷的细节，委托 `ExamBuilder`
//! - **资源所有者**：唯一创建配额跟踪器和生成缓存的模块

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::{build_provider, build_reviewer, InMemoryQuestionBank, QuestionBank};
use crate::config::Config;
use crate::infrastructure::{QuotaLimits, QuotaTracker};
use crate::models::{load_all_exam_requests, load_question_bank, ExamArtifact, ExamRequest};
use crate::orchestrator::exam_processor::ExamBuilder;
use crate::services::WarnWriter;
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    builder: ExamBuilder,
    warn_writer: Arc<WarnWriter>,
    cancel: CancellationToken,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;

        logging::log_startup(config.max_concurrent_exams);

        // 选择出题服务
        let provider = build_provider(&config).context("出题服务配置错误")?;
        let reviewer = build_reviewer(&config).context("质检服务配置错误")?;
        info!(
            "🤖 出题服务: {} (模型 {})",
            provider.name(),
            provider.model()
        );

        // 加载题库
        let bank = load_bank(&config.bank_file).await?;

        let quota = QuotaTracker::new(QuotaLimits {
            rate_limit_per_minute: config.rate_limit_per_minute,
            daily_quota: config.daily_quota,
        });

        let builder = ExamBuilder::with_reviewer(bank, provider, reviewer, quota, &config);

        Ok(Self::with_builder(config, builder))
    }

    /// 使用已创建的组卷器
    pub fn with_builder(config: Config, builder: ExamBuilder) -> Self {
        let warn_writer = Arc::new(WarnWriter::with_path(config.warn_file.clone()));
        Self {
            config,
            builder,
            warn_writer,
            cancel: CancellationToken::new(),
        }
    }

    /// 取消令牌（取消后不再开始新的出题，已完成的部分照常输出）
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<ProcessingStats> {
        // 加载所有组卷请求
        let all_requests = self.load_requests().await?;

        if all_requests.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(ProcessingStats::default());
        }

        let total = all_requests.len();
        logging::log_requests_loaded(total, self.config.max_concurrent_exams);

        tokio::fs::create_dir_all(&self.config.output_folder)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.config.output_folder))?;

        // 处理所有请求
        let stats = self.process_all_requests(all_requests).await?;

        // 输出最终统计
        logging::print_final_stats(
            stats.complete,
            stats.partial,
            stats.failed,
            stats.total,
            &self.config.output_log_file,
        );

        let quota = self.builder.quota_snapshot();
        info!(
            "📈 配额使用: 今日 {}/{}，本分钟 {}/{}",
            quota.used_today,
            quota.daily_quota,
            quota.requests_this_minute,
            quota.rate_limit_per_minute
        );

        Ok(stats)
    }

    /// 加载组卷请求
    async fn load_requests(&self) -> Result<Vec<ExamRequest>> {
        info!("\n📁 正在扫描待处理的组卷请求...");
        Ok(load_all_exam_requests(&self.config.request_folder).await?)
    }

    /// 处理所有请求
    async fn process_all_requests(&self, all_requests: Vec<ExamRequest>) -> Result<ProcessingStats> {
        let batch_size = self.config.max_concurrent_exams.max(1);
        let semaphore = Arc::new(Semaphore::new(batch_size));
        let total = all_requests.len();
        let mut stats = ProcessingStats {
            total,
            ..Default::default()
        };

        // 分批处理
        for batch_start in (0..total).step_by(batch_size) {
            let batch_end = (batch_start + batch_size).min(total);
            let batch_num = (batch_start / batch_size) + 1;
            let total_batches = total.div_ceil(batch_size);

            logging::log_batch_start(batch_num, total_batches, batch_start + 1, batch_end, total);

            let batch_stats = self
                .process_batch(&all_requests[batch_start..batch_end], batch_start, semaphore.clone())
                .await?;

            logging::log_batch_complete(
                batch_num,
                batch_stats.complete + batch_stats.partial,
                batch_end - batch_start,
            );

            stats.complete += batch_stats.complete;
            stats.partial += batch_stats.partial;
            stats.failed += batch_stats.failed;

            if self.cancel.is_cancelled() {
                warn!("⚠️ 已取消，剩余请求不再处理");
                stats.failed += total - batch_end;
                break;
            }
        }

        Ok(stats)
    }

    /// 处理单个批次
    async fn process_batch(
        &self,
        batch_requests: &[ExamRequest],
        batch_start: usize,
        semaphore: Arc<Semaphore>,
    ) -> Result<ProcessingStats> {
        let mut batch_handles = Vec::new();

        // 为本批创建并发任务
        for (idx, request) in batch_requests.iter().enumerate() {
            let exam_index = batch_start + idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;

            let builder = self.builder.clone();
            let warn_writer = self.warn_writer.clone();
            let request = request.clone();
            let output_folder = self.config.output_folder.clone();
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let artifact = builder.assemble(&request, &cancel).await.map_err(|e| {
                    error!("[组卷 {}] ❌ 组卷失败: {}", request.name, e);
                    anyhow::Error::from(e)
                })?;

                let path = write_artifact(&output_folder, &request, &artifact).await?;
                info!("[组卷 {}] 💾 试卷已保存: {}", request.name, path.display());

                for unmet in &artifact.unmet_slots {
                    if let Err(e) = warn_writer.write(&artifact.name, unmet).await {
                        warn!("[组卷 {}] ⚠️ 写入 warn.txt 失败: {}", request.name, e);
                    }
                }

                Ok::<bool, anyhow::Error>(artifact.is_complete())
            });
            batch_handles.push((exam_index, handle));
        }

        // 等待本批所有任务完成
        let mut result = ProcessingStats {
            total: batch_requests.len(),
            ..Default::default()
        };

        for (exam_index, handle) in batch_handles {
            match handle.await {
                Ok(Ok(true)) => result.complete += 1,
                Ok(Ok(false)) => result.partial += 1,
                Ok(Err(_)) => result.failed += 1,
                Err(e) => {
                    error!("[组卷 #{}] 任务执行失败: {}", exam_index, e);
                    result.failed += 1;
                }
            }
        }

        Ok(result)
    }
}

/// 处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStats {
    /// 全部槽位已填充
    pub complete: usize,
    /// 有未满足槽位或被取消
    pub partial: usize,
    pub failed: usize,
    pub total: usize,
}

/// 加载题库，文件不存在时使用空题库
async fn load_bank(bank_file: &str) -> Result<Arc<dyn QuestionBank>> {
    let path = Path::new(bank_file);
    if !path.exists() {
        warn!("⚠️ 题库文件 {} 不存在，使用空题库（全部题目将由出题服务生成）", bank_file);
        return Ok(Arc::new(InMemoryQuestionBank::empty()));
    }

    let records = load_question_bank(path)
        .await
        .with_context(|| format!("无法加载题库: {}", bank_file))?;
    info!("📚 题库加载完成，共 {} 道题", records.len());
    Ok(Arc::new(InMemoryQuestionBank::new(records)))
}

/// 试卷写入 JSON 文件，文件名取请求文件名（没有则取试卷名称）
async fn write_artifact(
    output_folder: &str,
    request: &ExamRequest,
    artifact: &ExamArtifact,
) -> Result<PathBuf> {
    let stem = request
        .file_path
        .as_deref()
        .and_then(|p| Path::new(p).file_stem())
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| sanitize_file_name(&request.name));

    let path = Path::new(output_folder).join(format!("{}.json", stem));
    let json = serde_json::to_string_pretty(artifact)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("无法写入试卷文件: {}", path.display()))?;
    Ok(path)
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
