//! # Exam Paper Builder
//!
//! 按章节与难度要求自动组卷的 Rust 应用程序：优先从题库选题，
//! 不足时调用出题服务生成并质检。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有共享状态，只暴露能力
//! - `QuotaTracker` - 每分钟限流与每日配额
//! - `FlightCache` - 按指纹去重的单飞缓存
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个槽位或单道题
//! - `matrix_planner` - 章节 × 难度的槽位规划
//! - `PoolSelector` - 题库选题能力
//! - `GenerationService` - 出题能力（缓存、配额、重试、放宽条件）
//! - `QualityValidator` - 质检能力
//! - `WarnWriter` - 写 warn.txt 能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个槽位"的完整处理流程
//! - `SlotCtx` - 上下文封装（试卷名 + 槽位位置）
//! - `SlotFlow` - 流程编排（题库 → 生成 → 质检 → 保存）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量组卷处理器，管理资源和并发
//! - `orchestrator/exam_processor` - 单张试卷处理器，并发填充槽位
//! - `orchestrator/exam_assembler` - 出题顺序与分值分配
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{InMemoryQuestionBank, QualityReviewer, QuestionBank, QuestionProvider};
pub use config::Config;
pub use error::{AppError, AppResult, GenerationError, PlanError};
pub use infrastructure::{QuotaLimits, QuotaTracker};
pub use models::{ExamArtifact, ExamRequest, GenerationSpec, SlotPlan};
pub use orchestrator::{App, ExamBuilder};
pub use services::{GenerationService, QualityValidator};
pub use workflow::{SlotCtx, SlotFlow};
