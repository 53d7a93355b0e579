//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量组卷处理器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载组卷请求（Vec<ExamRequest>）
//! - 控制并发数量（Semaphore）
//! - 创建共享资源（配额跟踪器、生成缓存）
//! - 输出全局统计信息
//!
//! ### `exam_processor` - 单张试卷处理器
//! - 规划槽位（Vec<Slot>）
//! - 并发执行 SlotFlow
//! - 判定整体失败
//!
//! ### `exam_assembler` - 试卷拼装
//! - 出题顺序
//! - 分值分配
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<ExamRequest>)
//!     ↓
//! exam_processor (处理 Vec<Slot>)
//!     ↓
//! workflow::SlotFlow (处理单个 Slot)
//!     ↓
//! services (能力层：规划 / 选题 / 出题 / 质检 / warn)
//!     ↓
//! infrastructure (基础设施：配额、单飞缓存)
//! ```

pub mod batch_processor;
pub mod exam_assembler;
pub mod exam_processor;

// 重新导出主要类型
pub use batch_processor::{App, ProcessingStats};
pub use exam_processor::ExamBuilder;
