//! 槽位处理上下文
//!
//! 封装"我正在处理哪张卷子的第几个槽位"这一信息

use std::fmt::Display;

use crate::models::Slot;

/// 槽位处理上下文
#[derive(Debug, Clone)]
pub struct SlotCtx {
    /// 试卷名称（仅用于日志显示）
    pub exam_name: String,

    /// 槽位在出题顺序中的位置（从1开始）
    pub position: usize,

    pub slot: Slot,
}

impl SlotCtx {
    /// 创建新的槽位上下文
    pub fn new(exam_name: impl Into<String>, position: usize, slot: Slot) -> Self {
        Self {
            exam_name: exam_name.into(),
            position,
            slot,
        }
    }
}

impl Display for SlotCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[组卷 {}] [槽位 #{}]", self.exam_name, self.position)
    }
}
