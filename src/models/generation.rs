use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::plan::{Difficulty, Slot};
use crate::models::exam::GenerationOptions;

/// 放宽程度（随尝试次数递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relaxation {
    /// 完整要求
    Full,
    /// 去掉知识点
    WithoutTopic,
    /// 去掉知识点和附加要求
    WithoutTopicAndInstructions,
}

/// 单道题的出题要求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSpec {
    pub chapter_id: u32,
    pub difficulty: Difficulty,
    pub topic: Option<String>,
    pub instructions: Option<String>,
    pub include_explanation: bool,
    /// 同一次组卷中相同要求的第几道（0 起）
    pub variant: u32,
}

impl GenerationSpec {
    pub fn new(chapter_id: u32, difficulty: Difficulty) -> Self {
        Self {
            chapter_id,
            difficulty,
            topic: None,
            instructions: None,
            include_explanation: false,
            variant: 0,
        }
    }

    /// 由槽位和组卷选项构造
    pub fn for_slot(slot: &Slot, options: &GenerationOptions, variant: u32) -> Self {
        Self {
            chapter_id: slot.chapter_id,
            difficulty: slot.difficulty,
            topic: slot.topic_hint.clone(),
            instructions: options.instructions.clone(),
            include_explanation: options.include_explanation,
            variant,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_variant(mut self, variant: u32) -> Self {
        self.variant = variant;
        self
    }

    /// 变体序号的分组键
    ///
    /// 不含知识点：放宽后去掉知识点的两个槽位仍然拿到不同的指纹
    pub fn variant_key(&self) -> (u32, Difficulty) {
        (self.chapter_id, self.difficulty)
    }

    /// 按放宽程度生成实际使用的要求
    pub fn relaxed(&self, relaxation: Relaxation) -> Self {
        let mut spec = self.clone();
        match relaxation {
            Relaxation::Full => {}
            Relaxation::WithoutTopic => {
                spec.topic = None;
            }
            Relaxation::WithoutTopicAndInstructions => {
                spec.topic = None;
                spec.instructions = None;
            }
        }
        spec
    }

    /// 生成指纹：sha256(章节, 难度, 知识点, 附加要求, 模型, 变体)
    pub fn fingerprint(&self, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.chapter_id.to_le_bytes());
        hasher.update([0x1f]);
        hasher.update(self.difficulty.as_str().as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.topic.as_deref().unwrap_or("").as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.instructions.as_deref().unwrap_or("").as_bytes());
        hasher.update([0x1f]);
        hasher.update(model.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.variant.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}
