use serde::{Deserialize, Serialize};

/// 难度等级
///
/// 排序即固定的平局顺序：简单 < 中等 < 困难
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// 按固定顺序列出全部难度
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// 难度序号（0, 1, 2），用于计算难度距离
    pub fn rank(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
        }
    }

    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Easy => "简单",
            Difficulty::Medium => "中等",
            Difficulty::Hard => "困难",
        }
    }

    /// 英文标识（用于提示词与指纹）
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// 宽松解析（支持中英文）
    pub fn find(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "简单" | "易" => Some(Difficulty::Easy),
            "medium" | "中等" | "中" => Some(Difficulty::Medium),
            "hard" | "困难" | "难" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 难度分布（百分比，必须合计 100）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyDistribution {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl DifficultyDistribution {
    pub fn new(easy: u32, medium: u32, hard: u32) -> Self {
        Self { easy, medium, hard }
    }

    /// 三项之和（按 u64 计算，不会溢出）
    pub fn sum(&self) -> u64 {
        self.easy as u64 + self.medium as u64 + self.hard as u64
    }

    /// 获取某个难度的百分比
    pub fn percent(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }
}

fn default_weight() -> u32 {
    1
}

/// 章节需求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRequirement {
    pub chapter_id: u32,
    /// 题量（有符号，非正数在规划阶段报错）
    pub question_count: i64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl ChapterRequirement {
    pub fn new(chapter_id: u32, question_count: i64) -> Self {
        Self {
            chapter_id,
            question_count,
            topics: Vec::new(),
            weight: default_weight(),
        }
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// 槽位：需要恰好一道题来填充的 (章节, 难度) 单元
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub chapter_id: u32,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_hint: Option<String>,
    pub weight: u32,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.topic_hint {
            Some(topic) => write!(f, "章节{}/{}/{}", self.chapter_id, self.difficulty, topic),
            None => write!(f, "章节{}/{}", self.chapter_id, self.difficulty),
        }
    }
}

/// 槽位计划
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPlan {
    /// 章节顺序（与请求一致）
    pub chapter_order: Vec<u32>,
    /// 按章节、难度分组的槽位
    pub slots: Vec<Slot>,
}

impl SlotPlan {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 某章节的槽位数
    pub fn count_for_chapter(&self, chapter_id: u32) -> usize {
        self.slots
            .iter()
            .filter(|s| s.chapter_id == chapter_id)
            .count()
    }

    /// 某章节某难度的槽位数
    pub fn count_for(&self, chapter_id: u32, difficulty: Difficulty) -> usize {
        self.slots
            .iter()
            .filter(|s| s.chapter_id == chapter_id && s.difficulty == difficulty)
            .count()
    }

    /// 某难度在整卷中的槽位数
    pub fn count_for_difficulty(&self, difficulty: Difficulty) -> usize {
        self.slots
            .iter()
            .filter(|s| s.difficulty == difficulty)
            .count()
    }
}
