//! 警告写入服务 - 业务能力层
//!
//! 只负责"写 warn.txt"能力，不关心流程

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

use crate::models::UnmetSlot;

/// 警告写入服务
///
/// 职责：
/// - 将无法填充的槽位写入 warn.txt
/// - 只处理单个槽位的警告
/// - 不关心流程顺序
pub struct WarnWriter {
    warn_file_path: String,
}

impl WarnWriter {
    /// 创建新的警告写入服务
    pub fn new() -> Self {
        Self {
            warn_file_path: "warn.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            warn_file_path: path.into(),
        }
    }

    /// 写入警告信息
    ///
    /// # 参数
    /// - `exam_name`: 试卷名称
    /// - `unmet`: 未满足的槽位
    pub async fn write(&self, exam_name: &str, unmet: &UnmetSlot) -> Result<()> {
        debug!(
            "写入警告: 试卷 {} | 槽位 {} | {}",
            exam_name, unmet.position, unmet.reason
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.warn_file_path)?;

        let warn_msg = format!(
            "试卷 {} | 槽位 #{} ({}) | 分值 {} | 原因: {}\n",
            exam_name, unmet.position, unmet.slot, unmet.points, unmet.reason
        );

        file.write_all(warn_msg.as_bytes())?;

        Ok(())
    }
}

impl Default for WarnWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, Points, Slot, UnmetReason};

    #[tokio::test]
    async fn test_append_unmet_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warn.txt");
        let writer = WarnWriter::with_path(path.to_string_lossy());

        let unmet = UnmetSlot {
            position: 3,
            slot: Slot {
                chapter_id: 2,
                difficulty: Difficulty::Hard,
                topic_hint: None,
                weight: 1,
            },
            points: Points::from_units(333, 2),
            reason: UnmetReason::NoPoolMatch,
        };

        writer.write("期中测试", &unmet).await.unwrap();
        writer.write("期中测试", &unmet).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("槽位 #3"));
        assert!(content.contains("3.33"));
    }
}
