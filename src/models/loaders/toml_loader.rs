use crate::error::{AppError, AppResult, FileError};
use crate::models::exam::ExamRequest;
use crate::models::question::{max_bank_ordinal, QuestionRecord, BANK_ID_PREFIX};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 题库文件结构
#[derive(Debug, Deserialize)]
struct QuestionBankFile {
    #[serde(default)]
    questions: Vec<QuestionRecord>,
}

async fn read_toml_text(path: &Path) -> AppResult<String> {
    fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))
}

fn parse_toml<T: serde::de::DeserializeOwned>(path: &Path, content: &str) -> AppResult<T> {
    toml::from_str(content).map_err(|e| {
        AppError::File(FileError::TomlParseFailed {
            path: path.display().to_string(),
            source: e,
        })
    })
}

/// 从 TOML 文件加载组卷请求
pub async fn load_exam_request(toml_file_path: &Path) -> AppResult<ExamRequest> {
    let content = read_toml_text(toml_file_path).await?;
    let request: ExamRequest = parse_toml(toml_file_path, &content)?;

    Ok(request.with_file_path(toml_file_path.to_string_lossy().to_string()))
}

/// 从文件夹中加载所有组卷请求（按文件名排序）
///
/// 解析失败的文件只记录警告，不中断其他文件的加载
pub async fn load_all_exam_requests(folder_path: &str) -> AppResult<Vec<ExamRequest>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(AppError::File(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }));
    }

    let mut entries = fs::read_dir(&folder)
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?;

    let mut toml_files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::file_read_failed(folder_path, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut requests = Vec::new();
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_exam_request(&path).await {
            Ok(request) => {
                let chapter_count = request.chapters.len();
                tracing::info!("成功加载组卷请求, 共 {} 个章节", chapter_count);
                requests.push(request);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(requests)
}

/// 从 TOML 文件加载题库
///
/// 没有 id 的题目按出现顺序分配 `bank-N`，序号从文件中已有的最大 `bank-N` 之后开始
pub async fn load_question_bank(toml_file_path: &Path) -> AppResult<Vec<QuestionRecord>> {
    let content = read_toml_text(toml_file_path).await?;
    let bank: QuestionBankFile = parse_toml(toml_file_path, &content)?;

    let mut next = max_bank_ordinal(&bank.questions) + 1;
    let records = bank
        .questions
        .into_iter()
        .map(|mut record| {
            if record.id.trim().is_empty() {
                record.id = format!("{}{}", BANK_ID_PREFIX, next);
                next += 1;
            }
            record
        })
        .collect::<Vec<_>>();

    tracing::info!(
        "成功加载题库 {}: {} 道题",
        toml_file_path.display(),
        records.len()
    );

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;

    const REQUEST_TOML: &str = r#"
name = "第一单元测验"
duration_minutes = 45
total_points = 100

[distribution]
easy = 30
medium = 50
hard = 20

[[chapters]]
chapter_id = 1
question_count = 6
topics = ["力", "运动"]

[[chapters]]
chapter_id = 2
question_count = 4
weight = 2

[options]
balance_topics = true

[options.generation]
instructions = "使用国际单位制"
include_explanation = true
"#;

    const BANK_TOML: &str = r#"
[[questions]]
chapter_id = 1
difficulty = "easy"
text = "物体的质量单位是什么？"
choices = ["千克", "牛顿", "米", "秒"]
correct_choice = 0
topic = "力"
usage_count = 3
created_at = "2024-03-01T08:00:00Z"

[[questions]]
id = "q-2"
chapter_id = 2
difficulty = "hard"
text = "简述牛顿第三定律。"
answer = "作用力与反作用力大小相等、方向相反。"
created_at = "2024-03-02T08:00:00Z"
"#;

    #[tokio::test]
    async fn test_load_exam_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit1.toml");
        std::fs::write(&path, REQUEST_TOML).unwrap();

        let request = load_exam_request(&path).await.unwrap();
        assert_eq!(request.name, "第一单元测验");
        assert_eq!(request.chapters.len(), 2);
        assert_eq!(request.chapters[0].weight, 1);
        assert_eq!(request.chapters[1].weight, 2);
        assert_eq!(request.chapters[0].topics, vec!["力", "运动"]);
        assert!(request.options.balance_topics);
        assert!(request.options.generation.include_explanation);
        assert!(request.file_path.is_some());
    }

    #[tokio::test]
    async fn test_load_all_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.toml"), REQUEST_TOML).unwrap();
        std::fs::write(dir.path().join("b.toml"), "name = ").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let folder = dir.path().to_string_lossy().to_string();
        let requests = load_all_exam_requests(&folder).await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_folder() {
        let result = load_all_exam_requests("/definitely/not/here").await;
        assert!(matches!(
            result,
            Err(AppError::File(FileError::DirectoryNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_load_question_bank_assigns_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.toml");
        std::fs::write(&path, BANK_TOML).unwrap();

        let records = load_question_bank(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "bank-1");
        assert_eq!(records[0].difficulty, Difficulty::Easy);
        assert_eq!(records[0].usage_count, 3);
        assert_eq!(records[1].id, "q-2");
        assert!(records[1].choices.is_empty());
    }

    #[tokio::test]
    async fn test_assigned_ids_skip_explicit_bank_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.toml");
        let content = r#"
[[questions]]
chapter_id = 1
difficulty = "easy"
text = "甲"
answer = "甲"
created_at = "2024-03-01T08:00:00Z"

[[questions]]
id = "bank-1"
chapter_id = 1
difficulty = "easy"
text = "乙"
answer = "乙"
created_at = "2024-03-01T08:00:00Z"
"#;
        std::fs::write(&path, content).unwrap();

        let records = load_question_bank(&path).await.unwrap();
        assert_eq!(records[0].id, "bank-2");
        assert_eq!(records[1].id, "bank-1");
    }
}
