//! 出题提示词
//!
//! 模板内容不是核心约定，只要求把出题要求完整传给出题服务

use crate::clients::ProviderRequest;
use crate::models::GenerationSpec;

const SYSTEM_PROMPT: &str = "你是一名经验丰富的命题老师。请严格按照要求出一道原创题目，只返回一个 JSON 对象，不要返回任何其他内容。";

/// 出题调用参数
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// 根据出题要求构建请求
pub fn build_request(spec: &GenerationSpec, settings: &PromptSettings) -> ProviderRequest {
    let mut prompt = format!(
        "请为第 {} 章出一道{}难度（{}）的单项选择题。\n",
        spec.chapter_id,
        spec.difficulty.name(),
        spec.difficulty.as_str()
    );

    if let Some(topic) = spec.topic.as_deref() {
        prompt.push_str(&format!("知识点：{}\n", topic));
    }
    if let Some(instructions) = spec.instructions.as_deref() {
        prompt.push_str(&format!("附加要求：{}\n", instructions));
    }
    if spec.variant > 0 {
        // 相同要求的多道题需要互不相同
        prompt.push_str(&format!(
            "这是同类题目中的第 {} 道，请换一个考查角度。\n",
            spec.variant + 1
        ));
    }

    prompt.push_str(
        r#"
【出题要求】
1. 恰好 4 个选项，选项互不相同，不要使用"以上都对""以上都不对"之类的选项
2. 只有一个正确选项，correct_choice 为正确选项的下标（从 0 开始）
3. 题干中不要出现答案
"#,
    );

    let explanation_field = if spec.include_explanation {
        prompt.push_str("4. 必须给出解析\n");
        r#", "explanation": "..." "#
    } else {
        ""
    };

    prompt.push_str(&format!(
        r#"
返回格式：{{"text": "...", "choices": ["...", "...", "...", "..."], "correct_choice": 0, "topic": "...", "difficulty": "{}"{}}}"#,
        spec.difficulty.as_str(),
        explanation_field
    ));

    ProviderRequest {
        system_prompt: SYSTEM_PROMPT.to_string(),
        prompt,
        model: settings.model.clone(),
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;

    fn settings() -> PromptSettings {
        PromptSettings {
            model: "test-model".to_string(),
            max_tokens: 512,
            temperature: 0.5,
        }
    }

    #[test]
    fn test_prompt_carries_spec() {
        let spec = GenerationSpec::new(3, Difficulty::Hard)
            .with_topic("电磁感应")
            .with_instructions("结合生活情境");
        let request = build_request(&spec, &settings());

        assert!(request.prompt.contains("第 3 章"));
        assert!(request.prompt.contains("电磁感应"));
        assert!(request.prompt.contains("结合生活情境"));
        assert!(request.prompt.contains("\"difficulty\": \"hard\""));
        assert_eq!(request.model, "test-model");
    }

    #[test]
    fn test_relaxed_prompt_omits_topic() {
        let spec = GenerationSpec::new(3, Difficulty::Easy);
        let request = build_request(&spec, &settings());
        assert!(!request.prompt.contains("知识点："));
        assert!(!request.prompt.contains("附加要求："));
        assert!(!request.prompt.contains("explanation"));
    }
}
