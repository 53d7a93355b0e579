//! 组卷矩阵规划 - 业务能力层
//!
//! 只负责"章节题量 + 难度比例 → 槽位计划"，不碰题库和出题服务。
//!
//! 取整规则：
//! 1. 每个章节内，`floor(题量 × 比例 / 100)`，剩余名额按小数部分从大到小分配，
//!    小数部分相同按 简单 < 中等 < 困难
//! 2. 全卷各难度总数再按同样规则对齐到整卷目标，
//!    调整优先落在权重最大的章节，权重相同按章节 id 升序

use tracing::debug;

use crate::error::PlanError;
use crate::models::{ChapterRequirement, Difficulty, DifficultyDistribution, Slot, SlotPlan};

/// 按最大余数法把 `count` 拆成三个难度
fn largest_remainder(count: u64, distribution: &DifficultyDistribution) -> [u64; 3] {
    let mut counts = [0u64; 3];
    let mut remainders = [(0u64, 0usize); 3];

    for (i, difficulty) in Difficulty::ALL.iter().enumerate() {
        let exact = count * distribution.percent(*difficulty) as u64;
        counts[i] = exact / 100;
        remainders[i] = (exact % 100, i);
    }

    let assigned: u64 = counts.iter().sum();
    let mut leftover = count.saturating_sub(assigned);

    // 余数大的优先，余数相同按难度顺序
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, i) in remainders.iter() {
        if leftover == 0 {
            break;
        }
        counts[*i] += 1;
        leftover -= 1;
    }

    counts
}

/// 校验请求
fn validate(
    chapters: &[ChapterRequirement],
    distribution: &DifficultyDistribution,
) -> Result<(), PlanError> {
    if chapters.is_empty() {
        return Err(PlanError::NoChapters);
    }
    let over_100 = Difficulty::ALL
        .iter()
        .any(|d| distribution.percent(*d) > 100);
    if over_100 || distribution.sum() != 100 {
        return Err(PlanError::InvalidDistribution {
            easy: distribution.easy,
            medium: distribution.medium,
            hard: distribution.hard,
            sum: distribution.sum(),
        });
    }
    if let Some(bad) = chapters.iter().find(|c| c.question_count <= 0) {
        return Err(PlanError::EmptyRequirement {
            chapter_id: bad.chapter_id,
            question_count: bad.question_count,
        });
    }
    Ok(())
}

/// 生成槽位计划
///
/// 错误在任何外部调用之前返回：
/// - `NoChapters`：章节列表为空
/// - `InvalidDistribution`：比例之和不为 100
/// - `EmptyRequirement`：某章节题量 ≤ 0
pub fn plan(
    chapters: &[ChapterRequirement],
    distribution: &DifficultyDistribution,
) -> Result<SlotPlan, PlanError> {
    validate(chapters, distribution)?;

    // 章节内分配
    let mut allocations: Vec<[u64; 3]> = chapters
        .iter()
        .map(|c| largest_remainder(c.question_count as u64, distribution))
        .collect();

    reconcile(chapters, distribution, &mut allocations);

    let mut slots = Vec::new();
    for (chapter, counts) in chapters.iter().zip(allocations.iter()) {
        let mut position = 0usize;
        for (i, difficulty) in Difficulty::ALL.iter().enumerate() {
            for _ in 0..counts[i] {
                let topic_hint = if chapter.topics.is_empty() {
                    None
                } else {
                    Some(chapter.topics[position % chapter.topics.len()].clone())
                };
                slots.push(Slot {
                    chapter_id: chapter.chapter_id,
                    difficulty: *difficulty,
                    topic_hint,
                    weight: chapter.weight,
                });
                position += 1;
            }
        }
        debug!(
            "章节 {} 槽位分配: 简单 {} / 中等 {} / 困难 {}",
            chapter.chapter_id, counts[0], counts[1], counts[2]
        );
    }

    Ok(SlotPlan {
        chapter_order: chapters.iter().map(|c| c.chapter_id).collect(),
        slots,
    })
}

/// 全卷对齐：各难度总数对齐到整卷的最大余数目标
///
/// 每次把一个名额从"超出"的难度挪到"不足"的难度，章节题量不变
fn reconcile(
    chapters: &[ChapterRequirement],
    distribution: &DifficultyDistribution,
    allocations: &mut [[u64; 3]],
) {
    let total: u64 = chapters.iter().map(|c| c.question_count as u64).sum();
    let targets = largest_remainder(total, distribution);

    // 权重大的章节优先，权重相同按 id 升序
    let mut priority: Vec<usize> = (0..chapters.len()).collect();
    priority.sort_by(|&a, &b| {
        chapters[b]
            .weight
            .cmp(&chapters[a].weight)
            .then(chapters[a].chapter_id.cmp(&chapters[b].chapter_id))
    });

    loop {
        let mut totals = [0u64; 3];
        for counts in allocations.iter() {
            for i in 0..3 {
                totals[i] += counts[i];
            }
        }

        let over = (0..3).find(|&i| totals[i] > targets[i]);
        let under = (0..3).find(|&i| totals[i] < targets[i]);
        let (over, under) = match (over, under) {
            (Some(o), Some(u)) => (o, u),
            _ => break,
        };

        let Some(&chapter_idx) = priority.iter().find(|&&idx| allocations[idx][over] > 0) else {
            break;
        };

        allocations[chapter_idx][over] -= 1;
        allocations[chapter_idx][under] += 1;
        debug!(
            "全卷对齐: 章节 {} 的一道 {} 调整为 {}",
            chapters[chapter_idx].chapter_id,
            Difficulty::ALL[over].name(),
            Difficulty::ALL[under].name()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counts(plan: &SlotPlan, chapter_id: u32) -> [usize; 3] {
        [
            plan.count_for(chapter_id, Difficulty::Easy),
            plan.count_for(chapter_id, Difficulty::Medium),
            plan.count_for(chapter_id, Difficulty::Hard),
        ]
    }

    #[test]
    fn test_two_chapter_example() {
        let chapters = vec![ChapterRequirement::new(1, 6), ChapterRequirement::new(2, 4)];
        let plan = plan(&chapters, &DifficultyDistribution::new(30, 50, 20)).unwrap();

        assert_eq!(counts(&plan, 1), [2, 3, 1]);
        assert_eq!(counts(&plan, 2), [1, 2, 1]);
        assert_eq!(plan.len(), 10);
        assert_eq!(plan.chapter_order, vec![1, 2]);
    }

    #[test]
    fn test_tie_prefers_easier_difficulty() {
        // 简单与困难余数相同，剩余名额给简单
        let chapters = vec![ChapterRequirement::new(1, 2)];
        let plan = plan(&chapters, &DifficultyDistribution::new(25, 50, 25)).unwrap();
        assert_eq!(counts(&plan, 1), [1, 1, 0]);
    }

    #[test]
    fn test_global_correction_hits_heaviest_chapter() {
        // 每章 1 道，50/50/0：章节内都给简单，全卷目标 {2, 1, 0}
        let chapters = vec![
            ChapterRequirement::new(1, 1),
            ChapterRequirement::new(2, 1).with_weight(3),
            ChapterRequirement::new(3, 1),
        ];
        let plan = plan(&chapters, &DifficultyDistribution::new(50, 50, 0)).unwrap();

        assert_eq!(plan.count_for_difficulty(Difficulty::Easy), 2);
        assert_eq!(plan.count_for_difficulty(Difficulty::Medium), 1);
        assert_eq!(counts(&plan, 2), [0, 1, 0]);
        assert_eq!(counts(&plan, 1), [1, 0, 0]);
    }

    #[test]
    fn test_global_correction_tie_by_chapter_id() {
        let chapters = vec![
            ChapterRequirement::new(7, 1),
            ChapterRequirement::new(3, 1),
            ChapterRequirement::new(5, 1),
        ];
        let plan = plan(&chapters, &DifficultyDistribution::new(50, 50, 0)).unwrap();
        assert_eq!(counts(&plan, 3), [0, 1, 0]);
        assert_eq!(plan.count_for_difficulty(Difficulty::Easy), 2);
    }

    #[test]
    fn test_topics_round_robin() {
        let chapters = vec![ChapterRequirement::new(1, 5)
            .with_topics(vec!["力".to_string(), "光".to_string()])];
        let plan = plan(&chapters, &DifficultyDistribution::new(40, 40, 20)).unwrap();
        let hints: Vec<_> = plan
            .slots
            .iter()
            .map(|s| s.topic_hint.clone().unwrap())
            .collect();
        assert_eq!(hints, vec!["力", "光", "力", "光", "力"]);
    }

    #[test]
    fn test_no_topics_leaves_hint_unset() {
        let chapters = vec![ChapterRequirement::new(1, 3)];
        let plan = plan(&chapters, &DifficultyDistribution::new(100, 0, 0)).unwrap();
        assert!(plan.slots.iter().all(|s| s.topic_hint.is_none()));
    }

    #[test]
    fn test_invalid_distribution() {
        let chapters = vec![ChapterRequirement::new(1, 6)];
        let err = plan(&chapters, &DifficultyDistribution::new(30, 30, 30)).unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidDistribution {
                easy: 30,
                medium: 30,
                hard: 30,
                sum: 90
            }
        );
    }

    #[test]
    fn test_overflowing_distribution_is_invalid() {
        let chapters = vec![ChapterRequirement::new(1, 3)];
        let err = plan(&chapters, &DifficultyDistribution::new(u32::MAX, 101, 0)).unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidDistribution {
                easy: u32::MAX,
                medium: 101,
                hard: 0,
                sum: u32::MAX as u64 + 101
            }
        );
    }

    #[test]
    fn test_percentage_above_100_is_invalid() {
        let chapters = vec![ChapterRequirement::new(1, 3)];
        let err = plan(&chapters, &DifficultyDistribution::new(150, 0, 0)).unwrap_err();
        assert!(matches!(err, PlanError::InvalidDistribution { sum: 150, .. }));
    }

    #[test]
    fn test_empty_requirement() {
        let chapters = vec![ChapterRequirement::new(1, 6), ChapterRequirement::new(2, 0)];
        let err = plan(&chapters, &DifficultyDistribution::new(30, 50, 20)).unwrap_err();
        assert_eq!(
            err,
            PlanError::EmptyRequirement {
                chapter_id: 2,
                question_count: 0
            }
        );
    }

    #[test]
    fn test_no_chapters() {
        let err = plan(&[], &DifficultyDistribution::new(30, 50, 20)).unwrap_err();
        assert_eq!(err, PlanError::NoChapters);
    }

    fn distribution_strategy() -> impl Strategy<Value = DifficultyDistribution> {
        (0u32..=100)
            .prop_flat_map(|easy| (Just(easy), 0u32..=(100 - easy)))
            .prop_map(|(easy, medium)| DifficultyDistribution::new(easy, medium, 100 - easy - medium))
    }

    proptest! {
        #[test]
        fn prop_chapter_counts_are_exact(
            counts in prop::collection::vec((1i64..40, 1u32..5), 1..8),
            distribution in distribution_strategy(),
        ) {
            let chapters: Vec<_> = counts
                .iter()
                .enumerate()
                .map(|(i, (count, weight))| ChapterRequirement::new(i as u32 + 1, *count).with_weight(*weight))
                .collect();
            let plan = plan(&chapters, &distribution).unwrap();

            for chapter in &chapters {
                prop_assert_eq!(plan.count_for_chapter(chapter.chapter_id) as i64, chapter.question_count);
            }

            // 全卷各难度与目标相差不超过 1
            let total: i64 = chapters.iter().map(|c| c.question_count).sum();
            for difficulty in Difficulty::ALL {
                let exact = total as f64 * distribution.percent(difficulty) as f64 / 100.0;
                let actual = plan.count_for_difficulty(difficulty) as f64;
                prop_assert!((actual - exact).abs() < 1.0 + f64::EPSILON);
            }
        }
    }
}
