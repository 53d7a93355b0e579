//! 试卷拼装 - 编排层
//!
//! 把各槽位的结果按出题顺序拼成试卷，并分配分值。
//!
//! - 默认顺序：按章节（请求顺序）分组，组内 简单 → 中等 → 困难
//! - `balance_topics`：每轮每个章节各出一题，轮流排列
//! - 分值：总分 / 槽位数 截断到精度，余下的最小单位逐个加给排在前面的题
//! - 无法填充的槽位列入 `unmet_slots`，保留它本应获得的分值

use chrono::Utc;
use std::collections::VecDeque;

use crate::models::{
    ExamArtifact, ExamItem, Points, SlotOutcome, SlotPlan, UnmetReason, UnmetSlot,
};

/// 出题顺序（槽位下标的排列）
pub fn emission_order(plan: &SlotPlan, balance_topics: bool) -> Vec<usize> {
    if !balance_topics {
        return (0..plan.slots.len()).collect();
    }

    // 每个章节一条队列，保持章节内顺序
    let mut chapters: Vec<u32> = Vec::new();
    for chapter_id in &plan.chapter_order {
        if !chapters.contains(chapter_id) {
            chapters.push(*chapter_id);
        }
    }
    let mut queues: Vec<VecDeque<usize>> = chapters
        .iter()
        .map(|chapter_id| {
            plan.slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.chapter_id == *chapter_id)
                .map(|(i, _)| i)
                .collect()
        })
        .collect();

    let mut order = Vec::with_capacity(plan.slots.len());
    while order.len() < plan.slots.len() {
        let before = order.len();
        for queue in queues.iter_mut() {
            if let Some(i) = queue.pop_front() {
                order.push(i);
            }
        }
        if order.len() == before {
            break;
        }
    }
    order
}

/// 把总分平均分给 `count` 道题
///
/// 各项之和恰好等于总分
pub fn distribute_points(total: Points, count: usize) -> Vec<Points> {
    if count == 0 {
        return Vec::new();
    }
    let n = count as u64;
    let base = total.units / n;
    let remainder = (total.units % n) as usize;

    (0..count)
        .map(|i| {
            let units = if i < remainder { base + 1 } else { base };
            Points::from_units(units, total.precision)
        })
        .collect()
}

/// 拼装试卷
///
/// - `outcomes[i]` 对应 `plan.slots[i]`
/// - `order` 为出题顺序
pub fn assemble(
    name: &str,
    duration_minutes: u32,
    total_points: Points,
    plan: &SlotPlan,
    order: &[usize],
    outcomes: Vec<SlotOutcome>,
    cancelled: bool,
) -> ExamArtifact {
    let points = distribute_points(total_points, order.len());
    let mut outcomes: Vec<Option<SlotOutcome>> = outcomes.into_iter().map(Some).collect();

    let mut items = Vec::new();
    let mut unmet_slots = Vec::new();

    for (position, (&slot_idx, slot_points)) in order.iter().zip(points).enumerate() {
        let outcome = outcomes
            .get_mut(slot_idx)
            .and_then(Option::take)
            .unwrap_or(SlotOutcome::Unfillable(UnmetReason::Cancelled));

        match outcome {
            SlotOutcome::Filled(question) => items.push(ExamItem {
                order: items.len() + 1,
                points: slot_points,
                question,
            }),
            SlotOutcome::Unfillable(reason) => unmet_slots.push(UnmetSlot {
                position: position + 1,
                slot: plan.slots[slot_idx].clone(),
                points: slot_points,
                reason,
            }),
        }
    }

    ExamArtifact {
        name: name.to_string(),
        duration_minutes,
        total_points,
        items,
        unmet_slots,
        cancelled,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateQuestion, Difficulty, Slot, SourceKind};
    use proptest::prelude::*;

    fn slot(chapter_id: u32, difficulty: Difficulty) -> Slot {
        Slot {
            chapter_id,
            difficulty,
            topic_hint: None,
            weight: 1,
        }
    }

    fn question(id: &str) -> CandidateQuestion {
        CandidateQuestion {
            id: id.to_string(),
            source_kind: SourceKind::Pool,
            chapter_id: 1,
            difficulty: Difficulty::Easy,
            text: format!("题目 {}", id),
            choices: vec![],
            correct_choice: None,
            answer: Some("答".to_string()),
            explanation: None,
            topic: String::new(),
            quality_score: None,
        }
    }

    fn plan() -> SlotPlan {
        SlotPlan {
            chapter_order: vec![1, 2],
            slots: vec![
                slot(1, Difficulty::Easy),
                slot(1, Difficulty::Medium),
                slot(1, Difficulty::Hard),
                slot(2, Difficulty::Easy),
            ],
        }
    }

    #[test]
    fn test_ten_points_over_three() {
        let points = distribute_points(Points::from_units(1000, 2), 3);
        let shown: Vec<String> = points.iter().map(|p| p.to_string()).collect();
        assert_eq!(shown, vec!["3.34", "3.33", "3.33"]);
    }

    #[test]
    fn test_default_order_keeps_plan_order() {
        assert_eq!(emission_order(&plan(), false), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_balanced_order_round_robins_chapters() {
        assert_eq!(emission_order(&plan(), true), vec![0, 3, 1, 2]);
    }

    #[test]
    fn test_unmet_slots_keep_their_points() {
        let plan = SlotPlan {
            chapter_order: vec![1],
            slots: vec![
                slot(1, Difficulty::Easy),
                slot(1, Difficulty::Medium),
                slot(1, Difficulty::Hard),
            ],
        };
        let outcomes = vec![
            SlotOutcome::Filled(question("a")),
            SlotOutcome::Unfillable(UnmetReason::NoPoolMatch),
            SlotOutcome::Filled(question("c")),
        ];
        let artifact = assemble(
            "测试卷",
            90,
            Points::from_units(1000, 2),
            &plan,
            &[0, 1, 2],
            outcomes,
            false,
        );

        assert_eq!(artifact.items.len(), 2);
        assert_eq!(artifact.items[0].points.to_string(), "3.34");
        assert_eq!(artifact.items[1].order, 2);
        assert_eq!(artifact.items[1].question.id, "c");
        assert_eq!(artifact.unmet_slots.len(), 1);
        assert_eq!(artifact.unmet_slots[0].position, 2);
        assert_eq!(artifact.unmet_slots[0].points.to_string(), "3.33");
        assert_eq!(artifact.slot_count(), 3);
        assert!(!artifact.is_complete());
        assert_eq!(artifact.duration_minutes, 90);
    }

    #[test]
    fn test_complete_artifact_sums_to_total() {
        let outcomes = (0..4)
            .map(|i| SlotOutcome::Filled(question(&i.to_string())))
            .collect();
        let order = emission_order(&plan(), true);
        let artifact = assemble(
            "测试卷",
            60,
            Points::from_units(10000, 2),
            &plan(),
            &order,
            outcomes,
            false,
        );
        assert!(artifact.is_complete());
        assert_eq!(artifact.assigned_units(), 10000);
        let ids: Vec<_> = artifact.items.iter().map(|i| i.question.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "3", "1", "2"]);
    }

    proptest! {
        #[test]
        fn prop_points_sum_exactly(units in 0u64..1_000_000, count in 1usize..200, precision in 0u32..5) {
            let total = Points::from_units(units, precision);
            let points = distribute_points(total, count);
            prop_assert_eq!(points.len(), count);
            prop_assert_eq!(points.iter().map(|p| p.units).sum::<u64>(), units);

            // 相邻两题最多相差一个最小单位，且前面的不少于后面的
            for pair in points.windows(2) {
                prop_assert!(pair[0].units >= pair[1].units);
                prop_assert!(pair[0].units - pair[1].units <= 1);
            }
        }
    }
}
