pub mod exam;
pub mod generation;
pub mod loaders;
pub mod plan;
pub mod question;

pub use exam::{
    AssemblyOptions, ExamArtifact, ExamItem, ExamRequest, GenerationOptions, Points, SlotOutcome,
    UnmetReason, UnmetSlot,
};
pub use generation::{GenerationSpec, Relaxation};
pub use loaders::{load_all_exam_requests, load_exam_request, load_question_bank};
pub use plan::{ChapterRequirement, Difficulty, DifficultyDistribution, Slot, SlotPlan};
pub use question::{
    max_bank_ordinal, CandidateQuestion, QualityScore, QuestionRecord, SourceKind, BANK_ID_PREFIX,
};
