pub mod toml_loader;

pub use toml_loader::{load_all_exam_requests, load_exam_request, load_question_bank};
