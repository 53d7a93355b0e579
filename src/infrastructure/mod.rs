//! 基础设施层
//!
//! 持有进程级共享状态（配额、生成缓存），只暴露能力，不认识试卷与流程。

pub mod flight_cache;
pub mod quota_tracker;

pub use flight_cache::{FlightCache, FlightLeader, FlightWaiter, Lookup};
pub use quota_tracker::{QuotaDenial, QuotaLimits, QuotaReservation, QuotaSnapshot, QuotaTracker};
