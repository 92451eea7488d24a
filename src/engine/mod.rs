// ==========================================
// 仓储质检核心 - 引擎层
// ==========================================
// 职责: 分配入位、质检流转、一致性审计
// 红线: Engine 不拼 SQL, 只通过 WarehouseStores 访问数据
// ==========================================

pub mod assigner;
pub mod audit_trail;
pub mod auditor;
pub mod cell_ledger;
pub mod error;
pub mod ratio;
pub mod transition;

#[cfg(test)]
pub(crate) mod fixtures;

// 重导出核心引擎
pub use assigner::{AllocationAssigner, AssignOutcome, AssignRequest};
pub use audit_trail::{AuditEvent, AuditSink, NoOpAuditSink, OptionalAuditSink};
pub use auditor::{
    AuditFix, AuditIssue, AuditReport, AuditScope, AuditStats, ConsistencyAuditor, IssueCode,
};
pub use cell_ledger::CellLedger;
pub use error::{EngineError, EngineResult};
pub use ratio::RatioBand;
pub use transition::{QualityTransitionEngine, TransitionOutcome, TransitionRequest};
