// ==========================================
// 仓储质检核心 - 领域层
// ==========================================
// 职责: 实体与封闭枚举，不含数据访问
// ==========================================

pub mod allocation;
pub mod audit;
pub mod cell;
pub mod intake;
pub mod transition;
pub mod types;

// 重导出领域实体
pub use allocation::{Allocation, InventoryRecord, Quantities};
pub use audit::{AuditAction, AuditRecord, MovementLogEntry};
pub use cell::{CellLoad, StorageCell};
pub use intake::{IntakeLine, IntakeLineSummary};
pub use transition::Transition;
pub use types::{
    CellRole, CellStatus, Condition, MovementKind, OperationalStatus, ParseEnumError,
    Presentation, QualityStatus, ReviewState, Severity,
};
