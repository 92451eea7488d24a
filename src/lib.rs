// ==========================================
// 仓储质检核心 - 核心库
// ==========================================
// 系统定位: 库位分配 + 质检状态流转 + 一致性审计
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    CellRole, CellStatus, Condition, MovementKind, OperationalStatus, Presentation,
    QualityStatus, ReviewState, Severity,
};

// 领域实体
pub use domain::{
    Allocation, AuditRecord, IntakeLine, IntakeLineSummary, InventoryRecord, MovementLogEntry,
    StorageCell, Transition,
};

// 引擎
pub use engine::{
    AllocationAssigner, AuditReport, AuditScope, ConsistencyAuditor, QualityTransitionEngine,
};

// 仓储
pub use repository::{InMemoryUnitOfWork, SqliteUnitOfWork, UnitOfWork};

// API
pub use api::{ApiError, ApiResult, AssignCommand, TransitionCommand, WarehouseApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "仓储质检核心";

// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "WAREHOUSE_QC_DB";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
