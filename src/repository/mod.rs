// ==========================================
// 仓储质检核心 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod allocation_repo;
pub mod audit_log_repo;
pub mod cell_repo;
pub mod error;
pub mod in_memory;
pub mod intake_line_repo;
pub mod inventory_repo;
pub mod transition_repo;
pub mod unit_of_work;

// 重导出核心仓储
pub use allocation_repo::{AllocationRepository, AllocationTotals};
pub use audit_log_repo::AuditTrailRepository;
pub use cell_repo::StorageCellRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use in_memory::{InMemoryStores, InMemoryUnitOfWork, WarehouseState};
pub use intake_line_repo::IntakeLineRepository;
pub use inventory_repo::InventoryRepository;
pub use transition_repo::TransitionRepository;
pub use unit_of_work::{SqliteStores, SqliteUnitOfWork, UnitOfWork, WarehouseStores};
