// ==========================================
// 仓储质检核心 - 事务单元 (Unit of Work)
// ==========================================
// 职责: 聚合引擎所需的全部仓储句柄，并保证全有或全无
// 红线: 分配/流转涉及的所有实体必须在同一事务内写入
// 说明: SQLite 使用 BEGIN IMMEDIATE，写锁在事务开始时获取
// ==========================================

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, TransactionBehavior};
use tracing::warn;

use crate::db::open_sqlite_connection;
use crate::repository::allocation_repo::AllocationRepository;
use crate::repository::audit_log_repo::AuditTrailRepository;
use crate::repository::cell_repo::StorageCellRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::intake_line_repo::IntakeLineRepository;
use crate::repository::inventory_repo::InventoryRepository;
use crate::repository::transition_repo::TransitionRepository;

// ==========================================
// WarehouseStores - 事务内仓储集合
// ==========================================
/// 引擎在事务回调内看到的仓储集合
///
/// 所有句柄共享同一个事务；回调返回 Err 时全部回滚。
pub trait WarehouseStores {
    fn intake_lines(&self) -> &dyn IntakeLineRepository;
    fn cells(&self) -> &dyn StorageCellRepository;
    fn allocations(&self) -> &dyn AllocationRepository;
    fn inventory(&self) -> &dyn InventoryRepository;
    fn transitions(&self) -> &dyn TransitionRepository;
    fn audit_trail(&self) -> &dyn AuditTrailRepository;
}

// ==========================================
// UnitOfWork - 事务执行器
// ==========================================
pub trait UnitOfWork: Send + Sync {
    /// 在一个写事务内执行回调
    ///
    /// # 返回
    /// - Ok: 回调成功且已提交
    /// - Err: 回调失败（已回滚）或提交失败
    fn run<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn WarehouseStores) -> Result<T, E>,
        E: From<RepositoryError>;

    /// 在一个只读快照内执行回调（结束后丢弃，不提交）
    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn WarehouseStores) -> Result<T, E>,
        E: From<RepositoryError>;
}

// ==========================================
// SqliteStores - 借用事务连接的仓储集合
// ==========================================
pub struct SqliteStores<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStores<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub(crate) fn conn(&self) -> &'c Connection {
        self.conn
    }
}

impl WarehouseStores for SqliteStores<'_> {
    fn intake_lines(&self) -> &dyn IntakeLineRepository {
        self
    }

    fn cells(&self) -> &dyn StorageCellRepository {
        self
    }

    fn allocations(&self) -> &dyn AllocationRepository {
        self
    }

    fn inventory(&self) -> &dyn InventoryRepository {
        self
    }

    fn transitions(&self) -> &dyn TransitionRepository {
        self
    }

    fn audit_trail(&self) -> &dyn AuditTrailRepository {
        self
    }
}

// ==========================================
// SqliteUnitOfWork - SQLite 事务执行器
// ==========================================
#[derive(Clone)]
pub struct SqliteUnitOfWork {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUnitOfWork {
    /// 打开数据库文件（不建表）
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// 从已有共享连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 共享连接（配置管理器等复用）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn execute<T, E, F>(&self, behavior: TransactionBehavior, commit: bool, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn WarehouseStores) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let outcome = {
            let stores = SqliteStores::new(&tx);
            work(&stores)
        };

        match outcome {
            Ok(value) if commit => {
                tx.commit()
                    .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
                Ok(value)
            }
            Ok(value) => {
                if let Err(e) = tx.rollback() {
                    warn!(error = %e, "只读事务结束失败");
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = tx.rollback() {
                    warn!(error = %e, "事务回滚失败");
                }
                Err(err)
            }
        }
    }
}

impl UnitOfWork for SqliteUnitOfWork {
    fn run<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn WarehouseStores) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.execute(TransactionBehavior::Immediate, true, work)
    }

    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn WarehouseStores) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.execute(TransactionBehavior::Deferred, false, work)
    }
}
