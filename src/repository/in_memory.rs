// ==========================================
// 仓储质检核心 - 内存仓储实现
// ==========================================
// 用途: 引擎单元测试 / 无数据库的嵌入场景
// 语义: 与 SQLite 实现一致（同样的排序、NotFound、乐观锁）
// 事务: 复制状态 -> 执行回调 -> 成功则整体替换
// ==========================================

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

use crate::domain::allocation::{Allocation, InventoryRecord, Quantities};
use crate::domain::audit::{AuditRecord, MovementLogEntry};
use crate::domain::cell::{CellLoad, StorageCell};
use crate::domain::intake::IntakeLine;
use crate::domain::transition::Transition;
use crate::domain::types::{CellStatus, OperationalStatus, QualityStatus};
use crate::repository::allocation_repo::{AllocationRepository, AllocationTotals};
use crate::repository::audit_log_repo::AuditTrailRepository;
use crate::repository::cell_repo::StorageCellRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::intake_line_repo::IntakeLineRepository;
use crate::repository::inventory_repo::InventoryRepository;
use crate::repository::transition_repo::TransitionRepository;
use crate::repository::unit_of_work::{UnitOfWork, WarehouseStores};

// ==========================================
// WarehouseState - 全量内存状态
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct WarehouseState {
    pub intake_lines: BTreeMap<String, IntakeLine>,
    pub cells: BTreeMap<String, StorageCell>,
    pub allocations: BTreeMap<String, Allocation>,
    pub inventory: BTreeMap<String, InventoryRecord>,
    pub transitions: Vec<Transition>,
    pub audit_records: Vec<AuditRecord>,
    pub movements: Vec<MovementLogEntry>,

    /// 审计/流水写入一律失败（验证尽力而为语义）
    pub fail_audit_writes: bool,
}

fn page<V: Clone>(
    map: &BTreeMap<String, V>,
    after_id: Option<&str>,
    limit: usize,
    keep: impl Fn(&V) -> bool,
) -> Vec<V> {
    let lower = match after_id {
        Some(id) => Bound::Excluded(id.to_string()),
        None => Bound::Unbounded,
    };
    map.range((lower, Bound::Unbounded))
        .map(|(_, v)| v)
        .filter(|v| keep(*v))
        .take(limit)
        .cloned()
        .collect()
}

// ==========================================
// InMemoryStores - 事务内视图
// ==========================================
pub struct InMemoryStores {
    state: RefCell<WarehouseState>,
}

impl InMemoryStores {
    pub fn new(state: WarehouseState) -> Self {
        Self {
            state: RefCell::new(state),
        }
    }

    pub fn into_state(self) -> WarehouseState {
        self.state.into_inner()
    }

    fn cell_warehouse(&self, cell_id: &str) -> Option<String> {
        self.state
            .borrow()
            .cells
            .get(cell_id)
            .map(|c| c.warehouse_id.clone())
    }
}

impl WarehouseStores for InMemoryStores {
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

impl IntakeLineRepository for InMemoryStores {
    fn insert(&self, line: &IntakeLine) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        if state.intake_lines.contains_key(&line.intake_line_id) {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "intake_line.intake_line_id={}",
                line.intake_line_id
            )));
        }
        state
            .intake_lines
            .insert(line.intake_line_id.clone(), line.clone());
        Ok(())
    }

    fn find_by_id(&self, intake_line_id: &str) -> RepositoryResult<Option<IntakeLine>> {
        Ok(self.state.borrow().intake_lines.get(intake_line_id).cloned())
    }

    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<IntakeLine>> {
        let state = self.state.borrow();
        Ok(page(&state.intake_lines, after_id, limit, |l| {
            warehouse_id.map_or(true, |w| l.warehouse_id == w)
        }))
    }
}

impl StorageCellRepository for InMemoryStores {
    fn insert(&self, cell: &StorageCell) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        if state.cells.contains_key(&cell.cell_id) {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "storage_cell.cell_id={}",
                cell.cell_id
            )));
        }
        state.cells.insert(cell.cell_id.clone(), cell.clone());
        Ok(())
    }

    fn find_by_id(&self, cell_id: &str) -> RepositoryResult<Option<StorageCell>> {
        Ok(self.state.borrow().cells.get(cell_id).cloned())
    }

    fn adjust_load(&self, cell_id: &str, delta: &CellLoad) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        let cell = state
            .cells
            .get_mut(cell_id)
            .ok_or_else(|| RepositoryError::not_found("StorageCell", cell_id))?;
        cell.current_packages += delta.packages;
        cell.current_weight_kg += delta.weight_kg;
        cell.current_volume_m3 += delta.volume_m3;
        Ok(())
    }

    fn mark_occupied(&self, cell_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(cell) = state.cells.get_mut(cell_id) {
            if cell.status == CellStatus::Available {
                cell.status = CellStatus::Occupied;
            }
        }
        Ok(())
    }

    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<StorageCell>> {
        let state = self.state.borrow();
        Ok(page(&state.cells, after_id, limit, |c| {
            warehouse_id.map_or(true, |w| c.warehouse_id == w)
        }))
    }
}

impl AllocationRepository for InMemoryStores {
    fn insert(&self, allocation: &Allocation) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        if state.allocations.contains_key(&allocation.allocation_id) {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "allocation.allocation_id={}",
                allocation.allocation_id
            )));
        }
        if !state.intake_lines.contains_key(&allocation.intake_line_id)
            || !state.cells.contains_key(&allocation.cell_id)
        {
            return Err(RepositoryError::ForeignKeyViolation(format!(
                "allocation.allocation_id={}",
                allocation.allocation_id
            )));
        }
        state
            .allocations
            .insert(allocation.allocation_id.clone(), allocation.clone());
        Ok(())
    }

    fn find_by_id(&self, allocation_id: &str) -> RepositoryResult<Option<Allocation>> {
        Ok(self.state.borrow().allocations.get(allocation_id).cloned())
    }

    fn update_guarded(&self, allocation: &Allocation, expected_revision: i32) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        let stored = state
            .allocations
            .get_mut(&allocation.allocation_id)
            .ok_or_else(|| RepositoryError::not_found("Allocation", &allocation.allocation_id))?;

        if stored.revision != expected_revision {
            return Err(RepositoryError::OptimisticLockFailure {
                entity: "Allocation".to_string(),
                id: allocation.allocation_id.clone(),
                expected: expected_revision,
                actual: stored.revision,
            });
        }

        stored.cell_id = allocation.cell_id.clone();
        stored.quantity = allocation.quantity;
        stored.packages = allocation.packages;
        stored.weight_kg = allocation.weight_kg;
        stored.volume_m3 = allocation.volume_m3;
        stored.quality_status = allocation.quality_status;
        stored.observations = allocation.observations.clone();
        stored.updated_by = allocation.updated_by.clone();
        stored.updated_at = allocation.updated_at;
        stored.revision += 1;
        Ok(())
    }

    fn totals_by_intake_line(&self, intake_line_id: &str) -> RepositoryResult<AllocationTotals> {
        let state = self.state.borrow();
        let totals = state
            .allocations
            .values()
            .filter(|a| a.intake_line_id == intake_line_id)
            .fold(AllocationTotals::default(), |acc, a| AllocationTotals {
                totals: acc.totals.plus(&a.quantities()),
                count: acc.count + 1,
            });
        Ok(totals)
    }

    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<Allocation>> {
        let state = self.state.borrow();
        Ok(page(&state.allocations, after_id, limit, |a| match warehouse_id {
            None => true,
            Some(w) => state
                .cells
                .get(&a.cell_id)
                .map_or(false, |c| c.warehouse_id == w),
        }))
    }
}

impl InventoryRepository for InMemoryStores {
    fn insert(&self, record: &InventoryRecord) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        if state.inventory.contains_key(&record.inventory_id) {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "inventory_record.inventory_id={}",
                record.inventory_id
            )));
        }
        state
            .inventory
            .insert(record.inventory_id.clone(), record.clone());
        Ok(())
    }

    fn find_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<InventoryRecord>> {
        let state = self.state.borrow();
        let mut records: Vec<InventoryRecord> = state
            .inventory
            .values()
            .filter(|r| r.allocation_id.as_deref() == Some(allocation_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.inventory_id.cmp(&b.inventory_id))
        });
        Ok(records)
    }

    fn update(&self, record: &InventoryRecord) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        let stored = state
            .inventory
            .get_mut(&record.inventory_id)
            .ok_or_else(|| RepositoryError::not_found("InventoryRecord", &record.inventory_id))?;
        stored.cell_id = record.cell_id.clone();
        stored.quantity = record.quantity;
        stored.packages = record.packages;
        stored.weight_kg = record.weight_kg;
        stored.volume_m3 = record.volume_m3;
        stored.quality_status = record.quality_status;
        stored.operational_status = record.operational_status;
        stored.updated_by = record.updated_by.clone();
        stored.updated_at = record.updated_at;
        Ok(())
    }

    fn totals_by_cell(&self, cell_id: &str) -> RepositoryResult<Quantities> {
        let state = self.state.borrow();
        Ok(state
            .inventory
            .values()
            .filter(|r| r.cell_id == cell_id)
            .fold(Quantities::default(), |acc, r| acc.plus(&r.quantities())))
    }

    fn count_orphans(&self, warehouse_id: Option<&str>) -> RepositoryResult<i64> {
        let state = self.state.borrow();
        let count = state
            .inventory
            .values()
            .filter(|r| {
                warehouse_id.map_or(true, |w| {
                    state
                        .cells
                        .get(&r.cell_id)
                        .map_or(false, |c| c.warehouse_id == w)
                })
            })
            .filter(|r| match &r.allocation_id {
                None => true,
                Some(id) => !state.allocations.contains_key(id),
            })
            .count();
        Ok(count as i64)
    }

    fn list_available_for_departure(
        &self,
        warehouse_id: Option<&str>,
    ) -> RepositoryResult<Vec<InventoryRecord>> {
        let mut records: Vec<InventoryRecord> = {
            let state = self.state.borrow();
            state
                .inventory
                .values()
                .filter(|r| {
                    r.quality_status == QualityStatus::Aprobado
                        && r.operational_status == OperationalStatus::Available
                        && r.quantity > 0.0
                })
                .filter(|r| state.intake_lines.contains_key(&r.intake_line_id))
                .cloned()
                .collect()
        };
        if let Some(w) = warehouse_id {
            records.retain(|r| self.cell_warehouse(&r.cell_id).as_deref() == Some(w));
        }

        let state = self.state.borrow();
        let expiry = |r: &InventoryRecord| {
            state
                .intake_lines
                .get(&r.intake_line_id)
                .and_then(|l| l.expiry_date)
        };
        // 有效期为空排最后
        records.sort_by(|a, b| {
            let (ea, eb) = (expiry(a), expiry(b));
            ea.is_none()
                .cmp(&eb.is_none())
                .then_with(|| ea.cmp(&eb))
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.inventory_id.cmp(&b.inventory_id))
        });
        Ok(records)
    }
}

impl TransitionRepository for InMemoryStores {
    fn insert(&self, transition: &Transition) -> RepositoryResult<()> {
        self.state.borrow_mut().transitions.push(transition.clone());
        Ok(())
    }

    fn list_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<Transition>> {
        Ok(self
            .state
            .borrow()
            .transitions
            .iter()
            .filter(|t| t.allocation_id == allocation_id)
            .cloned()
            .collect())
    }
}

impl AuditTrailRepository for InMemoryStores {
    fn insert_audit(&self, record: &AuditRecord) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_audit_writes {
            return Err(RepositoryError::InternalError("audit_log 不可写".to_string()));
        }
        state.audit_records.push(record.clone());
        Ok(())
    }

    fn insert_movement(&self, entry: &MovementLogEntry) -> RepositoryResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_audit_writes {
            return Err(RepositoryError::InternalError("movement_log 不可写".to_string()));
        }
        state.movements.push(entry.clone());
        Ok(())
    }

    fn find_audits_by_entity(&self, entity_type: &str, entity_id: &str) -> RepositoryResult<Vec<AuditRecord>> {
        Ok(self
            .state
            .borrow()
            .audit_records
            .iter()
            .filter(|r| r.entity_type == entity_type && r.entity_id == entity_id)
            .cloned()
            .collect())
    }

    fn find_movements_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<MovementLogEntry>> {
        Ok(self
            .state
            .borrow()
            .movements
            .iter()
            .filter(|m| m.allocation_ref.as_deref() == Some(allocation_id))
            .cloned()
            .collect())
    }
}

// ==========================================
// InMemoryUnitOfWork - 内存事务执行器
// ==========================================
#[derive(Debug, Default)]
pub struct InMemoryUnitOfWork {
    state: Mutex<WarehouseState>,
}

impl InMemoryUnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: WarehouseState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// 当前已提交状态的副本
    pub fn snapshot(&self) -> RepositoryResult<WarehouseState> {
        Ok(self.lock()?.clone())
    }

    /// 设置审计写入失败开关
    pub fn set_fail_audit_writes(&self, fail: bool) -> RepositoryResult<()> {
        self.lock()?.fail_audit_writes = fail;
        Ok(())
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, WarehouseState>> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl UnitOfWork for InMemoryUnitOfWork {
    fn run<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn WarehouseStores) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self.lock()?;
        let stores = InMemoryStores::new(guard.clone());
        let value = work(&stores)?;
        *guard = stores.into_state();
        Ok(value)
    }

    fn read<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn WarehouseStores) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let guard = self.lock()?;
        let stores = InMemoryStores::new(guard.clone());
        work(&stores)
    }
}
