// ==========================================
// 仓储质检核心 - 库位占用账本
// ==========================================
// 红线: 计数只走原子增减 (SET x = x + ?)，不做读-改-写
// 状态: 首次占用 AVAILABLE -> OCCUPIED，之后不再回退
// ==========================================

use crate::domain::cell::CellLoad;
use crate::repository::cell_repo::StorageCellRepository;
use crate::repository::error::RepositoryResult;

/// 库位占用账本（借用事务内的库位仓储）
pub struct CellLedger<'a> {
    cells: &'a dyn StorageCellRepository,
}

impl<'a> CellLedger<'a> {
    pub fn new(cells: &'a dyn StorageCellRepository) -> Self {
        Self { cells }
    }

    /// 增加占用并标记 OCCUPIED
    pub fn occupy(&self, cell_id: &str, delta: &CellLoad) -> RepositoryResult<()> {
        self.cells.adjust_load(cell_id, delta)?;
        self.cells.mark_occupied(cell_id)
    }

    /// 减少占用（状态不变）
    pub fn release(&self, cell_id: &str, delta: &CellLoad) -> RepositoryResult<()> {
        self.cells.adjust_load(cell_id, &delta.negated())
    }

    /// 源库位释放 + 目标库位占用
    pub fn transfer(&self, from_cell_id: &str, to_cell_id: &str, delta: &CellLoad) -> RepositoryResult<()> {
        if from_cell_id == to_cell_id {
            return Ok(());
        }
        self.release(from_cell_id, delta)?;
        self.occupy(to_cell_id, delta)
    }

    /// 审计修正: 按 (computed - observed) 增减件数与重量
    ///
    /// # 返回
    /// 实际施加的增量
    pub fn correct(&self, cell_id: &str, observed: &CellLoad, computed: &CellLoad) -> RepositoryResult<CellLoad> {
        let delta = CellLoad::new(
            computed.packages - observed.packages,
            computed.weight_kg - observed.weight_kg,
            0.0,
        );
        if !delta.is_zero() {
            self.cells.adjust_load(cell_id, &delta)?;
        }
        Ok(delta)
    }
}
