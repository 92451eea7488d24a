// ==========================================
// 引擎单元测试夹具
// ==========================================

use crate::domain::cell::StorageCell;
use crate::domain::intake::IntakeLine;
use crate::domain::types::{CellRole, CellStatus, ReviewState};
use crate::repository::in_memory::{InMemoryUnitOfWork, WarehouseState};
use chrono::Utc;

pub const WAREHOUSE: &str = "WH1";

pub fn approved_line(id: &str, quantity: f64, packages: i64, weight_kg: f64) -> IntakeLine {
    IntakeLine {
        intake_line_id: id.to_string(),
        warehouse_id: WAREHOUSE.to_string(),
        product_code: format!("P-{}", id),
        quantity,
        packages,
        weight_kg,
        volume_m3: 0.0,
        review_state: ReviewState::Approved,
        expiry_date: None,
        created_at: Utc::now().naive_utc(),
    }
}

pub fn cell(id: &str, role: CellRole) -> StorageCell {
    StorageCell {
        cell_id: id.to_string(),
        warehouse_id: WAREHOUSE.to_string(),
        code: id.to_string(),
        role,
        status: CellStatus::Available,
        max_packages: None,
        max_weight_kg: None,
        max_volume_m3: None,
        current_packages: 0,
        current_weight_kg: 0.0,
        current_volume_m3: 0.0,
    }
}

pub fn seeded(lines: Vec<IntakeLine>, cells: Vec<StorageCell>) -> InMemoryUnitOfWork {
    let mut state = WarehouseState::default();
    for line in lines {
        state.intake_lines.insert(line.intake_line_id.clone(), line);
    }
    for c in cells {
        state.cells.insert(c.cell_id.clone(), c);
    }
    InMemoryUnitOfWork::with_state(state)
}
