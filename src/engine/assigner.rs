// ==========================================
// 仓储质检核心 - 分配入位引擎
// ==========================================
// 职责: 把已审核入库行的一部分放入库位（隔离状态）
// 红线: 分配 / 库存镜像 / 库位占用 在同一事务内写入
// 校验顺序: 数值 -> 入库行 -> 库位 -> 剩余量 -> 比例带
// ==========================================

use crate::config::WarehouseRules;
use crate::domain::allocation::{Allocation, InventoryRecord, Quantities};
use crate::domain::audit::{AuditAction, AuditRecord, MovementLogEntry};
use crate::domain::cell::StorageCell;
use crate::domain::types::{CellStatus, MovementKind, Presentation, QualityStatus, ReviewState};
use crate::engine::audit_trail::{record_best_effort, AuditEvent};
use crate::engine::cell_ledger::CellLedger;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ratio::{proportional, RatioBand};
use crate::repository::unit_of_work::WarehouseStores;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

/// 分配请求（已在边界完成解析）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub intake_line_id: String,
    pub cell_id: String,
    pub quantity: f64,
    pub packages: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub presentation: Presentation,
    pub damaged: bool,
    pub observations: Option<String>,
    pub actor: String,
}

/// 分配结果
#[derive(Debug, Clone, Serialize)]
pub struct AssignOutcome {
    pub allocation: Allocation,
    pub inventory: InventoryRecord,
    pub cell: StorageCell,
    pub event: AuditEvent,
}

// ==========================================
// AllocationAssigner
// ==========================================
pub struct AllocationAssigner {
    rules: WarehouseRules,
}

impl AllocationAssigner {
    pub fn new(rules: WarehouseRules) -> Self {
        Self { rules }
    }

    /// 在事务内执行分配
    #[instrument(skip(self, stores, req), fields(
        intake_line_id = %req.intake_line_id,
        cell_id = %req.cell_id,
        quantity = req.quantity,
        actor = %req.actor
    ))]
    pub fn assign(&self, stores: &dyn WarehouseStores, req: &AssignRequest) -> EngineResult<AssignOutcome> {
        let band = RatioBand::new(self.rules.epsilon);
        Self::validate_amounts(req)?;

        // ===== 入库行 =====
        let line = stores
            .intake_lines()
            .find_by_id(&req.intake_line_id)?
            .ok_or_else(|| EngineError::not_found("IntakeLine", &req.intake_line_id))?;
        if line.review_state != ReviewState::Approved {
            return Err(EngineError::InvalidState(format!(
                "入库行{}未审核通过 (review_state={})",
                line.intake_line_id, line.review_state
            )));
        }

        // ===== 库位 =====
        let cell = stores
            .cells()
            .find_by_id(&req.cell_id)?
            .ok_or_else(|| EngineError::not_found("StorageCell", &req.cell_id))?;
        if cell.status != CellStatus::Available {
            return Err(EngineError::InvalidState(format!(
                "库位{}不可用 (status={})",
                cell.code, cell.status
            )));
        }

        // ===== 剩余量 =====
        let allocated = stores.allocations().totals_by_intake_line(&line.intake_line_id)?;
        let remaining = line.totals().minus(&allocated.totals);
        if band.exceeds(req.quantity, remaining.quantity) {
            return Err(self.reject(format!(
                "数量超出剩余可分配量: 请求={}, 剩余={}",
                req.quantity, remaining.quantity
            )));
        }
        if req.packages > remaining.packages {
            return Err(self.reject(format!(
                "件数超出剩余可分配量: 请求={}, 剩余={}",
                req.packages, remaining.packages
            )));
        }
        if band.exceeds(req.weight_kg, remaining.weight_kg) {
            return Err(self.reject(format!(
                "重量超出剩余可分配量: 请求={}, 剩余={}",
                req.weight_kg, remaining.weight_kg
            )));
        }

        // ===== 比例带 (对入库行) =====
        let expected_packages = proportional(line.packages as f64, line.quantity, req.quantity);
        if !band.check_relative(
            req.packages as f64,
            expected_packages,
            self.rules.allocation_package_ratio_tolerance,
        ) {
            return Err(self.reject(format!(
                "件数与入库行比例不符: 实际={}, 期望≈{:.2}, 容差={}%",
                req.packages,
                expected_packages,
                self.rules.allocation_package_ratio_tolerance * 100.0
            )));
        }
        let expected_weight = proportional(line.weight_kg, line.quantity, req.quantity);
        if !band.check_relative(
            req.weight_kg,
            expected_weight,
            self.rules.allocation_weight_ratio_tolerance,
        ) {
            return Err(self.reject(format!(
                "重量与入库行比例不符: 实际={}, 期望≈{:.2}, 容差={}%",
                req.weight_kg,
                expected_weight,
                self.rules.allocation_weight_ratio_tolerance * 100.0
            )));
        }

        // ===== 写入 =====
        let now = Utc::now().naive_utc();
        let (condition, status_code) = req.presentation.normalize(req.damaged);
        let allocation = Allocation {
            allocation_id: uuid::Uuid::new_v4().to_string(),
            intake_line_id: line.intake_line_id.clone(),
            cell_id: cell.cell_id.clone(),
            quantity: req.quantity,
            packages: req.packages,
            weight_kg: req.weight_kg,
            volume_m3: req.volume_m3,
            quality_status: QualityStatus::Cuarentena,
            presentation: req.presentation,
            condition,
            status_code,
            observations: req.observations.clone(),
            created_by: req.actor.clone(),
            updated_by: req.actor.clone(),
            created_at: now,
            updated_at: now,
            revision: 1,
        };
        stores.allocations().insert(&allocation)?;

        let inventory = InventoryRecord::mirror_of(&allocation, uuid::Uuid::new_v4().to_string());
        stores.inventory().insert(&inventory)?;

        let moved: Quantities = allocation.quantities();
        CellLedger::new(stores.cells()).occupy(&cell.cell_id, &moved.cell_load())?;

        // ===== 留痕 =====
        let record = AuditRecord::new(
            &req.actor,
            AuditAction::Assign,
            "allocation",
            &allocation.allocation_id,
            format!(
                "入库行{}分配{}单位至库位{}",
                line.intake_line_id, allocation.quantity, cell.code
            ),
        )
        .with_values(None, Some(json!(allocation)))
        .with_metadata(json!({
            "inventory_id": inventory.inventory_id,
            "status_code": status_code,
        }));
        let movement = MovementLogEntry::new(&req.actor, MovementKind::Entry)
            .with_deltas(moved.quantity, moved.packages, moved.weight_kg, moved.volume_m3)
            .with_refs(
                &line.intake_line_id,
                &allocation.allocation_id,
                &cell.cell_id,
                &cell.warehouse_id,
            );
        record_best_effort(stores.audit_trail(), &record, Some(&movement));

        let cell = stores
            .cells()
            .find_by_id(&cell.cell_id)?
            .ok_or_else(|| EngineError::not_found("StorageCell", &cell.cell_id))?;

        info!(
            allocation_id = %allocation.allocation_id,
            packages = allocation.packages,
            weight_kg = allocation.weight_kg,
            "分配入位完成"
        );

        Ok(AssignOutcome {
            allocation,
            inventory,
            cell,
            event: AuditEvent::new(record, Some(movement)),
        })
    }

    fn validate_amounts(req: &AssignRequest) -> EngineResult<()> {
        if req.actor.trim().is_empty() {
            return Err(EngineError::Validation("操作人不能为空".to_string()));
        }
        if !req.quantity.is_finite() || req.quantity <= 0.0 {
            return Err(EngineError::Validation(format!("数量必须大于0: {}", req.quantity)));
        }
        if req.packages < 0 {
            return Err(EngineError::Validation(format!("件数不能为负: {}", req.packages)));
        }
        if !req.weight_kg.is_finite() || req.weight_kg < 0.0 {
            return Err(EngineError::Validation(format!("重量不能为负: {}", req.weight_kg)));
        }
        if !req.volume_m3.is_finite() || req.volume_m3 < 0.0 {
            return Err(EngineError::Validation(format!("体积不能为负: {}", req.volume_m3)));
        }
        Ok(())
    }

    fn reject(&self, reason: String) -> EngineError {
        warn!(reason = %reason, "分配被拒绝");
        EngineError::Validation(reason)
    }
}
