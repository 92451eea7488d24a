// ==========================================
// 仓储质检核心 - 质检状态流转引擎
// ==========================================
// 流转: CUARENTENA -> {APROBADO, DEVOLUCIONES, CONTRAMUESTRAS, RECHAZADOS}
// 红线:
// - 只允许从隔离状态流出
// - 目标库位角色必须匹配目标状态
// - 分配行被改写为"流转部分"，revision 乐观锁保护
// 无幂等键: 重复调用按当前状态重新校验
// ==========================================

use crate::config::WarehouseRules;
use crate::domain::allocation::{Allocation, InventoryRecord, Quantities};
use crate::domain::audit::{AuditAction, AuditRecord, MovementLogEntry};
use crate::domain::cell::StorageCell;
use crate::domain::transition::Transition;
use crate::domain::types::{MovementKind, QualityStatus};
use crate::engine::audit_trail::{record_best_effort, AuditEvent};
use crate::engine::cell_ledger::CellLedger;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ratio::RatioBand;
use crate::repository::unit_of_work::WarehouseStores;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

/// 流转请求（已在边界完成解析）
///
/// packages / weight_kg / volume_m3 省略时按数量比例推导
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub allocation_id: String,
    pub to_status: QualityStatus,
    pub quantity: f64,
    pub packages: Option<i64>,
    pub weight_kg: Option<f64>,
    pub volume_m3: Option<f64>,
    pub reason: String,
    pub actor: String,
    pub destination_cell_id: Option<String>,
    pub expected_revision: Option<i32>,
}

/// 流转结果
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub transition: Transition,
    pub allocation: Allocation,
    pub inventory: InventoryRecord,
    pub source_cell: StorageCell,
    pub destination_cell: StorageCell,
    pub event: AuditEvent,
}

// ==========================================
// QualityTransitionEngine
// ==========================================
pub struct QualityTransitionEngine {
    rules: WarehouseRules,
}

impl QualityTransitionEngine {
    pub fn new(rules: WarehouseRules) -> Self {
        Self { rules }
    }

    /// 在事务内执行流转
    #[instrument(skip(self, stores, req), fields(
        allocation_id = %req.allocation_id,
        to_status = %req.to_status,
        quantity = req.quantity,
        actor = %req.actor
    ))]
    pub fn transition(
        &self,
        stores: &dyn WarehouseStores,
        req: &TransitionRequest,
    ) -> EngineResult<TransitionOutcome> {
        let band = RatioBand::new(self.rules.epsilon);

        if req.actor.trim().is_empty() {
            return Err(EngineError::Validation("操作人不能为空".to_string()));
        }
        if req.reason.trim().is_empty() {
            return Err(EngineError::Validation("流转原因不能为空".to_string()));
        }
        if !req.to_status.is_transition_target() {
            return Err(self.reject(format!("{}不是合法的流转目标状态", req.to_status)));
        }

        // ===== 分配 =====
        let allocation = stores
            .allocations()
            .find_by_id(&req.allocation_id)?
            .ok_or_else(|| EngineError::not_found("Allocation", &req.allocation_id))?;

        if let Some(expected) = req.expected_revision {
            if expected != allocation.revision {
                warn!(expected, actual = allocation.revision, "分配版本已过期");
                return Err(EngineError::Conflict {
                    entity: "Allocation".to_string(),
                    id: allocation.allocation_id.clone(),
                    expected,
                    actual: allocation.revision,
                });
            }
        }

        if allocation.quality_status != QualityStatus::Cuarentena {
            return Err(EngineError::InvalidState(format!(
                "分配{}当前状态为{}，只有{}可以流转",
                allocation.allocation_id,
                allocation.quality_status,
                QualityStatus::Cuarentena
            )));
        }

        if !req.quantity.is_finite() || req.quantity <= 0.0 {
            return Err(self.reject(format!("流转数量必须大于0: {}", req.quantity)));
        }
        if band.exceeds(req.quantity, allocation.quantity) {
            return Err(self.reject(format!(
                "流转数量超出分配数量: 请求={}, 分配={}",
                req.quantity, allocation.quantity
            )));
        }

        // ===== 库位 =====
        let destination_id = match &req.destination_cell_id {
            Some(id) => id.clone(),
            None if req.to_status.requires_destination_cell() => {
                return Err(self.reject(format!("流转至{}必须指定目标库位", req.to_status)));
            }
            None => allocation.cell_id.clone(),
        };
        let destination = stores
            .cells()
            .find_by_id(&destination_id)?
            .ok_or_else(|| EngineError::not_found("StorageCell", &destination_id))?;
        if !destination.accepts(req.to_status.allowed_cell_roles()) {
            return Err(self.reject(format!(
                "库位{}角色{}不能存放{}",
                destination.code, destination.role, req.to_status
            )));
        }
        let source = stores
            .cells()
            .find_by_id(&allocation.cell_id)?
            .ok_or_else(|| EngineError::not_found("StorageCell", &allocation.cell_id))?;

        // ===== 流转数量 =====
        let moved = self.resolve_moved(&band, &allocation, req)?;

        // ===== 写入 =====
        let now = Utc::now().naive_utc();
        let mut updated = allocation.clone();
        updated.cell_id = destination.cell_id.clone();
        updated.quantity = moved.quantity;
        updated.packages = moved.packages;
        updated.weight_kg = moved.weight_kg;
        updated.volume_m3 = moved.volume_m3;
        updated.quality_status = req.to_status;
        updated.updated_by = req.actor.clone();
        updated.updated_at = now;
        stores
            .allocations()
            .update_guarded(&updated, allocation.revision)?;
        updated.revision = allocation.revision + 1;

        CellLedger::new(stores.cells()).transfer(
            &source.cell_id,
            &destination.cell_id,
            &moved.cell_load(),
        )?;

        let mut inventory = stores
            .inventory()
            .find_by_allocation(&allocation.allocation_id)?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found("InventoryRecord", &allocation.allocation_id))?;
        inventory.cell_id = destination.cell_id.clone();
        inventory.quantity = moved.quantity;
        inventory.packages = moved.packages;
        inventory.weight_kg = moved.weight_kg;
        inventory.volume_m3 = moved.volume_m3;
        inventory.quality_status = req.to_status;
        inventory.operational_status = req.to_status.operational_status();
        inventory.updated_by = req.actor.clone();
        inventory.updated_at = now;
        stores.inventory().update(&inventory)?;

        let transition = Transition {
            transition_id: uuid::Uuid::new_v4().to_string(),
            allocation_id: allocation.allocation_id.clone(),
            from_status: allocation.quality_status,
            to_status: req.to_status,
            quantity: moved.quantity,
            packages: moved.packages,
            weight_kg: moved.weight_kg,
            volume_m3: moved.volume_m3,
            from_cell_id: source.cell_id.clone(),
            to_cell_id: destination.cell_id.clone(),
            reason: req.reason.clone(),
            actor: req.actor.clone(),
            created_at: now,
        };
        stores.transitions().insert(&transition)?;

        // ===== 留痕 =====
        let record = AuditRecord::new(
            &req.actor,
            AuditAction::QualityChange,
            "allocation",
            &allocation.allocation_id,
            format!(
                "{} -> {}: {}单位, 库位 {} -> {}",
                transition.from_status,
                transition.to_status,
                moved.quantity,
                source.code,
                destination.code
            ),
        )
        .with_values(Some(json!(allocation)), Some(json!(updated)))
        .with_metadata(json!({
            "transition_id": transition.transition_id,
            "reason": transition.reason,
        }));
        let kind = if transition.relocated() {
            MovementKind::Transfer
        } else {
            MovementKind::Adjustment
        };
        let movement = MovementLogEntry::new(&req.actor, kind)
            .with_deltas(moved.quantity, moved.packages, moved.weight_kg, moved.volume_m3)
            .with_refs(
                &allocation.intake_line_id,
                &allocation.allocation_id,
                &destination.cell_id,
                &destination.warehouse_id,
            );
        record_best_effort(stores.audit_trail(), &record, Some(&movement));

        let source_cell = stores
            .cells()
            .find_by_id(&source.cell_id)?
            .ok_or_else(|| EngineError::not_found("StorageCell", &source.cell_id))?;
        let destination_cell = stores
            .cells()
            .find_by_id(&destination.cell_id)?
            .ok_or_else(|| EngineError::not_found("StorageCell", &destination.cell_id))?;

        info!(
            transition_id = %transition.transition_id,
            packages = moved.packages,
            weight_kg = moved.weight_kg,
            relocated = transition.relocated(),
            "质检流转完成"
        );

        Ok(TransitionOutcome {
            transition,
            allocation: updated,
            inventory,
            source_cell,
            destination_cell,
            event: AuditEvent::new(record, Some(movement)),
        })
    }

    /// 推导并校验流转部分的件数/重量/体积
    fn resolve_moved(
        &self,
        band: &RatioBand,
        allocation: &Allocation,
        req: &TransitionRequest,
    ) -> EngineResult<Quantities> {
        let ratio = if allocation.quantity > 0.0 {
            req.quantity / allocation.quantity
        } else {
            0.0
        };
        let expected_packages = band.expected_packages_ceil(allocation.packages, ratio);
        let expected_weight = allocation.weight_kg * ratio;
        let expected_volume = allocation.volume_m3 * ratio;

        let packages = req.packages.unwrap_or(expected_packages);
        let weight_kg = req.weight_kg.unwrap_or(expected_weight);
        let volume_m3 = req.volume_m3.unwrap_or(expected_volume);

        if packages < 0 || !weight_kg.is_finite() || weight_kg < 0.0 || !volume_m3.is_finite() || volume_m3 < 0.0 {
            return Err(self.reject(format!(
                "流转件数/重量/体积不能为负: packages={}, weight={}, volume={}",
                packages, weight_kg, volume_m3
            )));
        }
        if packages > allocation.packages {
            return Err(self.reject(format!(
                "流转件数超出分配件数: 请求={}, 分配={}",
                packages, allocation.packages
            )));
        }

        let package_tolerance = (self.rules.transition_min_package_tolerance as f64)
            .max(expected_packages as f64 * self.rules.transition_package_tolerance);
        if !band.check(packages as f64, expected_packages as f64, package_tolerance) {
            return Err(self.reject(format!(
                "流转件数与分配比例不符: 实际={}, 期望={}, 容差={}",
                packages, expected_packages, package_tolerance
            )));
        }
        if !band.check_relative(weight_kg, expected_weight, self.rules.transition_weight_tolerance) {
            return Err(self.reject(format!(
                "流转重量与分配比例不符: 实际={}, 期望≈{:.3}, 容差={}%",
                weight_kg,
                expected_weight,
                self.rules.transition_weight_tolerance * 100.0
            )));
        }

        Ok(Quantities::new(req.quantity, packages, weight_kg, volume_m3))
    }

    fn reject(&self, reason: String) -> EngineError {
        warn!(reason = %reason, "质检流转被拒绝");
        EngineError::Validation(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{CellRole, CellStatus, OperationalStatus, Presentation};
    use crate::engine::assigner::{AllocationAssigner, AssignRequest};
    use crate::engine::fixtures::{approved_line, cell, seeded};
    use crate::repository::in_memory::InMemoryUnitOfWork;
    use crate::repository::unit_of_work::UnitOfWork;

    /// Scenario A 的分配: 40 单位 / 20 件 / 200kg 放入 C1
    fn setup() -> (InMemoryUnitOfWork, Allocation) {
        let uow = seeded(
            vec![approved_line("L1", 100.0, 50, 500.0)],
            vec![
                cell("C1", CellRole::Standard),
                cell("C2", CellRole::Standard),
                cell("R1", CellRole::Rejected),
                cell("D1", CellRole::Damaged),
                cell("S1", CellRole::Samples),
                cell("V1", CellRole::Returns),
            ],
        );
        let assigner = AllocationAssigner::new(WarehouseRules::default());
        let req = AssignRequest {
            intake_line_id: "L1".to_string(),
            cell_id: "C1".to_string(),
            quantity: 40.0,
            packages: 20,
            weight_kg: 200.0,
            volume_m3: 2.0,
            presentation: Presentation::Box,
            damaged: false,
            observations: None,
            actor: "receiver".to_string(),
        };
        let outcome = uow.run(|s| assigner.assign(s, &req)).unwrap();
        (uow, outcome.allocation)
    }

    fn request(allocation_id: &str, to_status: QualityStatus, quantity: f64) -> TransitionRequest {
        TransitionRequest {
            allocation_id: allocation_id.to_string(),
            to_status,
            quantity,
            packages: None,
            weight_kg: None,
            volume_m3: None,
            reason: "inspection".to_string(),
            actor: "inspector".to_string(),
            destination_cell_id: None,
            expected_revision: None,
        }
    }

    fn run(uow: &InMemoryUnitOfWork, req: &TransitionRequest) -> EngineResult<TransitionOutcome> {
        let engine = QualityTransitionEngine::new(WarehouseRules::default());
        uow.run(|s| engine.transition(s, req))
    }

    #[test]
    fn test_approve_defaults_to_source_cell() {
        let (uow, allocation) = setup();
        let outcome = run(&uow, &request(&allocation.allocation_id, QualityStatus::Aprobado, 15.0)).unwrap();

        assert_eq!(outcome.allocation.quantity, 15.0);
        assert_eq!(outcome.allocation.packages, 8);
        assert_eq!(outcome.allocation.weight_kg, 75.0);
        assert_eq!(outcome.allocation.quality_status, QualityStatus::Aprobado);
        assert_eq!(outcome.allocation.revision, 2);
        assert_eq!(outcome.transition.to_cell_id, "C1");
        assert_eq!(outcome.inventory.operational_status, OperationalStatus::Available);
        // 同库位净变化为 0
        assert_eq!(outcome.source_cell.current_packages, 20);
        assert_eq!(outcome.source_cell.current_weight_kg, 200.0);

        let state = uow.snapshot().unwrap();
        assert_eq!(state.transitions.len(), 1);
        let kinds: Vec<MovementKind> = state.movements.iter().map(|m| m.movement_kind).collect();
        assert_eq!(kinds, vec![MovementKind::Entry, MovementKind::Adjustment]);
    }

    #[test]
    fn test_reject_into_standard_cell_fails_role_check() {
        let (uow, allocation) = setup();
        let mut req = request(&allocation.allocation_id, QualityStatus::Rechazados, 10.0);
        req.destination_cell_id = Some("C2".to_string());

        let err = run(&uow, &req).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let state = uow.snapshot().unwrap();
        assert_eq!(state.allocations[&allocation.allocation_id].revision, 1);
        assert!(state.transitions.is_empty());
    }

    #[test]
    fn test_relocation_moves_load_to_destination() {
        let (uow, allocation) = setup();
        let mut req = request(&allocation.allocation_id, QualityStatus::Rechazados, 10.0);
        req.destination_cell_id = Some("D1".to_string());

        let outcome = run(&uow, &req).unwrap();
        // 10/40 -> 5 件 / 50kg
        assert_eq!(outcome.source_cell.current_packages, 15);
        assert_eq!(outcome.source_cell.current_weight_kg, 150.0);
        assert_eq!(outcome.destination_cell.current_packages, 5);
        assert_eq!(outcome.destination_cell.status, CellStatus::Occupied);
        assert_eq!(outcome.inventory.cell_id, "D1");
        assert_eq!(outcome.inventory.operational_status, OperationalStatus::Damaged);
        assert!(outcome.transition.relocated());

        let state = uow.snapshot().unwrap();
        assert_eq!(state.movements.last().unwrap().movement_kind, MovementKind::Transfer);
        assert_eq!(state.audit_records.last().unwrap().action, "QUALITY_CHANGE");
    }

    #[test]
    fn test_destination_required_for_non_approved_targets() {
        let (uow, allocation) = setup();
        for status in [
            QualityStatus::Devoluciones,
            QualityStatus::Contramuestras,
            QualityStatus::Rechazados,
        ] {
            let err = run(&uow, &request(&allocation.allocation_id, status, 5.0)).unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
    }

    #[test]
    fn test_quarantine_is_not_a_target() {
        let (uow, allocation) = setup();
        let err = run(&uow, &request(&allocation.allocation_id, QualityStatus::Cuarentena, 5.0)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_repeated_call_is_reevaluated_and_refused() {
        let (uow, allocation) = setup();
        let req = request(&allocation.allocation_id, QualityStatus::Aprobado, 15.0);
        run(&uow, &req).unwrap();

        let err = run(&uow, &req).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert_eq!(uow.snapshot().unwrap().transitions.len(), 1);
    }

    #[test]
    fn test_quantity_bounds() {
        let (uow, allocation) = setup();
        let err = run(&uow, &request(&allocation.allocation_id, QualityStatus::Aprobado, 41.0)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = run(&uow, &request(&allocation.allocation_id, QualityStatus::Aprobado, 0.0)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_explicit_amounts_checked_against_tolerance() {
        let (uow, allocation) = setup();
        // 期望 8 件 (容差 max(1, 0.4) = 1)，75kg (容差 3.75kg)
        let mut req = request(&allocation.allocation_id, QualityStatus::Aprobado, 15.0);
        req.packages = Some(10);
        assert!(matches!(run(&uow, &req), Err(EngineError::Validation(_))));

        req.packages = Some(7);
        req.weight_kg = Some(80.0);
        assert!(matches!(run(&uow, &req), Err(EngineError::Validation(_))));

        req.weight_kg = Some(78.0);
        let outcome = run(&uow, &req).unwrap();
        assert_eq!(outcome.allocation.packages, 7);
        assert_eq!(outcome.allocation.weight_kg, 78.0);
    }

    #[test]
    fn test_stale_expected_revision_is_conflict() {
        let (uow, allocation) = setup();
        let mut req = request(&allocation.allocation_id, QualityStatus::Aprobado, 15.0);
        req.expected_revision = Some(allocation.revision + 1);

        let err = run(&uow, &req).unwrap_err();
        assert!(matches!(err, EngineError::Conflict { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_samples_and_returns_roles() {
        let (uow, allocation) = setup();
        let mut req = request(&allocation.allocation_id, QualityStatus::Contramuestras, 2.0);
        req.destination_cell_id = Some("V1".to_string());
        assert!(matches!(run(&uow, &req), Err(EngineError::Validation(_))));

        req.destination_cell_id = Some("S1".to_string());
        let outcome = run(&uow, &req).unwrap();
        assert_eq!(outcome.inventory.operational_status, OperationalStatus::Returned);
        assert_eq!(outcome.allocation.packages, 1);
    }

    #[test]
    fn test_missing_allocation_and_cell() {
        let (uow, allocation) = setup();
        let err = run(&uow, &request("NOPE", QualityStatus::Aprobado, 1.0)).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let mut req = request(&allocation.allocation_id, QualityStatus::Rechazados, 1.0);
        req.destination_cell_id = Some("NOPE".to_string());
        let err = run(&uow, &req).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
