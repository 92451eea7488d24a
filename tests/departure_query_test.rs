// ==========================================
// 出库可用查询集成测试
// ==========================================
// 测试目标: 只返回 APROBADO + AVAILABLE，按有效期先进先出，空有效期排最后
// ==========================================


use chrono::NaiveDate;
use test_helpers::{
    assign_cmd, create_test_db, intake_line_expiring, seed, storage_cell, transition_cmd,
};
use warehouse_qc::api::WarehouseApi;
use warehouse_qc::domain::types::{CellRole, OperationalStatus, QualityStatus};

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

#[test]
fn test_departures_ordered_by_expiry() {
    let (_tmp, db_path) = create_test_db().unwrap();
    seed(
        &db_path,
        &[
            intake_line_expiring("LATE", date(2027, 6, 1)),
            intake_line_expiring("NONE", None),
            intake_line_expiring("SOON", date(2026, 12, 1)),
            intake_line_expiring("HELD", date(2026, 11, 1)),
        ],
        &[
            storage_cell("C1", CellRole::Standard),
            storage_cell("C2", CellRole::Standard),
            storage_cell("C3", CellRole::Standard),
            storage_cell("C4", CellRole::Standard),
        ],
    )
    .unwrap();
    let api = WarehouseApi::open(&db_path).unwrap();

    for (lot, cell) in [("LATE", "C1"), ("NONE", "C2"), ("SOON", "C3"), ("HELD", "C4")] {
        let outcome = api.assign(assign_cmd(lot, cell, 20.0, 10, 100.0)).unwrap();
        // HELD 保持隔离状态
        if lot != "HELD" {
            api.transition(transition_cmd(&outcome.allocation.allocation_id, "APROBADO", 20.0))
                .unwrap();
        }
    }

    let departures = api.available_for_departure(None).unwrap();
    let lots: Vec<_> = departures.iter().map(|r| r.intake_line_id.as_str()).collect();
    assert_eq!(lots, vec!["SOON", "LATE", "NONE"]);
    assert!(departures
        .iter()
        .all(|r| r.quality_status == QualityStatus::Aprobado
            && r.operational_status == OperationalStatus::Available));

    assert!(api.available_for_departure(Some("WH2")).unwrap().is_empty());
    assert_eq!(api.available_for_departure(Some("WH1")).unwrap().len(), 3);
}

#[test]
fn test_rejected_goods_are_not_departable() {
    let (_tmp, db_path) = create_test_db().unwrap();
    seed(
        &db_path,
        &[intake_line_expiring("L1", date(2026, 12, 1))],
        &[storage_cell("C1", CellRole::Standard), storage_cell("R1", CellRole::Rejected)],
    )
    .unwrap();
    let api = WarehouseApi::open(&db_path).unwrap();

    let outcome = api.assign(assign_cmd("L1", "C1", 20.0, 10, 100.0)).unwrap();
    let mut cmd = transition_cmd(&outcome.allocation.allocation_id, "RECHAZADOS", 20.0);
    cmd.destination_cell_id = Some("R1".to_string());
    api.transition(cmd).unwrap();

    assert!(api.available_for_departure(None).unwrap().is_empty());
}
