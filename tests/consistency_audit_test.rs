// ==========================================
// 一致性审计集成测试
// ==========================================
// 测试目标: 漂移检测、LOW 自动修复、HIGH/MEDIUM 只报告、分页
// ==========================================


use test_helpers::{assign_cmd, cell_counters, open_test_connection, setup_standard};
use warehouse_qc::api::WarehouseApi;
use warehouse_qc::config::{config_keys, ConfigManager, ConfigScope};
use warehouse_qc::domain::types::Severity;
use warehouse_qc::engine::IssueCode;
use warehouse_qc::AuditScope;

fn exec(db_path: &str, sql: &str) {
    open_test_connection(db_path).unwrap().execute_batch(sql).unwrap();
}

#[test]
fn test_drift_fixed_over_allocation_reported() {
    let (_tmp, db_path, api) = setup_standard();
    api.assign(assign_cmd("L1", "C1", 36.0, 18, 180.0)).unwrap();

    // 库位计数 20，真实库存 18；入库行总量被改小造成超额分配
    exec(
        &db_path,
        "UPDATE storage_cell SET current_packages = 20 WHERE cell_id = 'C1';
         UPDATE intake_line SET quantity = 30 WHERE intake_line_id = 'L1';",
    );

    let report = api.audit(AuditScope::All, true).unwrap();

    let drift: Vec<_> = report.issues_with(IssueCode::CellAggregateDrift).collect();
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].severity, Severity::Low);
    assert_eq!(drift[0].entity_id.as_deref(), Some("C1"));

    assert_eq!(report.fixes.len(), 1);
    assert_eq!(report.fixes[0].old_packages, 20);
    assert_eq!(report.fixes[0].new_packages, 18);
    assert_eq!(cell_counters(&db_path, "C1").0, 18);

    let high: Vec<_> = report.issues_with(IssueCode::LotOverAllocated).collect();
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].severity, Severity::High);
    assert!(!high[0].auto_fixable);
    assert_eq!(report.stats.high, 1);
    assert_eq!(report.stats.low, 1);

    // 超额分配保持原样
    let summary = api.lot_summary("L1").unwrap();
    assert_eq!(summary.intake_line.quantity, 30.0);
    assert_eq!(summary.allocated.quantity, 36.0);

    // 修复留痕
    let audits = api.audit_records_for("storage_cell", "C1").unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].action, "AGGREGATE_FIX");

    // 再次审计: 漂移已消失，HIGH 仍在
    let again = api.audit(AuditScope::All, true).unwrap();
    assert_eq!(again.issues_with(IssueCode::CellAggregateDrift).count(), 0);
    assert_eq!(again.issues_with(IssueCode::LotOverAllocated).count(), 1);
    assert!(again.fixes.is_empty());
}

#[test]
fn test_report_only_does_not_write() {
    let (_tmp, db_path, api) = setup_standard();
    api.assign(assign_cmd("L1", "C1", 36.0, 18, 180.0)).unwrap();
    exec(&db_path, "UPDATE storage_cell SET current_weight_kg = 185 WHERE cell_id = 'C1';");

    let report = api.audit(AuditScope::All, false).unwrap();
    assert_eq!(report.issues_with(IssueCode::CellAggregateDrift).count(), 1);
    assert!(report.fixes.is_empty());
    assert_eq!(cell_counters(&db_path, "C1").1, 185.0);
    assert!(api.audit_records_for("storage_cell", "C1").unwrap().is_empty());
}

#[test]
fn test_medium_findings_are_never_repaired() {
    let (_tmp, db_path, api) = setup_standard();
    let outcome = api.assign(assign_cmd("L1", "C1", 36.0, 18, 180.0)).unwrap();

    exec(
        &db_path,
        &format!(
            "UPDATE inventory_record SET quantity = 50 WHERE allocation_id = '{}';
             INSERT INTO inventory_record (inventory_id, allocation_id, intake_line_id, cell_id,
                 quantity, packages, weight_kg, volume_m3, quality_status, operational_status,
                 updated_by, created_at, updated_at)
             VALUES ('ORPHAN-1', NULL, 'L1', 'C2', 0, 0, 0, 0, 'CUARENTENA', 'QUARANTINED',
                 'legacy', '2024-01-01 00:00:00.000', '2024-01-01 00:00:00.000');
             UPDATE storage_cell SET max_packages = 10 WHERE cell_id = 'C1';",
            outcome.allocation.allocation_id
        ),
    );

    let report = api.audit(AuditScope::All, true).unwrap();

    assert_eq!(report.issues_with(IssueCode::InventoryExceedsAllocation).count(), 1);
    assert_eq!(report.issues_with(IssueCode::OrphanInventory).count(), 1);
    assert_eq!(report.stats.orphan_inventory, 1);
    assert_eq!(report.issues_with(IssueCode::CellOverCapacity).count(), 1);
    assert!(report.fixes.is_empty());

    let conn = open_test_connection(&db_path).unwrap();
    let quantity: f64 = conn
        .query_row(
            "SELECT quantity FROM inventory_record WHERE allocation_id = ?1",
            [&outcome.allocation.allocation_id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(quantity, 50.0);
    let orphans: i64 = conn
        .query_row("SELECT COUNT(*) FROM inventory_record WHERE allocation_id IS NULL", [], |row| row.get(0))
        .unwrap();
    assert_eq!(orphans, 1);
}

#[test]
fn test_scope_limits_to_warehouse() {
    let (_tmp, db_path, api) = setup_standard();
    api.assign(assign_cmd("L1", "C1", 36.0, 18, 180.0)).unwrap();
    exec(&db_path, "UPDATE storage_cell SET current_packages = 30 WHERE cell_id = 'C1';");

    let other = api.audit(AuditScope::Warehouse("WH2".to_string()), true).unwrap();
    assert!(other.issues.is_empty());
    assert_eq!(other.stats.cells_scanned, 0);
    assert_eq!(cell_counters(&db_path, "C1").0, 30);

    let own = api.audit(AuditScope::Warehouse("WH1".to_string()), true).unwrap();
    assert_eq!(own.fixes.len(), 1);
    assert_eq!(cell_counters(&db_path, "C1").0, 18);
}

#[test]
fn test_small_batches_cover_all_cells() {
    let (_tmp, db_path, _api) = setup_standard();
    ConfigManager::new(&db_path)
        .unwrap()
        .set_config_value(&ConfigScope::Global, config_keys::AUDIT_BATCH_SIZE, "2")
        .unwrap();
    let api = WarehouseApi::open(&db_path).unwrap();
    assert_eq!(api.rules().audit_batch_size, 2);

    exec(
        &db_path,
        "UPDATE storage_cell SET current_packages = 4, current_weight_kg = 40;",
    );

    let report = api.audit(AuditScope::All, true).unwrap();
    assert_eq!(report.stats.cells_scanned, 6);
    assert_eq!(report.fixes.len(), 6);
    assert!(report.stats.pages >= 3);

    for cell in ["C1", "C2", "C3", "R1", "RT1", "S1"] {
        assert_eq!(cell_counters(&db_path, cell).0, 0, "cell {}", cell);
    }
}
