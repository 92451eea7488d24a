// ==========================================
// 质检流转集成测试
// ==========================================
// 测试目标: 部分流转、库位迁移、计数增减、状态约束
// ==========================================


use test_helpers::{assign_cmd, cell_counters, setup_standard, transition_cmd};
use warehouse_qc::api::ApiError;
use warehouse_qc::domain::types::{OperationalStatus, QualityStatus};

#[test]
fn test_partial_approval_stays_in_cell() {
    let (_tmp, db_path, api) = setup_standard();
    let assigned = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
    let id = assigned.allocation.allocation_id.clone();

    let outcome = api.transition(transition_cmd(&id, "APROBADO", 15.0)).unwrap();

    assert_eq!(outcome.allocation.quantity, 15.0);
    assert_eq!(outcome.allocation.packages, 8);
    assert_eq!(outcome.allocation.weight_kg, 75.0);
    assert_eq!(outcome.allocation.quality_status, QualityStatus::Aprobado);
    assert_eq!(outcome.allocation.cell_id, "C1");
    assert_eq!(outcome.allocation.revision, 2);
    assert_eq!(outcome.inventory.operational_status, OperationalStatus::Available);

    // 同库位: 净变化为零
    let (packages, weight, _) = cell_counters(&db_path, "C1");
    assert_eq!(packages, 20);
    assert_eq!(weight, 200.0);

    let history = api.transition_history(&id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, QualityStatus::Cuarentena);
    assert_eq!(history[0].to_cell_id, "C1");
}

#[test]
fn test_rejection_into_standard_cell_fails() {
    let (_tmp, db_path, api) = setup_standard();
    let assigned = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
    let id = assigned.allocation.allocation_id.clone();

    let mut cmd = transition_cmd(&id, "RECHAZADOS", 10.0);
    cmd.destination_cell_id = Some("C2".to_string());
    let err = api.transition(cmd).unwrap_err();
    assert!(matches!(err, ApiError::ValidationError(_)), "got {:?}", err);

    // 缺少目标库位
    let err = api.transition(transition_cmd(&id, "RECHAZADOS", 10.0)).unwrap_err();
    assert!(matches!(err, ApiError::ValidationError(_)));

    // 全部回滚
    assert!(api.transition_history(&id).unwrap().is_empty());
    assert_eq!(cell_counters(&db_path, "C2").0, 0);
}

#[test]
fn test_rejection_moves_load_between_cells() {
    let (_tmp, db_path, api) = setup_standard();
    let assigned = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
    let id = assigned.allocation.allocation_id.clone();

    let mut cmd = transition_cmd(&id, "RECHAZADOS", 10.0);
    cmd.destination_cell_id = Some("R1".to_string());
    let outcome = api.transition(cmd).unwrap();

    assert_eq!(outcome.allocation.packages, 5);
    assert_eq!(outcome.allocation.weight_kg, 50.0);
    assert_eq!(outcome.source_cell.current_packages, 15);
    assert_eq!(outcome.destination_cell.current_packages, 5);

    let (src_packages, src_weight, src_status) = cell_counters(&db_path, "C1");
    assert_eq!((src_packages, src_weight), (15, 150.0));
    // 计数降低后库位仍保持 OCCUPIED
    assert_eq!(src_status, "OCCUPIED");
    let (dst_packages, dst_weight, dst_status) = cell_counters(&db_path, "R1");
    assert_eq!((dst_packages, dst_weight), (5, 50.0));
    assert_eq!(dst_status, "OCCUPIED");

    let movements = api.movements_for_allocation(&id).unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[1].movement_kind.as_str(), "TRANSFER");
    assert_eq!(movements[1].cell_ref.as_deref(), Some("R1"));
}

#[test]
fn test_samples_and_returns_need_matching_roles() {
    let (_tmp, _db_path, api) = setup_standard();
    let a = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
    let b = api.assign(assign_cmd("L1", "C2", 40.0, 20, 200.0)).unwrap();

    let mut samples = transition_cmd(&a.allocation.allocation_id, "CONTRAMUESTRAS", 2.0);
    samples.destination_cell_id = Some("RT1".to_string());
    assert!(matches!(api.transition(samples.clone()), Err(ApiError::ValidationError(_))));
    samples.destination_cell_id = Some("S1".to_string());
    let outcome = api.transition(samples).unwrap();
    assert_eq!(outcome.allocation.packages, 1);
    assert_eq!(outcome.allocation.weight_kg, 10.0);

    let mut returns = transition_cmd(&b.allocation.allocation_id, "DEVOLUCIONES", 40.0);
    returns.destination_cell_id = Some("RT1".to_string());
    let outcome = api.transition(returns).unwrap();
    assert_eq!(outcome.inventory.quality_status, QualityStatus::Devoluciones);
    assert_eq!(outcome.destination_cell.current_packages, 20);
}

#[test]
fn test_explicit_amounts_checked_against_tolerance() {
    let (_tmp, _db_path, api) = setup_standard();
    let assigned = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
    let id = assigned.allocation.allocation_id.clone();

    let mut cmd = transition_cmd(&id, "APROBADO", 15.0);
    cmd.packages = Some(12);
    assert!(matches!(api.transition(cmd.clone()), Err(ApiError::ValidationError(_))));

    cmd.packages = Some(7);
    cmd.weight_kg = Some(74.0);
    let outcome = api.transition(cmd).unwrap();
    assert_eq!(outcome.allocation.packages, 7);
    assert_eq!(outcome.allocation.weight_kg, 74.0);
}

#[test]
fn test_second_transition_of_same_allocation_rejected() {
    let (_tmp, db_path, api) = setup_standard();
    let assigned = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
    let id = assigned.allocation.allocation_id.clone();

    let mut cmd = transition_cmd(&id, "RECHAZADOS", 10.0);
    cmd.destination_cell_id = Some("R1".to_string());
    api.transition(cmd.clone()).unwrap();

    // 已离开 CUARENTENA，重复请求不会再次扣减
    let err = api.transition(cmd).unwrap_err();
    assert!(matches!(err, ApiError::InvalidState(_)), "got {:?}", err);
    assert_eq!(cell_counters(&db_path, "C1").0, 15);
    assert_eq!(cell_counters(&db_path, "R1").0, 5);
    assert_eq!(api.transition_history(&id).unwrap().len(), 1);
}

#[test]
fn test_input_validation() {
    let (_tmp, _db_path, api) = setup_standard();
    let assigned = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
    let id = assigned.allocation.allocation_id.clone();

    assert!(matches!(
        api.transition(transition_cmd(&id, "APROBADO", 41.0)),
        Err(ApiError::ValidationError(_))
    ));
    assert!(matches!(
        api.transition(transition_cmd(&id, "CUARENTENA", 1.0)),
        Err(ApiError::ValidationError(_))
    ));
    assert!(matches!(
        api.transition(transition_cmd("missing", "APROBADO", 1.0)),
        Err(ApiError::NotFound(_))
    ));

    let mut no_reason = transition_cmd(&id, "APROBADO", 1.0);
    no_reason.reason = "  ".to_string();
    assert!(matches!(api.transition(no_reason), Err(ApiError::ValidationError(_))));
}
