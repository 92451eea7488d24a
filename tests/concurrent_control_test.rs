// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证乐观锁 (revision) 与写事务串行化
// ==========================================


#[cfg(test)]
mod concurrent_control_test {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use warehouse_qc::api::{ApiError, WarehouseApi};
    use warehouse_qc::domain::types::CellRole;

    use crate::test_helpers::{
        assign_cmd, cell_counters, create_test_db, intake_line, seed, setup_standard,
        storage_cell, transition_cmd,
    };

    // ==========================================
    // 乐观锁
    // ==========================================

    #[test]
    fn test_stale_revision_conflict() {
        let (_tmp, _db_path, api) = setup_standard();
        let assigned = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
        let id = assigned.allocation.allocation_id.clone();

        let mut cmd = transition_cmd(&id, "APROBADO", 40.0);
        cmd.expected_revision = Some(7);
        match api.transition(cmd).unwrap_err() {
            ApiError::Conflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 7);
                assert_eq!(actual, 1);
            }
            other => panic!("Expected Conflict, got {:?}", other),
        }

        // 正确版本号可以通过
        let mut cmd = transition_cmd(&id, "APROBADO", 40.0);
        cmd.expected_revision = Some(1);
        let outcome = api.transition(cmd).unwrap();
        assert_eq!(outcome.allocation.revision, 2);
    }

    #[test]
    fn test_racing_transitions_single_winner() {
        let (_tmp, db_path, api) = setup_standard();
        let assigned = api.assign(assign_cmd("L1", "C1", 40.0, 20, 200.0)).unwrap();
        let id = assigned.allocation.allocation_id.clone();
        drop(api);

        let workers = 4;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let db_path = db_path.clone();
                let id = id.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    // 每个线程独立连接
                    let api = WarehouseApi::open(&db_path).unwrap();
                    let mut cmd = transition_cmd(&id, "RECHAZADOS", 10.0);
                    cmd.destination_cell_id = Some("R1".to_string());
                    cmd.expected_revision = Some(1);
                    barrier.wait();
                    api.transition(cmd)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "results: {:?}", results);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, ApiError::Conflict { .. }), "got {:?}", err);
        }

        // 只扣减一次
        assert_eq!(cell_counters(&db_path, "C1").0, 15);
        assert_eq!(cell_counters(&db_path, "R1").0, 5);
    }

    // ==========================================
    // 写事务串行化
    // ==========================================

    #[test]
    fn test_concurrent_assigns_never_overdraw_lot() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let cells: Vec<_> = (0..5)
            .map(|i| storage_cell(&format!("C{}", i), CellRole::Standard))
            .collect();
        seed(&db_path, &[intake_line("L1", 100.0, 50, 500.0)], &cells).unwrap();

        let barrier = Arc::new(Barrier::new(cells.len()));
        let handles: Vec<_> = (0..cells.len())
            .map(|i| {
                let db_path = db_path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let api = WarehouseApi::open(&db_path).unwrap();
                    barrier.wait();
                    api.assign(assign_cmd("L1", &format!("C{}", i), 30.0, 15, 150.0))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 3, "results: {:?}", results);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err, ApiError::ValidationError(_)), "got {:?}", err);
        }

        let api = WarehouseApi::open(&db_path).unwrap();
        let summary = api.lot_summary("L1").unwrap();
        assert_eq!(summary.allocated.quantity, 90.0);
        assert_eq!(summary.allocated.packages, 45);
        assert_eq!(summary.allocation_count, 3);
    }
}
