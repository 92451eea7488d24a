// ==========================================
// 仓储质检核心 - 分配数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: 更新使用乐观锁 (revision 字段)
// ==========================================

use crate::db::{enum_from_sql, ts_from_sql, ts_to_sql};
use crate::domain::allocation::{Allocation, Quantities};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::unit_of_work::SqliteStores;
use rusqlite::{params, OptionalExtension, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};

/// 某入库行下全部分配的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationTotals {
    pub totals: Quantities,
    pub count: i64,
}

// ==========================================
// AllocationRepository - 分配仓储接口
// ==========================================
pub trait AllocationRepository {
    /// 插入分配
    fn insert(&self, allocation: &Allocation) -> RepositoryResult<()>;

    /// 按ID查询
    fn find_by_id(&self, allocation_id: &str) -> RepositoryResult<Option<Allocation>>;

    /// 带乐观锁更新（revision 自增）
    ///
    /// # 参数
    /// - allocation: 新值（cell/数量/状态/修改人/修改时间）
    /// - expected_revision: 读取时的 revision
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配
    /// - `RepositoryError::NotFound`: 记录不存在
    fn update_guarded(&self, allocation: &Allocation, expected_revision: i32) -> RepositoryResult<()>;

    /// 某入库行下全部分配的汇总
    fn totals_by_intake_line(&self, intake_line_id: &str) -> RepositoryResult<AllocationTotals>;

    /// 按ID升序分页（仓库过滤按所在库位）
    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<Allocation>>;
}

const SELECT_COLUMNS: &str = r#"
    a.allocation_id, a.intake_line_id, a.cell_id,
    a.quantity, a.packages, a.weight_kg, a.volume_m3,
    a.quality_status, a.presentation, a.item_condition, a.status_code, a.observations,
    a.created_by, a.updated_by, a.created_at, a.updated_at, a.revision
"#;

fn map_row(row: &Row<'_>) -> SqliteResult<Allocation> {
    let quality_status: String = row.get(7)?;
    let presentation: String = row.get(8)?;
    let condition: String = row.get(9)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;
    Ok(Allocation {
        allocation_id: row.get(0)?,
        intake_line_id: row.get(1)?,
        cell_id: row.get(2)?,
        quantity: row.get(3)?,
        packages: row.get(4)?,
        weight_kg: row.get(5)?,
        volume_m3: row.get(6)?,
        quality_status: enum_from_sql(7, &quality_status)?,
        presentation: enum_from_sql(8, &presentation)?,
        condition: enum_from_sql(9, &condition)?,
        status_code: row.get(10)?,
        observations: row.get(11)?,
        created_by: row.get(12)?,
        updated_by: row.get(13)?,
        created_at: ts_from_sql(14, &created_at)?,
        updated_at: ts_from_sql(15, &updated_at)?,
        revision: row.get(16)?,
    })
}

impl AllocationRepository for SqliteStores<'_> {
    fn insert(&self, allocation: &Allocation) -> RepositoryResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO allocation (
                allocation_id, intake_line_id, cell_id,
                quantity, packages, weight_kg, volume_m3,
                quality_status, presentation, item_condition, status_code, observations,
                created_by, updated_by, created_at, updated_at, revision
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                allocation.allocation_id,
                allocation.intake_line_id,
                allocation.cell_id,
                allocation.quantity,
                allocation.packages,
                allocation.weight_kg,
                allocation.volume_m3,
                allocation.quality_status.as_str(),
                allocation.presentation.as_str(),
                allocation.condition.as_str(),
                allocation.status_code,
                allocation.observations,
                allocation.created_by,
                allocation.updated_by,
                ts_to_sql(&allocation.created_at),
                ts_to_sql(&allocation.updated_at),
                allocation.revision,
            ],
        )?;
        Ok(())
    }

    fn find_by_id(&self, allocation_id: &str) -> RepositoryResult<Option<Allocation>> {
        let sql = format!(
            "SELECT {} FROM allocation a WHERE a.allocation_id = ?1",
            SELECT_COLUMNS
        );
        let allocation = self
            .conn()
            .query_row(&sql, params![allocation_id], map_row)
            .optional()?;
        Ok(allocation)
    }

    fn update_guarded(&self, allocation: &Allocation, expected_revision: i32) -> RepositoryResult<()> {
        let conn = self.conn();

        // 执行更新，带revision检查
        let affected = conn.execute(
            r#"
            UPDATE allocation
               SET cell_id = ?2,
                   quantity = ?3, packages = ?4, weight_kg = ?5, volume_m3 = ?6,
                   quality_status = ?7, observations = ?8,
                   updated_by = ?9, updated_at = ?10,
                   revision = revision + 1
             WHERE allocation_id = ?1 AND revision = ?11
            "#,
            params![
                allocation.allocation_id,
                allocation.cell_id,
                allocation.quantity,
                allocation.packages,
                allocation.weight_kg,
                allocation.volume_m3,
                allocation.quality_status.as_str(),
                allocation.observations,
                allocation.updated_by,
                ts_to_sql(&allocation.updated_at),
                expected_revision,
            ],
        )?;

        if affected == 0 {
            // 判断是记录不存在还是revision冲突
            let actual: Option<i32> = conn
                .query_row(
                    "SELECT revision FROM allocation WHERE allocation_id = ?1",
                    params![allocation.allocation_id],
                    |row| row.get(0),
                )
                .optional()?;

            return Err(match actual {
                Some(actual) => RepositoryError::OptimisticLockFailure {
                    entity: "Allocation".to_string(),
                    id: allocation.allocation_id.clone(),
                    expected: expected_revision,
                    actual,
                },
                None => RepositoryError::not_found("Allocation", &allocation.allocation_id),
            });
        }

        Ok(())
    }

    fn totals_by_intake_line(&self, intake_line_id: &str) -> RepositoryResult<AllocationTotals> {
        let totals = self.conn().query_row(
            r#"
            SELECT COALESCE(SUM(quantity), 0), COALESCE(SUM(packages), 0),
                   COALESCE(SUM(weight_kg), 0), COALESCE(SUM(volume_m3), 0),
                   COUNT(*)
            FROM allocation
            WHERE intake_line_id = ?1
            "#,
            params![intake_line_id],
            |row| {
                Ok(AllocationTotals {
                    totals: Quantities::new(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?),
                    count: row.get(4)?,
                })
            },
        )?;
        Ok(totals)
    }

    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<Allocation>> {
        let sql = format!(
            r#"
            SELECT {} FROM allocation a
            JOIN storage_cell c ON c.cell_id = a.cell_id
            WHERE (?1 IS NULL OR c.warehouse_id = ?1)
              AND (?2 IS NULL OR a.allocation_id > ?2)
            ORDER BY a.allocation_id
            LIMIT ?3
            "#,
            SELECT_COLUMNS
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let allocations = stmt
            .query_map(params![warehouse_id, after_id, limit as i64], map_row)?
            .collect::<SqliteResult<Vec<Allocation>>>()?;
        Ok(allocations)
    }
}
