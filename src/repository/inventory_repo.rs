// ==========================================
// 仓储质检核心 - 库存记录数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 库存记录是分配的实物镜像；allocation_id 为空或悬空即孤儿
// ==========================================

use crate::db::{enum_from_sql, ts_from_sql, ts_to_sql};
use crate::domain::allocation::{InventoryRecord, Quantities};
use crate::domain::types::{OperationalStatus, QualityStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::unit_of_work::SqliteStores;
use rusqlite::{params, Result as SqliteResult, Row};

// ==========================================
// InventoryRepository - 库存记录仓储接口
// ==========================================
pub trait InventoryRepository {
    /// 插入库存记录
    fn insert(&self, record: &InventoryRecord) -> RepositoryResult<()>;

    /// 查询某分配下的库存记录（按创建时间升序）
    fn find_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<InventoryRecord>>;

    /// 更新库存记录（库位/数量/状态/修改人/修改时间）
    fn update(&self, record: &InventoryRecord) -> RepositoryResult<()>;

    /// 某库位上全部库存记录的汇总
    fn totals_by_cell(&self, cell_id: &str) -> RepositoryResult<Quantities>;

    /// 孤儿库存记录数量（无所属分配）
    fn count_orphans(&self, warehouse_id: Option<&str>) -> RepositoryResult<i64>;

    /// 可出库库存（APROBADO + AVAILABLE + 数量>0，按有效期 FIFO）
    fn list_available_for_departure(
        &self,
        warehouse_id: Option<&str>,
    ) -> RepositoryResult<Vec<InventoryRecord>>;
}

const SELECT_COLUMNS: &str = r#"
    i.inventory_id, i.allocation_id, i.intake_line_id, i.cell_id,
    i.quantity, i.packages, i.weight_kg, i.volume_m3,
    i.quality_status, i.operational_status,
    i.updated_by, i.created_at, i.updated_at
"#;

fn map_row(row: &Row<'_>) -> SqliteResult<InventoryRecord> {
    let quality_status: String = row.get(8)?;
    let operational_status: String = row.get(9)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    Ok(InventoryRecord {
        inventory_id: row.get(0)?,
        allocation_id: row.get(1)?,
        intake_line_id: row.get(2)?,
        cell_id: row.get(3)?,
        quantity: row.get(4)?,
        packages: row.get(5)?,
        weight_kg: row.get(6)?,
        volume_m3: row.get(7)?,
        quality_status: enum_from_sql(8, &quality_status)?,
        operational_status: enum_from_sql(9, &operational_status)?,
        updated_by: row.get(10)?,
        created_at: ts_from_sql(11, &created_at)?,
        updated_at: ts_from_sql(12, &updated_at)?,
    })
}

impl InventoryRepository for SqliteStores<'_> {
    fn insert(&self, record: &InventoryRecord) -> RepositoryResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO inventory_record (
                inventory_id, allocation_id, intake_line_id, cell_id,
                quantity, packages, weight_kg, volume_m3,
                quality_status, operational_status,
                updated_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                record.inventory_id,
                record.allocation_id,
                record.intake_line_id,
                record.cell_id,
                record.quantity,
                record.packages,
                record.weight_kg,
                record.volume_m3,
                record.quality_status.as_str(),
                record.operational_status.as_str(),
                record.updated_by,
                ts_to_sql(&record.created_at),
                ts_to_sql(&record.updated_at),
            ],
        )?;
        Ok(())
    }

    fn find_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<InventoryRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM inventory_record i
            WHERE i.allocation_id = ?1
            ORDER BY i.created_at, i.inventory_id
            "#,
            SELECT_COLUMNS
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let records = stmt
            .query_map(params![allocation_id], map_row)?
            .collect::<SqliteResult<Vec<InventoryRecord>>>()?;
        Ok(records)
    }

    fn update(&self, record: &InventoryRecord) -> RepositoryResult<()> {
        let affected = self.conn().execute(
            r#"
            UPDATE inventory_record
               SET cell_id = ?2,
                   quantity = ?3, packages = ?4, weight_kg = ?5, volume_m3 = ?6,
                   quality_status = ?7, operational_status = ?8,
                   updated_by = ?9, updated_at = ?10
             WHERE inventory_id = ?1
            "#,
            params![
                record.inventory_id,
                record.cell_id,
                record.quantity,
                record.packages,
                record.weight_kg,
                record.volume_m3,
                record.quality_status.as_str(),
                record.operational_status.as_str(),
                record.updated_by,
                ts_to_sql(&record.updated_at),
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("InventoryRecord", &record.inventory_id));
        }
        Ok(())
    }

    fn totals_by_cell(&self, cell_id: &str) -> RepositoryResult<Quantities> {
        let totals = self.conn().query_row(
            r#"
            SELECT COALESCE(SUM(quantity), 0), COALESCE(SUM(packages), 0),
                   COALESCE(SUM(weight_kg), 0), COALESCE(SUM(volume_m3), 0)
            FROM inventory_record
            WHERE cell_id = ?1
            "#,
            params![cell_id],
            |row| Ok(Quantities::new(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        Ok(totals)
    }

    fn count_orphans(&self, warehouse_id: Option<&str>) -> RepositoryResult<i64> {
        let count = self.conn().query_row(
            r#"
            SELECT COUNT(*)
            FROM inventory_record i
            JOIN storage_cell c ON c.cell_id = i.cell_id
            WHERE (?1 IS NULL OR c.warehouse_id = ?1)
              AND (i.allocation_id IS NULL
                   OR NOT EXISTS (SELECT 1 FROM allocation a WHERE a.allocation_id = i.allocation_id))
            "#,
            params![warehouse_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn list_available_for_departure(
        &self,
        warehouse_id: Option<&str>,
    ) -> RepositoryResult<Vec<InventoryRecord>> {
        // 有效期为空的排在最后，同有效期按入位时间先进先出
        let sql = format!(
            r#"
            SELECT {} FROM inventory_record i
            JOIN storage_cell c ON c.cell_id = i.cell_id
            JOIN intake_line l ON l.intake_line_id = i.intake_line_id
            WHERE (?1 IS NULL OR c.warehouse_id = ?1)
              AND i.quality_status = ?2
              AND i.operational_status = ?3
              AND i.quantity > 0
            ORDER BY l.expiry_date IS NULL, l.expiry_date, i.created_at, i.inventory_id
            "#,
            SELECT_COLUMNS
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let records = stmt
            .query_map(
                params![
                    warehouse_id,
                    QualityStatus::Aprobado.as_str(),
                    OperationalStatus::Available.as_str()
                ],
                map_row,
            )?
            .collect::<SqliteResult<Vec<InventoryRecord>>>()?;
        Ok(records)
    }
}
