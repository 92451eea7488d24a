// ==========================================
// 仓储质检核心 - 库位数据仓储
// ==========================================
// 红线: 占用计数只允许 "SET x = x + ?" 原子增减，禁止读-改-写
// ==========================================

use crate::db::enum_from_sql;
use crate::domain::cell::{CellLoad, StorageCell};
use crate::domain::types::CellStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::unit_of_work::SqliteStores;
use rusqlite::{params, OptionalExtension, Result as SqliteResult, Row};

// ==========================================
// StorageCellRepository - 库位仓储接口
// ==========================================
pub trait StorageCellRepository {
    /// 插入库位
    fn insert(&self, cell: &StorageCell) -> RepositoryResult<()>;

    /// 按ID查询
    fn find_by_id(&self, cell_id: &str) -> RepositoryResult<Option<StorageCell>>;

    /// 原子增减占用计数
    ///
    /// # 返回
    /// - Err(NotFound): 库位不存在
    fn adjust_load(&self, cell_id: &str, delta: &CellLoad) -> RepositoryResult<()>;

    /// AVAILABLE -> OCCUPIED（已占用则不变）
    fn mark_occupied(&self, cell_id: &str) -> RepositoryResult<()>;

    /// 按ID升序分页
    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<StorageCell>>;
}

const SELECT_COLUMNS: &str = r#"
    cell_id, warehouse_id, code, role, status,
    max_packages, max_weight_kg, max_volume_m3,
    current_packages, current_weight_kg, current_volume_m3
"#;

fn map_row(row: &Row<'_>) -> SqliteResult<StorageCell> {
    let role: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(StorageCell {
        cell_id: row.get(0)?,
        warehouse_id: row.get(1)?,
        code: row.get(2)?,
        role: enum_from_sql(3, &role)?,
        status: enum_from_sql(4, &status)?,
        max_packages: row.get(5)?,
        max_weight_kg: row.get(6)?,
        max_volume_m3: row.get(7)?,
        current_packages: row.get(8)?,
        current_weight_kg: row.get(9)?,
        current_volume_m3: row.get(10)?,
    })
}

impl StorageCellRepository for SqliteStores<'_> {
    fn insert(&self, cell: &StorageCell) -> RepositoryResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO storage_cell (
                cell_id, warehouse_id, code, role, status,
                max_packages, max_weight_kg, max_volume_m3,
                current_packages, current_weight_kg, current_volume_m3
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                cell.cell_id,
                cell.warehouse_id,
                cell.code,
                cell.role.as_str(),
                cell.status.as_str(),
                cell.max_packages,
                cell.max_weight_kg,
                cell.max_volume_m3,
                cell.current_packages,
                cell.current_weight_kg,
                cell.current_volume_m3,
            ],
        )?;
        Ok(())
    }

    fn find_by_id(&self, cell_id: &str) -> RepositoryResult<Option<StorageCell>> {
        let sql = format!("SELECT {} FROM storage_cell WHERE cell_id = ?1", SELECT_COLUMNS);
        let cell = self
            .conn()
            .query_row(&sql, params![cell_id], map_row)
            .optional()?;
        Ok(cell)
    }

    fn adjust_load(&self, cell_id: &str, delta: &CellLoad) -> RepositoryResult<()> {
        let affected = self.conn().execute(
            r#"
            UPDATE storage_cell
               SET current_packages = current_packages + ?2,
                   current_weight_kg = current_weight_kg + ?3,
                   current_volume_m3 = current_volume_m3 + ?4
             WHERE cell_id = ?1
            "#,
            params![cell_id, delta.packages, delta.weight_kg, delta.volume_m3],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("StorageCell", cell_id));
        }
        Ok(())
    }

    fn mark_occupied(&self, cell_id: &str) -> RepositoryResult<()> {
        self.conn().execute(
            "UPDATE storage_cell SET status = ?2 WHERE cell_id = ?1 AND status = ?3",
            params![
                cell_id,
                CellStatus::Occupied.as_str(),
                CellStatus::Available.as_str()
            ],
        )?;
        Ok(())
    }

    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<StorageCell>> {
        let sql = format!(
            r#"
            SELECT {} FROM storage_cell
            WHERE (?1 IS NULL OR warehouse_id = ?1)
              AND (?2 IS NULL OR cell_id > ?2)
            ORDER BY cell_id
            LIMIT ?3
            "#,
            SELECT_COLUMNS
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let cells = stmt
            .query_map(params![warehouse_id, after_id, limit as i64], map_row)?
            .collect::<SqliteResult<Vec<StorageCell>>>()?;
        Ok(cells)
    }
}
