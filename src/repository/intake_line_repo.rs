// ==========================================
// 仓储质检核心 - 入库行数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 入库行由上游登记，本核心只读；insert 仅供装载/测试
// ==========================================

use crate::db::{enum_from_sql, ts_from_sql, ts_to_sql};
use crate::domain::intake::IntakeLine;
use crate::repository::error::RepositoryResult;
use crate::repository::unit_of_work::SqliteStores;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Result as SqliteResult, Row};

// ==========================================
// IntakeLineRepository - 入库行仓储接口
// ==========================================
pub trait IntakeLineRepository {
    /// 插入入库行
    fn insert(&self, line: &IntakeLine) -> RepositoryResult<()>;

    /// 按ID查询
    fn find_by_id(&self, intake_line_id: &str) -> RepositoryResult<Option<IntakeLine>>;

    /// 按ID升序分页 (键集分页)
    ///
    /// # 参数
    /// - warehouse_id: 仓库过滤 (None = 全部)
    /// - after_id: 上一页最后一条ID
    /// - limit: 每页条数
    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<IntakeLine>>;
}

const SELECT_COLUMNS: &str = r#"
    intake_line_id, warehouse_id, product_code, quantity, packages,
    weight_kg, volume_m3, review_state, expiry_date, created_at
"#;

fn map_row(row: &Row<'_>) -> SqliteResult<IntakeLine> {
    let review_state: String = row.get(7)?;
    let expiry_date: Option<String> = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(IntakeLine {
        intake_line_id: row.get(0)?,
        warehouse_id: row.get(1)?,
        product_code: row.get(2)?,
        quantity: row.get(3)?,
        packages: row.get(4)?,
        weight_kg: row.get(5)?,
        volume_m3: row.get(6)?,
        review_state: enum_from_sql(7, &review_state)?,
        expiry_date: expiry_date.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        created_at: ts_from_sql(9, &created_at)?,
    })
}

impl IntakeLineRepository for SqliteStores<'_> {
    fn insert(&self, line: &IntakeLine) -> RepositoryResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO intake_line (
                intake_line_id, warehouse_id, product_code, quantity, packages,
                weight_kg, volume_m3, review_state, expiry_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                line.intake_line_id,
                line.warehouse_id,
                line.product_code,
                line.quantity,
                line.packages,
                line.weight_kg,
                line.volume_m3,
                line.review_state.as_str(),
                line.expiry_date.map(|d| d.format("%Y-%m-%d").to_string()),
                ts_to_sql(&line.created_at),
            ],
        )?;
        Ok(())
    }

    fn find_by_id(&self, intake_line_id: &str) -> RepositoryResult<Option<IntakeLine>> {
        let sql = format!(
            "SELECT {} FROM intake_line WHERE intake_line_id = ?1",
            SELECT_COLUMNS
        );
        let line = self
            .conn()
            .query_row(&sql, params![intake_line_id], map_row)
            .optional()?;
        Ok(line)
    }

    fn list_page(
        &self,
        warehouse_id: Option<&str>,
        after_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<IntakeLine>> {
        let sql = format!(
            r#"
            SELECT {} FROM intake_line
            WHERE (?1 IS NULL OR warehouse_id = ?1)
              AND (?2 IS NULL OR intake_line_id > ?2)
            ORDER BY intake_line_id
            LIMIT ?3
            "#,
            SELECT_COLUMNS
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let lines = stmt
            .query_map(params![warehouse_id, after_id, limit as i64], map_row)?
            .collect::<SqliteResult<Vec<IntakeLine>>>()?;
        Ok(lines)
    }
}
