// ==========================================
// 仓储质检核心 - 审计记录/移动流水仓储
// ==========================================
// 红线: 所有写入必须记录
// 说明: 只提供最小回读能力，查询/导出/看板属于外部系统
// ==========================================

use crate::db::{enum_from_sql, ts_from_sql, ts_to_sql};
use crate::domain::audit::{AuditRecord, MovementLogEntry};
use crate::repository::error::RepositoryResult;
use crate::repository::unit_of_work::SqliteStores;
use rusqlite::{params, Result as SqliteResult, Row};
use serde_json::Value as JsonValue;

// ==========================================
// AuditTrailRepository - 审计仓储接口
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub trait AuditTrailRepository {
    /// 插入审计记录
    fn insert_audit(&self, record: &AuditRecord) -> RepositoryResult<()>;

    /// 插入移动流水
    fn insert_movement(&self, entry: &MovementLogEntry) -> RepositoryResult<()>;

    /// 查询某实体的审计记录（时间升序）
    fn find_audits_by_entity(&self, entity_type: &str, entity_id: &str) -> RepositoryResult<Vec<AuditRecord>>;

    /// 查询某分配的移动流水（时间升序）
    fn find_movements_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<MovementLogEntry>>;
}

fn parse_json(raw: Option<String>) -> Option<JsonValue> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn map_audit_row(row: &Row<'_>) -> SqliteResult<AuditRecord> {
    let created_at: String = row.get(9)?;
    Ok(AuditRecord {
        audit_id: row.get(0)?,
        actor: row.get(1)?,
        action: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        description: row.get(5)?,
        old_values: parse_json(row.get(6)?),
        new_values: parse_json(row.get(7)?),
        metadata: parse_json(row.get(8)?),
        created_at: ts_from_sql(9, &created_at)?,
    })
}

fn map_movement_row(row: &Row<'_>) -> SqliteResult<MovementLogEntry> {
    let movement_kind: String = row.get(2)?;
    let created_at: String = row.get(11)?;
    Ok(MovementLogEntry {
        movement_id: row.get(0)?,
        actor: row.get(1)?,
        movement_kind: enum_from_sql(2, &movement_kind)?,
        quantity_delta: row.get(3)?,
        package_delta: row.get(4)?,
        weight_delta: row.get(5)?,
        volume_delta: row.get(6)?,
        lot_ref: row.get(7)?,
        allocation_ref: row.get(8)?,
        cell_ref: row.get(9)?,
        warehouse_ref: row.get(10)?,
        created_at: ts_from_sql(11, &created_at)?,
    })
}

impl AuditTrailRepository for SqliteStores<'_> {
    fn insert_audit(&self, record: &AuditRecord) -> RepositoryResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO audit_log (
                audit_id, actor, action, entity_type, entity_id,
                description, old_values, new_values, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                record.audit_id,
                record.actor,
                record.action,
                record.entity_type,
                record.entity_id,
                record.description,
                record.old_values.as_ref().map(|v| v.to_string()),
                record.new_values.as_ref().map(|v| v.to_string()),
                record.metadata.as_ref().map(|v| v.to_string()),
                ts_to_sql(&record.created_at),
            ],
        )?;
        Ok(())
    }

    fn insert_movement(&self, entry: &MovementLogEntry) -> RepositoryResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO movement_log (
                movement_id, actor, movement_kind,
                quantity_delta, package_delta, weight_delta, volume_delta,
                lot_ref, allocation_ref, cell_ref, warehouse_ref, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                entry.movement_id,
                entry.actor,
                entry.movement_kind.as_str(),
                entry.quantity_delta,
                entry.package_delta,
                entry.weight_delta,
                entry.volume_delta,
                entry.lot_ref,
                entry.allocation_ref,
                entry.cell_ref,
                entry.warehouse_ref,
                ts_to_sql(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    fn find_audits_by_entity(&self, entity_type: &str, entity_id: &str) -> RepositoryResult<Vec<AuditRecord>> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT audit_id, actor, action, entity_type, entity_id,
                   description, old_values, new_values, metadata, created_at
            FROM audit_log
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at, rowid
            "#,
        )?;
        let records = stmt
            .query_map(params![entity_type, entity_id], map_audit_row)?
            .collect::<SqliteResult<Vec<AuditRecord>>>()?;
        Ok(records)
    }

    fn find_movements_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<MovementLogEntry>> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT movement_id, actor, movement_kind,
                   quantity_delta, package_delta, weight_delta, volume_delta,
                   lot_ref, allocation_ref, cell_ref, warehouse_ref, created_at
            FROM movement_log
            WHERE allocation_ref = ?1
            ORDER BY created_at, rowid
            "#,
        )?;
        let entries = stmt
            .query_map(params![allocation_id], map_movement_row)?
            .collect::<SqliteResult<Vec<MovementLogEntry>>>()?;
        Ok(entries)
    }
}
