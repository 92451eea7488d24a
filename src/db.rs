// ==========================================
// 仓储质检核心 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表幂等 (CREATE TABLE IF NOT EXISTS)
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::types::ParseEnumError;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳存储格式
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化全部表结构（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS intake_line (
            intake_line_id TEXT PRIMARY KEY,
            warehouse_id TEXT NOT NULL,
            product_code TEXT NOT NULL,
            quantity REAL NOT NULL,
            packages INTEGER NOT NULL,
            weight_kg REAL NOT NULL,
            volume_m3 REAL NOT NULL DEFAULT 0,
            review_state TEXT NOT NULL,
            expiry_date TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_intake_line_warehouse ON intake_line(warehouse_id);

        CREATE TABLE IF NOT EXISTS storage_cell (
            cell_id TEXT PRIMARY KEY,
            warehouse_id TEXT NOT NULL,
            code TEXT NOT NULL,
            role TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'AVAILABLE',
            max_packages INTEGER,
            max_weight_kg REAL,
            max_volume_m3 REAL,
            current_packages INTEGER NOT NULL DEFAULT 0,
            current_weight_kg REAL NOT NULL DEFAULT 0,
            current_volume_m3 REAL NOT NULL DEFAULT 0,
            UNIQUE (warehouse_id, code)
        );

        CREATE TABLE IF NOT EXISTS allocation (
            allocation_id TEXT PRIMARY KEY,
            intake_line_id TEXT NOT NULL REFERENCES intake_line(intake_line_id),
            cell_id TEXT NOT NULL REFERENCES storage_cell(cell_id),
            quantity REAL NOT NULL,
            packages INTEGER NOT NULL,
            weight_kg REAL NOT NULL,
            volume_m3 REAL NOT NULL,
            quality_status TEXT NOT NULL,
            presentation TEXT NOT NULL,
            item_condition TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            observations TEXT,
            created_by TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_allocation_intake_line ON allocation(intake_line_id);
        CREATE INDEX IF NOT EXISTS idx_allocation_cell ON allocation(cell_id);

        CREATE TABLE IF NOT EXISTS inventory_record (
            inventory_id TEXT PRIMARY KEY,
            allocation_id TEXT REFERENCES allocation(allocation_id) ON DELETE SET NULL,
            intake_line_id TEXT NOT NULL,
            cell_id TEXT NOT NULL REFERENCES storage_cell(cell_id),
            quantity REAL NOT NULL,
            packages INTEGER NOT NULL,
            weight_kg REAL NOT NULL,
            volume_m3 REAL NOT NULL,
            quality_status TEXT NOT NULL,
            operational_status TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_inventory_allocation ON inventory_record(allocation_id);
        CREATE INDEX IF NOT EXISTS idx_inventory_cell ON inventory_record(cell_id);

        CREATE TABLE IF NOT EXISTS quality_transition (
            transition_id TEXT PRIMARY KEY,
            allocation_id TEXT NOT NULL REFERENCES allocation(allocation_id),
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            quantity REAL NOT NULL,
            packages INTEGER NOT NULL,
            weight_kg REAL NOT NULL,
            volume_m3 REAL NOT NULL,
            from_cell_id TEXT NOT NULL,
            to_cell_id TEXT NOT NULL,
            reason TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transition_allocation ON quality_transition(allocation_id);

        CREATE TABLE IF NOT EXISTS movement_log (
            movement_id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            movement_kind TEXT NOT NULL,
            quantity_delta REAL NOT NULL,
            package_delta INTEGER NOT NULL,
            weight_delta REAL NOT NULL,
            volume_delta REAL NOT NULL,
            lot_ref TEXT,
            allocation_ref TEXT,
            cell_ref TEXT,
            warehouse_ref TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_movement_allocation ON movement_log(allocation_ref);

        CREATE TABLE IF NOT EXISTS audit_log (
            audit_id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            description TEXT NOT NULL,
            old_values TEXT,
            new_values TEXT,
            metadata TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 时间戳 -> 数据库文本
pub fn ts_to_sql(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 数据库文本 -> 时间戳
pub fn ts_from_sql(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 数据库文本 -> 封闭枚举
pub fn enum_from_sql<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), None);
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_timestamp_round_trip_keeps_fraction() {
        let ts = chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_milli_opt(8, 30, 0, 250)
            .unwrap();
        let raw = ts_to_sql(&ts);
        assert_eq!(ts_from_sql(0, &raw).unwrap(), ts);
        assert!(ts_from_sql(0, "not a date").is_err());
    }
}
