// ==========================================
// 仓储质检核心 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 优先级: 仓库级 > global > 代码缺省值
// ==========================================

use crate::config::warehouse_rules::WarehouseRules;
use crate::db::open_sqlite_connection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

const GLOBAL_SCOPE_ID: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, scope: &ConfigScope, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![scope.scope_id(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        self.get_config_value(&ConfigScope::Global, key)
    }

    /// 写入配置值（存在则覆盖）
    pub fn set_config_value(&self, scope: &ConfigScope, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 读取生效值：仓库级覆写优先，其次 global
    fn get_effective_value(&self, scope: &ConfigScope, key: &str) -> RepositoryResult<Option<String>> {
        if let ConfigScope::Warehouse { .. } = scope {
            if let Some(value) = self.get_config_value(scope, key)? {
                return Ok(Some(value));
            }
        }
        self.get_global_config_value(key)
    }

    /// 读取数值配置，缺失/格式错误/越界时回退缺省值
    fn get_number_or_default<T>(
        &self,
        scope: &ConfigScope,
        key: &str,
        default: T,
        valid: impl Fn(&T) -> bool,
    ) -> RepositoryResult<T>
    where
        T: FromStr + Display + Copy,
    {
        let raw = match self.get_effective_value(scope, key)? {
            Some(raw) => raw,
            None => return Ok(default),
        };

        match raw.trim().parse::<T>() {
            Ok(value) if valid(&value) => Ok(value),
            _ => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置值无效，使用缺省值"
                );
                Ok(default)
            }
        }
    }

    /// 加载业务规则参数
    pub fn load_rules(&self, scope: &ConfigScope) -> RepositoryResult<WarehouseRules> {
        let d = WarehouseRules::default();
        let ratio = |v: &f64| v.is_finite() && *v >= 0.0;

        Ok(WarehouseRules {
            allocation_package_ratio_tolerance: self.get_number_or_default(
                scope,
                config_keys::ALLOCATION_PACKAGE_RATIO_TOLERANCE,
                d.allocation_package_ratio_tolerance,
                ratio,
            )?,
            allocation_weight_ratio_tolerance: self.get_number_or_default(
                scope,
                config_keys::ALLOCATION_WEIGHT_RATIO_TOLERANCE,
                d.allocation_weight_ratio_tolerance,
                ratio,
            )?,
            transition_package_tolerance: self.get_number_or_default(
                scope,
                config_keys::TRANSITION_PACKAGE_TOLERANCE,
                d.transition_package_tolerance,
                ratio,
            )?,
            transition_weight_tolerance: self.get_number_or_default(
                scope,
                config_keys::TRANSITION_WEIGHT_TOLERANCE,
                d.transition_weight_tolerance,
                ratio,
            )?,
            transition_min_package_tolerance: self.get_number_or_default(
                scope,
                config_keys::TRANSITION_MIN_PACKAGE_TOLERANCE,
                d.transition_min_package_tolerance,
                |v: &i64| *v >= 0,
            )?,
            audit_package_drift_threshold: self.get_number_or_default(
                scope,
                config_keys::AUDIT_PACKAGE_DRIFT_THRESHOLD,
                d.audit_package_drift_threshold,
                |v: &i64| *v >= 0,
            )?,
            audit_weight_drift_threshold_kg: self.get_number_or_default(
                scope,
                config_keys::AUDIT_WEIGHT_DRIFT_THRESHOLD_KG,
                d.audit_weight_drift_threshold_kg,
                ratio,
            )?,
            audit_batch_size: self.get_number_or_default(
                scope,
                config_keys::AUDIT_BATCH_SIZE,
                d.audit_batch_size,
                |v: &usize| *v > 0,
            )?,
            epsilon: self.get_number_or_default(
                scope,
                config_keys::NUMERIC_EPSILON,
                d.epsilon,
                |v: &f64| v.is_finite() && *v > 0.0,
            )?,
        })
    }
}

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,                             // 全局
    Warehouse { warehouse_id: String }, // 仓库
}

impl ConfigScope {
    pub fn warehouse(warehouse_id: &str) -> Self {
        ConfigScope::Warehouse {
            warehouse_id: warehouse_id.to_string(),
        }
    }

    /// config_kv.scope_id
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => GLOBAL_SCOPE_ID.to_string(),
            ConfigScope::Warehouse { warehouse_id } => format!("warehouse/{}", warehouse_id),
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分配
    pub const ALLOCATION_PACKAGE_RATIO_TOLERANCE: &str = "allocation.package_ratio_tolerance";
    pub const ALLOCATION_WEIGHT_RATIO_TOLERANCE: &str = "allocation.weight_ratio_tolerance";

    // 质检流转
    pub const TRANSITION_PACKAGE_TOLERANCE: &str = "transition.package_tolerance";
    pub const TRANSITION_WEIGHT_TOLERANCE: &str = "transition.weight_tolerance";
    pub const TRANSITION_MIN_PACKAGE_TOLERANCE: &str = "transition.min_package_tolerance";

    // 一致性审计
    pub const AUDIT_PACKAGE_DRIFT_THRESHOLD: &str = "audit.package_drift_threshold";
    pub const AUDIT_WEIGHT_DRIFT_THRESHOLD_KG: &str = "audit.weight_drift_threshold_kg";
    pub const AUDIT_BATCH_SIZE: &str = "audit.batch_size";

    // 数值
    pub const NUMERIC_EPSILON: &str = "numeric.epsilon";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_table_empty() {
        let manager = setup();
        let rules = manager.load_rules(&ConfigScope::Global).unwrap();
        assert_eq!(rules, WarehouseRules::default());
    }

    #[test]
    fn test_warehouse_scope_overrides_global() {
        let manager = setup();
        manager
            .set_config_value(&ConfigScope::Global, config_keys::AUDIT_BATCH_SIZE, "50")
            .unwrap();
        manager
            .set_config_value(&ConfigScope::warehouse("WH1"), config_keys::AUDIT_BATCH_SIZE, "10")
            .unwrap();

        assert_eq!(manager.load_rules(&ConfigScope::Global).unwrap().audit_batch_size, 50);
        assert_eq!(
            manager.load_rules(&ConfigScope::warehouse("WH1")).unwrap().audit_batch_size,
            10
        );
        assert_eq!(
            manager.load_rules(&ConfigScope::warehouse("WH2")).unwrap().audit_batch_size,
            50
        );
    }

    #[test]
    fn test_malformed_value_falls_back() {
        let manager = setup();
        manager
            .set_config_value(
                &ConfigScope::Global,
                config_keys::ALLOCATION_WEIGHT_RATIO_TOLERANCE,
                "five percent",
            )
            .unwrap();
        manager
            .set_config_value(&ConfigScope::Global, config_keys::AUDIT_BATCH_SIZE, "0")
            .unwrap();

        let rules = manager.load_rules(&ConfigScope::Global).unwrap();
        assert_eq!(rules.allocation_weight_ratio_tolerance, 0.05);
        assert_eq!(rules.audit_batch_size, 200);
    }

    #[test]
    fn test_set_overwrites_existing_value() {
        let manager = setup();
        let key = config_keys::TRANSITION_PACKAGE_TOLERANCE;
        manager.set_config_value(&ConfigScope::Global, key, "0.08").unwrap();
        manager.set_config_value(&ConfigScope::Global, key, "0.02").unwrap();
        assert_eq!(
            manager.get_global_config_value(key).unwrap().as_deref(),
            Some("0.02")
        );
    }
}
