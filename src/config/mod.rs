// ==========================================
// 仓储质检核心 - 配置层
// ==========================================
// 职责: 系统配置管理,支持 global + 仓库级覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod warehouse_rules;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ConfigScope};
pub use warehouse_rules::WarehouseRules;
