// ==========================================
// 仓储质检核心 - 业务规则参数
// ==========================================
// 来源: config_kv (global / 仓库级覆写)，缺省值见 Default
// ==========================================

use serde::{Deserialize, Serialize};

/// 分配/流转/审计的容差与分页参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WarehouseRules {
    // ===== 分配 (与入库行比例) =====
    pub allocation_package_ratio_tolerance: f64, // 件数允许偏差比例
    pub allocation_weight_ratio_tolerance: f64,  // 重量允许偏差比例

    // ===== 质检流转 (与分配自身比例) =====
    pub transition_package_tolerance: f64,
    pub transition_weight_tolerance: f64,
    pub transition_min_package_tolerance: i64, // 件数容差下限

    // ===== 一致性审计 =====
    pub audit_package_drift_threshold: i64,
    pub audit_weight_drift_threshold_kg: f64,
    pub audit_batch_size: usize,

    /// 浮点比较 epsilon
    pub epsilon: f64,
}

impl Default for WarehouseRules {
    fn default() -> Self {
        Self {
            allocation_package_ratio_tolerance: 0.10,
            allocation_weight_ratio_tolerance: 0.05,
            transition_package_tolerance: 0.05,
            transition_weight_tolerance: 0.05,
            transition_min_package_tolerance: 1,
            audit_package_drift_threshold: 1,
            audit_weight_drift_threshold_kg: 0.1,
            audit_batch_size: 200,
            epsilon: 1e-6,
        }
    }
}
