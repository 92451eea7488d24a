// ==========================================
// 仓储质检核心 - 质检流转记录
// ==========================================
// 红线: 只追加，不修改
// ==========================================

use crate::domain::types::QualityStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Transition - 质检状态流转
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub transition_id: String,
    pub allocation_id: String,
    pub from_status: QualityStatus,
    pub to_status: QualityStatus,

    // ===== 流转数量 =====
    pub quantity: f64,
    pub packages: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,

    // ===== 库位 =====
    pub from_cell_id: String,
    pub to_cell_id: String,

    pub reason: String,
    pub actor: String,
    pub created_at: NaiveDateTime,
}

impl Transition {
    /// 是否发生了移库
    pub fn relocated(&self) -> bool {
        self.from_cell_id != self.to_cell_id
    }
}
