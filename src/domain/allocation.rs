// ==========================================
// 仓储质检核心 - 分配与库存领域模型
// ==========================================
// Allocation: 入库行的一部分数量放入某个库位、处于某个质检状态
// InventoryRecord: Allocation 的实物镜像，带独立作业状态
// ==========================================

use crate::domain::cell::CellLoad;
use crate::domain::types::{Condition, OperationalStatus, Presentation, QualityStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Quantities - 数量四元组
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantities {
    pub quantity: f64,
    pub packages: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,
}

impl Quantities {
    pub fn new(quantity: f64, packages: i64, weight_kg: f64, volume_m3: f64) -> Self {
        Self {
            quantity,
            packages,
            weight_kg,
            volume_m3,
        }
    }

    pub fn plus(&self, other: &Quantities) -> Quantities {
        Quantities {
            quantity: self.quantity + other.quantity,
            packages: self.packages + other.packages,
            weight_kg: self.weight_kg + other.weight_kg,
            volume_m3: self.volume_m3 + other.volume_m3,
        }
    }

    pub fn minus(&self, other: &Quantities) -> Quantities {
        Quantities {
            quantity: self.quantity - other.quantity,
            packages: self.packages - other.packages,
            weight_kg: self.weight_kg - other.weight_kg,
            volume_m3: self.volume_m3 - other.volume_m3,
        }
    }

    /// 对库位的占用 (不含数量)
    pub fn cell_load(&self) -> CellLoad {
        CellLoad::new(self.packages, self.weight_kg, self.volume_m3)
    }
}

// ==========================================
// Allocation - 库位分配
// ==========================================
// 注意: 质检流转会覆盖本行数量为"流转部分"，剩余部分不再单独成行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: String,
    pub intake_line_id: String,
    pub cell_id: String,

    // ===== 数量 =====
    pub quantity: f64,
    pub packages: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,

    // ===== 状态 =====
    pub quality_status: QualityStatus,
    pub presentation: Presentation,
    pub condition: Condition,
    pub status_code: i32,              // 包装形式 + 品相 归一化状态码
    pub observations: Option<String>,

    // ===== 审计 =====
    pub created_by: String,
    pub updated_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,

    // ===== 并发控制 =====
    pub revision: i32,                 // 乐观锁版本号
}

impl Allocation {
    pub fn quantities(&self) -> Quantities {
        Quantities::new(self.quantity, self.packages, self.weight_kg, self.volume_m3)
    }
}

// ==========================================
// InventoryRecord - 库存记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub inventory_id: String,
    pub allocation_id: Option<String>, // 为空或悬空即孤儿记录
    pub intake_line_id: String,
    pub cell_id: String,

    pub quantity: f64,
    pub packages: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,

    pub quality_status: QualityStatus,
    pub operational_status: OperationalStatus,

    pub updated_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl InventoryRecord {
    pub fn quantities(&self) -> Quantities {
        Quantities::new(self.quantity, self.packages, self.weight_kg, self.volume_m3)
    }

    /// 由分配创建镜像库存记录 (隔离状态)
    pub fn mirror_of(allocation: &Allocation, inventory_id: String) -> Self {
        Self {
            inventory_id,
            allocation_id: Some(allocation.allocation_id.clone()),
            intake_line_id: allocation.intake_line_id.clone(),
            cell_id: allocation.cell_id.clone(),
            quantity: allocation.quantity,
            packages: allocation.packages,
            weight_kg: allocation.weight_kg,
            volume_m3: allocation.volume_m3,
            quality_status: allocation.quality_status,
            operational_status: OperationalStatus::Quarantined,
            updated_by: allocation.updated_by.clone(),
            created_at: allocation.created_at,
            updated_at: allocation.updated_at,
        }
    }
}
