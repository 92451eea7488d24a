// ==========================================
// 仓储质检核心 - 库位领域模型
// ==========================================
// 红线: 占用计数只能通过原子增减修改
// ==========================================

use crate::domain::types::{CellRole, CellStatus};
use serde::{Deserialize, Serialize};

// ==========================================
// StorageCell - 库位
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageCell {
    pub cell_id: String,
    pub warehouse_id: String,
    pub code: String,               // 库位编码
    pub role: CellRole,             // 库位角色
    pub status: CellStatus,         // 占用状态

    // ===== 容量 =====
    pub max_packages: Option<i64>,
    pub max_weight_kg: Option<f64>,
    pub max_volume_m3: Option<f64>,

    // ===== 当前占用 (冗余汇总) =====
    pub current_packages: i64,
    pub current_weight_kg: f64,
    pub current_volume_m3: f64,
}

impl StorageCell {
    /// 当前占用
    pub fn load(&self) -> CellLoad {
        CellLoad {
            packages: self.current_packages,
            weight_kg: self.current_weight_kg,
            volume_m3: self.current_volume_m3,
        }
    }

    /// 是否接受该角色
    pub fn accepts(&self, roles: &[CellRole]) -> bool {
        roles.contains(&self.role)
    }

    /// 超出容量的维度 (packages / weight / volume)
    pub fn capacity_overruns(&self) -> Vec<&'static str> {
        let mut overruns = Vec::new();
        if let Some(max) = self.max_packages {
            if self.current_packages > max {
                overruns.push("packages");
            }
        }
        if let Some(max) = self.max_weight_kg {
            if self.current_weight_kg > max {
                overruns.push("weight");
            }
        }
        if let Some(max) = self.max_volume_m3 {
            if self.current_volume_m3 > max {
                overruns.push("volume");
            }
        }
        overruns
    }
}

// ==========================================
// CellLoad - 库位占用增量
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CellLoad {
    pub packages: i64,
    pub weight_kg: f64,
    pub volume_m3: f64,
}

impl CellLoad {
    pub fn new(packages: i64, weight_kg: f64, volume_m3: f64) -> Self {
        Self {
            packages,
            weight_kg,
            volume_m3,
        }
    }

    pub fn negated(&self) -> Self {
        Self {
            packages: -self.packages,
            weight_kg: -self.weight_kg,
            volume_m3: -self.volume_m3,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.packages == 0 && self.weight_kg == 0.0 && self.volume_m3 == 0.0
    }
}
