// ==========================================
// 仓储质检核心 - 入库行领域模型
// ==========================================
// 来源: 上游入库登记 (Intake Registry)
// 约束: 审核通过后只读，分配汇总在读取时计算
// ==========================================

use crate::domain::allocation::Quantities;
use crate::domain::types::ReviewState;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// IntakeLine - 入库行
// ==========================================
// 一张供应商单据下某个产品的到货数量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeLine {
    pub intake_line_id: String,
    pub warehouse_id: String,          // 收货仓库
    pub product_code: String,          // 产品代码
    pub quantity: f64,                 // 总数量
    pub packages: i64,                 // 总件数
    pub weight_kg: f64,                // 总重量 (kg)
    pub volume_m3: f64,                // 总体积 (m3)
    pub review_state: ReviewState,     // 审核状态
    pub expiry_date: Option<NaiveDate>, // 有效期 (出库 FIFO 依据)
    pub created_at: NaiveDateTime,
}

impl IntakeLine {
    /// 入库行总量
    pub fn totals(&self) -> Quantities {
        Quantities {
            quantity: self.quantity,
            packages: self.packages,
            weight_kg: self.weight_kg,
            volume_m3: self.volume_m3,
        }
    }

    /// 件数/数量 比
    pub fn packages_per_unit(&self) -> f64 {
        if self.quantity <= 0.0 {
            return 0.0;
        }
        self.packages as f64 / self.quantity
    }

    /// 单位重量 (kg/数量)
    pub fn weight_per_unit(&self) -> f64 {
        if self.quantity <= 0.0 {
            return 0.0;
        }
        self.weight_kg / self.quantity
    }
}

// ==========================================
// IntakeLineSummary - 入库行分配汇总
// ==========================================
// 用途: 读取时计算 已分配/剩余
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeLineSummary {
    pub intake_line: IntakeLine,
    pub allocated: Quantities,
    pub remaining: Quantities,
    pub allocation_count: i64,
}

impl IntakeLineSummary {
    pub fn new(intake_line: IntakeLine, allocated: Quantities, allocation_count: i64) -> Self {
        let remaining = intake_line.totals().minus(&allocated);
        Self {
            intake_line,
            allocated,
            remaining,
            allocation_count,
        }
    }
}
