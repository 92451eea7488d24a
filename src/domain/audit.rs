// ==========================================
// 仓储质检核心 - 审计记录与移动流水
// ==========================================
// 红线: 所有写入必须记录
// 下游: 审计/事件汇聚 (Audit/Event Sink)
// ==========================================

use crate::domain::types::MovementKind;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// AuditRecord - 审计记录
// ==========================================
// 对齐: audit_log 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: String,
    pub actor: String,                   // 操作人
    pub action: String,                  // 操作类型 (AuditAction::as_str)
    pub entity_type: String,             // 实体类型
    pub entity_id: String,               // 实体ID
    pub description: String,             // 描述
    pub old_values: Option<JsonValue>,   // 变更前快照
    pub new_values: Option<JsonValue>,   // 变更后快照
    pub metadata: Option<JsonValue>,     // 附加信息
    pub created_at: NaiveDateTime,
}

impl AuditRecord {
    /// 创建审计记录
    pub fn new(
        actor: &str,
        action: AuditAction,
        entity_type: &str,
        entity_id: &str,
        description: String,
    ) -> Self {
        Self {
            audit_id: uuid::Uuid::new_v4().to_string(),
            actor: actor.to_string(),
            action: action.as_str().to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            description,
            old_values: None,
            new_values: None,
            metadata: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    pub fn with_values(mut self, old_values: Option<JsonValue>, new_values: Option<JsonValue>) -> Self {
        self.old_values = old_values;
        self.new_values = new_values;
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ==========================================
// AuditAction - 审计操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Assign,         // 分配入位
    QualityChange,  // 质检流转
    AggregateFix,   // 审计自动修复
}

impl AuditAction {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Assign => "ASSIGN",
            AuditAction::QualityChange => "QUALITY_CHANGE",
            AuditAction::AggregateFix => "AGGREGATE_FIX",
        }
    }
}

// ==========================================
// MovementLogEntry - 移动流水
// ==========================================
// 每一次数量增减一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementLogEntry {
    pub movement_id: String,
    pub actor: String,
    pub movement_kind: MovementKind,

    // ===== 增量 =====
    pub quantity_delta: f64,
    pub package_delta: i64,
    pub weight_delta: f64,
    pub volume_delta: f64,

    // ===== 关联 =====
    pub lot_ref: Option<String>,
    pub allocation_ref: Option<String>,
    pub cell_ref: Option<String>,
    pub warehouse_ref: Option<String>,

    pub created_at: NaiveDateTime,
}

impl MovementLogEntry {
    /// 创建移动流水 (增量为 0，关联为空)
    pub fn new(actor: &str, movement_kind: MovementKind) -> Self {
        Self {
            movement_id: uuid::Uuid::new_v4().to_string(),
            actor: actor.to_string(),
            movement_kind,
            quantity_delta: 0.0,
            package_delta: 0,
            weight_delta: 0.0,
            volume_delta: 0.0,
            lot_ref: None,
            allocation_ref: None,
            cell_ref: None,
            warehouse_ref: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    pub fn with_deltas(mut self, quantity: f64, packages: i64, weight_kg: f64, volume_m3: f64) -> Self {
        self.quantity_delta = quantity;
        self.package_delta = packages;
        self.weight_delta = weight_kg;
        self.volume_delta = volume_m3;
        self
    }

    pub fn with_refs(
        mut self,
        lot_ref: &str,
        allocation_ref: &str,
        cell_ref: &str,
        warehouse_ref: &str,
    ) -> Self {
        self.lot_ref = Some(lot_ref.to_string());
        self.allocation_ref = Some(allocation_ref.to_string());
        self.cell_ref = Some(cell_ref.to_string());
        self.warehouse_ref = Some(warehouse_ref.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_record_builder() {
        let record = AuditRecord::new("u1", AuditAction::Assign, "allocation", "A1", "分配".to_string())
            .with_values(None, Some(serde_json::json!({"quantity": 40.0})))
            .with_metadata(serde_json::json!({"cell_id": "C1"}));

        assert_eq!(record.action, "ASSIGN");
        assert!(record.old_values.is_none());
        assert_eq!(record.new_values.unwrap()["quantity"], 40.0);
        assert_eq!(record.metadata.unwrap()["cell_id"], "C1");
    }

    #[test]
    fn test_movement_entry_builder() {
        let entry = MovementLogEntry::new("u1", MovementKind::Entry)
            .with_deltas(40.0, 20, 200.0, 1.5)
            .with_refs("L1", "A1", "C1", "W1");

        assert_eq!(entry.movement_kind, MovementKind::Entry);
        assert_eq!(entry.package_delta, 20);
        assert_eq!(entry.warehouse_ref.as_deref(), Some("W1"));
    }
}
