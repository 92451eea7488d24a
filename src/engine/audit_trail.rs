// ==========================================
// 仓储质检核心 - 审计留痕与下游汇聚
// ==========================================
// 职责:
// - 事务内: 尽力写入 audit_log / movement_log（失败只告警）
// - 提交后: 把审计事件推给下游汇聚 (AuditSink)
// 说明: Engine 层定义 trait，外部系统实现适配器
// ==========================================

use crate::domain::audit::{AuditRecord, MovementLogEntry};
use crate::repository::audit_log_repo::AuditTrailRepository;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 审计事件
// ==========================================

/// 一次已提交操作的审计事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub record: AuditRecord,
    pub movement: Option<MovementLogEntry>,
}

impl AuditEvent {
    pub fn new(record: AuditRecord, movement: Option<MovementLogEntry>) -> Self {
        Self { record, movement }
    }
}

/// 尽力写入审计记录与移动流水
///
/// # 返回
/// - true: 全部写入
/// - false: 至少一项失败（已告警，不影响业务事务）
pub fn record_best_effort(
    trail: &dyn AuditTrailRepository,
    record: &AuditRecord,
    movement: Option<&MovementLogEntry>,
) -> bool {
    let mut persisted = true;

    if let Err(e) = trail.insert_audit(record) {
        tracing::warn!(
            error = %e,
            action = %record.action,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            "审计记录写入失败，继续执行"
        );
        persisted = false;
    }

    if let Some(entry) = movement {
        if let Err(e) = trail.insert_movement(entry) {
            tracing::warn!(
                error = %e,
                movement_kind = %entry.movement_kind,
                allocation_ref = ?entry.allocation_ref,
                "移动流水写入失败，继续执行"
            );
            persisted = false;
        }
    }

    persisted
}

// ==========================================
// 下游汇聚 Trait
// ==========================================

/// 审计事件汇聚 Trait
///
/// 只在事务提交后调用；实现方的失败不会回传给调用者
pub trait AuditSink: Send + Sync {
    fn publish(&self, event: &AuditEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作汇聚
///
/// 用于不需要下游推送的场景（如单元测试、命令行）
#[derive(Debug, Clone, Default)]
pub struct NoOpAuditSink;

impl AuditSink for NoOpAuditSink {
    fn publish(&self, event: &AuditEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpAuditSink: 跳过审计推送 - action={}, entity_id={}",
            event.record.action,
            event.record.entity_id
        );
        Ok(())
    }
}

/// 可选的汇聚包装
///
/// 简化 Option<Arc<dyn AuditSink>> 的使用，并吞掉下游错误
#[derive(Clone)]
pub struct OptionalAuditSink {
    inner: Option<Arc<dyn AuditSink>>,
}

impl OptionalAuditSink {
    /// 创建带汇聚的实例
    pub fn with_sink(sink: Arc<dyn AuditSink>) -> Self {
        Self { inner: Some(sink) }
    }

    /// 创建空实例（不推送）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 推送事件（失败只告警）
    pub fn publish(&self, event: &AuditEvent) {
        let Some(sink) = &self.inner else {
            tracing::debug!(
                "OptionalAuditSink: 未配置汇聚，跳过事件 - action={}",
                event.record.action
            );
            return;
        };

        if let Err(e) = sink.publish(event) {
            tracing::warn!(
                error = %e,
                action = %event.record.action,
                entity_id = %event.record.entity_id,
                "审计事件推送失败"
            );
        }
    }

    /// 检查是否配置了汇聚
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalAuditSink {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::AuditAction;
    use crate::domain::types::MovementKind;
    use crate::repository::in_memory::{InMemoryStores, WarehouseState};
    use std::sync::Mutex;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn publish(&self, _event: &AuditEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("下游不可用".into())
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl AuditSink for CollectingSink {
        fn publish(&self, event: &AuditEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn sample_event() -> AuditEvent {
        let record = AuditRecord::new("tester", AuditAction::Assign, "allocation", "A1", "分配".to_string());
        let movement = MovementLogEntry::new("tester", MovementKind::Entry).with_deltas(1.0, 1, 1.0, 0.0);
        AuditEvent::new(record, Some(movement))
    }

    #[test]
    fn test_best_effort_reports_failure_without_error() {
        let state = WarehouseState {
            fail_audit_writes: true,
            ..Default::default()
        };
        let stores = InMemoryStores::new(state);
        let event = sample_event();

        assert!(!record_best_effort(&stores, &event.record, event.movement.as_ref()));
        assert!(stores.into_state().audit_records.is_empty());
    }

    #[test]
    fn test_best_effort_persists_both_entries() {
        let stores = InMemoryStores::new(WarehouseState::default());
        let event = sample_event();

        assert!(record_best_effort(&stores, &event.record, event.movement.as_ref()));
        let state = stores.into_state();
        assert_eq!(state.audit_records.len(), 1);
        assert_eq!(state.movements.len(), 1);
    }

    #[test]
    fn test_optional_sink_swallows_errors() {
        let sink = OptionalAuditSink::with_sink(Arc::new(FailingSink));
        assert!(sink.is_configured());
        sink.publish(&sample_event());

        let none = OptionalAuditSink::default();
        assert!(!none.is_configured());
        none.publish(&sample_event());
    }

    #[test]
    fn test_optional_sink_forwards_events() {
        let collecting = Arc::new(CollectingSink::default());
        let sink = OptionalAuditSink::with_sink(collecting.clone());
        sink.publish(&sample_event());
        assert_eq!(collecting.events.lock().unwrap().len(), 1);
    }
}
