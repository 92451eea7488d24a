// ==========================================
// 仓储质检核心 - 仓储操作 API
// ==========================================
// 职责: 边界解析、事务编排、提交后推送审计事件
// 红线: 所有写操作在一个 UnitOfWork 内完成，失败整体回滚
// ==========================================

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ConfigScope, WarehouseRules};
use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::allocation::InventoryRecord;
use crate::domain::audit::{AuditRecord, MovementLogEntry};
use crate::domain::intake::IntakeLineSummary;
use crate::domain::transition::Transition;
use crate::domain::types::{Presentation, QualityStatus};
use crate::engine::assigner::{AllocationAssigner, AssignOutcome, AssignRequest};
use crate::engine::audit_trail::{AuditSink, OptionalAuditSink};
use crate::engine::auditor::{AuditReport, AuditScope, ConsistencyAuditor};
use crate::engine::error::EngineError;
use crate::engine::transition::{QualityTransitionEngine, TransitionOutcome, TransitionRequest};
use crate::repository::error::RepositoryError;
use crate::repository::unit_of_work::{SqliteUnitOfWork, UnitOfWork};

// ==========================================
// 请求命令 (字符串枚举在此解析一次)
// ==========================================

/// 分配入位命令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignCommand {
    pub intake_line_id: String,
    pub cell_id: String,
    pub quantity: f64,
    pub packages: i64,
    pub weight_kg: f64,
    #[serde(default)]
    pub volume_m3: f64,
    pub presentation: String,
    #[serde(default)]
    pub damaged: bool,
    pub observations: Option<String>,
    pub actor: String,
}

impl TryFrom<AssignCommand> for AssignRequest {
    type Error = ApiError;

    fn try_from(cmd: AssignCommand) -> Result<Self, Self::Error> {
        Ok(AssignRequest {
            presentation: Presentation::from_str(&cmd.presentation)?,
            intake_line_id: cmd.intake_line_id,
            cell_id: cmd.cell_id,
            quantity: cmd.quantity,
            packages: cmd.packages,
            weight_kg: cmd.weight_kg,
            volume_m3: cmd.volume_m3,
            damaged: cmd.damaged,
            observations: cmd.observations,
            actor: cmd.actor,
        })
    }
}

/// 质检流转命令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionCommand {
    pub allocation_id: String,
    pub to_status: String,
    pub quantity: f64,
    pub packages: Option<i64>,
    pub weight_kg: Option<f64>,
    pub volume_m3: Option<f64>,
    pub reason: String,
    pub actor: String,
    pub destination_cell_id: Option<String>,
    pub expected_revision: Option<i32>,
}

impl TryFrom<TransitionCommand> for TransitionRequest {
    type Error = ApiError;

    fn try_from(cmd: TransitionCommand) -> Result<Self, Self::Error> {
        Ok(TransitionRequest {
            to_status: QualityStatus::from_str(&cmd.to_status)?,
            allocation_id: cmd.allocation_id,
            quantity: cmd.quantity,
            packages: cmd.packages,
            weight_kg: cmd.weight_kg,
            volume_m3: cmd.volume_m3,
            reason: cmd.reason,
            actor: cmd.actor,
            destination_cell_id: cmd.destination_cell_id,
            expected_revision: cmd.expected_revision,
        })
    }
}

// ==========================================
// WarehouseApi - 仓储操作 API
// ==========================================

/// 仓储操作API
///
/// 职责：
/// 1. 分配入位 / 质检流转（单事务）
/// 2. 一致性审计（分页短事务）
/// 3. 出库可用查询与只读回查
/// 4. 提交后推送审计事件
pub struct WarehouseApi<U: UnitOfWork> {
    uow: Arc<U>,
    rules: WarehouseRules,
    assigner: AllocationAssigner,
    transitions: QualityTransitionEngine,
    auditor: ConsistencyAuditor,
    sink: OptionalAuditSink,
}

impl<U: UnitOfWork> WarehouseApi<U> {
    /// 创建新的WarehouseApi实例
    pub fn new(uow: Arc<U>, rules: WarehouseRules) -> Self {
        Self {
            uow,
            rules,
            assigner: AllocationAssigner::new(rules),
            transitions: QualityTransitionEngine::new(rules),
            auditor: ConsistencyAuditor::new(rules),
            sink: OptionalAuditSink::none(),
        }
    }

    /// 配置下游审计汇聚
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = OptionalAuditSink::with_sink(sink);
        self
    }

    pub fn rules(&self) -> &WarehouseRules {
        &self.rules
    }

    pub fn unit_of_work(&self) -> &U {
        &self.uow
    }

    // ==========================================
    // 写操作
    // ==========================================

    /// 分配入位
    ///
    /// # 返回
    /// - Ok(AssignOutcome): 新分配、库存镜像、更新后的库位
    /// - Err(ApiError): 校验/未找到/状态错误，事务已回滚
    pub fn assign(&self, cmd: AssignCommand) -> ApiResult<AssignOutcome> {
        let req = AssignRequest::try_from(cmd)?;
        let outcome = self
            .uow
            .run(|stores| self.assigner.assign(stores, &req))
            .map_err(|e| Self::rejected("assign", e))?;

        self.sink.publish(&outcome.event);
        info!(
            allocation_id = %outcome.allocation.allocation_id,
            cell_id = %outcome.cell.cell_id,
            "分配入位已提交"
        );
        Ok(outcome)
    }

    /// 质检流转
    ///
    /// # 返回
    /// - Ok(TransitionOutcome): 流转记录与更新后的分配/库存/库位
    /// - Err(ApiError::Conflict): expected_revision 不匹配
    pub fn transition(&self, cmd: TransitionCommand) -> ApiResult<TransitionOutcome> {
        let req = TransitionRequest::try_from(cmd)?;
        let outcome = self
            .uow
            .run(|stores| self.transitions.transition(stores, &req))
            .map_err(|e| Self::rejected("transition", e))?;

        self.sink.publish(&outcome.event);
        info!(
            transition_id = %outcome.transition.transition_id,
            allocation_id = %outcome.allocation.allocation_id,
            revision = outcome.allocation.revision,
            "质检流转已提交"
        );
        Ok(outcome)
    }

    /// 一致性审计
    ///
    /// auto_fix 为 true 时只修正 LOW 级库位计数漂移
    pub fn audit(&self, scope: AuditScope, auto_fix: bool) -> ApiResult<AuditReport> {
        let report = self
            .auditor
            .audit(self.uow.as_ref(), scope, auto_fix)
            .map_err(|e| Self::rejected("audit", e))?;

        for event in &report.events {
            self.sink.publish(event);
        }
        Ok(report)
    }

    // ==========================================
    // 只读查询
    // ==========================================

    /// 可出库库存 (APROBADO + AVAILABLE，按有效期先进先出)
    pub fn available_for_departure(&self, warehouse_id: Option<&str>) -> ApiResult<Vec<InventoryRecord>> {
        let records = self.uow.read(|stores| -> ApiResult<Vec<InventoryRecord>> {
            Ok(stores.inventory().list_available_for_departure(warehouse_id)?)
        })?;
        Ok(records)
    }

    /// 入库行分配汇总
    pub fn lot_summary(&self, intake_line_id: &str) -> ApiResult<IntakeLineSummary> {
        Self::require_id("入库行ID", intake_line_id)?;
        self.uow.read(|stores| -> ApiResult<IntakeLineSummary> {
            let line = stores
                .intake_lines()
                .find_by_id(intake_line_id)?
                .ok_or_else(|| RepositoryError::not_found("IntakeLine", intake_line_id))?;
            let allocated = stores.allocations().totals_by_intake_line(intake_line_id)?;
            Ok(IntakeLineSummary::new(line, allocated.totals, allocated.count))
        })
    }

    /// 分配的流转历史 (最早在前)
    pub fn transition_history(&self, allocation_id: &str) -> ApiResult<Vec<Transition>> {
        Self::require_id("分配ID", allocation_id)?;
        self.uow.read(|stores| -> ApiResult<Vec<Transition>> {
            Ok(stores.transitions().list_by_allocation(allocation_id)?)
        })
    }

    /// 分配的移动流水
    pub fn movements_for_allocation(&self, allocation_id: &str) -> ApiResult<Vec<MovementLogEntry>> {
        Self::require_id("分配ID", allocation_id)?;
        self.uow.read(|stores| -> ApiResult<Vec<MovementLogEntry>> {
            Ok(stores.audit_trail().find_movements_by_allocation(allocation_id)?)
        })
    }

    /// 实体的审计记录
    pub fn audit_records_for(&self, entity_type: &str, entity_id: &str) -> ApiResult<Vec<AuditRecord>> {
        Self::require_id("实体类型", entity_type)?;
        Self::require_id("实体ID", entity_id)?;
        self.uow.read(|stores| -> ApiResult<Vec<AuditRecord>> {
            Ok(stores.audit_trail().find_audits_by_entity(entity_type, entity_id)?)
        })
    }

    fn require_id(label: &str, value: &str) -> ApiResult<()> {
        if value.trim().is_empty() {
            return Err(ApiError::ValidationError(format!("{}不能为空", label)));
        }
        Ok(())
    }

    fn rejected(operation: &str, err: EngineError) -> ApiError {
        warn!(operation, error = %err, "操作被拒绝，事务已回滚");
        err.into()
    }
}

impl WarehouseApi<SqliteUnitOfWork> {
    /// 打开数据库文件（建表 + 加载 global 规则）
    pub fn open(db_path: &str) -> ApiResult<Self> {
        Self::open_scoped(db_path, &ConfigScope::Global)
    }

    /// 打开数据库文件并按指定作用域加载规则
    pub fn open_scoped(db_path: &str, scope: &ConfigScope) -> ApiResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        let shared = Arc::new(Mutex::new(conn));
        let rules = ConfigManager::from_connection(Arc::clone(&shared))?.load_rules(scope)?;
        info!(db_path, scope = %scope.scope_id(), "仓储API已初始化");

        Ok(Self::new(
            Arc::new(SqliteUnitOfWork::from_connection(shared)),
            rules,
        ))
    }
}
