// ==========================================
// 仓储质检核心 - 一致性审计引擎
// ==========================================
// 检查项:
// - HIGH   LOT_OVER_ALLOCATED           入库行被超额分配
// - MEDIUM INVENTORY_EXCEEDS_ALLOCATION 库存记录超出所属分配
// - LOW    CELL_AGGREGATE_DRIFT         库位计数与库存汇总漂移（可自动修复）
// - MEDIUM ORPHAN_INVENTORY             无所属分配的库存记录（只计数）
// - MEDIUM CELL_OVER_CAPACITY           库位占用超出声明容量（只报告）
// 红线: 只有 LOW 漂移会被修改，且只在 auto_fix 时
// 分页: 每页一个短事务，页大小 audit.batch_size
// ==========================================

use crate::config::WarehouseRules;
use crate::domain::audit::{AuditAction, AuditRecord, MovementLogEntry};
use crate::domain::cell::{CellLoad, StorageCell};
use crate::domain::types::{MovementKind, Severity};
use crate::engine::audit_trail::{record_best_effort, AuditEvent};
use crate::engine::cell_ledger::CellLedger;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ratio::RatioBand;
use crate::repository::unit_of_work::{UnitOfWork, WarehouseStores};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use tracing::{debug, info, instrument};

const AUDITOR_ACTOR: &str = "consistency-auditor";

// ==========================================
// 审计范围
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditScope {
    All,
    Warehouse(String),
}

impl AuditScope {
    pub fn warehouse_id(&self) -> Option<&str> {
        match self {
            AuditScope::All => None,
            AuditScope::Warehouse(id) => Some(id.as_str()),
        }
    }
}

// ==========================================
// 问题类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    LotOverAllocated,
    InventoryExceedsAllocation,
    CellAggregateDrift,
    OrphanInventory,
    CellOverCapacity,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::LotOverAllocated => "LOT_OVER_ALLOCATED",
            IssueCode::InventoryExceedsAllocation => "INVENTORY_EXCEEDS_ALLOCATION",
            IssueCode::CellAggregateDrift => "CELL_AGGREGATE_DRIFT",
            IssueCode::OrphanInventory => "ORPHAN_INVENTORY",
            IssueCode::CellOverCapacity => "CELL_OVER_CAPACITY",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IssueCode::LotOverAllocated => Severity::High,
            IssueCode::CellAggregateDrift => Severity::Low,
            IssueCode::InventoryExceedsAllocation
            | IssueCode::OrphanInventory
            | IssueCode::CellOverCapacity => Severity::Medium,
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 审计发现的问题
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditIssue {
    pub code: IssueCode,
    pub severity: Severity,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub message: String,
    pub details: JsonValue,
    pub auto_fixable: bool,
}

impl AuditIssue {
    fn new(code: IssueCode, entity_type: &str, entity_id: Option<&str>, message: String, details: JsonValue) -> Self {
        Self {
            code,
            severity: code.severity(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(str::to_string),
            message,
            details,
            auto_fixable: code == IssueCode::CellAggregateDrift,
        }
    }
}

/// 自动修复记录 (旧值 -> 新值)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFix {
    pub cell_id: String,
    pub old_packages: i64,
    pub new_packages: i64,
    pub old_weight_kg: f64,
    pub new_weight_kg: f64,
    pub applied_at: NaiveDateTime,
}

/// 扫描统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStats {
    pub lots_scanned: usize,
    pub allocations_scanned: usize,
    pub cells_scanned: usize,
    pub pages: usize,
    pub orphan_inventory: i64,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub fixes_applied: usize,
}

/// 审计报告
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub scope: AuditScope,
    pub auto_fix: bool,
    pub issues: Vec<AuditIssue>,
    pub fixes: Vec<AuditFix>,
    pub stats: AuditStats,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    #[serde(skip)]
    pub events: Vec<AuditEvent>,
}

impl AuditReport {
    pub fn issues_with(&self, code: IssueCode) -> impl Iterator<Item = &AuditIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

// 单页库位扫描结果
struct CellPage {
    last_id: Option<String>,
    scanned: usize,
    issues: Vec<AuditIssue>,
    fixes: Vec<AuditFix>,
    events: Vec<AuditEvent>,
}

// ==========================================
// ConsistencyAuditor
// ==========================================
pub struct ConsistencyAuditor {
    rules: WarehouseRules,
}

impl ConsistencyAuditor {
    pub fn new(rules: WarehouseRules) -> Self {
        Self { rules }
    }

    /// 执行一致性审计
    #[instrument(skip(self, uow), fields(scope = ?scope, auto_fix = auto_fix))]
    pub fn audit<U: UnitOfWork>(&self, uow: &U, scope: AuditScope, auto_fix: bool) -> EngineResult<AuditReport> {
        let started_at = Utc::now().naive_utc();
        let mut issues = Vec::new();
        let mut fixes = Vec::new();
        let mut events = Vec::new();
        let mut stats = AuditStats::default();

        self.scan_lots(uow, &scope, &mut issues, &mut stats)?;
        self.scan_allocations(uow, &scope, &mut issues, &mut stats)?;

        // ===== 库位 =====
        let mut after: Option<String> = None;
        loop {
            let page = if auto_fix {
                uow.run(|s| self.scan_cell_page(s, &scope, after.as_deref(), true))?
            } else {
                uow.read(|s| self.scan_cell_page(s, &scope, after.as_deref(), false))?
            };
            stats.pages += 1;
            stats.cells_scanned += page.scanned;
            debug!(scanned = page.scanned, issues = page.issues.len(), "库位页扫描完成");
            issues.extend(page.issues);
            fixes.extend(page.fixes);
            events.extend(page.events);
            if page.scanned < self.rules.audit_batch_size || page.last_id.is_none() {
                break;
            }
            after = page.last_id;
        }

        // ===== 孤儿库存 =====
        let orphans = uow.read(|s| -> EngineResult<i64> {
            Ok(s.inventory().count_orphans(scope.warehouse_id())?)
        })?;
        stats.orphan_inventory = orphans;
        if orphans > 0 {
            issues.push(AuditIssue::new(
                IssueCode::OrphanInventory,
                "inventory_record",
                None,
                format!("{}条库存记录没有所属分配", orphans),
                json!({ "count": orphans }),
            ));
        }

        for issue in &issues {
            match issue.severity {
                Severity::High => stats.high += 1,
                Severity::Medium => stats.medium += 1,
                Severity::Low => stats.low += 1,
            }
        }
        stats.fixes_applied = fixes.len();

        info!(
            high = stats.high,
            medium = stats.medium,
            low = stats.low,
            fixes = stats.fixes_applied,
            "一致性审计完成"
        );

        Ok(AuditReport {
            scope,
            auto_fix,
            issues,
            fixes,
            stats,
            started_at,
            finished_at: Utc::now().naive_utc(),
            events,
        })
    }

    /// HIGH: 入库行超额分配
    fn scan_lots<U: UnitOfWork>(
        &self,
        uow: &U,
        scope: &AuditScope,
        issues: &mut Vec<AuditIssue>,
        stats: &mut AuditStats,
    ) -> EngineResult<()> {
        let band = RatioBand::new(self.rules.epsilon);
        let mut after: Option<String> = None;
        loop {
            let (scanned, last_id) = uow.read(|s| -> EngineResult<(usize, Option<String>)> {
                let lines = s.intake_lines().list_page(
                    scope.warehouse_id(),
                    after.as_deref(),
                    self.rules.audit_batch_size,
                )?;
                for line in &lines {
                    let allocated = s.allocations().totals_by_intake_line(&line.intake_line_id)?;
                    let totals = allocated.totals;
                    let mut exceeded = Vec::new();
                    if band.exceeds(totals.quantity, line.quantity) {
                        exceeded.push("quantity");
                    }
                    if totals.packages > line.packages {
                        exceeded.push("packages");
                    }
                    if band.exceeds(totals.weight_kg, line.weight_kg) {
                        exceeded.push("weight");
                    }
                    if !exceeded.is_empty() {
                        issues.push(AuditIssue::new(
                            IssueCode::LotOverAllocated,
                            "intake_line",
                            Some(line.intake_line_id.as_str()),
                            format!(
                                "入库行{}超额分配: {}",
                                line.intake_line_id,
                                exceeded.join(",")
                            ),
                            json!({
                                "fields": exceeded,
                                "lot": line.totals(),
                                "allocated": totals,
                                "allocation_count": allocated.count,
                            }),
                        ));
                    }
                }
                Ok((lines.len(), lines.last().map(|l| l.intake_line_id.clone())))
            })?;

            stats.pages += 1;
            stats.lots_scanned += scanned;
            debug!(scanned, "入库行页扫描完成");
            if scanned < self.rules.audit_batch_size || last_id.is_none() {
                return Ok(());
            }
            after = last_id;
        }
    }

    /// MEDIUM: 库存记录超出所属分配
    fn scan_allocations<U: UnitOfWork>(
        &self,
        uow: &U,
        scope: &AuditScope,
        issues: &mut Vec<AuditIssue>,
        stats: &mut AuditStats,
    ) -> EngineResult<()> {
        let band = RatioBand::new(self.rules.epsilon);
        let mut after: Option<String> = None;
        loop {
            let (scanned, last_id) = uow.read(|s| -> EngineResult<(usize, Option<String>)> {
                let allocations = s.allocations().list_page(
                    scope.warehouse_id(),
                    after.as_deref(),
                    self.rules.audit_batch_size,
                )?;
                for allocation in &allocations {
                    for record in s.inventory().find_by_allocation(&allocation.allocation_id)? {
                        let exceeds = band.exceeds(record.quantity, allocation.quantity)
                            || record.packages > allocation.packages
                            || band.exceeds(record.weight_kg, allocation.weight_kg);
                        if exceeds {
                            issues.push(AuditIssue::new(
                                IssueCode::InventoryExceedsAllocation,
                                "inventory_record",
                                Some(record.inventory_id.as_str()),
                                format!(
                                    "库存记录{}超出分配{}",
                                    record.inventory_id, allocation.allocation_id
                                ),
                                json!({
                                    "allocation_id": allocation.allocation_id,
                                    "allocation": allocation.quantities(),
                                    "inventory": record.quantities(),
                                }),
                            ));
                        }
                    }
                }
                Ok((
                    allocations.len(),
                    allocations.last().map(|a| a.allocation_id.clone()),
                ))
            })?;

            stats.pages += 1;
            stats.allocations_scanned += scanned;
            debug!(scanned, "分配页扫描完成");
            if scanned < self.rules.audit_batch_size || last_id.is_none() {
                return Ok(());
            }
            after = last_id;
        }
    }

    /// LOW 漂移 (+修复) 与 MEDIUM 超容量
    fn scan_cell_page(
        &self,
        stores: &dyn WarehouseStores,
        scope: &AuditScope,
        after: Option<&str>,
        auto_fix: bool,
    ) -> EngineResult<CellPage> {
        let cells = stores
            .cells()
            .list_page(scope.warehouse_id(), after, self.rules.audit_batch_size)?;
        let mut page = CellPage {
            last_id: cells.last().map(|c| c.cell_id.clone()),
            scanned: cells.len(),
            issues: Vec::new(),
            fixes: Vec::new(),
            events: Vec::new(),
        };

        for cell in &cells {
            let computed = stores.inventory().totals_by_cell(&cell.cell_id)?.cell_load();
            let observed = cell.load();

            let overruns = cell.capacity_overruns();
            if !overruns.is_empty() {
                page.issues.push(AuditIssue::new(
                    IssueCode::CellOverCapacity,
                    "storage_cell",
                    Some(cell.cell_id.as_str()),
                    format!("库位{}超出容量: {}", cell.code, overruns.join(",")),
                    json!({
                        "fields": overruns,
                        "current": observed,
                        "max_packages": cell.max_packages,
                        "max_weight_kg": cell.max_weight_kg,
                        "max_volume_m3": cell.max_volume_m3,
                    }),
                ));
            }

            if !self.drifted(&observed, &computed) {
                continue;
            }
            page.issues.push(AuditIssue::new(
                IssueCode::CellAggregateDrift,
                "storage_cell",
                Some(cell.cell_id.as_str()),
                format!(
                    "库位{}计数漂移: 件数 {} vs {}, 重量 {} vs {}",
                    cell.code,
                    observed.packages,
                    computed.packages,
                    observed.weight_kg,
                    computed.weight_kg
                ),
                json!({ "observed": observed, "computed": computed }),
            ));

            if auto_fix {
                let (fix, event) = self.fix_cell(stores, cell, &observed, &computed)?;
                page.fixes.push(fix);
                page.events.push(event);
            }
        }

        Ok(page)
    }

    fn drifted(&self, observed: &CellLoad, computed: &CellLoad) -> bool {
        (observed.packages - computed.packages).abs() > self.rules.audit_package_drift_threshold
            || (observed.weight_kg - computed.weight_kg).abs()
                > self.rules.audit_weight_drift_threshold_kg + self.rules.epsilon
    }

    fn fix_cell(
        &self,
        stores: &dyn WarehouseStores,
        cell: &StorageCell,
        observed: &CellLoad,
        computed: &CellLoad,
    ) -> EngineResult<(AuditFix, AuditEvent)> {
        let delta = CellLedger::new(stores.cells()).correct(&cell.cell_id, observed, computed)?;
        let fixed = stores
            .cells()
            .find_by_id(&cell.cell_id)?
            .ok_or_else(|| EngineError::not_found("StorageCell", &cell.cell_id))?;

        let fix = AuditFix {
            cell_id: cell.cell_id.clone(),
            old_packages: observed.packages,
            new_packages: fixed.current_packages,
            old_weight_kg: observed.weight_kg,
            new_weight_kg: fixed.current_weight_kg,
            applied_at: Utc::now().naive_utc(),
        };

        let record = AuditRecord::new(
            AUDITOR_ACTOR,
            AuditAction::AggregateFix,
            "storage_cell",
            &cell.cell_id,
            format!(
                "库位{}计数修正: 件数 {} -> {}, 重量 {} -> {}",
                cell.code, fix.old_packages, fix.new_packages, fix.old_weight_kg, fix.new_weight_kg
            ),
        )
        .with_values(
            Some(json!({ "packages": fix.old_packages, "weight_kg": fix.old_weight_kg })),
            Some(json!({ "packages": fix.new_packages, "weight_kg": fix.new_weight_kg })),
        )
        .with_metadata(json!({ "delta": delta }));

        // 计数修正记为同库位调整
        let mut movement = MovementLogEntry::new(AUDITOR_ACTOR, MovementKind::Adjustment)
            .with_deltas(0.0, delta.packages, delta.weight_kg, delta.volume_m3);
        movement.cell_ref = Some(cell.cell_id.clone());
        movement.warehouse_ref = Some(cell.warehouse_id.clone());
        record_best_effort(stores.audit_trail(), &record, Some(&movement));

        info!(
            cell_id = %cell.cell_id,
            package_delta = delta.packages,
            weight_delta = delta.weight_kg,
            "库位计数已修正"
        );

        Ok((fix, AuditEvent::new(record, Some(movement))))
    }
}
