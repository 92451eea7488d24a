// ==========================================
// 仓储质检核心 - 领域类型定义
// ==========================================
// 职责: 状态/角色/包装形式等封闭枚举
// 约束: 只在边界解析一次 (FromStr)，内部不再反解展示字符串
// 存储: 统一使用 SCREAMING_SNAKE_CASE 文本 (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 枚举解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("无效的{kind}取值: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ==========================================
// 入库行审核状态 (Review State)
// ==========================================
// 只有 APPROVED 的入库行可以被分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Pending,  // 待审核
    Approved, // 已审核
    Rejected, // 已驳回
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewState::Pending => "PENDING",
            ReviewState::Approved => "APPROVED",
            ReviewState::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(ReviewState::Pending),
            "APPROVED" => Ok(ReviewState::Approved),
            "REJECTED" => Ok(ReviewState::Rejected),
            _ => Err(ParseEnumError::new("审核状态", s)),
        }
    }
}

// ==========================================
// 质检状态 (Quality Status)
// ==========================================
// 流转: CUARENTENA 是唯一合法源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityStatus {
    Cuarentena,     // 隔离待检
    Aprobado,       // 合格
    Devoluciones,   // 退货
    Contramuestras, // 留样
    Rechazados,     // 拒收
}

impl QualityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityStatus::Cuarentena => "CUARENTENA",
            QualityStatus::Aprobado => "APROBADO",
            QualityStatus::Devoluciones => "DEVOLUCIONES",
            QualityStatus::Contramuestras => "CONTRAMUESTRAS",
            QualityStatus::Rechazados => "RECHAZADOS",
        }
    }

    /// 是否为合法的流转目标状态
    pub fn is_transition_target(&self) -> bool {
        !matches!(self, QualityStatus::Cuarentena)
    }

    /// 目标状态是否必须显式指定目标库位
    ///
    /// APROBADO 可沿用源库位，其余目标状态必须指定
    pub fn requires_destination_cell(&self) -> bool {
        matches!(
            self,
            QualityStatus::Devoluciones | QualityStatus::Contramuestras | QualityStatus::Rechazados
        )
    }

    /// 目标状态允许放入的库位角色
    pub fn allowed_cell_roles(&self) -> &'static [CellRole] {
        match self {
            QualityStatus::Cuarentena => &[],
            QualityStatus::Aprobado => &[CellRole::Standard],
            QualityStatus::Devoluciones => &[CellRole::Returns],
            QualityStatus::Contramuestras => &[CellRole::Samples],
            QualityStatus::Rechazados => &[CellRole::Rejected, CellRole::Damaged],
        }
    }

    /// 流转后库存记录的作业状态
    pub fn operational_status(&self) -> OperationalStatus {
        match self {
            QualityStatus::Cuarentena => OperationalStatus::Quarantined,
            QualityStatus::Aprobado => OperationalStatus::Available,
            QualityStatus::Rechazados => OperationalStatus::Damaged,
            QualityStatus::Devoluciones | QualityStatus::Contramuestras => {
                OperationalStatus::Returned
            }
        }
    }
}

impl fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CUARENTENA" => Ok(QualityStatus::Cuarentena),
            "APROBADO" => Ok(QualityStatus::Aprobado),
            "DEVOLUCIONES" => Ok(QualityStatus::Devoluciones),
            "CONTRAMUESTRAS" => Ok(QualityStatus::Contramuestras),
            "RECHAZADOS" => Ok(QualityStatus::Rechazados),
            _ => Err(ParseEnumError::new("质检状态", s)),
        }
    }
}

// ==========================================
// 库位角色 (Cell Role)
// ==========================================
// EXPIRED 已声明，但没有任何流转以它为目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellRole {
    Standard, // 标准库位
    Returns,  // 退货区
    Samples,  // 留样区
    Rejected, // 拒收区
    Damaged,  // 破损区
    Expired,  // 过期区
}

impl CellRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellRole::Standard => "STANDARD",
            CellRole::Returns => "RETURNS",
            CellRole::Samples => "SAMPLES",
            CellRole::Rejected => "REJECTED",
            CellRole::Damaged => "DAMAGED",
            CellRole::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for CellRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STANDARD" => Ok(CellRole::Standard),
            "RETURNS" => Ok(CellRole::Returns),
            "SAMPLES" => Ok(CellRole::Samples),
            "REJECTED" => Ok(CellRole::Rejected),
            "DAMAGED" => Ok(CellRole::Damaged),
            "EXPIRED" => Ok(CellRole::Expired),
            _ => Err(ParseEnumError::new("库位角色", s)),
        }
    }
}

// ==========================================
// 库位占用状态 (Cell Status)
// ==========================================
// 首次入账 AVAILABLE -> OCCUPIED，清空后不自动回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellStatus {
    Available, // 空闲
    Occupied,  // 占用
}

impl CellStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellStatus::Available => "AVAILABLE",
            CellStatus::Occupied => "OCCUPIED",
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CellStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AVAILABLE" => Ok(CellStatus::Available),
            "OCCUPIED" => Ok(CellStatus::Occupied),
            _ => Err(ParseEnumError::new("库位状态", s)),
        }
    }
}

// ==========================================
// 库存作业状态 (Operational Status)
// ==========================================
// 与质检状态独立，描述实物能否作业
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalStatus {
    Quarantined, // 隔离
    Available,   // 可用
    Damaged,     // 破损
    Returned,    // 退回
}

impl OperationalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalStatus::Quarantined => "QUARANTINED",
            OperationalStatus::Available => "AVAILABLE",
            OperationalStatus::Damaged => "DAMAGED",
            OperationalStatus::Returned => "RETURNED",
        }
    }
}

impl fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "QUARANTINED" => Ok(OperationalStatus::Quarantined),
            "AVAILABLE" => Ok(OperationalStatus::Available),
            "DAMAGED" => Ok(OperationalStatus::Damaged),
            "RETURNED" => Ok(OperationalStatus::Returned),
            _ => Err(ParseEnumError::new("作业状态", s)),
        }
    }
}

// ==========================================
// 包装形式 (Presentation)
// ==========================================
// 每种包装形式对应一对数值状态码 (正常, 破损)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Presentation {
    Pallet,  // 托盘
    Box,     // 箱
    Sack,    // 袋
    Unit,    // 件
    Package, // 包
    Drum,    // 桶
    Bundle,  // 捆
    Other,   // 其他
}

impl Presentation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presentation::Pallet => "PALLET",
            Presentation::Box => "BOX",
            Presentation::Sack => "SACK",
            Presentation::Unit => "UNIT",
            Presentation::Package => "PACKAGE",
            Presentation::Drum => "DRUM",
            Presentation::Bundle => "BUNDLE",
            Presentation::Other => "OTHER",
        }
    }

    /// 状态码对 (正常, 破损)
    pub fn status_codes(&self) -> (i32, i32) {
        match self {
            Presentation::Pallet => (30, 40),
            Presentation::Box => (31, 41),
            Presentation::Sack => (32, 42),
            Presentation::Unit => (33, 43),
            Presentation::Package => (34, 44),
            Presentation::Drum => (35, 45),
            Presentation::Bundle => (36, 46),
            Presentation::Other => (37, 47),
        }
    }

    /// 归一化 (包装形式, 是否破损) -> (品相, 状态码)
    pub fn normalize(&self, damaged: bool) -> (Condition, i32) {
        let (normal, damaged_code) = self.status_codes();
        if damaged {
            (Condition::Damaged, damaged_code)
        } else {
            (Condition::Normal, normal)
        }
    }
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Presentation {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PALLET" => Ok(Presentation::Pallet),
            "BOX" => Ok(Presentation::Box),
            "SACK" => Ok(Presentation::Sack),
            "UNIT" => Ok(Presentation::Unit),
            "PACKAGE" => Ok(Presentation::Package),
            "DRUM" => Ok(Presentation::Drum),
            "BUNDLE" => Ok(Presentation::Bundle),
            "OTHER" => Ok(Presentation::Other),
            _ => Err(ParseEnumError::new("包装形式", s)),
        }
    }
}

// ==========================================
// 品相 (Condition)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    Normal,  // 正常
    Damaged, // 破损
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Normal => "NORMAL",
            Condition::Damaged => "DAMAGED",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NORMAL" => Ok(Condition::Normal),
            "DAMAGED" => Ok(Condition::Damaged),
            _ => Err(ParseEnumError::new("品相", s)),
        }
    }
}

// ==========================================
// 移动类型 (Movement Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Entry,      // 入库
    Transfer,   // 移库
    Adjustment, // 调整 (同库位)
    Departure,  // 出库
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entry => "ENTRY",
            MovementKind::Transfer => "TRANSFER",
            MovementKind::Adjustment => "ADJUSTMENT",
            MovementKind::Departure => "DEPARTURE",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ENTRY" => Ok(MovementKind::Entry),
            "TRANSFER" => Ok(MovementKind::Transfer),
            "ADJUSTMENT" => Ok(MovementKind::Adjustment),
            "DEPARTURE" => Ok(MovementKind::Departure),
            _ => Err(ParseEnumError::new("移动类型", s)),
        }
    }
}

// ==========================================
// 审计问题严重度 (Severity)
// ==========================================
// 顺序: Low < Medium < High
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,    // 可自动修复
    Medium, // 人工处理
    High,   // 超额分配
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_status_codes() {
        assert_eq!(Presentation::Pallet.normalize(false), (Condition::Normal, 30));
        assert_eq!(Presentation::Pallet.normalize(true), (Condition::Damaged, 40));
        assert_eq!(Presentation::Bundle.normalize(false), (Condition::Normal, 36));
        assert_eq!(Presentation::Other.normalize(true), (Condition::Damaged, 47));
    }

    #[test]
    fn test_quality_status_role_mapping() {
        assert_eq!(QualityStatus::Aprobado.allowed_cell_roles(), &[CellRole::Standard]);
        assert_eq!(
            QualityStatus::Rechazados.allowed_cell_roles(),
            &[CellRole::Rejected, CellRole::Damaged]
        );
        assert!(QualityStatus::Cuarentena.allowed_cell_roles().is_empty());
        assert!(!QualityStatus::Cuarentena.is_transition_target());
        assert!(!QualityStatus::Aprobado.requires_destination_cell());
        assert!(QualityStatus::Contramuestras.requires_destination_cell());
    }

    #[test]
    fn test_operational_status_mapping() {
        assert_eq!(QualityStatus::Aprobado.operational_status(), OperationalStatus::Available);
        assert_eq!(QualityStatus::Rechazados.operational_status(), OperationalStatus::Damaged);
        assert_eq!(QualityStatus::Devoluciones.operational_status(), OperationalStatus::Returned);
        assert_eq!(QualityStatus::Contramuestras.operational_status(), OperationalStatus::Returned);
    }

    #[test]
    fn test_parse_is_case_insensitive_and_rejects_unknown() {
        assert_eq!("aprobado".parse::<QualityStatus>().unwrap(), QualityStatus::Aprobado);
        assert_eq!(" drum ".parse::<Presentation>().unwrap(), Presentation::Drum);
        let err = "PALLET-DAMAGED".parse::<Presentation>().unwrap_err();
        assert_eq!(err.value, "PALLET-DAMAGED");
        assert!("EXPIRED".parse::<CellRole>().is_ok());
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Low.to_string(), "LOW");
    }
}
