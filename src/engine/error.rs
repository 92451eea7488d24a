// ==========================================
// 仓储质检核心 - 引擎层错误类型
// ==========================================
// 分类: 校验 / 未找到 / 状态 / 冲突 / 仓储
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("校验失败: {0}")]
    Validation(String),

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("状态不允许: {0}")]
    InvalidState(String),

    #[error("并发冲突: {entity} id={id}, expected_revision={expected}, actual_revision={actual}")]
    Conflict {
        entity: String,
        id: String,
        expected: i32,
        actual: i32,
    },

    #[error(transparent)]
    Repository(RepositoryError),
}

impl EngineError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

// 乐观锁/未找到提升为业务错误，其余保持仓储错误
impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => EngineError::Conflict {
                entity,
                id,
                expected,
                actual,
            },
            RepositoryError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Repository(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
