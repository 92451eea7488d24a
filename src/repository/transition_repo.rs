// ==========================================
// 仓储质检核心 - 质检流转记录仓储
// ==========================================
// 红线: 只追加
// ==========================================

use crate::db::{enum_from_sql, ts_from_sql, ts_to_sql};
use crate::domain::transition::Transition;
use crate::repository::error::RepositoryResult;
use crate::repository::unit_of_work::SqliteStores;
use rusqlite::{params, Result as SqliteResult, Row};

// ==========================================
// TransitionRepository - 流转记录仓储接口
// ==========================================
pub trait TransitionRepository {
    /// 追加流转记录
    fn insert(&self, transition: &Transition) -> RepositoryResult<()>;

    /// 查询某分配的流转历史（时间升序）
    fn list_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<Transition>>;
}

fn map_row(row: &Row<'_>) -> SqliteResult<Transition> {
    let from_status: String = row.get(2)?;
    let to_status: String = row.get(3)?;
    let created_at: String = row.get(12)?;
    Ok(Transition {
        transition_id: row.get(0)?,
        allocation_id: row.get(1)?,
        from_status: enum_from_sql(2, &from_status)?,
        to_status: enum_from_sql(3, &to_status)?,
        quantity: row.get(4)?,
        packages: row.get(5)?,
        weight_kg: row.get(6)?,
        volume_m3: row.get(7)?,
        from_cell_id: row.get(8)?,
        to_cell_id: row.get(9)?,
        reason: row.get(10)?,
        actor: row.get(11)?,
        created_at: ts_from_sql(12, &created_at)?,
    })
}

impl TransitionRepository for SqliteStores<'_> {
    fn insert(&self, transition: &Transition) -> RepositoryResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO quality_transition (
                transition_id, allocation_id, from_status, to_status,
                quantity, packages, weight_kg, volume_m3,
                from_cell_id, to_cell_id, reason, actor, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                transition.transition_id,
                transition.allocation_id,
                transition.from_status.as_str(),
                transition.to_status.as_str(),
                transition.quantity,
                transition.packages,
                transition.weight_kg,
                transition.volume_m3,
                transition.from_cell_id,
                transition.to_cell_id,
                transition.reason,
                transition.actor,
                ts_to_sql(&transition.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_by_allocation(&self, allocation_id: &str) -> RepositoryResult<Vec<Transition>> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT transition_id, allocation_id, from_status, to_status,
                   quantity, packages, weight_kg, volume_m3,
                   from_cell_id, to_cell_id, reason, actor, created_at
            FROM quality_transition
            WHERE allocation_id = ?1
            ORDER BY created_at, rowid
            "#,
        )?;
        let transitions = stmt
            .query_map(params![allocation_id], map_row)?
            .collect::<SqliteResult<Vec<Transition>>>()?;
        Ok(transitions)
    }
}
