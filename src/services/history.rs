use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationDef, Set,
    entity::prelude::DateTimeWithTimeZone,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::{permission_category, permission_history, prelude::*, role};
use crate::error::RbacResult;
use crate::graphql::types::{DailyChangeSummary, HistoryQuery, PermissionChange};
use crate::services::capability::CapabilityFlags;

pub const DEFAULT_ACTOR: &str = "system";
pub const DEFAULT_RECENT_LIMIT: u64 = 10;

/// Before/after payload stored in `role_permission_history.changes`.
///
/// `None` on either side means the grant row did not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantChange {
    pub before: Option<CapabilityFlags>,
    pub after: Option<CapabilityFlags>,
}

impl GrantChange {
    pub fn new(before: Option<CapabilityFlags>, after: Option<CapabilityFlags>) -> Self {
        Self { before, after }
    }

    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

#[derive(Clone)]
pub struct HistoryService {
    db: DatabaseConnection,
}

#[derive(Debug, FromQueryResult)]
struct HistoryRow {
    id: i32,
    role_id: i32,
    role_name: Option<String>,
    category_id: i32,
    category_name: Option<String>,
    changes: serde_json::Value,
    changed_by: String,
    changed_at: DateTimeWithTimeZone,
}

impl From<HistoryRow> for PermissionChange {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            role_id: row.role_id,
            role_name: row.role_name,
            category_id: row.category_id,
            category_name: row.category_name,
            changes: async_graphql::Json(row.changes),
            changed_by: row.changed_by,
            changed_at: row.changed_at.into(),
        }
    }
}

fn history_role() -> RelationDef {
    PermissionHistory::belongs_to(Role)
        .from(permission_history::Column::RoleId)
        .to(role::Column::Id)
        .into()
}

fn history_category() -> RelationDef {
    PermissionHistory::belongs_to(PermissionCategory)
        .from(permission_history::Column::CategoryId)
        .to(permission_category::Column::Id)
        .into()
}

impl HistoryService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Append one history row on `conn`, normally the transaction that made
    /// the change. Nothing is written when `change` is a no-op.
    pub async fn record_change<C: ConnectionTrait>(
        conn: &C,
        role_id: i32,
        category_id: i32,
        change: &GrantChange,
        actor: &str,
    ) -> RbacResult<Option<permission_history::Model>> {
        if change.is_noop() {
            return Ok(None);
        }

        let entry = permission_history::ActiveModel {
            role_id: Set(role_id),
            category_id: Set(category_id),
            changes: Set(serde_json::to_value(change)?),
            changed_by: Set(actor.to_string()),
            changed_at: Set(Utc::now().into()),
            ..Default::default()
        };

        Ok(Some(entry.insert(conn).await?))
    }

    /// Record one row per category whose flags differ between two snapshots
    /// of a role's grant set. Returns the number of rows written.
    pub async fn record_diff<C: ConnectionTrait>(
        conn: &C,
        role_id: i32,
        before: &HashMap<i32, CapabilityFlags>,
        after: &HashMap<i32, CapabilityFlags>,
        actor: &str,
    ) -> RbacResult<usize> {
        let mut categories: Vec<i32> = before.keys().chain(after.keys()).copied().collect();
        categories.sort_unstable();
        categories.dedup();

        let mut written = 0;
        for category_id in categories {
            let change = GrantChange::new(
                before.get(&category_id).copied(),
                after.get(&category_id).copied(),
            );
            if Self::record_change(conn, role_id, category_id, &change, actor)
                .await?
                .is_some()
            {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Get history entries, newest first, optionally narrowed to a role and
    /// an inclusive time range
    pub async fn history(&self, query: HistoryQuery) -> RbacResult<Vec<PermissionChange>> {
        self.fetch(query, None).await
    }

    pub async fn role_history(
        &self,
        role_id: i32,
        from_date: Option<DateTime<Utc>>,
        to_date: Option<DateTime<Utc>>,
    ) -> RbacResult<Vec<PermissionChange>> {
        self.fetch(
            HistoryQuery {
                role_id: Some(role_id),
                from_date,
                to_date,
            },
            None,
        )
        .await
    }

    /// Get the most recent changes across all roles
    pub async fn recent_changes(&self, limit: Option<u64>) -> RbacResult<Vec<PermissionChange>> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT);
        self.fetch(HistoryQuery::default(), Some(limit)).await
    }

    /// Per-day change counts for a role with the distinct category names
    /// touched that day, most recent day first.
    pub async fn changes_summary(&self, role_id: i32) -> RbacResult<Vec<DailyChangeSummary>> {
        let rows = self
            .fetch(
                HistoryQuery {
                    role_id: Some(role_id),
                    ..Default::default()
                },
                None,
            )
            .await?;

        let mut days: BTreeMap<NaiveDate, (u64, Vec<String>, HashSet<String>)> = BTreeMap::new();
        for change in rows {
            let day = days.entry(change.changed_at.date_naive()).or_default();
            day.0 += 1;
            if let Some(name) = change.category_name {
                if day.2.insert(name.clone()) {
                    day.1.push(name);
                }
            }
        }

        Ok(days
            .into_iter()
            .rev()
            .map(|(change_date, (change_count, mut affected_categories, _))| {
                affected_categories.sort();
                DailyChangeSummary {
                    change_date,
                    change_count,
                    affected_categories,
                }
            })
            .collect())
    }

    async fn fetch(
        &self,
        query: HistoryQuery,
        limit: Option<u64>,
    ) -> RbacResult<Vec<PermissionChange>> {
        debug!(role_id = ?query.role_id, ?limit, "loading permission history");

        let mut select = PermissionHistory::find()
            .select_only()
            .column(permission_history::Column::Id)
            .column(permission_history::Column::RoleId)
            .column_as(role::Column::Name, "role_name")
            .column(permission_history::Column::CategoryId)
            .column_as(permission_category::Column::Name, "category_name")
            .column(permission_history::Column::Changes)
            .column(permission_history::Column::ChangedBy)
            .column(permission_history::Column::ChangedAt)
            .join(JoinType::LeftJoin, history_role())
            .join(JoinType::LeftJoin, history_category());

        if let Some(role_id) = query.role_id {
            select = select.filter(permission_history::Column::RoleId.eq(role_id));
        }
        if let Some(from_date) = query.from_date {
            let from_date: DateTimeWithTimeZone = from_date.into();
            select = select.filter(permission_history::Column::ChangedAt.gte(from_date));
        }
        if let Some(to_date) = query.to_date {
            let to_date: DateTimeWithTimeZone = to_date.into();
            select = select.filter(permission_history::Column::ChangedAt.lte(to_date));
        }

        select = select
            .order_by_desc(permission_history::Column::ChangedAt)
            .order_by_desc(permission_history::Column::Id);

        if let Some(limit) = limit {
            select = select.limit(limit);
        }

        let rows = select.into_model::<HistoryRow>().all(&self.db).await?;
        Ok(rows.into_iter().map(PermissionChange::from).collect())
    }
}
