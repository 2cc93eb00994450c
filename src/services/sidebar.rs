use futures::future::join_all;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{debug, warn};

use crate::entities::{prelude::*, sidebar_menu, sidebar_sub_menu};
use crate::error::RbacResult;
use crate::graphql::types::{
    BatchItemResult, DisplayOrderUpdate, SidebarMenu as SidebarMenuView,
    SidebarSubMenu as SidebarSubMenuView,
};

#[derive(Clone)]
pub struct SidebarService {
    db: DatabaseConnection,
}

impl SidebarService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Get menus with their submenus, both ordered by display order
    pub async fn menu_tree(&self, active_only: bool) -> RbacResult<Vec<SidebarMenuView>> {
        let mut query = SidebarMenu::find();
        if active_only {
            query = query.filter(sidebar_menu::Column::IsActive.eq(true));
        }

        // find_with_related orders by menu id; display order is applied here.
        let mut menus = query
            .find_with_related(SidebarSubMenu)
            .all(&self.db)
            .await?;
        menus.sort_by_key(|(menu, _)| (menu.display_order, menu.id));
        debug!(menus = menus.len(), active_only, "menu tree loaded");

        Ok(menus
            .into_iter()
            .map(|(menu, mut sub_menus)| {
                sub_menus.retain(|sub| !active_only || sub.is_active);
                sub_menus.sort_by_key(|sub| (sub.display_order, sub.id));
                SidebarMenuView {
                    sub_menus: sub_menus.into_iter().map(SidebarSubMenuView::from).collect(),
                    ..SidebarMenuView::from(menu)
                }
            })
            .collect())
    }

    /// Set display order on many menus. Each entry is an independent
    /// statement; a failed entry does not undo the others.
    pub async fn update_menu_display_order(
        &self,
        updates: &[DisplayOrderUpdate],
    ) -> Vec<BatchItemResult> {
        let statements = updates.iter().map(|update| {
            SidebarMenu::update_many()
                .col_expr(sidebar_menu::Column::DisplayOrder, Expr::value(update.display_order))
                .filter(sidebar_menu::Column::Id.eq(update.id))
                .exec(&self.db)
        });
        let outcomes = join_all(statements).await;

        outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| match outcome {
                Ok(result) if result.rows_affected > 0 => BatchItemResult::updated(index),
                Ok(_) => BatchItemResult::not_found(index),
                Err(e) => {
                    warn!(index, error = %e, "menu display order update failed");
                    BatchItemResult::failed(index, e.to_string())
                }
            })
            .collect()
    }

    /// Set display order on many submenus, reported per entry.
    pub async fn update_sub_menu_display_order(
        &self,
        updates: &[DisplayOrderUpdate],
    ) -> Vec<BatchItemResult> {
        let statements = updates.iter().map(|update| {
            SidebarSubMenu::update_many()
                .col_expr(
                    sidebar_sub_menu::Column::DisplayOrder,
                    Expr::value(update.display_order),
                )
                .filter(sidebar_sub_menu::Column::Id.eq(update.id))
                .exec(&self.db)
        });
        let outcomes = join_all(statements).await;

        outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| match outcome {
                Ok(result) if result.rows_affected > 0 => BatchItemResult::updated(index),
                Ok(_) => BatchItemResult::not_found(index),
                Err(e) => {
                    warn!(index, error = %e, "submenu display order update failed");
                    BatchItemResult::failed(index, e.to_string())
                }
            })
            .collect()
    }
}
