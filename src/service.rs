//! Session-scoped operations against the upstream list service.
//!
//! Every mutation is followed by a full re-fetch, so callers always get back an authoritative
//! [`MasterList`] rather than a locally patched one.

use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::AppError;
use crate::model::{
    denormalize_category_id, CreateCategoryInput, DeleteCategoryInput, DeleteItemsInput,
    ListsOverview, MasterList, MoveItemsInput, RenameCategoryInput, RenameItemInput,
    ReorderCategoriesInput,
};
use crate::projector::{build_category_index, extract_shopping_lists, project_master_list, CategoryIndex};
use crate::session::{short_id, SessionClientCache, SessionRecord};
use crate::upstream::{Connector, UpstreamClient};

pub const MAX_INPUT_LENGTH: usize = 4096;
pub const REORDER_COMMAND: &str = "reorderItem";
const NO_LISTS_ERROR: &str = "No shopping lists found in OurGroceries response.";
const ITEM_NOT_FOUND_ERROR: &str = "Item not found.";
const CATEGORY_LIST_ERROR: &str = "Category list identifier not available.";

/// Trims, collapses inner whitespace and caps the length; blank input yields `None`.
pub fn sanitize_input(value: &str, max_length: usize) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= max_length {
        return Some(collapsed);
    }
    let truncated: String = collapsed.chars().take(max_length).collect();
    Some(truncated.trim_end().to_string())
}

fn require_text(value: &str, context: &str) -> Result<String, AppError> {
    sanitize_input(value, MAX_INPUT_LENGTH)
        .ok_or_else(|| AppError::InvalidInput(format!("{context} must be a non-empty string.")))
}

fn optional_text(value: Option<&str>, context: &str) -> Result<Option<String>, AppError> {
    value.map(|value| require_text(value, context)).transpose()
}

pub struct MasterService<C: Connector> {
    cache: SessionClientCache<C>,
}

impl<C: Connector> MasterService<C> {
    pub fn new(cache: SessionClientCache<C>) -> Self {
        Self { cache }
    }

    pub fn sessions(&self) -> &SessionClientCache<C> {
        &self.cache
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionRecord, AppError> {
        let email = require_text(email, "email")?;
        if password.is_empty() {
            return Err(AppError::InvalidInput(
                "password must be a non-empty string.".to_string(),
            ));
        }
        self.cache.login(&email, password).await
    }

    pub fn logout(&self, session_id: &str) {
        self.cache.logout(session_id);
    }

    async fn client(&self, session_id: &str) -> Result<Arc<C::Client>, AppError> {
        self.cache.get(session_id).await
    }

    async fn load_index(client: &C::Client) -> Result<CategoryIndex, AppError> {
        let payload = client.read_categories().await?;
        Ok(build_category_index(&payload))
    }

    async fn load_master(client: &C::Client) -> Result<MasterList, AppError> {
        let index = Self::load_index(client).await?;
        let payload = client.read_master_list().await?;
        project_master_list(&payload, &index)
    }

    async fn require_category_list_id(client: &C::Client) -> Result<String, AppError> {
        Self::load_index(client)
            .await?
            .category_list_id
            .ok_or_else(|| AppError::Structural(CATEGORY_LIST_ERROR.to_string()))
    }

    pub async fn master_list(&self, session_id: &str) -> Result<MasterList, AppError> {
        let client = self.client(session_id).await?;
        Self::load_master(&client).await
    }

    pub async fn lists_overview(&self, session_id: &str) -> Result<ListsOverview, AppError> {
        let client = self.client(session_id).await?;
        let overview = client.read_lists().await?;
        let lists = extract_shopping_lists(&overview);
        if lists.is_empty() {
            return Err(AppError::NotFound(NO_LISTS_ERROR.to_string()));
        }
        let master_list = Self::load_master(&client).await?;
        Ok(ListsOverview { lists, master_list })
    }

    pub async fn move_items(
        &self,
        session_id: &str,
        input: MoveItemsInput,
    ) -> Result<MasterList, AppError> {
        let list_id = require_text(&input.list_id, "list_id")?;
        let target = optional_text(input.target_category_id.as_deref(), "target_category_id")?
            .and_then(|id| denormalize_category_id(&id));
        let mut items = Vec::with_capacity(input.items.len());
        for item in &input.items {
            items.push((
                require_text(&item.item_id, "item_id")?,
                require_text(&item.item_name, "item_name")?,
            ));
        }

        let client = self.client(session_id).await?;
        debug!(
            session = short_id(session_id),
            count = items.len(),
            category = target.as_deref().unwrap_or("-"),
            "moving items"
        );
        try_join_all(items.iter().map(|(item_id, item_name)| {
            client.mutate_item(&list_id, item_id, target.as_deref(), item_name)
        }))
        .await?;
        Self::load_master(&client).await
    }

    pub async fn delete_items(
        &self,
        session_id: &str,
        input: DeleteItemsInput,
    ) -> Result<MasterList, AppError> {
        let list_id = require_text(&input.list_id, "list_id")?;
        let item_ids = input
            .item_ids
            .iter()
            .map(|id| require_text(id, "item_ids[]"))
            .collect::<Result<Vec<_>, _>>()?;

        let client = self.client(session_id).await?;
        debug!(session = short_id(session_id), count = item_ids.len(), "deleting items");
        try_join_all(item_ids.iter().map(|id| client.remove_item(&list_id, id))).await?;
        Self::load_master(&client).await
    }

    pub async fn rename_item(
        &self,
        session_id: &str,
        input: RenameItemInput,
    ) -> Result<MasterList, AppError> {
        let item_id = require_text(&input.item_id, "itemId")?;
        let new_name = require_text(&input.new_name, "newName")?;

        let client = self.client(session_id).await?;
        let current = Self::load_master(&client).await?;
        let item = current
            .find_item(&item_id)
            .ok_or_else(|| AppError::NotFound(ITEM_NOT_FOUND_ERROR.to_string()))?;
        client
            .mutate_item(&current.id, &item_id, item.category_id.as_deref(), &new_name)
            .await?;
        Self::load_master(&client).await
    }

    pub async fn rename_category(
        &self,
        session_id: &str,
        input: RenameCategoryInput,
    ) -> Result<MasterList, AppError> {
        let category_id = require_text(&input.category_id, "categoryId")?;
        let new_name = require_text(&input.new_name, "newName")?;

        let client = self.client(session_id).await?;
        let list_id = Self::require_category_list_id(&client).await?;
        client
            .mutate_item(&list_id, &category_id, None, &new_name)
            .await?;
        info!(session = short_id(session_id), category = %category_id, "category renamed");
        Self::load_master(&client).await
    }

    pub async fn create_category(
        &self,
        session_id: &str,
        input: CreateCategoryInput,
    ) -> Result<MasterList, AppError> {
        let name = require_text(&input.name, "name")?;
        let client = self.client(session_id).await?;
        client.create_category(&name).await?;
        info!(session = short_id(session_id), "category created");
        Self::load_master(&client).await
    }

    pub async fn delete_category(
        &self,
        session_id: &str,
        input: DeleteCategoryInput,
    ) -> Result<MasterList, AppError> {
        let category_id = require_text(&input.category_id, "categoryId")?;
        let client = self.client(session_id).await?;
        let list_id = Self::require_category_list_id(&client).await?;
        client.remove_item(&list_id, &category_id).await?;
        info!(session = short_id(session_id), category = %category_id, "category deleted");
        Self::load_master(&client).await
    }

    pub async fn reorder_categories(
        &self,
        session_id: &str,
        input: ReorderCategoriesInput,
    ) -> Result<MasterList, AppError> {
        let item_id = require_text(&input.item_id, "itemId")?;
        let next_item_id = optional_text(input.next_item_id.as_deref(), "nextItemId")?;

        let client = self.client(session_id).await?;
        let list_id = Self::require_category_list_id(&client).await?;
        let payload = json!({
            "listId": list_id,
            "itemId": item_id,
            "nextItemId": next_item_id,
            "categoryId": Value::Null,
        });
        client.run_command(REORDER_COMMAND, payload).await?;
        Self::load_master(&client).await
    }
}
