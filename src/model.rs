use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub const UNCATEGORIZED_ID: &str = "uncategorized";
pub const FALLBACK_CATEGORY_NAME: &str = "Uncategorized";
/// Sort key of the fallback section; sorts after any real ordinal key.
pub const UNCATEGORIZED_SORT_KEY: &str = "\u{10FFFF}";
pub const UNNAMED_ITEM_LABEL: &str = "Unnamed Item";
pub const UNKNOWN_MASTER_LIST_ID: &str = "unknown";
pub const DEFAULT_MASTER_LIST_NAME: &str = "Master List";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub category_id: Option<String>,
    pub category_name: String,
    pub crossed_off: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
    pub items: Vec<Item>,
}

impl Section {
    pub fn is_fallback(&self) -> bool {
        self.id == UNCATEGORIZED_ID
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterList {
    pub id: String,
    pub name: String,
    pub item_count: usize,
    pub sections: Vec<Section>,
}

impl MasterList {
    pub fn find_item(&self, item_id: &str) -> Option<&Item> {
        self.sections
            .iter()
            .flat_map(|section| section.items.iter())
            .find(|item| item.id == item_id)
    }

    pub fn find_section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == section_id)
    }

    pub fn section_name(&self, section_id: &str) -> Option<&str> {
        self.find_section(section_id).map(|section| section.name.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListSummary {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct ListsOverview {
    pub lists: Vec<ShoppingListSummary>,
    pub master_list: MasterList,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMoveEntry {
    pub item_id: String,
    pub item_name: String,
    pub target_category_id: String,
    pub target_category_name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDeleteEntry {
    pub item_id: String,
    pub item_name: String,
}

/// Persisted shape of the staged changes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoredPending {
    #[serde(default)]
    pub moves: Vec<PendingMoveEntry>,
    #[serde(default)]
    pub deletes: Vec<PendingDeleteEntry>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ApplyStepKind {
    Move,
    Delete,
}

impl ApplyStepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Delete => "delete",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ApplyStepStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl ApplyStepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApplyStep {
    pub key: String,
    pub kind: ApplyStepKind,
    pub status: ApplyStepStatus,
    pub item_id: String,
    pub item_name: String,
    pub target_category_id: Option<String>,
    pub target_category_name: Option<String>,
    pub error_message: Option<String>,
}

impl ApplyStep {
    pub fn for_move(entry: &PendingMoveEntry) -> Self {
        Self {
            key: format!("move-{}", entry.item_id),
            kind: ApplyStepKind::Move,
            status: ApplyStepStatus::Pending,
            item_id: entry.item_id.clone(),
            item_name: entry.item_name.clone(),
            target_category_id: Some(entry.target_category_id.clone()),
            target_category_name: Some(entry.target_category_name.clone()),
            error_message: None,
        }
    }

    pub fn for_delete(entry: &PendingDeleteEntry) -> Self {
        Self {
            key: format!("delete-{}", entry.item_id),
            kind: ApplyStepKind::Delete,
            status: ApplyStepStatus::Pending,
            item_id: entry.item_id.clone(),
            item_name: entry.item_name.clone(),
            target_category_id: None,
            target_category_name: None,
            error_message: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ApplySummary {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewFilters {
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub pending_only: bool,
}

impl ViewFilters {
    pub fn is_active(&self) -> bool {
        self.pending_only || !self.categories.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MoveItemInput {
    pub item_id: String,
    pub item_name: String,
}

#[derive(Clone, Debug)]
pub struct MoveItemsInput {
    pub list_id: String,
    pub items: Vec<MoveItemInput>,
    pub target_category_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DeleteItemsInput {
    pub list_id: String,
    pub item_ids: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RenameItemInput {
    pub item_id: String,
    pub new_name: String,
}

#[derive(Clone, Debug)]
pub struct RenameCategoryInput {
    pub category_id: String,
    pub new_name: String,
}

#[derive(Clone, Debug)]
pub struct CreateCategoryInput {
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct DeleteCategoryInput {
    pub category_id: String,
}

#[derive(Clone, Debug)]
pub struct ReorderCategoriesInput {
    pub item_id: String,
    pub next_item_id: Option<String>,
}

/// Maps an absent or empty category id onto the fallback id.
pub fn normalize_category_id(category_id: Option<&str>) -> String {
    match category_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => UNCATEGORIZED_ID.to_string(),
    }
}

/// Inverse of [`normalize_category_id`]: the fallback id becomes `None` on the wire.
pub fn denormalize_category_id(category_id: &str) -> Option<String> {
    if category_id.is_empty() || category_id == UNCATEGORIZED_ID {
        None
    } else {
        Some(category_id.to_string())
    }
}
