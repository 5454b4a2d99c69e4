//! Single-category reorder expressed as "place before neighbour".
//!
//! The upstream only understands `nextItemId` (the category the moved one should precede,
//! or none for "last"), so positions are translated into a neighbour before anything is sent.

use crate::model::{Section, UNCATEGORIZED_ID};

pub const FALLBACK_REORDER_MESSAGE: &str = "Cannot reorder 'Uncategorized' category";
pub const NOT_QUIESCENT_MESSAGE: &str =
    "Reordering is disabled while filters or pending changes are active";
pub const REORDER_SUCCESS_MESSAGE: &str = "Categories reordered";
const UNKNOWN_CATEGORY_MESSAGE: &str = "Category not found.";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReorderPlan {
    pub source_id: String,
    /// Category the source ends up directly in front of; `None` places it last.
    pub next_item_id: Option<String>,
    /// Index the source occupies after the splice.
    pub insert_index: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReorderRejection {
    Fallback,
    UnknownCategory,
}

impl ReorderRejection {
    pub fn message(&self) -> &'static str {
        match self {
            ReorderRejection::Fallback => FALLBACK_REORDER_MESSAGE,
            ReorderRejection::UnknownCategory => UNKNOWN_CATEGORY_MESSAGE,
        }
    }
}

/// Works out where `source_id` lands when dropped onto `target_id` in the displayed order.
///
/// Returns `Ok(None)` when source and target are the same category.
pub fn plan_reorder(
    sections: &[Section],
    source_id: &str,
    target_id: &str,
) -> Result<Option<ReorderPlan>, ReorderRejection> {
    if source_id == UNCATEGORIZED_ID || target_id == UNCATEGORIZED_ID {
        return Err(ReorderRejection::Fallback);
    }
    let position = |id: &str| sections.iter().position(|section| section.id == id);
    let (Some(source), Some(target)) = (position(source_id), position(target_id)) else {
        return Err(ReorderRejection::UnknownCategory);
    };
    if source == target {
        return Ok(None);
    }

    let next_item_id = if source < target {
        sections
            .get(target + 1)
            .filter(|next| !next.is_fallback())
            .map(|next| next.id.clone())
    } else {
        Some(sections[target].id.clone())
    };

    Ok(Some(ReorderPlan {
        source_id: source_id.to_string(),
        next_item_id,
        insert_index: target,
    }))
}

/// Splices the source into its planned slot and renumbers every section densely.
pub fn apply_optimistic(sections: &mut Vec<Section>, plan: &ReorderPlan) {
    let Some(source) = sections
        .iter()
        .position(|section| section.id == plan.source_id)
    else {
        return;
    };
    let moving = sections.remove(source);
    let insert_at = plan.insert_index.min(sections.len());
    sections.insert(insert_at, moving);
    renumber(sections);
}

fn renumber(sections: &mut [Section]) {
    for (idx, section) in sections.iter_mut().enumerate() {
        section.sort_order = Some(format!("{idx:04}"));
    }
}
