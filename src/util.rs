use chrono::{DateTime, Utc};

use crate::model::{
    ApplyStep, ApplyStepKind, ApplyStepStatus, MasterList, Notice, NoticeLevel, Section,
    ShoppingListSummary, StoredPending, ViewFilters,
};
use crate::pending::PendingChangeStore;

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

fn has_text(value: &Option<String>) -> bool {
    value
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

fn pending_marker(pending: &PendingChangeStore, item_id: &str) -> String {
    if let Some(entry) = pending.staged_move(item_id) {
        return format!(" -> {}", entry.target_category_name);
    }
    if pending.is_staged_for_delete(item_id) {
        return " (delete)".to_string();
    }
    String::new()
}

pub fn format_filters(filters: &ViewFilters) -> String {
    if !filters.is_active() {
        return "Filters: (none)".to_string();
    }
    let mut parts = Vec::new();
    if filters.pending_only {
        parts.push("pending only".to_string());
    }
    if !filters.categories.is_empty() {
        let ids: Vec<_> = filters.categories.iter().map(String::as_str).collect();
        parts.push(format!("categories {}", ids.join(", ")));
    }
    format!("Filters: {}", parts.join("; "))
}

/// Renders the visible sections with staged markers next to the affected items.
pub fn format_master_view(
    master: &MasterList,
    sections: &[Section],
    pending: &PendingChangeStore,
    filters: &ViewFilters,
) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{} (list id {}, {} items)\n",
        master.name, master.id, master.item_count
    ));
    output.push_str(&format_filters(filters));
    output.push('\n');
    if !pending.is_empty() {
        output.push_str(&format!("Pending changes: {}\n", pending.len()));
    }
    output.push('\n');

    if sections.is_empty() {
        output.push_str("(nothing to show)");
        return output;
    }
    for section in sections {
        output.push_str(&format!(
            "{} [{}] ({})\n",
            section.name,
            section.id,
            section.items.len()
        ));
        for item in &section.items {
            let crossed = if item.crossed_off { "x" } else { " " };
            output.push_str(&format!(
                "  [{crossed}] {} (item id {}){}\n",
                item.name,
                item.id,
                pending_marker(pending, &item.id)
            ));
            if has_text(&item.note) {
                output.push_str(&format!(
                    "      Note: {}\n",
                    item.note.as_deref().unwrap_or("")
                ));
            }
        }
    }
    output.trim_end().to_string()
}

pub fn format_lists(lists: &[ShoppingListSummary]) -> String {
    let mut output = String::from("Lists:\n");
    for list in lists {
        output.push_str(&format!("- {} (list id {})\n", list.name, list.id));
    }
    output.trim_end().to_string()
}

pub fn format_pending(stored: &StoredPending) -> String {
    if stored.moves.is_empty() && stored.deletes.is_empty() {
        return "No pending changes.".to_string();
    }
    let mut output = String::new();
    if !stored.moves.is_empty() {
        output.push_str("Moves:\n");
        for entry in &stored.moves {
            output.push_str(&format!(
                "- {} (item id {}) -> {} [{}]\n",
                entry.item_name, entry.item_id, entry.target_category_name, entry.target_category_id
            ));
        }
    }
    if !stored.deletes.is_empty() {
        output.push_str("Deletes:\n");
        for entry in &stored.deletes {
            output.push_str(&format!("- {} (item id {})\n", entry.item_name, entry.item_id));
        }
    }
    output.trim_end().to_string()
}

pub fn format_step(step: &ApplyStep) -> String {
    let action = match step.kind {
        ApplyStepKind::Move => format!(
            "Move {} to {}",
            step.item_name,
            step.target_category_name.as_deref().unwrap_or("")
        ),
        ApplyStepKind::Delete => format!("Delete {}", step.item_name),
    };
    let mut line = format!("[{}] {} ({})", step.status.as_str(), action, step.key);
    if step.status == ApplyStepStatus::Error {
        if let Some(message) = &step.error_message {
            line.push_str(&format!(": {message}"));
        }
    }
    line
}

pub fn format_steps(steps: &[ApplyStep]) -> String {
    steps
        .iter()
        .map(format_step)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_notice(notice: &Notice) -> String {
    let label = match notice.level {
        NoticeLevel::Info => "Info",
        NoticeLevel::Success => "Success",
        NoticeLevel::Error => "Error",
    };
    format!("{label}: {}", notice.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PendingDeleteEntry, PendingMoveEntry};
    use crate::pending::tests::{item, master, section};

    #[test]
    fn master_view_marks_staged_items() {
        let list = master(vec![
            section("a", "Produce", None, vec![item("x", "Apples", Some("a"))]),
            section("b", "Bakery", None, vec![item("y", "Bread", Some("b"))]),
        ]);
        let mut pending = PendingChangeStore::new();
        pending.toggle_move(list.find_item("x").expect("x"), "b", &list);
        pending.toggle_delete(list.find_item("y").expect("y"));

        let output = format_master_view(&list, &list.sections, &pending, &ViewFilters::default());
        assert!(output.contains("Filters: (none)"));
        assert!(output.contains("Pending changes: 2"));
        assert!(output.contains("[ ] Apples (item id x) -> Bakery"));
        assert!(output.contains("[ ] Bread (item id y) (delete)"));
    }

    #[test]
    fn pending_listing_and_empty_state() {
        assert_eq!(format_pending(&StoredPending::default()), "No pending changes.");
        let stored = StoredPending {
            moves: vec![PendingMoveEntry {
                item_id: "x".to_string(),
                item_name: "Apples".to_string(),
                target_category_id: "b".to_string(),
                target_category_name: "Bakery".to_string(),
            }],
            deletes: vec![PendingDeleteEntry {
                item_id: "y".to_string(),
                item_name: "Bread".to_string(),
            }],
        };
        assert_eq!(
            format_pending(&stored),
            "Moves:\n- Apples (item id x) -> Bakery [b]\nDeletes:\n- Bread (item id y)"
        );
    }

    #[test]
    fn failed_steps_show_their_message() {
        let mut step = ApplyStep::for_delete(&PendingDeleteEntry {
            item_id: "y".to_string(),
            item_name: "Bread".to_string(),
        });
        assert_eq!(format_step(&step), "[pending] Delete Bread (delete-y)");
        step.status = ApplyStepStatus::Error;
        step.error_message = Some("Request failed".to_string());
        assert_eq!(
            format_step(&step),
            "[error] Delete Bread (delete-y): Request failed"
        );
    }
}
