//! Projection of raw upstream payloads into the normalized [`MasterList`].
//!
//! Everything here is pure: the same payloads always yield the same snapshot, and a new
//! snapshot is built on every fetch instead of patching the previous one.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::AppError;
use crate::model::{
    Category, Item, MasterList, Section, ShoppingListSummary, DEFAULT_MASTER_LIST_NAME,
    FALLBACK_CATEGORY_NAME, UNCATEGORIZED_ID, UNCATEGORIZED_SORT_KEY, UNKNOWN_MASTER_LIST_ID,
    UNNAMED_ITEM_LABEL,
};

const LIST_KEY: &str = "list";
const CATEGORY_CONTAINER_KEYS: [&str; 2] = ["list", "categoryList"];
const LIST_SUFFIXES: [&str; 2] = ["list", "lists"];
const RECORD_ERROR: &str = "Unexpected master list response structure.";

#[derive(Clone, Debug, Default)]
pub struct CategoryIndex {
    pub categories: Vec<Category>,
    pub lookup: HashMap<String, String>,
    pub category_list_id: Option<String>,
}

/// Trimmed string form of a scalar; blank strings, null and containers yield `None`.
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record.get(key).and_then(coerce_string)
}

fn has_sort_key(key: Option<&str>) -> bool {
    key.is_some_and(|key| !key.trim().is_empty())
}

/// Keyed entries first (ordered by trimmed key), then unkeyed ones.
pub fn compare_sort_keys(first: Option<&str>, second: Option<&str>) -> Ordering {
    match (has_sort_key(first), has_sort_key(second)) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
        (true, true) => {
            let first = first.map(str::trim).unwrap_or_default();
            let second = second.map(str::trim).unwrap_or_default();
            first.cmp(second)
        }
    }
}

pub fn compare_sort_key_then_name(
    first_key: Option<&str>,
    first_name: &str,
    second_key: Option<&str>,
    second_name: &str,
) -> Ordering {
    compare_sort_keys(first_key, second_key).then_with(|| first_name.cmp(second_name))
}

fn compare_item_names(first: &str, second: &str) -> Ordering {
    first
        .to_lowercase()
        .cmp(&second.to_lowercase())
        .then_with(|| first.cmp(second))
}

fn compare_sections(first: &Section, second: &Section) -> Ordering {
    match (first.is_fallback(), second.is_fallback()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => compare_sort_key_then_name(
            first.sort_order.as_deref(),
            &first.name,
            second.sort_order.as_deref(),
            &second.name,
        ),
    }
}

/// Sorts sections by (has-sort-key, sort-key, name) with the fallback pinned last.
pub fn sort_sections(sections: &mut [Section]) {
    sections.sort_by(compare_sections);
}

fn pick_category_container(payload: &Value) -> Option<&Map<String, Value>> {
    let root = payload.as_object()?;
    CATEGORY_CONTAINER_KEYS
        .iter()
        .find_map(|key| root.get(*key).and_then(Value::as_object))
}

fn category_from_entry(entry: &Value) -> Option<Category> {
    let record = entry.as_object()?;
    let id = field(record, "id")?;
    let name = field(record, "value").or_else(|| field(record, "name"))?;
    Some(Category {
        id,
        name,
        sort_order: field(record, "sortOrder"),
    })
}

pub fn build_category_index(payload: &Value) -> CategoryIndex {
    let container = pick_category_container(payload);
    let entries = container
        .and_then(|record| record.get("items"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut categories = Vec::new();
    let mut lookup = HashMap::new();
    for category in entries.iter().filter_map(category_from_entry) {
        if lookup.contains_key(&category.id) {
            continue;
        }
        lookup.insert(category.id.clone(), category.name.clone());
        categories.push(category);
    }
    categories.sort_by(|a, b| {
        compare_sort_key_then_name(a.sort_order.as_deref(), &a.name, b.sort_order.as_deref(), &b.name)
    });

    CategoryIndex {
        categories,
        lookup,
        category_list_id: container.and_then(|record| field(record, "id")),
    }
}

fn require_master_list_record(payload: &Value) -> Result<&Map<String, Value>, AppError> {
    payload
        .as_object()
        .and_then(|root| root.get(LIST_KEY))
        .and_then(Value::as_object)
        .ok_or_else(|| AppError::Structural(RECORD_ERROR.to_string()))
}

fn item_from_entry(entry: &Value, lookup: &HashMap<String, String>) -> Option<Item> {
    let record = entry.as_object()?;
    let id = field(record, "id")?;
    let name = field(record, "value")
        .or_else(|| field(record, "name"))
        .unwrap_or_else(|| UNNAMED_ITEM_LABEL.to_string());
    let category_id = field(record, "categoryId");
    let category_name = category_id
        .as_ref()
        .and_then(|id| lookup.get(id))
        .cloned()
        .unwrap_or_default();
    Some(Item {
        id,
        name,
        category_id,
        category_name,
        crossed_off: record.get("crossedOff").is_some_and(is_truthy),
        note: field(record, "note"),
    })
}

fn fallback_section() -> Section {
    Section {
        id: UNCATEGORIZED_ID.to_string(),
        name: FALLBACK_CATEGORY_NAME.to_string(),
        sort_order: Some(UNCATEGORIZED_SORT_KEY.to_string()),
        items: Vec::new(),
    }
}

pub fn project_master_list(payload: &Value, index: &CategoryIndex) -> Result<MasterList, AppError> {
    let record = require_master_list_record(payload)?;

    let mut sections: Vec<Section> = index
        .categories
        .iter()
        .map(|category| Section {
            id: category.id.clone(),
            name: category.name.clone(),
            sort_order: category.sort_order.clone(),
            items: Vec::new(),
        })
        .collect();
    let positions: HashMap<String, usize> = sections
        .iter()
        .enumerate()
        .map(|(idx, section)| (section.id.clone(), idx))
        .collect();
    let mut fallback = fallback_section();

    let entries = record
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut item_count = 0usize;
    for item in entries
        .iter()
        .filter_map(|entry| item_from_entry(entry, &index.lookup))
    {
        item_count += 1;
        let slot = item
            .category_id
            .as_ref()
            .and_then(|id| positions.get(id))
            .copied();
        match slot {
            Some(idx) => sections[idx].items.push(item),
            None => fallback.items.push(item),
        }
    }

    if !fallback.items.is_empty() {
        sections.push(fallback);
    }
    for section in &mut sections {
        section
            .items
            .sort_by(|a, b| compare_item_names(&a.name, &b.name));
    }
    sort_sections(&mut sections);

    Ok(MasterList {
        id: field(record, "id").unwrap_or_else(|| UNKNOWN_MASTER_LIST_ID.to_string()),
        name: field(record, "name").unwrap_or_else(|| DEFAULT_MASTER_LIST_NAME.to_string()),
        item_count,
        sections,
    })
}

fn inspects_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    LIST_SUFFIXES.iter().any(|suffix| lowered.ends_with(suffix))
}

/// Collects `{id, name}` records found in arrays under `*list`/`*lists` keys anywhere in
/// the overview payload, first occurrence of an id wins.
pub fn extract_shopping_lists(payload: &Value) -> Vec<ShoppingListSummary> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();
    let mut stack = vec![payload];

    while let Some(value) = stack.pop() {
        match value {
            Value::Array(items) => stack.extend(items.iter()),
            Value::Object(record) => {
                for (key, child) in record {
                    if let (true, Some(entries)) = (inspects_key(key), child.as_array()) {
                        for entry in entries.iter().filter_map(Value::as_object) {
                            let (Some(id), Some(name)) = (field(entry, "id"), field(entry, "name"))
                            else {
                                continue;
                            };
                            if seen.insert(id.clone()) {
                                results.push(ShoppingListSummary { id, name });
                            }
                        }
                    }
                    stack.push(child);
                }
            }
            _ => {}
        }
    }

    results
}
