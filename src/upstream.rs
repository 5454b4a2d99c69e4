//! Capability surface of the upstream list service.
//!
//! The engine never talks HTTP directly; it only sees an authenticated [`UpstreamClient`]
//! handed out by a [`Connector`]. Payloads stay raw JSON until the projector normalizes them.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream session is no longer authorized")]
    Unauthorized,
    #[error("{0}")]
    Rejected(String),
    #[error("upstream request failed: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("OurGroceries login failed.")]
    InvalidCredentials,
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn read_lists(&self) -> Result<Value, UpstreamError>;

    async fn read_categories(&self) -> Result<Value, UpstreamError>;

    async fn read_master_list(&self) -> Result<Value, UpstreamError>;

    /// Rewrites an item in place; `category_id == None` moves it to the fallback category.
    async fn mutate_item(
        &self,
        list_id: &str,
        item_id: &str,
        category_id: Option<&str>,
        new_value: &str,
    ) -> Result<(), UpstreamError>;

    async fn remove_item(&self, list_id: &str, item_id: &str) -> Result<(), UpstreamError>;

    async fn create_category(&self, name: &str) -> Result<(), UpstreamError>;

    async fn run_command(&self, name: &str, payload: Value) -> Result<Value, UpstreamError>;
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Client: UpstreamClient + 'static;

    async fn login(&self, email: &str, password: &str) -> Result<Self::Client, LoginError>;
}

#[cfg(test)]
pub mod fake {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{Connector, LoginError, UpstreamClient, UpstreamError};

    pub const MASTER_LIST_ID: &str = "master-1";
    pub const CATEGORY_LIST_ID: &str = "categories-1";

    #[derive(Default)]
    pub struct FakeState {
        pub categories: Vec<Value>,
        pub items: Vec<Value>,
        pub failing_items: HashSet<String>,
        pub fail_commands: bool,
        pub calls: Vec<String>,
    }

    /// In-memory stand-in for the list service, shared between clients of one connector.
    #[derive(Clone, Default)]
    pub struct FakeUpstream {
        pub state: Arc<Mutex<FakeState>>,
    }

    impl FakeUpstream {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_category(self, id: &str, name: &str, sort_order: Option<&str>) -> Self {
            {
                let mut state = self.state.lock().expect("fake state");
                let mut entry = json!({ "id": id, "value": name });
                if let Some(sort_order) = sort_order {
                    entry["sortOrder"] = json!(sort_order);
                }
                state.categories.push(entry);
            }
            self
        }

        pub fn with_item(self, id: &str, name: &str, category_id: Option<&str>) -> Self {
            {
                let mut state = self.state.lock().expect("fake state");
                let mut entry = json!({ "id": id, "value": name, "crossedOff": false });
                if let Some(category_id) = category_id {
                    entry["categoryId"] = json!(category_id);
                }
                state.items.push(entry);
            }
            self
        }

        pub fn fail_item(&self, item_id: &str) {
            let mut state = self.state.lock().expect("fake state");
            state.failing_items.insert(item_id.to_string());
        }

        pub fn heal_items(&self) {
            self.state.lock().expect("fake state").failing_items.clear();
        }

        pub fn fail_commands(&self) {
            self.state.lock().expect("fake state").fail_commands = true;
        }

        pub fn calls(&self) -> Vec<String> {
            self.state.lock().expect("fake state").calls.clone()
        }

        pub fn item_category(&self, item_id: &str) -> Option<String> {
            let state = self.state.lock().expect("fake state");
            state
                .items
                .iter()
                .find(|item| item["id"] == item_id)
                .and_then(|item| item["categoryId"].as_str().map(str::to_string))
        }

        fn record(&self, call: String) {
            self.state.lock().expect("fake state").calls.push(call);
        }

        fn check_item(&self, item_id: &str) -> Result<(), UpstreamError> {
            let state = self.state.lock().expect("fake state");
            if state.failing_items.contains(item_id) {
                return Err(UpstreamError::Rejected(format!("cannot change {item_id}")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl UpstreamClient for FakeUpstream {
        async fn read_lists(&self) -> Result<Value, UpstreamError> {
            Ok(json!({
                "shoppingLists": [
                    { "id": "list-a", "name": "Groceries" },
                    { "id": "list-b", "name": "Hardware" }
                ]
            }))
        }

        async fn read_categories(&self) -> Result<Value, UpstreamError> {
            let state = self.state.lock().expect("fake state");
            Ok(json!({ "list": { "id": CATEGORY_LIST_ID, "items": state.categories.clone() } }))
        }

        async fn read_master_list(&self) -> Result<Value, UpstreamError> {
            let state = self.state.lock().expect("fake state");
            Ok(json!({
                "list": { "id": MASTER_LIST_ID, "name": "Master", "items": state.items.clone() }
            }))
        }

        async fn mutate_item(
            &self,
            list_id: &str,
            item_id: &str,
            category_id: Option<&str>,
            new_value: &str,
        ) -> Result<(), UpstreamError> {
            self.record(format!(
                "mutate {list_id} {item_id} {} {new_value}",
                category_id.unwrap_or("-")
            ));
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.check_item(item_id)?;
            let mut state = self.state.lock().expect("fake state");
            let target = if list_id == CATEGORY_LIST_ID {
                &mut state.categories
            } else {
                &mut state.items
            };
            let entry = target
                .iter_mut()
                .find(|entry| entry["id"] == item_id)
                .ok_or_else(|| UpstreamError::Rejected(format!("unknown item {item_id}")))?;
            entry["value"] = json!(new_value);
            if list_id != CATEGORY_LIST_ID {
                match category_id {
                    Some(category_id) => entry["categoryId"] = json!(category_id),
                    None => {
                        if let Some(map) = entry.as_object_mut() {
                            map.remove("categoryId");
                        }
                    }
                }
            }
            Ok(())
        }

        async fn remove_item(&self, list_id: &str, item_id: &str) -> Result<(), UpstreamError> {
            self.record(format!("remove {list_id} {item_id}"));
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.check_item(item_id)?;
            let mut state = self.state.lock().expect("fake state");
            if list_id == CATEGORY_LIST_ID {
                state.categories.retain(|entry| entry["id"] != item_id);
            } else {
                state.items.retain(|entry| entry["id"] != item_id);
            }
            Ok(())
        }

        async fn create_category(&self, name: &str) -> Result<(), UpstreamError> {
            self.record(format!("create {name}"));
            let mut state = self.state.lock().expect("fake state");
            let id = format!("cat-{}", state.categories.len() + 1);
            state.categories.push(json!({ "id": id, "value": name }));
            Ok(())
        }

        async fn run_command(&self, name: &str, payload: Value) -> Result<Value, UpstreamError> {
            self.record(format!("command {name} {payload}"));
            let mut state = self.state.lock().expect("fake state");
            if state.fail_commands {
                return Err(UpstreamError::Rejected("reorder rejected".to_string()));
            }
            let item_id = payload["itemId"].as_str().unwrap_or_default().to_string();
            let next_id = payload["nextItemId"].as_str().map(str::to_string);
            let position = state
                .categories
                .iter()
                .position(|entry| entry["id"] == item_id.as_str())
                .ok_or_else(|| UpstreamError::Rejected("unknown category".to_string()))?;
            let moving = state.categories.remove(position);
            let insert_at = next_id
                .and_then(|next| {
                    state
                        .categories
                        .iter()
                        .position(|entry| entry["id"] == next.as_str())
                })
                .unwrap_or(state.categories.len());
            state.categories.insert(insert_at, moving);
            for (idx, entry) in state.categories.iter_mut().enumerate() {
                entry["sortOrder"] = json!(format!("{idx:04}"));
            }
            Ok(json!({}))
        }
    }

    /// Connector that counts logins and accepts a single password.
    pub struct FakeConnector {
        pub upstream: FakeUpstream,
        pub password: String,
        pub delay: Duration,
        pub logins: AtomicUsize,
    }

    impl FakeConnector {
        pub fn new(upstream: FakeUpstream, password: &str) -> Self {
            Self {
                upstream,
                password: password.to_string(),
                delay: Duration::from_millis(20),
                logins: AtomicUsize::new(0),
            }
        }

        pub fn login_count(&self) -> usize {
            self.logins.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Client = FakeUpstream;

        async fn login(&self, _email: &str, password: &str) -> Result<FakeUpstream, LoginError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if password != self.password {
                return Err(LoginError::InvalidCredentials);
            }
            Ok(self.upstream.clone())
        }
    }
}
