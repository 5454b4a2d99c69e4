//! HTTP client for the OurGroceries web endpoints.
//!
//! Login is a form post that leaves an auth cookie in the client's jar. The list page embeds
//! the team id and the static metalist (master and category list ids) in inline script, and
//! every other operation is a JSON command posted back to that page.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::upstream::{Connector, LoginError, UpstreamClient, UpstreamError};

pub const DEFAULT_BASE_URL: &str = "https://www.ourgroceries.com";
const SIGN_IN_PATH: &str = "/sign-in";
const LISTS_PATH: &str = "/your-lists/";
const AUTH_COOKIE: &str = "ourgroceries-auth";
const MASTER_LIST_TYPE: &str = "MASTER";
const CATEGORY_LIST_TYPE: &str = "CATEGORY";

const TEAM_ID_PATTERN: &str = r#"g_teamId = "(.*?)";"#;
const METALIST_PATTERN: &str = r"g_staticMetalist = (\[.*?\]);";

fn transport(err: impl std::fmt::Display) -> UpstreamError {
    UpstreamError::Transport(err.to_string())
}

fn login_failure(err: impl std::fmt::Display) -> LoginError {
    LoginError::Failed(format!("OurGroceries login request failed: {err}"))
}

/// Logs in against a base URL; each login gets its own cookie jar.
#[derive(Clone, Debug)]
pub struct OurGroceriesConnector {
    base_url: Url,
    timeout: Duration,
}

impl OurGroceriesConnector {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            timeout,
        })
    }
}

pub struct OurGroceriesClient {
    http: Client,
    lists_url: Url,
    team_id: String,
    master_list_id: Option<String>,
    category_list_id: Option<String>,
}

struct ListPageIds {
    team_id: String,
    master_list_id: Option<String>,
    category_list_id: Option<String>,
}

fn capture(pattern: &str, page: &str) -> Option<String> {
    let regex = Regex::new(pattern).ok()?;
    regex
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|found| found.as_str().to_string())
}

fn parse_list_page(page: &str) -> Result<ListPageIds, LoginError> {
    let team_id = capture(TEAM_ID_PATTERN, page)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| LoginError::Failed("OurGroceries team id not found.".to_string()))?;

    let metalist: Vec<Value> = capture(METALIST_PATTERN, page)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    let list_id_of = |list_type: &str| {
        metalist
            .iter()
            .find(|entry| entry["listType"] == list_type)
            .and_then(|entry| entry["id"].as_str())
            .map(str::to_string)
    };

    Ok(ListPageIds {
        master_list_id: list_id_of(MASTER_LIST_TYPE),
        category_list_id: list_id_of(CATEGORY_LIST_TYPE),
        team_id,
    })
}

#[async_trait]
impl Connector for OurGroceriesConnector {
    type Client = OurGroceriesClient;

    async fn login(&self, email: &str, password: &str) -> Result<OurGroceriesClient, LoginError> {
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(self.timeout)
            .build()
            .map_err(login_failure)?;

        let sign_in = self.base_url.join(SIGN_IN_PATH).map_err(login_failure)?;
        let form = [
            ("emailAddress", email),
            ("password", password),
            ("action", "sign-me-in"),
        ];
        http.post(sign_in)
            .form(&form)
            .send()
            .await
            .map_err(login_failure)?;

        let authenticated = jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().map(|text| text.contains(AUTH_COOKIE)).ok())
            .unwrap_or(false);
        if !authenticated {
            return Err(LoginError::InvalidCredentials);
        }

        let lists_url = self.base_url.join(LISTS_PATH).map_err(login_failure)?;
        let page = http
            .get(lists_url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(login_failure)?
            .text()
            .await
            .map_err(login_failure)?;
        let ids = parse_list_page(&page)?;
        debug!(
            master = ids.master_list_id.is_some(),
            categories = ids.category_list_id.is_some(),
            "resolved list page identifiers"
        );

        Ok(OurGroceriesClient {
            http,
            lists_url,
            team_id: ids.team_id,
            master_list_id: ids.master_list_id,
            category_list_id: ids.category_list_id,
        })
    }
}

impl OurGroceriesClient {
    async fn post_command(&self, command: &str, fields: Value) -> Result<Value, UpstreamError> {
        let mut body = Map::new();
        body.insert("command".to_string(), json!(command));
        body.insert("teamId".to_string(), json!(self.team_id));
        if let Value::Object(extra) = fields {
            body.extend(extra);
        }

        let response = self
            .http
            .post(self.lists_url.clone())
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            || response.url().path().starts_with(SIGN_IN_PATH)
        {
            warn!(command, "upstream rejected session");
            return Err(UpstreamError::Unauthorized);
        }
        if !status.is_success() {
            return Err(UpstreamError::Rejected(format!(
                "{command} failed with status {status}"
            )));
        }

        let text = response.text().await.map_err(transport)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(transport)
    }

    async fn get_list(&self, list_id: Option<&str>) -> Result<Value, UpstreamError> {
        let list_id = list_id
            .ok_or_else(|| UpstreamError::Rejected("List identifier not available.".to_string()))?;
        self.post_command("getList", json!({ "listId": list_id }))
            .await
    }
}

#[async_trait]
impl UpstreamClient for OurGroceriesClient {
    async fn read_lists(&self) -> Result<Value, UpstreamError> {
        self.post_command("getOverview", json!({})).await
    }

    async fn read_categories(&self) -> Result<Value, UpstreamError> {
        self.get_list(self.category_list_id.as_deref()).await
    }

    async fn read_master_list(&self) -> Result<Value, UpstreamError> {
        self.get_list(self.master_list_id.as_deref()).await
    }

    async fn mutate_item(
        &self,
        list_id: &str,
        item_id: &str,
        category_id: Option<&str>,
        new_value: &str,
    ) -> Result<(), UpstreamError> {
        self.post_command(
            "changeItemValue",
            json!({
                "listId": list_id,
                "itemId": item_id,
                "newValue": new_value,
                "categoryId": category_id,
            }),
        )
        .await?;
        Ok(())
    }

    async fn remove_item(&self, list_id: &str, item_id: &str) -> Result<(), UpstreamError> {
        self.post_command("deleteItem", json!({ "listId": list_id, "itemId": item_id }))
            .await?;
        Ok(())
    }

    async fn create_category(&self, name: &str) -> Result<(), UpstreamError> {
        let list_id = self.category_list_id.as_deref().ok_or_else(|| {
            UpstreamError::Rejected("Category list identifier not available.".to_string())
        })?;
        self.post_command("insertItem", json!({ "listId": list_id, "value": name }))
            .await?;
        Ok(())
    }

    async fn run_command(&self, name: &str, payload: Value) -> Result<Value, UpstreamError> {
        self.post_command(name, payload).await
    }
}
