use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::entities::{local_state, session};
use crate::error::AppError;
use crate::session::SessionRecord;

pub const PENDING_OPERATIONS_KEY: &str = "master-pending-operations";
pub const FILTER_STATE_KEY: &str = "master-filter-state";
pub const CURRENT_SESSION_KEY: &str = "current-session";

/// Durable client-local state: JSON documents under fixed keys plus session records.
#[derive(Clone)]
pub struct LocalState {
    db: DatabaseConnection,
}

impl LocalState {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Reads a stored document. Unreadable documents are logged and treated as absent.
    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let Some(row) = local_state::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        match serde_json::from_str(&row.value) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, error = %err, "ignoring unreadable stored state");
                Ok(None)
            }
        }
    }

    pub async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let active = local_state::ActiveModel {
            key: Set(key.to_string()),
            value: Set(serde_json::to_string(value)?),
            updated_at: Set(Utc::now()),
        };
        local_state::Entity::insert(active)
            .on_conflict(
                OnConflict::column(local_state::Column::Key)
                    .update_columns([local_state::Column::Value, local_state::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), AppError> {
        local_state::Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn save_session(&self, record: &SessionRecord) -> Result<(), AppError> {
        let active = session::ActiveModel {
            id: Set(record.id.clone()),
            email: Set(record.email.clone()),
            password: Set(record.password.clone()),
            expires_at: Set(record.expires_at),
            created_at: Set(Utc::now()),
        };
        session::Entity::insert(active)
            .on_conflict(
                OnConflict::column(session::Column::Id)
                    .update_columns([session::Column::ExpiresAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn load_session(&self, id: &str) -> Result<Option<SessionRecord>, AppError> {
        let row = session::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        Ok(row.map(|row| SessionRecord {
            id: row.id,
            email: row.email,
            password: row.password,
            expires_at: row.expires_at,
        }))
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), AppError> {
        session::Entity::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64, AppError> {
        let result = session::Entity::delete_many()
            .filter(session::Column::ExpiresAt.lte(Utc::now()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::db;
    use crate::model::ViewFilters;
    use chrono::Duration;
    use tempfile::TempDir;

    pub async fn setup_state() -> (TempDir, LocalState) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = db::resolve_db_path(dir.path());
        db::ensure_parent_dir(&db_path).expect("ensure parent");
        let db = db::connect(&db_path).await.expect("connect db");
        db::ensure_schema(&db).await.expect("ensure schema");
        (dir, LocalState::new(db))
    }

    #[tokio::test]
    async fn json_documents_round_trip_and_overwrite() {
        let (_dir, state) = setup_state().await;
        assert_eq!(state.read_json::<ViewFilters>(FILTER_STATE_KEY).await.expect("read"), None);

        let mut filters = ViewFilters::default();
        filters.categories.insert("a".to_string());
        state.write_json(FILTER_STATE_KEY, &filters).await.expect("write");
        filters.pending_only = true;
        state.write_json(FILTER_STATE_KEY, &filters).await.expect("overwrite");

        let stored: ViewFilters = state
            .read_json(FILTER_STATE_KEY)
            .await
            .expect("read")
            .expect("present");
        assert_eq!(stored, filters);

        state.remove(FILTER_STATE_KEY).await.expect("remove");
        assert_eq!(state.read_json::<ViewFilters>(FILTER_STATE_KEY).await.expect("read"), None);
    }

    #[tokio::test]
    async fn unreadable_documents_are_treated_as_absent() {
        let (_dir, state) = setup_state().await;
        state.write_json(FILTER_STATE_KEY, &"not filters").await.expect("write");
        assert_eq!(state.read_json::<ViewFilters>(FILTER_STATE_KEY).await.expect("read"), None);
    }

    #[tokio::test]
    async fn sessions_persist_and_expire() {
        let (_dir, state) = setup_state().await;
        let live = SessionRecord {
            id: "live".to_string(),
            email: "a@example.com".to_string(),
            password: "pw".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let stale = SessionRecord {
            id: "stale".to_string(),
            expires_at: Utc::now() - Duration::hours(1),
            ..live.clone()
        };
        state.save_session(&live).await.expect("save live");
        state.save_session(&stale).await.expect("save stale");

        assert_eq!(state.purge_expired_sessions().await.expect("purge"), 1);
        let loaded = state.load_session("live").await.expect("load").expect("present");
        assert_eq!(loaded.email, live.email);
        assert!(state.load_session("stale").await.expect("load").is_none());

        state.delete_session("live").await.expect("delete");
        assert!(state.load_session("live").await.expect("load").is_none());
    }
}
