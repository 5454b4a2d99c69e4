use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;
use crate::model::{
    ApplyStep, ApplyStepKind, DeleteItemsInput, MasterList, MoveItemInput, MoveItemsInput,
    ReorderCategoriesInput,
};
use crate::service::MasterService;
use crate::upstream::Connector;

/// What the client context needs from the server side, bound to one session.
#[async_trait]
pub trait MasterApi: Send + Sync {
    async fn fetch_master_list(&self) -> Result<MasterList, AppError>;

    /// Commits one staged change. A returned list is the post-mutation authoritative state.
    async fn apply_step(
        &self,
        list_id: &str,
        step: &ApplyStep,
    ) -> Result<Option<MasterList>, AppError>;

    /// Places `item_id` before `next_item_id`, or last when it is `None`.
    async fn reorder_category(
        &self,
        item_id: &str,
        next_item_id: Option<&str>,
    ) -> Result<Option<MasterList>, AppError>;
}

pub struct SessionApi<C: Connector> {
    service: Arc<MasterService<C>>,
    session_id: String,
}

impl<C: Connector> SessionApi<C> {
    pub fn new(service: Arc<MasterService<C>>, session_id: impl Into<String>) -> Self {
        Self {
            service,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl<C: Connector> MasterApi for SessionApi<C> {
    async fn fetch_master_list(&self) -> Result<MasterList, AppError> {
        self.service.master_list(&self.session_id).await
    }

    async fn apply_step(
        &self,
        list_id: &str,
        step: &ApplyStep,
    ) -> Result<Option<MasterList>, AppError> {
        let list = match step.kind {
            ApplyStepKind::Move => {
                let input = MoveItemsInput {
                    list_id: list_id.to_string(),
                    items: vec![MoveItemInput {
                        item_id: step.item_id.clone(),
                        item_name: step.item_name.clone(),
                    }],
                    target_category_id: step.target_category_id.clone(),
                };
                self.service.move_items(&self.session_id, input).await?
            }
            ApplyStepKind::Delete => {
                let input = DeleteItemsInput {
                    list_id: list_id.to_string(),
                    item_ids: vec![step.item_id.clone()],
                };
                self.service.delete_items(&self.session_id, input).await?
            }
        };
        Ok(Some(list))
    }

    async fn reorder_category(
        &self,
        item_id: &str,
        next_item_id: Option<&str>,
    ) -> Result<Option<MasterList>, AppError> {
        let input = ReorderCategoriesInput {
            item_id: item_id.to_string(),
            next_item_id: next_item_id.map(str::to_string),
        };
        let list = self
            .service
            .reorder_categories(&self.session_id, input)
            .await?;
        Ok(Some(list))
    }
}
