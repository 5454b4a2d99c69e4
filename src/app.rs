//! Client-side context for one session: the projected master list, the staged changes,
//! the view filters and the apply progress, all owned by a single flow of control.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::api::MasterApi;
use crate::apply::{
    prepare_steps, prune_succeeded, ApplyProgress, BatchApplyEngine, StepEvent,
    APPLY_FAILURE_MESSAGE, APPLY_SUCCESS_MESSAGE,
};
use crate::error::AppError;
use crate::model::{
    normalize_category_id, ApplyStep, ApplyStepKind, ApplySummary, MasterList, Notice, Section,
    StoredPending, ViewFilters, FALLBACK_CATEGORY_NAME, UNCATEGORIZED_ID,
};
use crate::pending::{PendingChangeStore, ToggleOutcome};
use crate::reorder::{
    apply_optimistic, plan_reorder, NOT_QUIESCENT_MESSAGE, REORDER_SUCCESS_MESSAGE,
};
use crate::state::{LocalState, FILTER_STATE_KEY, PENDING_OPERATIONS_KEY};

pub const PENDING_FILTER_OFF_MESSAGE: &str = "No pending changes remaining - showing all items";
const ITEM_NOT_FOUND: &str = "Item not found.";
const CATEGORY_NOT_FOUND: &str = "Category not found.";
const NOT_LOADED: &str = "Master list has not been loaded.";
const APPLY_IN_PROGRESS: &str = "An apply is already in progress.";

pub struct App<A: MasterApi> {
    api: A,
    state: LocalState,
    engine: BatchApplyEngine,
    master: Option<MasterList>,
    pending: PendingChangeStore,
    pending_loaded: bool,
    filters: ViewFilters,
    progress: ApplyProgress,
    notices: Vec<Notice>,
}

impl<A: MasterApi> App<A> {
    pub async fn load(api: A, state: LocalState, engine: BatchApplyEngine) -> Result<Self, AppError> {
        let filters = state
            .read_json::<ViewFilters>(FILTER_STATE_KEY)
            .await?
            .unwrap_or_default();
        Ok(Self {
            api,
            state,
            engine,
            master: None,
            pending: PendingChangeStore::new(),
            pending_loaded: false,
            filters,
            progress: ApplyProgress::default(),
            notices: Vec::new(),
        })
    }

    pub fn master(&self) -> Option<&MasterList> {
        self.master.as_ref()
    }

    pub fn pending(&self) -> &PendingChangeStore {
        &self.pending
    }

    pub fn filters(&self) -> &ViewFilters {
        &self.filters
    }

    pub fn progress(&self) -> &ApplyProgress {
        &self.progress
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Staged changes as last persisted, without resolving them against a fresh list.
    pub async fn stored_pending(&self) -> Result<StoredPending, AppError> {
        Ok(self
            .state
            .read_json(PENDING_OPERATIONS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn refresh(&mut self) -> Result<(), AppError> {
        let list = self.api.fetch_master_list().await?;
        self.adopt(list).await
    }

    /// Installs an authoritative list and brings the staged changes in line with it.
    pub async fn adopt(&mut self, list: MasterList) -> Result<(), AppError> {
        if self.pending_loaded {
            if self.pending.reconcile(&list) {
                debug!("staged changes reconciled against fresh list");
                self.persist_pending().await?;
            }
        } else {
            let stored = self.stored_pending().await?;
            self.pending = PendingChangeStore::from_stored(stored.clone(), &list);
            self.pending_loaded = true;
            if self.pending.to_stored() != stored {
                self.persist_pending().await?;
            }
        }
        self.master = Some(list);
        self.sync_pending_filter().await
    }

    fn require_master(&self) -> Result<&MasterList, AppError> {
        self.master
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput(NOT_LOADED.to_string()))
    }

    pub async fn stage_move(
        &mut self,
        item_id: &str,
        target_category_id: &str,
    ) -> Result<ToggleOutcome, AppError> {
        let master = self
            .master
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput(NOT_LOADED.to_string()))?;
        let item = master
            .find_item(item_id)
            .ok_or_else(|| AppError::NotFound(ITEM_NOT_FOUND.to_string()))?
            .clone();
        let target = normalize_category_id(Some(target_category_id.trim()));
        if target != UNCATEGORIZED_ID && master.find_section(&target).is_none() {
            return Err(AppError::NotFound(CATEGORY_NOT_FOUND.to_string()));
        }

        let outcome = self.pending.toggle_move(&item, &target, master);
        match outcome {
            ToggleOutcome::AlreadyInCategory => {
                let category = master.section_name(&target).unwrap_or(FALLBACK_CATEGORY_NAME);
                self.notices
                    .push(Notice::info(format!("{} is already in {category}", item.name)));
            }
            ToggleOutcome::Staged | ToggleOutcome::Cleared => {
                self.persist_pending().await?;
                self.sync_pending_filter().await?;
            }
        }
        Ok(outcome)
    }

    pub async fn stage_delete(&mut self, item_id: &str) -> Result<ToggleOutcome, AppError> {
        let item = self
            .require_master()?
            .find_item(item_id)
            .ok_or_else(|| AppError::NotFound(ITEM_NOT_FOUND.to_string()))?
            .clone();
        let outcome = self.pending.toggle_delete(&item);
        self.persist_pending().await?;
        self.sync_pending_filter().await?;
        Ok(outcome)
    }

    pub async fn unstage(&mut self, item_id: &str) -> Result<bool, AppError> {
        self.require_master()?;
        let removed = self.pending.remove(item_id);
        if removed {
            self.persist_pending().await?;
            self.sync_pending_filter().await?;
        }
        Ok(removed)
    }

    pub async fn toggle_category_filter(&mut self, category_id: &str) -> Result<(), AppError> {
        let category_id = normalize_category_id(Some(category_id.trim()));
        if !self.filters.categories.remove(&category_id) {
            self.filters.categories.insert(category_id);
        }
        self.persist_filters().await
    }

    /// Turning pending-only on clears any category filters.
    pub async fn toggle_pending_only(&mut self) -> Result<(), AppError> {
        self.filters.pending_only = !self.filters.pending_only;
        if self.filters.pending_only {
            self.filters.categories.clear();
        }
        self.persist_filters().await?;
        self.sync_pending_filter().await
    }

    pub async fn clear_filters(&mut self) -> Result<(), AppError> {
        self.filters = ViewFilters::default();
        self.persist_filters().await
    }

    /// Sections as currently displayed under the active filters.
    pub fn visible_sections(&self) -> Vec<Section> {
        let Some(master) = &self.master else {
            return Vec::new();
        };
        master
            .sections
            .iter()
            .filter(|section| {
                self.filters.categories.is_empty() || self.filters.categories.contains(&section.id)
            })
            .filter_map(|section| {
                if !self.filters.pending_only {
                    return Some(section.clone());
                }
                let items: Vec<_> = section
                    .items
                    .iter()
                    .filter(|item| self.pending.contains(&item.id))
                    .cloned()
                    .collect();
                (!items.is_empty()).then(|| Section {
                    items,
                    ..section.clone()
                })
            })
            .collect()
    }

    /// Snapshots the staged changes into the progress view.
    pub fn prepare_apply(&mut self) -> &[ApplyStep] {
        let steps = prepare_steps(&self.pending);
        if steps.is_empty() {
            self.notices.push(Notice::info("No pending changes to apply."));
        }
        self.progress.open_with(steps);
        &self.progress.steps
    }

    /// Cancels one step before commit, unstaging its entry as well.
    pub async fn remove_step(&mut self, key: &str) -> Result<bool, AppError> {
        let Some(step) = self.progress.remove_step(key) else {
            return Ok(false);
        };
        let removed = match step.kind {
            ApplyStepKind::Move => self.pending.remove_move(&step.item_id),
            ApplyStepKind::Delete => self.pending.remove_delete(&step.item_id),
        };
        if removed {
            self.persist_pending().await?;
        }
        Ok(true)
    }

    pub async fn commit_apply(&mut self) -> Result<ApplySummary, AppError> {
        if self.progress.applying {
            return Err(AppError::InvalidInput(APPLY_IN_PROGRESS.to_string()));
        }
        // Steps come from the staged entries as they stand now; a retry after a partial
        // failure must not resend what already succeeded.
        let selected: HashSet<String> = self
            .progress
            .steps
            .iter()
            .map(|step| step.key.clone())
            .collect();
        self.progress.steps = prepare_steps(&self.pending)
            .into_iter()
            .filter(|step| selected.contains(&step.key))
            .collect();
        if self.progress.steps.is_empty() {
            self.progress.close();
            return Ok(ApplySummary::default());
        }
        let list_id = self.require_master()?.id.clone();

        self.progress.applying = true;
        let master = &mut self.master;
        let summary = self
            .engine
            .run(&self.api, &list_id, &mut self.progress.steps, |event| {
                if let StepEvent::Settled(_, Some(list)) = event {
                    *master = Some(list);
                }
            })
            .await;
        self.progress.applying = false;

        let pruned = prune_succeeded(&mut self.pending, &self.progress.steps);
        if let Some(list) = &self.master {
            self.pending.reconcile(list);
        }
        self.persist_pending().await?;
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            pruned,
            "apply finished"
        );

        if summary.failed == 0 {
            self.progress.close();
            self.notices.push(Notice::success(APPLY_SUCCESS_MESSAGE));
            self.refresh().await?;
        } else {
            self.notices.push(Notice::error(APPLY_FAILURE_MESSAGE));
        }
        Ok(summary)
    }

    pub fn can_reorder(&self) -> bool {
        self.master.is_some()
            && !self.filters.is_active()
            && self.pending.is_empty()
            && !self.progress.applying
    }

    /// Drops `source_id` onto `target_id`. Returns whether the upstream accepted the move.
    pub async fn reorder_categories(
        &mut self,
        source_id: &str,
        target_id: &str,
    ) -> Result<bool, AppError> {
        if !self.can_reorder() {
            self.notices.push(Notice::error(NOT_QUIESCENT_MESSAGE));
            return Ok(false);
        }
        let master = self.require_master()?;
        let plan = match plan_reorder(&master.sections, source_id, target_id) {
            Ok(Some(plan)) => plan,
            Ok(None) => return Ok(false),
            Err(rejection) => {
                self.notices.push(Notice::error(rejection.message()));
                return Ok(false);
            }
        };

        if let Some(master) = self.master.as_mut() {
            apply_optimistic(&mut master.sections, &plan);
        }

        match self
            .api
            .reorder_category(&plan.source_id, plan.next_item_id.as_deref())
            .await
        {
            Ok(fresh) => {
                if let Some(list) = fresh {
                    self.adopt(list).await?;
                }
                self.notices.push(Notice::success(REORDER_SUCCESS_MESSAGE));
                Ok(true)
            }
            Err(err) => {
                self.notices
                    .push(Notice::error(format!("Error: {}", err.user_message())));
                self.refresh().await?;
                Ok(false)
            }
        }
    }

    async fn sync_pending_filter(&mut self) -> Result<(), AppError> {
        if self.pending_loaded && self.filters.pending_only && self.pending.is_empty() {
            self.filters.pending_only = false;
            self.persist_filters().await?;
            self.notices.push(Notice::info(PENDING_FILTER_OFF_MESSAGE));
        }
        Ok(())
    }

    async fn persist_pending(&self) -> Result<(), AppError> {
        self.state
            .write_json(PENDING_OPERATIONS_KEY, &self.pending.to_stored())
            .await
    }

    async fn persist_filters(&self) -> Result<(), AppError> {
        self.state.write_json(FILTER_STATE_KEY, &self.filters).await
    }
}
