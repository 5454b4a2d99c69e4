//! Batched commit of staged changes with per-step outcomes.
//!
//! Steps run in fixed-size batches. Every step of a batch is dispatched at once and the
//! next batch starts only after all of them settled. Completions are applied in arrival
//! order, so a step's status never depends on its neighbours.

use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use crate::api::MasterApi;
use crate::model::{ApplyStep, ApplyStepKind, ApplyStepStatus, ApplySummary, MasterList};
use crate::pending::PendingChangeStore;

pub const BATCH_SIZE: usize = 5;
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;
pub const APPLY_SUCCESS_MESSAGE: &str = "Changes applied successfully.";
pub const APPLY_FAILURE_MESSAGE: &str = "Some changes failed. Review and try again.";
pub const STEP_FAILURE_FALLBACK: &str = "Request failed";
pub const STEP_TIMEOUT_MESSAGE: &str = "Request timed out";

/// Snapshot of the staged changes as an ordered step list: moves first, then deletes.
pub fn prepare_steps(pending: &PendingChangeStore) -> Vec<ApplyStep> {
    pending
        .moves()
        .map(ApplyStep::for_move)
        .chain(pending.deletes().map(ApplyStep::for_delete))
        .collect()
}

/// Progress view state for one prepare/commit cycle.
#[derive(Clone, Debug, Default)]
pub struct ApplyProgress {
    pub steps: Vec<ApplyStep>,
    pub open: bool,
    pub applying: bool,
}

impl ApplyProgress {
    pub fn open_with(&mut self, steps: Vec<ApplyStep>) {
        self.open = !steps.is_empty();
        self.steps = steps;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.steps.clear();
    }

    /// Drops a step before commit; the view closes once no steps remain.
    pub fn remove_step(&mut self, key: &str) -> Option<ApplyStep> {
        let position = self.steps.iter().position(|step| step.key == key)?;
        let removed = self.steps.remove(position);
        if self.steps.is_empty() {
            self.open = false;
        }
        Some(removed)
    }
}

/// Status change reported while a commit runs.
#[derive(Debug)]
pub enum StepEvent<'a> {
    /// The step was marked running and handed to the API.
    Dispatched(&'a ApplyStep),
    /// The step settled; carries the fresh list a successful mutation returned.
    Settled(&'a ApplyStep, Option<MasterList>),
}

#[derive(Clone, Debug)]
pub struct BatchApplyEngine {
    batch_size: usize,
    step_timeout: Duration,
}

impl Default for BatchApplyEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS))
    }
}

impl BatchApplyEngine {
    pub fn new(step_timeout: Duration) -> Self {
        Self {
            batch_size: BATCH_SIZE,
            step_timeout,
        }
    }

    /// Runs every step against `api`, updating statuses in place.
    ///
    /// `on_event` sees every step of a batch as it is dispatched, before any of them settles,
    /// and again right after it settles.
    pub async fn run<A, F>(
        &self,
        api: &A,
        list_id: &str,
        steps: &mut [ApplyStep],
        mut on_event: F,
    ) -> ApplySummary
    where
        A: MasterApi + ?Sized,
        F: FnMut(StepEvent<'_>),
    {
        let mut summary = ApplySummary::default();
        let total = steps.len();
        let mut start = 0;

        while start < total {
            let end = (start + self.batch_size).min(total);
            debug!(start, end, total, "dispatching apply batch");

            let mut in_flight = FuturesUnordered::new();
            for (idx, step) in steps.iter_mut().enumerate().take(end).skip(start) {
                step.status = ApplyStepStatus::Running;
                step.error_message = None;
                on_event(StepEvent::Dispatched(step));
                let snapshot = step.clone();
                let timeout = self.step_timeout;
                in_flight.push(async move {
                    let outcome =
                        tokio::time::timeout(timeout, api.apply_step(list_id, &snapshot)).await;
                    (idx, outcome)
                });
            }

            while let Some((idx, outcome)) = in_flight.next().await {
                let step = &mut steps[idx];
                let fresh = match outcome {
                    Ok(Ok(list)) => {
                        step.status = ApplyStepStatus::Success;
                        summary.succeeded += 1;
                        list
                    }
                    Ok(Err(err)) => {
                        if err.is_auth() {
                            warn!(step = %step.key, error = %err, "apply step lost authorization");
                        } else {
                            warn!(
                                step = %step.key,
                                kind = step.kind.as_str(),
                                error = %err,
                                "apply step failed"
                            );
                        }
                        let message = err.user_message();
                        step.status = ApplyStepStatus::Error;
                        step.error_message = Some(if message.trim().is_empty() {
                            STEP_FAILURE_FALLBACK.to_string()
                        } else {
                            message
                        });
                        summary.failed += 1;
                        None
                    }
                    Err(_) => {
                        warn!(
                            step = %step.key,
                            timeout_secs = self.step_timeout.as_secs(),
                            "apply step timed out"
                        );
                        step.status = ApplyStepStatus::Error;
                        step.error_message = Some(STEP_TIMEOUT_MESSAGE.to_string());
                        summary.failed += 1;
                        None
                    }
                };
                on_event(StepEvent::Settled(step, fresh));
            }

            start = end;
        }

        summary
    }
}

/// Removes the staged entries whose steps succeeded; failed entries stay staged.
pub fn prune_succeeded(pending: &mut PendingChangeStore, steps: &[ApplyStep]) -> usize {
    let mut pruned = 0;
    for step in steps
        .iter()
        .filter(|step| step.status == ApplyStepStatus::Success)
    {
        let removed = match step.kind {
            ApplyStepKind::Move => pending.remove_move(&step.item_id),
            ApplyStepKind::Delete => pending.remove_delete(&step.item_id),
        };
        if removed {
            pruned += 1;
        }
    }
    pruned
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::model::{PendingDeleteEntry, PendingMoveEntry};
    use crate::pending::tests::{item, master, section};

    /// Scripted API: each call takes a little while, tracks concurrency and fails on demand.
    #[derive(Default)]
    struct ScriptedApi {
        failing: HashSet<String>,
        stalled: HashSet<String>,
        active: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl ScriptedApi {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|id| id.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MasterApi for ScriptedApi {
        async fn fetch_master_list(&self) -> Result<MasterList, AppError> {
            Ok(master(Vec::new()))
        }

        async fn apply_step(
            &self,
            _list_id: &str,
            step: &ApplyStep,
        ) -> Result<Option<MasterList>, AppError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().expect("order").push(step.item_id.clone());
            if self.stalled.contains(&step.item_id) {
                futures::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(&step.item_id) {
                return Err(AppError::Upstream(format!("boom {}", step.item_id)));
            }
            if step.item_id == "blank" {
                return Err(AppError::Upstream(String::new()));
            }
            Ok(Some(master(vec![section(
                "a",
                "A",
                None,
                vec![item(&step.item_id, "done", Some("a"))],
            )])))
        }

        async fn reorder_category(
            &self,
            _item_id: &str,
            _next_item_id: Option<&str>,
        ) -> Result<Option<MasterList>, AppError> {
            Ok(None)
        }
    }

    fn delete_steps(count: usize) -> Vec<ApplyStep> {
        (0..count)
            .map(|idx| {
                ApplyStep::for_delete(&PendingDeleteEntry {
                    item_id: format!("item-{idx}"),
                    item_name: format!("Item {idx}"),
                })
            })
            .collect()
    }

    #[test]
    fn prepare_orders_moves_before_deletes() {
        let list = master(vec![
            section("a", "A", None, vec![item("m", "Milk", Some("a"))]),
            section("b", "B", None, vec![item("d", "Dough", Some("b"))]),
        ]);
        let mut pending = PendingChangeStore::new();
        pending.toggle_delete(list.find_item("d").expect("d"));
        pending.toggle_move(list.find_item("m").expect("m"), "b", &list);

        let steps = prepare_steps(&pending);
        let keys: Vec<_> = steps.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["move-m", "delete-d"]);
        assert!(steps.iter().all(|s| s.status == ApplyStepStatus::Pending));
    }

    #[tokio::test]
    async fn failures_are_isolated_and_batches_are_bounded() {
        let api = ScriptedApi::failing(&["item-3", "item-7"]);
        let mut steps = delete_steps(12);
        let mut settled = 0;
        let mut adopted = 0;
        let summary = BatchApplyEngine::default()
            .run(&api, "list", &mut steps, |event| {
                if let StepEvent::Settled(step, fresh) = event {
                    assert!(matches!(
                        step.status,
                        ApplyStepStatus::Success | ApplyStepStatus::Error
                    ));
                    settled += 1;
                    if fresh.is_some() {
                        adopted += 1;
                    }
                }
            })
            .await;

        assert_eq!(summary, ApplySummary { succeeded: 10, failed: 2 });
        assert_eq!(settled, 12);
        assert_eq!(adopted, 10);
        assert!(api.peak.load(Ordering::SeqCst) <= BATCH_SIZE);
        let failed: Vec<_> = steps
            .iter()
            .filter(|s| s.status == ApplyStepStatus::Error)
            .map(|s| (s.item_id.as_str(), s.error_message.as_deref()))
            .collect();
        assert_eq!(
            failed,
            vec![("item-3", Some("boom item-3")), ("item-7", Some("boom item-7"))]
        );
    }

    #[tokio::test]
    async fn whole_batch_is_running_before_any_step_settles() {
        let api = ScriptedApi::default();
        let mut steps = delete_steps(7);
        let mut events = Vec::new();
        BatchApplyEngine::default()
            .run(&api, "list", &mut steps, |event| match event {
                StepEvent::Dispatched(step) => {
                    assert_eq!(step.status, ApplyStepStatus::Running);
                    assert_eq!(step.error_message, None);
                    events.push(format!("run {}", step.item_id));
                }
                StepEvent::Settled(step, _) => {
                    assert_eq!(step.status, ApplyStepStatus::Success);
                    events.push(format!("done {}", step.item_id));
                }
            })
            .await;

        assert_eq!(events.len(), 14);
        let first_batch: Vec<_> = (0..BATCH_SIZE).map(|idx| format!("run item-{idx}")).collect();
        assert_eq!(events[..BATCH_SIZE], first_batch[..]);
        let settled_first: HashSet<_> = events[BATCH_SIZE..2 * BATCH_SIZE].iter().cloned().collect();
        let expected: HashSet<_> = (0..BATCH_SIZE).map(|idx| format!("done item-{idx}")).collect();
        assert_eq!(settled_first, expected);
        assert_eq!(
            events[2 * BATCH_SIZE..2 * BATCH_SIZE + 2],
            ["run item-5".to_string(), "run item-6".to_string()]
        );
    }

    #[tokio::test]
    async fn batches_run_strictly_in_sequence() {
        let api = ScriptedApi::default();
        let mut steps = delete_steps(11);
        BatchApplyEngine::default()
            .run(&api, "list", &mut steps, |_| {})
            .await;

        let order = api.order.lock().expect("order").clone();
        let batch_of = |id: &str| {
            let idx: usize = id.trim_start_matches("item-").parse().expect("index");
            idx / BATCH_SIZE
        };
        let batches: Vec<_> = order.iter().map(|id| batch_of(id)).collect();
        let mut sorted = batches.clone();
        sorted.sort();
        assert_eq!(batches, sorted);
    }

    #[tokio::test]
    async fn blank_errors_use_generic_message() {
        let api = ScriptedApi::default();
        let mut steps = vec![ApplyStep::for_delete(&PendingDeleteEntry {
            item_id: "blank".to_string(),
            item_name: "Blank".to_string(),
        })];
        BatchApplyEngine::default()
            .run(&api, "list", &mut steps, |_| {})
            .await;
        assert_eq!(steps[0].error_message.as_deref(), Some(STEP_FAILURE_FALLBACK));
    }

    #[tokio::test]
    async fn stalled_step_times_out_without_blocking_the_rest() {
        let api = ScriptedApi {
            stalled: ["item-1".to_string()].into_iter().collect(),
            ..ScriptedApi::default()
        };
        let mut steps = delete_steps(7);
        let summary = BatchApplyEngine::new(Duration::from_millis(100))
            .run(&api, "list", &mut steps, |_| {})
            .await;
        assert_eq!(summary, ApplySummary { succeeded: 6, failed: 1 });
        assert_eq!(steps[1].error_message.as_deref(), Some(STEP_TIMEOUT_MESSAGE));
        assert_eq!(steps[6].status, ApplyStepStatus::Success);
    }

    #[test]
    fn pruning_keeps_failed_entries() {
        let list = master(vec![section(
            "a",
            "A",
            None,
            vec![item("x", "X", Some("a")), item("y", "Y", Some("a"))],
        )]);
        let mut pending = PendingChangeStore::new();
        pending.toggle_move(list.find_item("x").expect("x"), "b", &list);
        pending.toggle_delete(list.find_item("y").expect("y"));

        let mut steps = prepare_steps(&pending);
        steps[0].status = ApplyStepStatus::Success;
        steps[1].status = ApplyStepStatus::Error;
        assert_eq!(steps[0].kind, ApplyStepKind::Move);

        assert_eq!(prune_succeeded(&mut pending, &steps), 1);
        assert!(pending.staged_move("x").is_none());
        assert!(pending.is_staged_for_delete("y"));
    }

    #[test]
    fn removing_last_step_closes_progress() {
        let mut progress = ApplyProgress::default();
        progress.open_with(vec![
            ApplyStep::for_move(&PendingMoveEntry {
                item_id: "x".to_string(),
                item_name: "X".to_string(),
                target_category_id: "b".to_string(),
                target_category_name: "B".to_string(),
            }),
            ApplyStep::for_delete(&PendingDeleteEntry {
                item_id: "y".to_string(),
                item_name: "Y".to_string(),
            }),
        ]);
        assert!(progress.open);
        assert!(progress.remove_step("move-x").is_some());
        assert!(progress.open);
        assert!(progress.remove_step("missing").is_none());
        assert!(progress.remove_step("delete-y").is_some());
        assert!(!progress.open);
    }
}
