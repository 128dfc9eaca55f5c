//! Turn advancement.
//!
//! Runs under the instance advisory lock, so two advancements of one instance
//! never overlap. The whole step is one transaction: abandon what is
//! outstanding, apply processed sheets in `(account_id, turn_sheet_id)` order,
//! resolve the end-of-turn rules, bump the turn and issue the next sheets.

use std::sync::Arc;

use playbymail_domain::{
    world::{apply_location_choice, resolve_end_of_turn, MoveOutcome},
    CharacterInstanceId, DomainError, GameInstanceId, InstanceStatus, LocationChoiceAnswer,
    ProcessingStatus, SheetType, TurnAdvance, TurnSheet, TurnSheetId,
};

use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::ports::{ClockPort, JobQueuePort, RepoError, Store};
use crate::use_cases::context::RequestContext;
use crate::use_cases::error::{repo_reason, ErrorKind};
use crate::use_cases::jobs::enqueue_renders;
use crate::use_cases::sheets::{issue_turn_sheets, IssueError};

#[derive(Debug, thiserror::Error)]
pub enum AdvanceError {
    #[error(transparent)]
    Issue(#[from] IssueError),
    #[error("Cannot advance: {0}")]
    Domain(#[from] DomainError),
    #[error("Advancement cancelled")]
    Cancelled,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl AdvanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Issue(e) => e.kind(),
            Self::Domain(e) if e.is_invalid_transition() => ErrorKind::Conflict,
            Self::Domain(_) | Self::Cancelled => ErrorKind::Internal,
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Issue(e) => e.reason(),
            Self::Domain(e) if e.is_invalid_transition() => "IllegalTransition",
            Self::Domain(_) => "Internal",
            Self::Cancelled => "Cancelled",
            Self::Repo(e) => repo_reason(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The instance is not started at this turn any more; nothing to do.
    Skipped { status: InstanceStatus, current_turn: u32 },
    /// Sheets are outstanding and the deadline has not passed.
    Waiting { outstanding: usize },
    Advanced { turn: u32, issued: usize, abandoned: usize },
    Completed { final_turn: u32, abandoned: usize },
}

pub struct TurnAdvancer {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueuePort>,
    clock: Arc<dyn ClockPort>,
    cache: Arc<SnapshotCache>,
}

impl TurnAdvancer {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueuePort>,
        clock: Arc<dyn ClockPort>,
        cache: Arc<SnapshotCache>,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            cache,
        }
    }

    /// Advance `instance_id` past `turn` if every sheet is in, or the deadline passed.
    pub async fn advance_if_ready(
        &self,
        ctx: &RequestContext,
        instance_id: GameInstanceId,
        turn: u32,
    ) -> Result<AdvanceOutcome, AdvanceError> {
        let mut tx = self.store.begin(&ctx.scope).await?;
        tx.lock_instance(instance_id).await?;
        let mut instance = tx.get_instance(instance_id).await?;
        if instance.status() != InstanceStatus::Started || instance.current_turn() != turn {
            tracing::debug!(
                instance_id = %instance_id,
                turn,
                status = %instance.status(),
                current_turn = instance.current_turn(),
                "Advance check skipped"
            );
            return Ok(AdvanceOutcome::Skipped {
                status: instance.status(),
                current_turn: instance.current_turn(),
            });
        }

        let now = self.clock.now();
        let sheets = tx.list_turn_sheets(instance_id, turn).await?;
        let (finished, outstanding): (Vec<TurnSheet>, Vec<TurnSheet>) =
            sheets.into_iter().partition(TurnSheet::is_final);

        if !outstanding.is_empty() && !instance.deadline_passed(now) {
            drop(tx);
            // A render job lost after a commit is re-enqueued here; tags dedupe.
            let pending: Vec<TurnSheetId> = outstanding
                .iter()
                .filter(|s| s.status() == ProcessingStatus::Pending)
                .map(TurnSheet::id)
                .collect();
            enqueue_renders(self.queue.as_ref(), &pending).await;
            tracing::debug!(
                instance_id = %instance_id,
                turn,
                outstanding = outstanding.len(),
                "Turn still waiting for sheets"
            );
            return Ok(AdvanceOutcome::Waiting {
                outstanding: outstanding.len(),
            });
        }

        let abandoned = outstanding.len();
        for mut sheet in outstanding {
            sheet.abandon(now)?;
            tx.save_turn_sheet(&sheet).await?;
        }

        let world = tx.load_world(instance.game_id()).await?;
        let mut live = tx.load_live_world(instance_id).await?;

        let mut processed: Vec<&TurnSheet> = finished
            .iter()
            .filter(|s| s.status() == ProcessingStatus::Processed)
            .collect();
        processed.sort_by_key(|s| s.apply_order_key());

        let mut order: Vec<CharacterInstanceId> = Vec::new();
        let mut moves = 0;
        for sheet in &processed {
            let (Some(character_id), Some(scan)) = (sheet.character_instance_id(), sheet.scan())
            else {
                continue;
            };
            order.push(character_id);
            if sheet.sheet_type() != SheetType::LocationChoice {
                continue;
            }
            let answer = match LocationChoiceAnswer::from_json(&scan.scanned_data) {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::warn!(turn_sheet_id = %sheet.id(), error = %e, "Unreadable answer; character stays");
                    continue;
                }
            };
            let outcome = apply_location_choice(&world, &mut live, character_id, &answer, now);
            match &outcome {
                MoveOutcome::Moved(_) => moves += 1,
                MoveOutcome::Refused(event) => {
                    tracing::info!(turn_sheet_id = %sheet.id(), event = ?event, "Move refused");
                }
                MoveOutcome::Stayed => {}
            }
        }

        // Characters without a processed sheet still meet what is around them.
        let mut idle: Vec<_> = live
            .active_characters()
            .into_iter()
            .filter(|c| !order.contains(&c.id))
            .map(|c| (c.account_id, c.id))
            .collect();
        idle.sort();
        order.extend(idle.into_iter().map(|(_, id)| id));

        let events = resolve_end_of_turn(&world, &mut live, &order, now);
        for event in &events {
            tracing::debug!(instance_id = %instance_id, turn, event = ?event, "Turn event");
        }
        tx.save_live_world(instance_id, &live).await?;

        let advance = instance.advance_turn(turn, now)?;
        tx.save_instance(&instance).await?;

        let issued = match advance {
            TurnAdvance::Next(_) => {
                issue_turn_sheets(tx.as_mut(), &self.cache, &world, &live, &instance, now).await?
            }
            TurnAdvance::Completed(_) => Vec::new(),
        };

        if ctx.is_cancelled() {
            return Err(AdvanceError::Cancelled);
        }
        tx.commit().await?;

        tracing::info!(
            instance_id = %instance_id,
            turn,
            applied = processed.len(),
            moves,
            abandoned,
            events = events.len(),
            status = %instance.status(),
            correlation_id = %ctx.correlation_id,
            "Turn advanced"
        );

        match advance {
            TurnAdvance::Next(next) => {
                let ids: Vec<TurnSheetId> = issued.iter().map(TurnSheet::id).collect();
                enqueue_renders(self.queue.as_ref(), &ids).await;
                Ok(AdvanceOutcome::Advanced {
                    turn: next,
                    issued: issued.len(),
                    abandoned,
                })
            }
            TurnAdvance::Completed(final_turn) => {
                self.cache.forget_instance(instance_id);
                Ok(AdvanceOutcome::Completed {
                    final_turn,
                    abandoned,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playbymail_domain::{
        AccountId, GameInstance, ItemPosition, LocationChoiceSheetData, LocationLinkId,
    };

    use crate::infrastructure::correlation::CorrelationId;
    use crate::infrastructure::ports::{AccessScope, JobKind};
    use crate::test_fixtures::{RecordingQueue, Seeded};

    struct Harness {
        seeded: Seeded,
        queue: Arc<RecordingQueue>,
        advancer: TurnAdvancer,
        cache: Arc<SnapshotCache>,
        instance: GameInstance,
        players: Vec<AccountId>,
    }

    async fn harness(names: &[&str]) -> Harness {
        harness_from(Seeded::new().await, names).await
    }

    async fn harness_from(mut seeded: Seeded, names: &[&str]) -> Harness {
        let (instance, players) = seeded.start_with_players(names).await;
        let queue = Arc::new(RecordingQueue::new());
        let cache = Arc::new(SnapshotCache::new());
        let advancer = TurnAdvancer::new(seeded.store(), queue.clone(), seeded.clock(), cache.clone());
        Harness {
            seeded,
            queue,
            advancer,
            cache,
            instance,
            players,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::system(CorrelationId::new())
    }

    fn stay() -> serde_json::Value {
        LocationChoiceAnswer {
            location_link_id: None,
        }
        .to_json()
    }

    fn take(link: LocationLinkId) -> serde_json::Value {
        LocationChoiceAnswer {
            location_link_id: Some(link),
        }
        .to_json()
    }

    impl Harness {
        async fn sheets(&self, turn: u32) -> Vec<TurnSheet> {
            let store = self.seeded.store();
            let mut tx = store.begin(&AccessScope::System).await.unwrap();
            let mut sheets = tx.list_turn_sheets(self.instance.id(), turn).await.unwrap();
            sheets.sort_by_key(|s| s.account_id());
            sheets
        }

        async fn advance(&self, turn: u32) -> AdvanceOutcome {
            self.advancer
                .advance_if_ready(&ctx(), self.instance.id(), turn)
                .await
                .unwrap()
        }

        async fn current_turn(&self) -> u32 {
            self.seeded.instance(self.instance.id()).await.current_turn()
        }
    }

    #[tokio::test]
    async fn when_sheets_are_outstanding_then_advance_waits_until_the_last_arrives() {
        let h = harness(&["Ada", "Brunel", "Curie"]).await;
        for turn in 1..=2 {
            for sheet in h.sheets(turn).await {
                h.seeded.process_sheet(sheet.id(), stay()).await;
            }
            assert!(matches!(h.advance(turn).await, AdvanceOutcome::Advanced { .. }));
        }
        assert_eq!(h.current_turn().await, 3);

        let sheets = h.sheets(3).await;
        assert_eq!(sheets.len(), 3);
        h.seeded.process_sheet(sheets[0].id(), stay()).await;
        h.seeded.process_sheet(sheets[1].id(), stay()).await;
        assert_eq!(h.advance(3).await, AdvanceOutcome::Waiting { outstanding: 1 });
        assert_eq!(h.current_turn().await, 3);

        h.seeded.process_sheet(sheets[2].id(), stay()).await;
        assert_eq!(
            h.advance(3).await,
            AdvanceOutcome::Advanced {
                turn: 4,
                issued: 3,
                abandoned: 0
            }
        );
        assert_eq!(h.current_turn().await, 4);
        let next = h.sheets(4).await;
        assert_eq!(next.len(), 3);
        assert!(next.iter().all(|s| s.status() == ProcessingStatus::Pending));
        assert!(h
            .sheets(3)
            .await
            .iter()
            .all(|s| s.status() == ProcessingStatus::Processed));
        assert_eq!(h.queue.pending_of(JobKind::RenderSheet), 9);
    }

    #[tokio::test]
    async fn when_deadline_passed_then_outstanding_sheets_are_abandoned() {
        let h = harness(&["Ada", "Brunel"]).await;
        let sheets = h.sheets(1).await;
        h.seeded.process_sheet(sheets[0].id(), stay()).await;
        h.seeded.manual_clock().advance(chrono::Duration::days(30));

        let outcome = h.advance(1).await;
        assert_eq!(
            outcome,
            AdvanceOutcome::Advanced {
                turn: 2,
                issued: 2,
                abandoned: 1
            }
        );
        let after = h.seeded.sheet(sheets[1].id()).await;
        assert_eq!(after.status(), ProcessingStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_apply_order_follows_account_not_arrival() {
        let mut seeded = Seeded::new().await;
        let lantern = seeded.place_item("Lantern", "Great Hall").await;
        let descend = seeded.link("Descend").id;
        let h = harness_from(seeded, &["Ada", "Brunel"]).await;

        // Sheets are sorted by account; process the later account first.
        let sheets = h.sheets(1).await;
        h.seeded.process_sheet(sheets[1].id(), take(descend)).await;
        h.seeded.process_sheet(sheets[0].id(), take(descend)).await;
        assert!(matches!(h.advance(1).await, AdvanceOutcome::Advanced { .. }));

        let store = h.seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let live = tx.load_live_world(h.instance.id()).await.unwrap();
        let hall = live
            .location_instance_of(h.seeded.location("Great Hall").id)
            .unwrap()
            .id;
        assert!(live.characters.iter().all(|c| c.location_instance_id == hall));

        let first = live
            .characters
            .iter()
            .find(|c| c.account_id == sheets[0].account_id())
            .unwrap();
        let item = live.items.iter().find(|i| i.item_id == lantern).unwrap();
        assert_eq!(item.position, ItemPosition::HeldBy(first.id));
    }

    #[tokio::test]
    async fn test_next_sheets_offer_options_from_the_new_location() {
        let h = harness(&["Ada"]).await;
        let descend = h.seeded.link("Descend").id;
        let sheet = &h.sheets(1).await[0];
        h.seeded.process_sheet(sheet.id(), take(descend)).await;
        h.advance(1).await;

        let next = &h.sheets(2).await[0];
        let data = LocationChoiceSheetData::from_json(next.sheet_data()).unwrap();
        assert_eq!(data.location_name, "Great Hall");
        assert_eq!(data.options.len(), 1);
        assert_eq!(data.options[0].label, "Climb");
    }

    #[tokio::test]
    async fn test_last_turn_completes_the_instance() {
        let h = harness(&["Ada"]).await;

        let mut last = None;
        for turn in 1..=10 {
            h.seeded.manual_clock().advance(chrono::Duration::days(30));
            last = Some(h.advance(turn).await);
        }
        assert_eq!(
            last,
            Some(AdvanceOutcome::Completed {
                final_turn: 10,
                abandoned: 1
            })
        );
        let instance = h.seeded.instance(h.instance.id()).await;
        assert_eq!(instance.status(), InstanceStatus::Completed);
        assert!(h.sheets(11).await.is_empty());
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_stale_and_paused_checks_are_skipped() {
        let h = harness(&["Ada"]).await;
        assert!(matches!(
            h.advance(7).await,
            AdvanceOutcome::Skipped { current_turn: 1, .. }
        ));

        let store = h.seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let mut instance = tx.get_instance(h.instance.id()).await.unwrap();
        instance.pause(h.seeded.clock().now()).unwrap();
        tx.save_instance(&instance).await.unwrap();
        tx.commit().await.unwrap();

        h.seeded.manual_clock().advance(chrono::Duration::days(30));
        assert_eq!(
            h.advance(1).await,
            AdvanceOutcome::Skipped {
                status: InstanceStatus::Paused,
                current_turn: 1
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_advancement_is_busy() {
        let h = harness(&["Ada"]).await;
        let store = h.seeded.store();
        let mut holder = store.begin(&AccessScope::System).await.unwrap();
        holder.lock_instance(h.instance.id()).await.unwrap();

        let err = h
            .advancer
            .advance_if_ready(&ctx(), h.instance.id(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "Busy");
        drop(holder);
        assert!(matches!(h.advance(1).await, AdvanceOutcome::Waiting { .. }));
    }

    #[tokio::test]
    async fn test_waiting_re_enqueues_renders_for_pending_sheets() {
        let h = harness(&["Ada"]).await;
        assert_eq!(h.advance(1).await, AdvanceOutcome::Waiting { outstanding: 1 });
        assert_eq!(h.queue.pending_of(JobKind::RenderSheet), 1);
    }
}
