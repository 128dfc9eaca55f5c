//! Game instance lifecycle: create, inspect and the manager transitions.
//!
//! Starting an instance checks publication and readiness, materialises the
//! live world with an RNG seeded from the instance id, freezes the templates
//! and issues turn 1 in the same transaction. Render jobs are enqueued only
//! after commit.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use playbymail_domain::{
    check_readiness, materialise, DomainError, GameId, GameInstance, GameInstanceId,
    InstanceAction, ReadinessIssue, SubscriptionKind, TurnSheetId,
};

use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::ports::{ClockPort, JobQueuePort, RepoError, Store, StoreTx};
use crate::use_cases::context::{AccessError, RequestContext};
use crate::use_cases::error::{access_reason, repo_reason, ErrorKind};
use crate::use_cases::jobs::{enqueue_advance, enqueue_renders, resume_advance_tag};
use crate::use_cases::sheets::{issue_turn_sheets, IssueError};
use crate::use_cases::templates::capture_snapshots;

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Illegal transition: {0}")]
    IllegalTransition(String),
    #[error("Game {0} is not published")]
    GameNotPublished(GameId),
    #[error("Instance is not ready to start: {}", describe(.0))]
    NotReady(Vec<ReadinessIssue>),
    #[error("Caller holds no manager subscription on game {0}")]
    NoManagerSubscription(GameId),
    #[error(transparent)]
    Issue(#[from] IssueError),
    #[error("Request cancelled")]
    Cancelled,
    #[error(transparent)]
    Domain(DomainError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

fn describe(issues: &[ReadinessIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<DomainError> for TransitionError {
    fn from(err: DomainError) -> Self {
        if err.is_invalid_transition() {
            Self::IllegalTransition(err.to_string())
        } else {
            Self::Domain(err)
        }
    }
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IllegalTransition(_) => ErrorKind::Conflict,
            Self::GameNotPublished(_) | Self::NotReady(_) => ErrorKind::Unprocessable,
            Self::NoManagerSubscription(_) => ErrorKind::Forbidden,
            Self::Issue(e) => e.kind(),
            Self::Cancelled | Self::Domain(_) => ErrorKind::Internal,
            Self::Access(e) => ErrorKind::of_access(e),
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::IllegalTransition(_) => "IllegalTransition",
            Self::GameNotPublished(_) => "GameNotPublished",
            Self::NotReady(_) => "NotReady",
            Self::NoManagerSubscription(_) => "Forbidden",
            Self::Issue(e) => e.reason(),
            Self::Cancelled => "Cancelled",
            Self::Domain(_) => "Internal",
            Self::Access(e) => access_reason(e),
            Self::Repo(e) => repo_reason(e),
        }
    }

    /// Readiness issues to echo in the error body.
    pub fn issues(&self) -> Option<&[ReadinessIssue]> {
        match self {
            Self::NotReady(issues) => Some(issues),
            _ => None,
        }
    }
}

/// RNG for placement rolls, fixed by the instance id.
pub fn placement_rng(instance_id: GameInstanceId) -> StdRng {
    let bytes = instance_id.as_uuid().as_bytes();
    let mut seed = [0u8; 32];
    seed[..16].copy_from_slice(bytes);
    seed[16..].copy_from_slice(bytes);
    StdRng::from_seed(seed)
}

/// Load an instance of `game_id`; instances of other games read as missing.
pub(crate) async fn load_instance(
    tx: &mut dyn StoreTx,
    game_id: GameId,
    instance_id: GameInstanceId,
) -> Result<GameInstance, RepoError> {
    let instance = tx.get_instance(instance_id).await?;
    if instance.game_id() != game_id {
        return Err(RepoError::not_found("GameInstance", instance_id));
    }
    Ok(instance)
}

pub struct Instances {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueuePort>,
    clock: Arc<dyn ClockPort>,
    cache: Arc<SnapshotCache>,
}

impl Instances {
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

    /// Open a new instance under the caller's manager subscription.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
    ) -> Result<GameInstance, TransitionError> {
        ctx.require(game_id, &[SubscriptionKind::Manager], "create an instance")?;
        let account_id = ctx
            .scope
            .account_id()
            .ok_or(TransitionError::NoManagerSubscription(game_id))?;

        let mut tx = self.store.begin(&ctx.scope).await?;
        let game = tx.get_game(game_id).await?;
        let manager = tx
            .list_account_subscriptions(account_id)
            .await?
            .into_iter()
            .find(|s| s.game_id == game_id && s.kind == SubscriptionKind::Manager)
            .ok_or(TransitionError::NoManagerSubscription(game_id))?;

        let instance = GameInstance::new(&game, manager.id, self.clock.now());
        tx.save_instance(&instance).await?;
        tx.commit().await?;

        tracing::info!(
            game_id = %game_id,
            instance_id = %instance.id(),
            manager_subscription_id = %manager.id,
            "Created game instance"
        );
        Ok(instance)
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        instance_id: GameInstanceId,
    ) -> Result<GameInstance, TransitionError> {
        if !ctx.scope.can_see(game_id) {
            return Err(AccessError::NotVisible(game_id).into());
        }
        let mut tx = self.store.begin(&ctx.scope).await?;
        Ok(load_instance(tx.as_mut(), game_id, instance_id).await?)
    }

    /// Apply a manager action under the instance lock.
    pub async fn transition(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        instance_id: GameInstanceId,
        action: InstanceAction,
    ) -> Result<GameInstance, TransitionError> {
        ctx.require(game_id, &[SubscriptionKind::Manager], action.as_str())?;

        let mut tx = self.store.begin(&ctx.scope).await?;
        load_instance(tx.as_mut(), game_id, instance_id).await?;
        tx.lock_instance(instance_id).await?;
        let mut instance = load_instance(tx.as_mut(), game_id, instance_id).await?;
        let from = instance.status();
        let now = self.clock.now();

        let issued = match action {
            InstanceAction::Start => self.start(tx.as_mut(), &mut instance).await?,
            _ => {
                instance.apply(action, now)?;
                tx.save_instance(&instance).await?;
                Vec::new()
            }
        };

        if ctx.is_cancelled() {
            return Err(TransitionError::Cancelled);
        }
        tx.commit().await?;

        tracing::info!(
            game_id = %game_id,
            instance_id = %instance_id,
            action = %action,
            from = %from,
            to = %instance.status(),
            turn = instance.current_turn(),
            correlation_id = %ctx.correlation_id,
            "Instance transitioned"
        );

        self.after_commit(&instance, action, &issued).await;
        Ok(instance)
    }

    async fn start(
        &self,
        tx: &mut dyn StoreTx,
        instance: &mut GameInstance,
    ) -> Result<Vec<TurnSheetId>, TransitionError> {
        let now = self.clock.now();
        // The state machine goes first: a started or cancelled instance is a
        // conflict whatever its game looks like.
        instance.start(now)?;
        let game_id = instance.game_id();
        let game = tx.get_game(game_id).await?;
        if !game.is_published() {
            return Err(TransitionError::GameNotPublished(game_id));
        }

        let world = tx.load_world(game_id).await?;
        let players = tx.list_instance_players(instance.id()).await?;
        let issues = check_readiness(&world, players.len());
        if !issues.is_empty() {
            return Err(TransitionError::NotReady(issues));
        }

        let mut characters = Vec::with_capacity(players.len());
        for player in &players {
            match tx.find_character(game_id, player.account_id).await? {
                Some(character) => characters.push(character),
                None => tracing::warn!(
                    instance_id = %instance.id(),
                    account_id = %player.account_id,
                    "Player has no character; skipped"
                ),
            }
        }

        let mut rng = placement_rng(instance.id());
        let mut roll = || rng.gen::<f64>();
        let live = materialise(&world, instance.id(), &characters, &mut roll, now)?;

        tx.save_instance(instance).await?;
        tx.save_live_world(instance.id(), &live).await?;

        let templates = tx.list_templates(game_id).await?;
        tx.save_template_snapshots(&capture_snapshots(&templates, instance.id(), now))
            .await?;

        // Private cache: nothing is shared until the snapshots are committed.
        let staging = SnapshotCache::new();
        let sheets = issue_turn_sheets(tx, &staging, &world, &live, instance, now).await?;

        tracing::info!(
            instance_id = %instance.id(),
            characters = characters.len(),
            creatures = live.creatures.len(),
            items = live.items.len(),
            "Materialised live world"
        );
        Ok(sheets.iter().map(|s| s.id()).collect())
    }

    async fn after_commit(
        &self,
        instance: &GameInstance,
        action: InstanceAction,
        issued: &[TurnSheetId],
    ) {
        match action {
            InstanceAction::Start => {
                enqueue_renders(self.queue.as_ref(), issued).await;
            }
            InstanceAction::Resume => {
                let tag = resume_advance_tag(
                    instance.id(),
                    instance.current_turn(),
                    instance.updated_at(),
                );
                if let Err(e) = enqueue_advance(
                    self.queue.as_ref(),
                    instance.id(),
                    instance.current_turn(),
                    &tag,
                )
                .await
                {
                    tracing::warn!(instance_id = %instance.id(), error = %e, "Failed to enqueue advance after resume");
                }
            }
            InstanceAction::Cancel => {
                let dropped = self.cache.forget_instance(instance.id());
                tracing::debug!(instance_id = %instance.id(), dropped, "Dropped cached snapshots");
            }
            InstanceAction::Pause => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{AccessScope, JobKind};
    use crate::test_fixtures::{RecordingQueue, Seeded};
    use playbymail_domain::{InstanceStatus, ProcessingStatus};

    struct Harness {
        seeded: Seeded,
        queue: Arc<RecordingQueue>,
        instances: Instances,
    }

    async fn harness() -> Harness {
        let seeded = Seeded::new().await;
        let queue = Arc::new(RecordingQueue::new());
        let instances = Instances::new(
            seeded.store(),
            queue.clone(),
            seeded.clock(),
            Arc::new(SnapshotCache::new()),
        );
        Harness {
            seeded,
            queue,
            instances,
        }
    }

    #[tokio::test]
    async fn when_game_is_unpublished_then_start_fails() {
        let h = harness().await;
        let instance = h.seeded.create_instance().await;
        h.seeded.enroll_player(&instance, "Ada").await;

        let err = h
            .instances
            .transition(&h.seeded.owner_ctx(), h.seeded.game.id, instance.id(), InstanceAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::GameNotPublished(_)));
        assert_eq!(err.kind(), ErrorKind::Unprocessable);
    }

    #[tokio::test]
    async fn when_no_player_joined_then_start_lists_the_issue() {
        let mut h = harness().await;
        h.seeded.publish().await;
        let instance = h.seeded.create_instance().await;

        let err = h
            .instances
            .transition(&h.seeded.owner_ctx(), h.seeded.game.id, instance.id(), InstanceAction::Start)
            .await
            .unwrap_err();
        assert_eq!(err.issues(), Some(&[ReadinessIssue::NoPlayersJoined][..]));
        assert_eq!(err.reason(), "NotReady");
    }

    #[tokio::test]
    async fn when_ready_then_turn_one_sheets_exist_after_commit() {
        let mut h = harness().await;
        h.seeded.publish().await;
        let instance = h.seeded.create_instance().await;
        h.seeded.enroll_player(&instance, "Ada").await;
        h.seeded.enroll_player(&instance, "Brunel").await;

        let started = h
            .instances
            .transition(&h.seeded.owner_ctx(), h.seeded.game.id, instance.id(), InstanceAction::Start)
            .await
            .unwrap();
        assert_eq!(started.status(), InstanceStatus::Started);
        assert_eq!(started.current_turn(), 1);
        assert!(started.turn_deadline_at().is_some());

        let store = h.seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let sheets = tx.list_turn_sheets(instance.id(), 1).await.unwrap();
        assert_eq!(sheets.len(), 2);
        assert!(sheets.iter().all(|s| s.status() == ProcessingStatus::Pending));
        let live = tx.load_live_world(instance.id()).await.unwrap();
        assert_eq!(live.locations.len(), 3);
        assert_eq!(live.characters.len(), 2);

        assert_eq!(h.queue.pending_of(JobKind::RenderSheet), 2);
    }

    #[tokio::test]
    async fn test_start_twice_is_an_illegal_transition() {
        let mut h = harness().await;
        h.seeded.publish().await;
        let instance = h.seeded.create_instance().await;
        h.seeded.enroll_player(&instance, "Ada").await;
        let ctx = h.seeded.owner_ctx();

        h.instances
            .transition(&ctx, h.seeded.game.id, instance.id(), InstanceAction::Start)
            .await
            .unwrap();
        let err = h
            .instances
            .transition(&ctx, h.seeded.game.id, instance.id(), InstanceAction::Start)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_starting_a_cancelled_instance_is_an_illegal_transition() {
        let h = harness().await;
        let instance = h.seeded.create_instance().await;
        let ctx = h.seeded.owner_ctx();
        let game_id = h.seeded.game.id;
        h.instances
            .transition(&ctx, game_id, instance.id(), InstanceAction::Cancel)
            .await
            .unwrap();

        // Unpublished and without players, yet the state is what fails.
        let err = h
            .instances
            .transition(&ctx, game_id, instance.id(), InstanceAction::Start)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.reason(), "IllegalTransition");

        let store = h.seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        assert!(tx.load_live_world(instance.id()).await.is_err());
        assert_eq!(
            tx.get_instance(instance.id()).await.unwrap().status(),
            InstanceStatus::Cancelled
        );
        assert!(h.queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_resume_enqueues_an_advance_check() {
        let mut h = harness().await;
        h.seeded.publish().await;
        let instance = h.seeded.create_instance().await;
        h.seeded.enroll_player(&instance, "Ada").await;
        let ctx = h.seeded.owner_ctx();
        let game_id = h.seeded.game.id;

        h.instances.transition(&ctx, game_id, instance.id(), InstanceAction::Start).await.unwrap();
        let paused = h
            .instances
            .transition(&ctx, game_id, instance.id(), InstanceAction::Pause)
            .await
            .unwrap();
        assert_eq!(paused.turn_deadline_at(), None);

        let resumed = h
            .instances
            .transition(&ctx, game_id, instance.id(), InstanceAction::Resume)
            .await
            .unwrap();
        assert_eq!(resumed.status(), InstanceStatus::Started);
        let tags = h.queue.tags_of(JobKind::AdvanceIfReady);
        assert_eq!(tags.len(), 1);
        assert!(tags[0].starts_with(&format!("resume:{}:1:", instance.id())));
    }

    #[tokio::test]
    async fn test_cancel_from_created() {
        let h = harness().await;
        let instance = h.seeded.create_instance().await;
        let cancelled = h
            .instances
            .transition(&h.seeded.owner_ctx(), h.seeded.game.id, instance.id(), InstanceAction::Cancel)
            .await
            .unwrap();
        assert_eq!(cancelled.status(), InstanceStatus::Cancelled);
        assert_eq!(cancelled.current_turn(), 0);
    }

    #[tokio::test]
    async fn test_players_cannot_transition_and_strangers_see_nothing() {
        let h = harness().await;
        let instance = h.seeded.create_instance().await;
        let player = h.seeded.enroll_player(&instance, "Ada").await;
        let player_ctx = h.seeded.account_ctx(player).await;

        let err = h
            .instances
            .transition(&player_ctx, h.seeded.game.id, instance.id(), InstanceAction::Cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = h
            .instances
            .get(&h.seeded.stranger_ctx(), h.seeded.game.id, instance.id())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_contended_instance_lock_is_busy() {
        let h = harness().await;
        let instance = h.seeded.create_instance().await;
        let store = h.seeded.store();
        let mut holder = store.begin(&AccessScope::System).await.unwrap();
        holder.lock_instance(instance.id()).await.unwrap();

        let err = h
            .instances
            .transition(&h.seeded.owner_ctx(), h.seeded.game.id, instance.id(), InstanceAction::Cancel)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "Busy");
        drop(holder);
    }

    #[tokio::test]
    async fn test_create_binds_the_manager_subscription() {
        let h = harness().await;
        let instance = h
            .instances
            .create(&h.seeded.owner_ctx(), h.seeded.game.id)
            .await
            .unwrap();
        assert_eq!(instance.manager_subscription_id(), h.seeded.manager_subscription.id);
        assert_eq!(instance.status(), InstanceStatus::Created);
    }

    #[test]
    fn test_placement_rng_is_fixed_by_instance_id() {
        let id = GameInstanceId::new();
        let a: Vec<f64> = (0..4).map({
            let mut rng = placement_rng(id);
            move |_| rng.gen()
        }).collect();
        let b: Vec<f64> = (0..4).map({
            let mut rng = placement_rng(id);
            move |_| rng.gen()
        }).collect();
        assert_eq!(a, b);
    }
}
