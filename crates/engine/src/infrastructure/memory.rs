//! In-memory store.
//!
//! Used when no `DATABASE_URL` is configured and by the use-case tests. A
//! transaction works on a private copy of the committed state and records
//! every write; commit replays the writes onto the latest committed state, so
//! concurrent transactions touching different rows do not clobber each other.
//! Row and instance locks never wait: a contended lock is `RepoError::Busy`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use playbymail_domain::{
    AccountId, AuthoredWorld, Character, CharacterId, Game, GameId, GameImage, GameImageId,
    GameInstance, GameInstanceId, InstanceStatus, JoinSubmission, JoinSubmissionId,
    JoinSubmissionStatus, LiveWorld, ProcessingStatus, SheetTemplate, SheetTemplateId,
    SheetToken, SheetType, Subscription, SubscriptionId, SubscriptionKind, TemplateSnapshot,
    TurnSheet, TurnSheetId,
};

use crate::infrastructure::ports::{AccessScope, RepoError, Store, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    games: HashMap<GameId, Game>,
    worlds: HashMap<GameId, AuthoredWorld>,
    characters: HashMap<CharacterId, Character>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    instances: HashMap<GameInstanceId, GameInstance>,
    live_worlds: HashMap<GameInstanceId, LiveWorld>,
    templates: HashMap<SheetTemplateId, SheetTemplate>,
    snapshots: Vec<TemplateSnapshot>,
    images: HashMap<GameImageId, GameImage>,
    turn_sheets: HashMap<TurnSheetId, TurnSheet>,
    documents: HashMap<TurnSheetId, Vec<u8>>,
    join_submissions: HashMap<JoinSubmissionId, JoinSubmission>,
}

impl MemoryState {
    fn instance_game(&self, id: GameInstanceId) -> Option<GameId> {
        self.instances.get(&id).map(|i| i.game_id())
    }

    fn sheet_game(&self, id: TurnSheetId) -> Option<GameId> {
        self.turn_sheets
            .get(&id)
            .and_then(|s| self.instance_game(s.game_instance_id()))
    }

    fn sheet_slot_taken(&self, sheet: &TurnSheet) -> bool {
        self.turn_sheets.values().any(|other| {
            other.id() != sheet.id()
                && other.game_instance_id() == sheet.game_instance_id()
                && other.account_id() == sheet.account_id()
                && other.turn_number() == sheet.turn_number()
                && other.sheet_type() == sheet.sheet_type()
        })
    }

    fn sheet_code_taken(&self, sheet: &TurnSheet) -> bool {
        self.turn_sheets
            .values()
            .any(|other| other.id() != sheet.id() && other.code() == sheet.code())
    }

    fn join_code_taken(&self, subscription: &Subscription) -> bool {
        subscription.join_code.is_some_and(|code| {
            self.subscriptions
                .values()
                .any(|other| other.id != subscription.id && other.join_code == Some(code))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Instance(GameInstanceId),
    TurnSheet(TurnSheetId),
}

#[derive(Default)]
struct Shared {
    state: Mutex<MemoryState>,
    locks: Mutex<HashSet<LockKey>>,
}

impl Shared {
    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, RepoError> {
        self.state
            .lock()
            .map_err(|_| RepoError::database("memory_state", "state mutex poisoned"))
    }

    fn locks(&self) -> Result<MutexGuard<'_, HashSet<LockKey>>, RepoError> {
        self.locks
            .lock()
            .map_err(|_| RepoError::database("memory_locks", "lock mutex poisoned"))
    }
}

/// Shared in-memory store. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self, scope: &AccessScope) -> Result<Box<dyn StoreTx>, RepoError> {
        let working = self.shared.state()?.clone();
        Ok(Box::new(MemoryTx {
            shared: self.shared.clone(),
            scope: scope.clone(),
            working,
            writes: Vec::new(),
            held: Vec::new(),
        }))
    }
}

type Write = Box<dyn Fn(&mut MemoryState) -> Result<(), RepoError> + Send + Sync>;

struct MemoryTx {
    shared: Arc<Shared>,
    scope: AccessScope,
    working: MemoryState,
    writes: Vec<Write>,
    held: Vec<LockKey>,
}

impl MemoryTx {
    fn write<F>(&mut self, op: F) -> Result<(), RepoError>
    where
        F: Fn(&mut MemoryState) -> Result<(), RepoError> + Send + Sync + 'static,
    {
        op(&mut self.working)?;
        self.writes.push(Box::new(op));
        Ok(())
    }

    /// Take a lock, then reload committed state so reads see the latest rows.
    fn acquire(
        &mut self,
        key: LockKey,
        entity_type: &'static str,
        id: impl ToString,
    ) -> Result<(), RepoError> {
        if self.held.contains(&key) {
            return Ok(());
        }
        if !self.shared.locks()?.insert(key) {
            return Err(RepoError::busy(entity_type, id));
        }
        self.held.push(key);

        let mut fresh = self.shared.state()?.clone();
        for write in &self.writes {
            write(&mut fresh)?;
        }
        self.working = fresh;
        Ok(())
    }

    fn visible(&self, game_id: Option<GameId>) -> bool {
        game_id.is_some_and(|g| self.scope.can_see(g))
    }

    fn require_game(&self, game_id: GameId) -> Result<(), RepoError> {
        if self.scope.can_see(game_id) {
            Ok(())
        } else {
            Err(RepoError::not_found("Game", game_id))
        }
    }

    fn require_instance(&self, id: GameInstanceId) -> Result<GameId, RepoError> {
        self.working
            .instance_game(id)
            .filter(|g| self.scope.can_see(*g))
            .ok_or_else(|| RepoError::not_found("GameInstance", id))
    }

    fn subscription_visible(&self, subscription: &Subscription) -> bool {
        self.scope.can_see(subscription.game_id)
            || self.scope.account_id() == Some(subscription.account_id)
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.shared.locks.lock() {
            for key in &self.held {
                locks.remove(key);
            }
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    // =========================================================================
    // Games and authored content
    // =========================================================================

    async fn get_game(&mut self, id: GameId) -> Result<Game, RepoError> {
        self.require_game(id)?;
        self.working
            .games
            .get(&id)
            .cloned()
            .ok_or_else(|| RepoError::not_found("Game", id))
    }

    async fn save_game(&mut self, game: &Game) -> Result<(), RepoError> {
        self.require_game(game.id)?;
        let game = game.clone();
        self.write(move |state| {
            state.games.insert(game.id, game.clone());
            Ok(())
        })
    }

    async fn save_world(&mut self, world: &AuthoredWorld) -> Result<(), RepoError> {
        let game_id = world.game.id;
        self.require_game(game_id)?;
        if !self.working.games.contains_key(&game_id) {
            return Err(RepoError::not_found("Game", game_id));
        }
        let world = world.clone();
        self.write(move |state| {
            state.worlds.insert(game_id, world.clone());
            Ok(())
        })
    }

    async fn load_world(&mut self, game_id: GameId) -> Result<AuthoredWorld, RepoError> {
        let game = self.get_game(game_id).await?;
        let mut world = self
            .working
            .worlds
            .get(&game_id)
            .cloned()
            .unwrap_or_else(|| AuthoredWorld::empty(game.clone()));
        world.game = game;
        Ok(world)
    }

    async fn save_character(&mut self, character: &Character) -> Result<(), RepoError> {
        self.require_game(character.game_id)?;
        let character = character.clone();
        self.write(move |state| {
            state.characters.insert(character.id, character.clone());
            Ok(())
        })
    }

    async fn find_character(
        &mut self,
        game_id: GameId,
        account_id: AccountId,
    ) -> Result<Option<Character>, RepoError> {
        self.require_game(game_id)?;
        Ok(self
            .working
            .characters
            .values()
            .find(|c| c.game_id == game_id && c.account_id == account_id)
            .cloned())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    async fn save_subscription(&mut self, subscription: &Subscription) -> Result<(), RepoError> {
        if !self.subscription_visible(subscription) {
            return Err(RepoError::not_found("Game", subscription.game_id));
        }
        let subscription = subscription.clone();
        self.write(move |state| {
            if state.join_code_taken(&subscription) {
                return Err(RepoError::constraint(format!(
                    "join code of subscription {} is already in use",
                    subscription.id
                )));
            }
            state
                .subscriptions
                .insert(subscription.id, subscription.clone());
            Ok(())
        })
    }

    async fn get_subscription(&mut self, id: SubscriptionId) -> Result<Subscription, RepoError> {
        self.working
            .subscriptions
            .get(&id)
            .filter(|s| self.subscription_visible(s))
            .cloned()
            .ok_or_else(|| RepoError::not_found("Subscription", id))
    }

    async fn find_manager_by_join_code(
        &mut self,
        code: SheetToken,
    ) -> Result<Option<Subscription>, RepoError> {
        Ok(self
            .working
            .subscriptions
            .values()
            .find(|s| {
                s.kind == SubscriptionKind::Manager
                    && s.join_code == Some(code)
                    && self.subscription_visible(s)
            })
            .cloned())
    }

    async fn list_account_subscriptions(
        &mut self,
        account_id: AccountId,
    ) -> Result<Vec<Subscription>, RepoError> {
        let mut subscriptions: Vec<Subscription> = self
            .working
            .subscriptions
            .values()
            .filter(|s| s.account_id == account_id && self.subscription_visible(s))
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| (s.created_at, s.id));
        Ok(subscriptions)
    }

    async fn list_instance_players(
        &mut self,
        instance_id: GameInstanceId,
    ) -> Result<Vec<Subscription>, RepoError> {
        self.require_instance(instance_id)?;
        let mut players: Vec<Subscription> = self
            .working
            .subscriptions
            .values()
            .filter(|s| {
                s.kind == SubscriptionKind::Player && s.game_instance_id == Some(instance_id)
            })
            .cloned()
            .collect();
        players.sort_by_key(|s| (s.created_at, s.id));
        Ok(players)
    }

    // =========================================================================
    // Game instances
    // =========================================================================

    async fn save_instance(&mut self, instance: &GameInstance) -> Result<(), RepoError> {
        self.require_game(instance.game_id())?;
        let instance = instance.clone();
        self.write(move |state| {
            state.instances.insert(instance.id(), instance.clone());
            Ok(())
        })
    }

    async fn get_instance(&mut self, id: GameInstanceId) -> Result<GameInstance, RepoError> {
        self.require_instance(id)?;
        self.working
            .instances
            .get(&id)
            .cloned()
            .ok_or_else(|| RepoError::not_found("GameInstance", id))
    }

    async fn lock_instance(&mut self, id: GameInstanceId) -> Result<(), RepoError> {
        self.require_instance(id)?;
        self.acquire(LockKey::Instance(id), "GameInstance", id)
    }

    async fn list_manager_instances(
        &mut self,
        manager_subscription_id: SubscriptionId,
    ) -> Result<Vec<GameInstance>, RepoError> {
        let mut instances: Vec<GameInstance> = self
            .working
            .instances
            .values()
            .filter(|i| {
                i.manager_subscription_id() == manager_subscription_id
                    && self.scope.can_see(i.game_id())
            })
            .cloned()
            .collect();
        instances.sort_by_key(|i| (i.created_at(), i.id()));
        Ok(instances)
    }

    async fn list_overdue_instances(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<GameInstance>, RepoError> {
        let mut overdue: Vec<GameInstance> = self
            .working
            .instances
            .values()
            .filter(|i| {
                i.status() == InstanceStatus::Started
                    && i.deadline_passed(now)
                    && self.scope.can_see(i.game_id())
            })
            .cloned()
            .collect();
        overdue.sort_by_key(|i| (i.turn_deadline_at(), i.id()));
        Ok(overdue)
    }

    // =========================================================================
    // Live world
    // =========================================================================

    async fn save_live_world(
        &mut self,
        instance_id: GameInstanceId,
        live: &LiveWorld,
    ) -> Result<(), RepoError> {
        self.require_instance(instance_id)?;
        let live = live.clone();
        self.write(move |state| {
            state.live_worlds.insert(instance_id, live.clone());
            Ok(())
        })
    }

    async fn load_live_world(
        &mut self,
        instance_id: GameInstanceId,
    ) -> Result<LiveWorld, RepoError> {
        self.require_instance(instance_id)?;
        self.working
            .live_worlds
            .get(&instance_id)
            .cloned()
            .ok_or_else(|| RepoError::not_found("LiveWorld", instance_id))
    }

    // =========================================================================
    // Sheet templates
    // =========================================================================

    async fn save_template(&mut self, template: &SheetTemplate) -> Result<SheetTemplate, RepoError> {
        self.require_game(template.game_id)?;
        let mut stored = template.clone();
        if let Some(existing) = self.working.templates.values().find(|t| {
            t.game_id == template.game_id
                && t.sheet_type == template.sheet_type
                && t.record_id == template.record_id
        }) {
            stored.id = existing.id;
            stored.created_at = existing.created_at;
        }
        let row = stored.clone();
        self.write(move |state| {
            state.templates.retain(|_, t| {
                !(t.game_id == row.game_id
                    && t.sheet_type == row.sheet_type
                    && t.record_id == row.record_id)
            });
            state.templates.insert(row.id, row.clone());
            Ok(())
        })?;
        Ok(stored)
    }

    async fn find_template(
        &mut self,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<SheetTemplate>, RepoError> {
        self.require_game(game_id)?;
        Ok(self
            .working
            .templates
            .values()
            .find(|t| t.game_id == game_id && t.sheet_type == sheet_type && t.record_id == record_id)
            .cloned())
    }

    async fn list_templates(&mut self, game_id: GameId) -> Result<Vec<SheetTemplate>, RepoError> {
        self.require_game(game_id)?;
        let mut templates: Vec<SheetTemplate> = self
            .working
            .templates
            .values()
            .filter(|t| t.game_id == game_id)
            .cloned()
            .collect();
        templates.sort_by_key(|t| (t.sheet_type, t.record_id, t.id));
        Ok(templates)
    }

    async fn save_template_snapshots(
        &mut self,
        snapshots: &[TemplateSnapshot],
    ) -> Result<(), RepoError> {
        for snapshot in snapshots {
            self.require_instance(snapshot.game_instance_id)?;
        }
        let snapshots = snapshots.to_vec();
        self.write(move |state| {
            for snapshot in &snapshots {
                let taken = state.snapshots.iter().any(|s| {
                    s.game_instance_id == snapshot.game_instance_id
                        && s.sheet_type == snapshot.sheet_type
                        && s.record_id == snapshot.record_id
                });
                if taken {
                    return Err(RepoError::constraint(format!(
                        "template snapshot for {} {} already captured",
                        snapshot.game_instance_id, snapshot.sheet_type
                    )));
                }
                state.snapshots.push(snapshot.clone());
            }
            Ok(())
        })
    }

    async fn find_template_snapshot(
        &mut self,
        instance_id: GameInstanceId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<TemplateSnapshot>, RepoError> {
        self.require_instance(instance_id)?;
        Ok(self
            .working
            .snapshots
            .iter()
            .find(|s| {
                s.game_instance_id == instance_id
                    && s.sheet_type == sheet_type
                    && s.record_id == record_id
            })
            .cloned())
    }

    // =========================================================================
    // Game images
    // =========================================================================

    async fn upsert_image(&mut self, image: &GameImage) -> Result<GameImage, RepoError> {
        self.require_game(image.game_id)?;
        let mut stored = image.clone();
        if let Some(existing) = self.working.images.values().find(|i| i.same_slot(image)) {
            stored.id = existing.id;
            stored.created_at = existing.created_at;
        }
        let row = stored.clone();
        self.write(move |state| {
            state.images.retain(|_, i| !i.same_slot(&row));
            state.images.insert(row.id, row.clone());
            Ok(())
        })?;
        Ok(stored)
    }

    async fn find_image(
        &mut self,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<GameImage>, RepoError> {
        self.require_game(game_id)?;
        Ok(self
            .working
            .images
            .values()
            .find(|i| i.game_id == game_id && i.sheet_type == sheet_type && i.record_id == record_id)
            .cloned())
    }

    // =========================================================================
    // Turn sheets
    // =========================================================================

    async fn insert_turn_sheet(&mut self, sheet: &TurnSheet) -> Result<(), RepoError> {
        self.require_instance(sheet.game_instance_id())?;
        let sheet = sheet.clone();
        self.write(move |state| {
            if state.turn_sheets.contains_key(&sheet.id()) || state.sheet_slot_taken(&sheet) {
                return Err(RepoError::constraint(format!(
                    "turn sheet for account {} turn {} {} already exists",
                    sheet.account_id(),
                    sheet.turn_number(),
                    sheet.sheet_type()
                )));
            }
            if state.sheet_code_taken(&sheet) {
                return Err(RepoError::constraint(format!(
                    "sheet code {} is already printed on another sheet",
                    sheet.code()
                )));
            }
            state.turn_sheets.insert(sheet.id(), sheet.clone());
            Ok(())
        })
    }

    async fn save_turn_sheet(&mut self, sheet: &TurnSheet) -> Result<(), RepoError> {
        self.require_instance(sheet.game_instance_id())?;
        let sheet = sheet.clone();
        self.write(move |state| {
            if !state.turn_sheets.contains_key(&sheet.id()) {
                return Err(RepoError::not_found("TurnSheet", sheet.id()));
            }
            state.turn_sheets.insert(sheet.id(), sheet.clone());
            Ok(())
        })
    }

    async fn get_turn_sheet(&mut self, id: TurnSheetId) -> Result<TurnSheet, RepoError> {
        if !self.visible(self.working.sheet_game(id)) {
            return Err(RepoError::not_found("TurnSheet", id));
        }
        self.working
            .turn_sheets
            .get(&id)
            .cloned()
            .ok_or_else(|| RepoError::not_found("TurnSheet", id))
    }

    async fn find_turn_sheet_by_code(
        &mut self,
        code: SheetToken,
    ) -> Result<Option<TurnSheet>, RepoError> {
        Ok(self
            .working
            .turn_sheets
            .values()
            .find(|s| s.code() == code)
            .filter(|s| self.visible(self.working.sheet_game(s.id())))
            .cloned())
    }

    async fn lock_turn_sheet(&mut self, id: TurnSheetId) -> Result<TurnSheet, RepoError> {
        self.get_turn_sheet(id).await?;
        self.acquire(LockKey::TurnSheet(id), "TurnSheet", id)?;
        self.get_turn_sheet(id).await
    }

    async fn list_turn_sheets(
        &mut self,
        instance_id: GameInstanceId,
        turn_number: u32,
    ) -> Result<Vec<TurnSheet>, RepoError> {
        self.require_instance(instance_id)?;
        let mut sheets: Vec<TurnSheet> = self
            .working
            .turn_sheets
            .values()
            .filter(|s| s.game_instance_id() == instance_id && s.turn_number() == turn_number)
            .cloned()
            .collect();
        sheets.sort_by_key(|s| s.apply_order_key());
        Ok(sheets)
    }

    async fn list_unprinted_sheets(
        &mut self,
        before: DateTime<Utc>,
    ) -> Result<Vec<TurnSheet>, RepoError> {
        let state = &self.working;
        let mut sheets: Vec<TurnSheet> = state
            .turn_sheets
            .values()
            .filter(|s| s.status() == ProcessingStatus::Pending && s.created_at() <= before)
            .filter(|s| {
                state.instances.get(&s.game_instance_id()).is_some_and(|i| {
                    i.status() == InstanceStatus::Started && self.scope.can_see(i.game_id())
                })
            })
            .cloned()
            .collect();
        sheets.sort_by_key(|s| (s.created_at(), s.id()));
        Ok(sheets)
    }

    // =========================================================================
    // Rendered documents
    // =========================================================================

    async fn save_sheet_document(
        &mut self,
        turn_sheet_id: TurnSheetId,
        pdf: &[u8],
    ) -> Result<(), RepoError> {
        self.get_turn_sheet(turn_sheet_id).await?;
        let pdf = pdf.to_vec();
        self.write(move |state| {
            state.documents.insert(turn_sheet_id, pdf.clone());
            Ok(())
        })
    }

    async fn get_sheet_document(
        &mut self,
        turn_sheet_id: TurnSheetId,
    ) -> Result<Option<Vec<u8>>, RepoError> {
        self.get_turn_sheet(turn_sheet_id).await?;
        Ok(self.working.documents.get(&turn_sheet_id).cloned())
    }

    // =========================================================================
    // Join submissions
    // =========================================================================

    async fn save_join_submission(
        &mut self,
        submission: &JoinSubmission,
    ) -> Result<(), RepoError> {
        self.require_game(submission.game_id)?;
        let submission = submission.clone();
        self.write(move |state| {
            state
                .join_submissions
                .insert(submission.id, submission.clone());
            Ok(())
        })
    }

    async fn get_join_submission(
        &mut self,
        id: JoinSubmissionId,
    ) -> Result<JoinSubmission, RepoError> {
        self.working
            .join_submissions
            .get(&id)
            .filter(|s| self.scope.can_see(s.game_id))
            .cloned()
            .ok_or_else(|| RepoError::not_found("JoinSubmission", id))
    }

    async fn list_received_join_submissions(
        &mut self,
        before: DateTime<Utc>,
    ) -> Result<Vec<JoinSubmission>, RepoError> {
        let mut received: Vec<JoinSubmission> = self
            .working
            .join_submissions
            .values()
            .filter(|s| {
                s.status == JoinSubmissionStatus::Received
                    && s.created_at <= before
                    && self.scope.can_see(s.game_id)
            })
            .cloned()
            .collect();
        received.sort_by_key(|s| (s.created_at, s.id));
        Ok(received)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let mut state = self.shared.state()?;
        let mut next = state.clone();
        for write in &self.writes {
            write(&mut next)?;
        }
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use playbymail_domain::GameName;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    async fn seeded() -> (MemoryStore, Game, GameInstance) {
        let store = MemoryStore::new();
        let game = Game::new(GameName::new("Hollow Keep").unwrap(), now());
        let manager = Subscription::new(game.id, AccountId::new(), SubscriptionKind::Manager, now());
        let instance = GameInstance::new(&game, manager.id, now());

        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        tx.save_game(&game).await.unwrap();
        tx.save_subscription(&manager).await.unwrap();
        tx.save_instance(&instance).await.unwrap();
        tx.commit().await.unwrap();
        (store, game, instance)
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let (store, game, _) = seeded().await;
        let mut renamed = game.clone();
        renamed.name = GameName::new("Renamed").unwrap();

        {
            let mut tx = store.begin(&AccessScope::System).await.unwrap();
            tx.save_game(&renamed).await.unwrap();
            assert_eq!(tx.get_game(game.id).await.unwrap().name, renamed.name);
        }

        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        assert_eq!(tx.get_game(game.id).await.unwrap().name, game.name);
    }

    #[tokio::test]
    async fn rows_of_other_games_read_as_absent() {
        let (store, game, instance) = seeded().await;
        let outsider = AccessScope::for_account(AccountId::new(), &[]);

        let mut tx = store.begin(&outsider).await.unwrap();
        assert!(tx.get_game(game.id).await.unwrap_err().is_not_found());
        assert!(tx.get_instance(instance.id()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn instance_lock_is_exclusive_until_the_holder_ends() {
        let (store, _, instance) = seeded().await;

        let mut first = store.begin(&AccessScope::System).await.unwrap();
        first.lock_instance(instance.id()).await.unwrap();

        let mut second = store.begin(&AccessScope::System).await.unwrap();
        let err = second.lock_instance(instance.id()).await.unwrap_err();
        assert!(err.is_busy());

        drop(first);
        second.lock_instance(instance.id()).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_sheet_slot_is_a_constraint_violation() {
        let (store, _, instance) = seeded().await;
        let account = AccountId::new();
        let sheet = |n| {
            TurnSheet::pending(
                instance.id(),
                account,
                None,
                SheetType::LocationChoice,
                n,
                serde_json::json!({}),
                now(),
            )
        };

        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        tx.insert_turn_sheet(&sheet(1)).await.unwrap();
        let err = tx.insert_turn_sheet(&sheet(1)).await.unwrap_err();
        assert!(matches!(err, RepoError::ConstraintViolation(_)));
        tx.insert_turn_sheet(&sheet(2)).await.unwrap();
    }

    #[tokio::test]
    async fn printed_codes_are_unique_and_resolve_within_scope() {
        let (store, _, instance) = seeded().await;
        let sheet = TurnSheet::pending(
            instance.id(),
            AccountId::new(),
            None,
            SheetType::LocationChoice,
            1,
            serde_json::json!({}),
            now(),
        );
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        tx.insert_turn_sheet(&sheet).await.unwrap();

        let mut twin = playbymail_domain::TurnSheetRecord::from(&sheet);
        twin.id = TurnSheetId::new();
        twin.turn_number = 2;
        let err = tx
            .insert_turn_sheet(&TurnSheet::try_from(twin).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::ConstraintViolation(_)));
        tx.commit().await.unwrap();

        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let found = tx.find_turn_sheet_by_code(sheet.code()).await.unwrap();
        assert_eq!(found.map(|s| s.id()), Some(sheet.id()));
        let manager = tx.get_subscription(instance.manager_subscription_id()).await.unwrap();
        let by_code = tx
            .find_manager_by_join_code(manager.join_code.unwrap())
            .await
            .unwrap();
        assert_eq!(by_code.map(|s| s.id), Some(manager.id));
        assert!(tx
            .find_turn_sheet_by_code(playbymail_domain::SheetToken::PLACEHOLDER)
            .await
            .unwrap()
            .is_none());

        let outsider = AccessScope::for_account(AccountId::new(), &[]);
        let mut tx = store.begin(&outsider).await.unwrap();
        assert!(tx.find_turn_sheet_by_code(sheet.code()).await.unwrap().is_none());
        assert!(tx
            .find_manager_by_join_code(manager.join_code.unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn sweeps_see_only_stale_pending_sheets_of_started_instances() {
        let (store, game, instance) = seeded().await;
        let mut started = instance.clone();
        started.start(now()).unwrap();
        let sheet = TurnSheet::pending(
            instance.id(),
            AccountId::new(),
            None,
            SheetType::LocationChoice,
            1,
            serde_json::json!({}),
            now(),
        );
        let submission = JoinSubmission::received(
            game.id,
            instance.manager_subscription_id(),
            playbymail_domain::JoinAnswers {
                name: "Grace".to_string(),
                email: "grace@example.org".to_string(),
                postal_address: "1 Harbour Row".to_string(),
            },
            playbymail_domain::ScanQuality::clamped(0.9),
            "aa".to_string(),
            now(),
        );
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        tx.insert_turn_sheet(&sheet).await.unwrap();
        tx.save_join_submission(&submission).await.unwrap();
        tx.commit().await.unwrap();

        let earlier = now() - chrono::Duration::seconds(1);
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        // Still `created`, so nothing is due for printing yet.
        assert!(tx.list_unprinted_sheets(now()).await.unwrap().is_empty());
        assert!(tx.list_received_join_submissions(earlier).await.unwrap().is_empty());
        assert_eq!(
            tx.list_received_join_submissions(now()).await.unwrap().len(),
            1
        );

        tx.save_instance(&started).await.unwrap();
        assert!(tx.list_unprinted_sheets(earlier).await.unwrap().is_empty());
        let due = tx.list_unprinted_sheets(now()).await.unwrap();
        assert_eq!(due.iter().map(|s| s.id()).collect::<Vec<_>>(), vec![sheet.id()]);
    }

    #[tokio::test]
    async fn locking_reloads_rows_committed_since_begin() {
        let (store, _, instance) = seeded().await;
        let mut sheet = TurnSheet::pending(
            instance.id(),
            AccountId::new(),
            None,
            SheetType::LocationChoice,
            1,
            serde_json::json!({}),
            now(),
        );
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        tx.insert_turn_sheet(&sheet).await.unwrap();
        tx.commit().await.unwrap();

        let mut stale = store.begin(&AccessScope::System).await.unwrap();

        sheet.mark_printed(now()).unwrap();
        let mut writer = store.begin(&AccessScope::System).await.unwrap();
        writer.save_turn_sheet(&sheet).await.unwrap();
        writer.commit().await.unwrap();

        let locked = stale.lock_turn_sheet(sheet.id()).await.unwrap();
        assert_eq!(locked.status(), playbymail_domain::ProcessingStatus::Printed);
    }

    #[tokio::test]
    async fn image_upsert_keeps_one_row_per_slot() {
        let (store, game, _) = seeded().await;
        let image = |bytes: Vec<u8>| GameImage {
            id: GameImageId::new(),
            game_id: game.id,
            record_id: None,
            sheet_type: SheetType::LocationChoice,
            mime_type: playbymail_domain::MimeType::Png,
            width: 2550,
            height: 3300,
            file_size: bytes.len() as u32,
            bytes,
            created_at: now(),
            updated_at: now(),
        };

        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let first = tx.upsert_image(&image(vec![1])).await.unwrap();
        let second = tx.upsert_image(&image(vec![2])).await.unwrap();
        assert_eq!(first.id, second.id);
        let found = tx
            .find_image(game.id, SheetType::LocationChoice, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.bytes, vec![2]);
    }
}
