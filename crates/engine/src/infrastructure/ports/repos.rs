//! Store port: a unit of work over every persisted row.
//!
//! A transaction is opened for one [`AccessScope`]. Game-owned rows outside
//! the scope are indistinguishable from absent rows. Dropping a transaction
//! without calling [`StoreTx::commit`] rolls it back.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use playbymail_domain::{
    AccountId, AuthoredWorld, Character, Game, GameId, GameImage, GameInstance, GameInstanceId,
    JoinSubmission, JoinSubmissionId, LiveWorld, SheetTemplate, SheetToken, SheetType,
    Subscription, SubscriptionId, SubscriptionKind, TemplateSnapshot, TurnSheet, TurnSheetId,
};

use super::error::RepoError;

// =============================================================================
// Access scope
// =============================================================================

/// The rows a transaction may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// Background workers see everything.
    System,
    /// An authenticated account sees the games it is subscribed to.
    Account {
        account_id: AccountId,
        games: HashMap<GameId, HashSet<SubscriptionKind>>,
    },
}

impl AccessScope {
    /// Build an account scope from the account's subscriptions.
    pub fn for_account(account_id: AccountId, subscriptions: &[Subscription]) -> Self {
        let mut games: HashMap<GameId, HashSet<SubscriptionKind>> = HashMap::new();
        for subscription in subscriptions
            .iter()
            .filter(|s| s.account_id == account_id)
        {
            games
                .entry(subscription.game_id)
                .or_default()
                .insert(subscription.kind);
        }
        Self::Account { account_id, games }
    }

    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::System => None,
            Self::Account { account_id, .. } => Some(*account_id),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    /// Whether rows of `game_id` are visible.
    pub fn can_see(&self, game_id: GameId) -> bool {
        match self {
            Self::System => true,
            Self::Account { games, .. } => games.contains_key(&game_id),
        }
    }

    /// Whether the caller holds any of `kinds` on `game_id`.
    pub fn has_any(&self, game_id: GameId, kinds: &[SubscriptionKind]) -> bool {
        match self {
            Self::System => true,
            Self::Account { games, .. } => games
                .get(&game_id)
                .is_some_and(|held| kinds.iter().any(|k| held.contains(k))),
        }
    }

    /// Register a game the caller just created.
    pub fn grant(&mut self, game_id: GameId, kind: SubscriptionKind) {
        if let Self::Account { games, .. } = self {
            games.entry(game_id).or_default().insert(kind);
        }
    }
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction restricted to `scope`.
    async fn begin(&self, scope: &AccessScope) -> Result<Box<dyn StoreTx>, RepoError>;
}

#[async_trait]
pub trait StoreTx: Send {
    // Games and authored content
    async fn get_game(&mut self, id: GameId) -> Result<Game, RepoError>;
    async fn save_game(&mut self, game: &Game) -> Result<(), RepoError>;
    /// Replace every authored row of the world's game.
    async fn save_world(&mut self, world: &AuthoredWorld) -> Result<(), RepoError>;
    async fn load_world(&mut self, game_id: GameId) -> Result<AuthoredWorld, RepoError>;
    async fn save_character(&mut self, character: &Character) -> Result<(), RepoError>;
    async fn find_character(
        &mut self,
        game_id: GameId,
        account_id: AccountId,
    ) -> Result<Option<Character>, RepoError>;

    // Subscriptions
    async fn save_subscription(&mut self, subscription: &Subscription) -> Result<(), RepoError>;
    async fn get_subscription(&mut self, id: SubscriptionId) -> Result<Subscription, RepoError>;
    /// The manager subscription whose join sheets print `code`.
    async fn find_manager_by_join_code(
        &mut self,
        code: SheetToken,
    ) -> Result<Option<Subscription>, RepoError>;
    async fn list_account_subscriptions(
        &mut self,
        account_id: AccountId,
    ) -> Result<Vec<Subscription>, RepoError>;
    /// Player subscriptions bound to an instance, oldest first.
    async fn list_instance_players(
        &mut self,
        instance_id: GameInstanceId,
    ) -> Result<Vec<Subscription>, RepoError>;

    // Game instances
    async fn save_instance(&mut self, instance: &GameInstance) -> Result<(), RepoError>;
    async fn get_instance(&mut self, id: GameInstanceId) -> Result<GameInstance, RepoError>;
    /// Take the instance-level advisory lock for the rest of the transaction.
    ///
    /// Fails with [`RepoError::Busy`] instead of waiting.
    async fn lock_instance(&mut self, id: GameInstanceId) -> Result<(), RepoError>;
    /// Instances opened by a manager subscription, oldest first.
    async fn list_manager_instances(
        &mut self,
        manager_subscription_id: SubscriptionId,
    ) -> Result<Vec<GameInstance>, RepoError>;
    /// Started instances whose turn deadline is at or before `now`.
    async fn list_overdue_instances(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<GameInstance>, RepoError>;

    // Live world
    async fn save_live_world(
        &mut self,
        instance_id: GameInstanceId,
        live: &LiveWorld,
    ) -> Result<(), RepoError>;
    async fn load_live_world(&mut self, instance_id: GameInstanceId)
        -> Result<LiveWorld, RepoError>;

    // Sheet templates
    /// Upsert by `(game_id, sheet_type, record_id)`.
    async fn save_template(&mut self, template: &SheetTemplate) -> Result<SheetTemplate, RepoError>;
    /// Exact lookup; a `None` record id matches only the game-level row.
    async fn find_template(
        &mut self,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<SheetTemplate>, RepoError>;
    async fn list_templates(&mut self, game_id: GameId) -> Result<Vec<SheetTemplate>, RepoError>;
    async fn save_template_snapshots(
        &mut self,
        snapshots: &[TemplateSnapshot],
    ) -> Result<(), RepoError>;
    async fn find_template_snapshot(
        &mut self,
        instance_id: GameInstanceId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<TemplateSnapshot>, RepoError>;

    // Game images
    /// Upsert by `(game_id, record_id, sheet_type)`; returns the stored row.
    async fn upsert_image(&mut self, image: &GameImage) -> Result<GameImage, RepoError>;
    /// Exact lookup; a `None` record id matches only the game-level row.
    async fn find_image(
        &mut self,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<GameImage>, RepoError>;

    // Turn sheets
    /// Fails with a constraint violation when the
    /// `(instance, account, turn, sheet_type)` slot or the printed code is taken.
    async fn insert_turn_sheet(&mut self, sheet: &TurnSheet) -> Result<(), RepoError>;
    async fn save_turn_sheet(&mut self, sheet: &TurnSheet) -> Result<(), RepoError>;
    async fn get_turn_sheet(&mut self, id: TurnSheetId) -> Result<TurnSheet, RepoError>;
    /// The sheet whose printed code carries `code`.
    async fn find_turn_sheet_by_code(
        &mut self,
        code: SheetToken,
    ) -> Result<Option<TurnSheet>, RepoError>;
    /// Load the sheet under a row lock that does not wait.
    ///
    /// Fails with [`RepoError::Busy`] when another transaction holds it.
    async fn lock_turn_sheet(&mut self, id: TurnSheetId) -> Result<TurnSheet, RepoError>;
    async fn list_turn_sheets(
        &mut self,
        instance_id: GameInstanceId,
        turn_number: u32,
    ) -> Result<Vec<TurnSheet>, RepoError>;
    /// Pending sheets of started instances created at or before `before`.
    async fn list_unprinted_sheets(
        &mut self,
        before: DateTime<Utc>,
    ) -> Result<Vec<TurnSheet>, RepoError>;

    // Rendered documents
    async fn save_sheet_document(
        &mut self,
        turn_sheet_id: TurnSheetId,
        pdf: &[u8],
    ) -> Result<(), RepoError>;
    async fn get_sheet_document(
        &mut self,
        turn_sheet_id: TurnSheetId,
    ) -> Result<Option<Vec<u8>>, RepoError>;

    // Join submissions
    async fn save_join_submission(&mut self, submission: &JoinSubmission)
        -> Result<(), RepoError>;
    async fn get_join_submission(
        &mut self,
        id: JoinSubmissionId,
    ) -> Result<JoinSubmission, RepoError>;
    /// Submissions still `received` that arrived at or before `before`.
    async fn list_received_join_submissions(
        &mut self,
        before: DateTime<Utc>,
    ) -> Result<Vec<JoinSubmission>, RepoError>;

    /// Make every write of this transaction visible.
    async fn commit(self: Box<Self>) -> Result<(), RepoError>;
}
