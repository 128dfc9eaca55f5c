//! Turn sheets: issuing a new turn's sheets and reading them back.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use playbymail_domain::{
    world::location_choice_sheet_data, AuthoredWorld, DomainError, GameId, GameInstance,
    GameInstanceId, LiveWorld, LocationChoiceLayout, SheetType, SubscriptionKind, TurnSheet,
    TurnSheetId,
};

use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::ports::{RepoError, Store, StoreTx};
use crate::use_cases::context::{AccessError, RequestContext};
use crate::use_cases::error::{access_reason, repo_reason, ErrorKind};
use crate::use_cases::instances::load_instance;
use crate::use_cases::templates::{resolve_snapshot, TemplateError};

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Cannot build sheet data: {0}")]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl IssueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Template(e) => e.kind(),
            Self::Domain(_) => ErrorKind::Internal,
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Template(e) => e.reason(),
            Self::Domain(_) => "Internal",
            Self::Repo(e) => repo_reason(e),
        }
    }
}

/// Create a `pending` location choice sheet for every active character.
///
/// Layouts come from the instance's snapshots: the snapshot for the
/// character's location if one was captured, else the game-level one.
pub(crate) async fn issue_turn_sheets(
    tx: &mut dyn StoreTx,
    cache: &SnapshotCache,
    world: &AuthoredWorld,
    live: &LiveWorld,
    instance: &GameInstance,
    now: DateTime<Utc>,
) -> Result<Vec<TurnSheet>, IssueError> {
    let turn = instance.current_turn();
    let mut issued = Vec::new();

    for character in live.active_characters() {
        let location = live
            .location_instance(character.location_instance_id)
            .ok_or_else(|| {
                DomainError::not_found(
                    "LocationInstance",
                    character.location_instance_id.to_string(),
                )
            })?;
        let snapshot = resolve_snapshot(
            tx,
            cache,
            instance.id(),
            SheetType::LocationChoice,
            Some(location.location_id.to_uuid()),
        )
        .await?;
        let layout = LocationChoiceLayout::from_json(&snapshot.layout)?;

        let name = tx
            .find_character(instance.game_id(), character.account_id)
            .await?
            .map(|c| c.name.to_string())
            .ok_or_else(|| RepoError::not_found("Character", character.account_id))?;
        let data = location_choice_sheet_data(world, live, character, &name, &layout)?;

        let sheet = TurnSheet::pending(
            instance.id(),
            character.account_id,
            Some(character.id),
            SheetType::LocationChoice,
            turn,
            data.to_json(),
            now,
        );
        tx.insert_turn_sheet(&sheet).await?;
        issued.push(sheet);
    }

    tracing::info!(
        instance_id = %instance.id(),
        turn,
        sheets = issued.len(),
        "Issued turn sheets"
    );
    Ok(issued)
}

/// Load a turn sheet of `instance_id` the caller may see.
///
/// Managers see every sheet of their game; players only their own. Anything
/// else reads as missing.
pub(crate) async fn load_visible_sheet(
    tx: &mut dyn StoreTx,
    ctx: &RequestContext,
    game_id: GameId,
    instance_id: GameInstanceId,
    turn_sheet_id: TurnSheetId,
) -> Result<TurnSheet, RepoError> {
    load_instance(tx, game_id, instance_id).await?;
    let sheet = tx.get_turn_sheet(turn_sheet_id).await?;
    let own = ctx.scope.account_id() == Some(sheet.account_id());
    if sheet.game_instance_id() != instance_id
        || !(own || ctx.scope.has_any(game_id, &[SubscriptionKind::Manager]))
    {
        return Err(RepoError::not_found("TurnSheet", turn_sheet_id));
    }
    Ok(sheet)
}

#[derive(Debug, thiserror::Error)]
pub enum SheetQueryError {
    #[error("Turn sheet {0} has not been rendered yet")]
    NotRendered(TurnSheetId),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl SheetQueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotRendered(_) => ErrorKind::NotFound,
            Self::Access(e) => ErrorKind::of_access(e),
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotRendered(_) => "NotRendered",
            Self::Access(e) => access_reason(e),
            Self::Repo(e) => repo_reason(e),
        }
    }
}

pub struct TurnSheetQueries {
    store: Arc<dyn Store>,
}

impl TurnSheetQueries {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        instance_id: GameInstanceId,
        turn_sheet_id: TurnSheetId,
    ) -> Result<TurnSheet, SheetQueryError> {
        if !ctx.scope.can_see(game_id) {
            return Err(AccessError::NotVisible(game_id).into());
        }
        let mut tx = self.store.begin(&ctx.scope).await?;
        Ok(load_visible_sheet(tx.as_mut(), ctx, game_id, instance_id, turn_sheet_id).await?)
    }

    /// The rendered PDF of a sheet.
    pub async fn document(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        instance_id: GameInstanceId,
        turn_sheet_id: TurnSheetId,
    ) -> Result<Vec<u8>, SheetQueryError> {
        if !ctx.scope.can_see(game_id) {
            return Err(AccessError::NotVisible(game_id).into());
        }
        let mut tx = self.store.begin(&ctx.scope).await?;
        load_visible_sheet(tx.as_mut(), ctx, game_id, instance_id, turn_sheet_id).await?;
        tx.get_sheet_document(turn_sheet_id)
            .await?
            .ok_or(SheetQueryError::NotRendered(turn_sheet_id))
    }
}
