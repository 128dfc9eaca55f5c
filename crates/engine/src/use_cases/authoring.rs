//! Game authoring: creating games, importing their worlds and publishing.
//!
//! Worlds are replaced whole. Caller-chosen ids in the document become the
//! row ids so templates and backgrounds can reference locations by them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use playbymail_domain::{
    AuthoredWorld, Creature, CreatureName, CreaturePlacement, Description, Disposition,
    DomainError, Game, GameId, GameName, Item, ItemName, ItemPlacement, LinkName,
    LinkRequirement, Location, LocationLink, LocationName, RequirementKind, SpawnChance,
    Subscription, SubscriptionKind,
};
use playbymail_shared::{RequirementData, WorldDocument};

use crate::infrastructure::ports::{ClockPort, RepoError, Store};
use crate::use_cases::context::{AccessError, RequestContext};
use crate::use_cases::error::{access_reason, repo_reason, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum AuthoringError {
    #[error("Invalid game: {0}")]
    Invalid(DomainError),
    #[error("Document references unknown {entity} {id}")]
    UnknownReference { entity: &'static str, id: Uuid },
    #[error("Game {0} is published and its world can no longer change")]
    GameNotEditable(GameId),
    #[error("Only an account can create games")]
    NoAccount,
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<DomainError> for AuthoringError {
    fn from(err: DomainError) -> Self {
        Self::Invalid(err)
    }
}

impl AuthoringError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid(_) | Self::UnknownReference { .. } => ErrorKind::BadRequest,
            Self::GameNotEditable(_) => ErrorKind::Conflict,
            Self::NoAccount => ErrorKind::Unauthorized,
            Self::Access(e) => ErrorKind::of_access(e),
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "InvalidGame",
            Self::UnknownReference { .. } => "UnknownReference",
            Self::GameNotEditable(_) => "GameNotEditable",
            Self::NoAccount => "Unauthorized",
            Self::Access(e) => access_reason(e),
            Self::Repo(e) => repo_reason(e),
        }
    }
}

/// Input for [`GameAuthoring::create`].
#[derive(Debug, Clone)]
pub struct NewGame {
    pub name: String,
    pub description: String,
    pub turn_duration_hours: Option<u32>,
    pub turn_limit: Option<u32>,
}

/// A freshly created game and the subscriptions minted for its creator.
#[derive(Debug, Clone)]
pub struct CreatedGame {
    pub game: Game,
    pub designer: Subscription,
    pub manager: Subscription,
}

/// Row counts of an imported world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub locations: usize,
    pub links: usize,
    pub requirements: usize,
    pub creatures: usize,
    pub items: usize,
    pub placements: usize,
}

pub struct GameAuthoring {
    store: Arc<dyn Store>,
    clock: Arc<dyn ClockPort>,
}

impl GameAuthoring {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn ClockPort>) -> Self {
        Self { store, clock }
    }

    /// Create a draft game; the caller becomes its designer and manager.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: NewGame,
    ) -> Result<CreatedGame, AuthoringError> {
        let account_id = ctx.scope.account_id().ok_or(AuthoringError::NoAccount)?;
        let now = self.clock.now();

        let mut game = Game::new(GameName::new(input.name)?, now);
        game.description = Description::new(input.description)?;
        if let Some(hours) = input.turn_duration_hours {
            if hours == 0 {
                return Err(DomainError::validation("Turn duration must be at least one hour").into());
            }
            game = game.with_turn_duration_hours(hours);
        }
        if let Some(limit) = input.turn_limit {
            if limit == 0 {
                return Err(DomainError::validation("Turn limit must be at least one").into());
            }
            game = game.with_turn_limit(limit);
        }
        let [designer, manager] = Subscription::minted_for_creator(game.id, account_id, now);

        let mut scope = ctx.scope.clone();
        scope.grant(game.id, SubscriptionKind::Designer);
        scope.grant(game.id, SubscriptionKind::Manager);
        let mut tx = self.store.begin(&scope).await?;
        tx.save_game(&game).await?;
        tx.save_subscription(&designer).await?;
        tx.save_subscription(&manager).await?;
        tx.commit().await?;

        tracing::info!(game_id = %game.id, account_id = %account_id, name = %game.name, "Game created");
        Ok(CreatedGame {
            game,
            designer,
            manager,
        })
    }

    pub async fn get(&self, ctx: &RequestContext, game_id: GameId) -> Result<Game, AuthoringError> {
        if !ctx.scope.can_see(game_id) {
            return Err(AccessError::NotVisible(game_id).into());
        }
        let mut tx = self.store.begin(&ctx.scope).await?;
        Ok(tx.get_game(game_id).await?)
    }

    /// Replace the authored world of a draft game.
    pub async fn import_world(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        document: &WorldDocument,
    ) -> Result<ImportSummary, AuthoringError> {
        ctx.require(game_id, &[SubscriptionKind::Designer], "import a world")?;
        let mut tx = self.store.begin(&ctx.scope).await?;
        let game = tx.get_game(game_id).await?;
        if game.is_published() {
            return Err(AuthoringError::GameNotEditable(game_id));
        }

        let world = world_from_document(game, document, self.clock.now())?;
        world.validate()?;
        let summary = ImportSummary {
            locations: world.locations.len(),
            links: world.links.len(),
            requirements: world.requirements.len(),
            creatures: world.creatures.len(),
            items: world.items.len(),
            placements: world.creature_placements.len() + world.item_placements.len(),
        };
        tx.save_world(&world).await?;
        tx.commit().await?;

        tracing::info!(
            game_id = %game_id,
            locations = summary.locations,
            links = summary.links,
            placements = summary.placements,
            "World imported"
        );
        Ok(summary)
    }

    /// One-way `draft -> published`. Publishing twice is a no-op.
    pub async fn publish(&self, ctx: &RequestContext, game_id: GameId) -> Result<Game, AuthoringError> {
        ctx.require(game_id, &[SubscriptionKind::Designer], "publish a game")?;
        let mut tx = self.store.begin(&ctx.scope).await?;
        let mut game = tx.get_game(game_id).await?;
        if !game.is_published() {
            game.publish(self.clock.now());
            tx.save_game(&game).await?;
            tx.commit().await?;
            tracing::info!(game_id = %game_id, "Game published");
        }
        Ok(game)
    }
}

fn world_from_document(
    game: Game,
    document: &WorldDocument,
    now: DateTime<Utc>,
) -> Result<AuthoredWorld, AuthoringError> {
    let game_id = game.id;
    let mut world = AuthoredWorld::empty(game);

    for data in &document.locations {
        let mut location = Location::new(game_id, LocationName::new(data.name.as_str())?, now)
            .with_description(Description::new(data.description.as_str())?);
        location.id = data.id.into();
        location.is_starting_location = data.is_starting_location;
        world.locations.push(location);
    }
    let locations: HashMap<Uuid, &Location> = world
        .locations
        .iter()
        .map(|l| (l.id.to_uuid(), l))
        .collect();
    let location = |id: Uuid| {
        locations
            .get(&id)
            .copied()
            .ok_or(AuthoringError::UnknownReference {
                entity: "location",
                id,
            })
    };

    for data in &document.creatures {
        let disposition: Disposition = data.disposition.parse()?;
        let mut creature = Creature::new(
            game_id,
            CreatureName::new(data.name.as_str())?,
            disposition,
            now,
        )
        .with_stats(data.max_health, data.attack_damage);
        creature.id = data.id.into();
        creature.description = Description::new(data.description.as_str())?;
        world.creatures.push(creature);
    }
    for data in &document.items {
        let mut item = Item::new(game_id, ItemName::new(data.name.as_str())?, now);
        item.id = data.id.into();
        item.description = Description::new(data.description.as_str())?;
        world.items.push(item);
    }

    let mut links = Vec::new();
    let mut requirements = Vec::new();
    for data in &document.links {
        let mut link = LocationLink::new(
            location(data.from_location_id)?,
            location(data.to_location_id)?,
            LinkName::new(data.name.as_str())?,
            now,
        )?;
        link.id = data.id.into();
        link.description = Description::new(data.description.as_str())?;
        for requirement in &data.requirements {
            let kind = match *requirement {
                RequirementData::Item { item_id, quantity } => RequirementKind::Item {
                    item_id: item_id.into(),
                    quantity,
                },
                RequirementData::CreatureAbsent { creature_id } => {
                    RequirementKind::CreatureAbsent {
                        creature_id: creature_id.into(),
                    }
                }
            };
            requirements.push(LinkRequirement::new(&link, kind, now));
        }
        links.push(link);
    }

    let mut creature_placements = Vec::new();
    for data in &document.creature_placements {
        let placement = CreaturePlacement::new(
            game_id,
            data.template_id.into(),
            location(data.location_id)?.id,
            data.quantity,
            now,
        )
        .with_chance(SpawnChance::new(data.spawn_chance)?);
        creature_placements.push(placement);
    }
    let mut item_placements = Vec::new();
    for data in &document.item_placements {
        let placement = ItemPlacement::new(
            game_id,
            data.template_id.into(),
            location(data.location_id)?.id,
            data.quantity,
            now,
        )
        .with_chance(SpawnChance::new(data.spawn_chance)?);
        item_placements.push(placement);
    }

    world.links = links;
    world.requirements = requirements;
    world.creature_placements = creature_placements;
    world.item_placements = item_placements;
    Ok(world)
}
