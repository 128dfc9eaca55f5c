//! Sheet template registry.
//!
//! Templates are keyed by `(game, sheet type, optional record)`. Drafts are
//! resolved for previews; running instances read the snapshot captured when
//! they started.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use playbymail_domain::{
    DomainError, GameId, GameInstanceId, JoinGameLayout, LocationChoiceLayout, LocationId,
    SheetTemplate, SheetType, SubscriptionKind, TemplateSnapshot,
};

use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::ports::{ClockPort, RepoError, Store, StoreTx};
use crate::use_cases::context::{AccessError, RequestContext};
use crate::use_cases::error::{access_reason, repo_reason, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Invalid layout: {0}")]
    InvalidLayout(DomainError),
    #[error("Game {0} is published and its templates can no longer change")]
    GameNotEditable(GameId),
    #[error("Location {0} is not part of the game")]
    UnknownRecord(Uuid),
    #[error("No {sheet_type} template for record {record_id:?}")]
    NoTemplate {
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    },
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl TemplateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLayout(_) => ErrorKind::BadRequest,
            Self::GameNotEditable(_) => ErrorKind::Conflict,
            Self::UnknownRecord(_) | Self::NoTemplate { .. } => ErrorKind::NotFound,
            Self::Access(e) => ErrorKind::of_access(e),
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidLayout(_) => "InvalidLayout",
            Self::GameNotEditable(_) => "GameNotEditable",
            Self::UnknownRecord(_) => "NotFound",
            Self::NoTemplate { .. } => "NoTemplate",
            Self::Access(e) => access_reason(e),
            Self::Repo(e) => repo_reason(e),
        }
    }
}

/// Check a layout parses for its sheet type.
///
/// Inventory layouts are stored opaquely; they only need to be objects.
pub fn validate_layout(sheet_type: SheetType, layout: &serde_json::Value) -> Result<(), DomainError> {
    match sheet_type {
        SheetType::LocationChoice => LocationChoiceLayout::from_json(layout).map(|_| ()),
        SheetType::JoinGame => JoinGameLayout::from_json(layout).map(|_| ()),
        SheetType::InventoryManagement if layout.is_object() => Ok(()),
        SheetType::InventoryManagement => Err(DomainError::validation(
            "Inventory layout must be a JSON object",
        )),
    }
}

/// Resolve a draft template: exact record, then the game-level row.
pub(crate) async fn resolve_draft(
    tx: &mut dyn StoreTx,
    game_id: GameId,
    sheet_type: SheetType,
    record_id: Option<Uuid>,
) -> Result<SheetTemplate, TemplateError> {
    if record_id.is_some() {
        if let Some(template) = tx.find_template(game_id, sheet_type, record_id).await? {
            return Ok(template);
        }
    }
    tx.find_template(game_id, sheet_type, None)
        .await?
        .ok_or(TemplateError::NoTemplate {
            sheet_type,
            record_id,
        })
}

/// Resolve the snapshot a running instance renders with.
///
/// Snapshots never change after start, so hits are served from the cache.
pub(crate) async fn resolve_snapshot(
    tx: &mut dyn StoreTx,
    cache: &SnapshotCache,
    instance_id: GameInstanceId,
    sheet_type: SheetType,
    record_id: Option<Uuid>,
) -> Result<TemplateSnapshot, TemplateError> {
    let mut candidates = vec![None];
    if record_id.is_some() {
        candidates.insert(0, record_id);
    }

    for candidate in candidates {
        if let Some(snapshot) = cache.get(instance_id, sheet_type, candidate) {
            return Ok(snapshot);
        }
        if let Some(snapshot) = tx
            .find_template_snapshot(instance_id, sheet_type, candidate)
            .await?
        {
            cache.insert(snapshot.clone());
            return Ok(snapshot);
        }
    }

    Err(TemplateError::NoTemplate {
        sheet_type,
        record_id,
    })
}

/// Freeze every template of a game for one instance.
pub(crate) fn capture_snapshots(
    templates: &[SheetTemplate],
    instance_id: GameInstanceId,
    now: DateTime<Utc>,
) -> Vec<TemplateSnapshot> {
    templates
        .iter()
        .map(|template| template.snapshot(instance_id, now))
        .collect()
}

pub struct SheetTemplates {
    store: Arc<dyn Store>,
    clock: Arc<dyn ClockPort>,
}

impl SheetTemplates {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn ClockPort>) -> Self {
        Self { store, clock }
    }

    /// Create or replace the template in one slot.
    pub async fn put(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
        layout: serde_json::Value,
    ) -> Result<SheetTemplate, TemplateError> {
        ctx.require(game_id, &[SubscriptionKind::Designer], "edit a template")?;
        validate_layout(sheet_type, &layout).map_err(TemplateError::InvalidLayout)?;

        let mut tx = self.store.begin(&ctx.scope).await?;
        let game = tx.get_game(game_id).await?;
        if game.is_published() {
            return Err(TemplateError::GameNotEditable(game_id));
        }
        if let Some(record) = record_id {
            let world = tx.load_world(game_id).await?;
            if world.location(LocationId::from(record)).is_none() {
                return Err(TemplateError::UnknownRecord(record));
            }
        }

        let stored = tx
            .save_template(&SheetTemplate::new(
                game_id,
                sheet_type,
                record_id,
                layout,
                self.clock.now(),
            ))
            .await?;
        tx.commit().await?;

        tracing::info!(
            game_id = %game_id,
            sheet_type = %sheet_type,
            record_id = ?record_id,
            template_id = %stored.id,
            "Saved sheet template"
        );
        Ok(stored)
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
    ) -> Result<Vec<SheetTemplate>, TemplateError> {
        ctx.require(
            game_id,
            &[SubscriptionKind::Designer, SubscriptionKind::Manager],
            "list templates",
        )?;
        let mut tx = self.store.begin(&ctx.scope).await?;
        Ok(tx.list_templates(game_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::AccessScope;
    use crate::test_fixtures::{location_choice_layout, t0, Seeded};
    use serde_json::json;

    #[tokio::test]
    async fn test_put_validates_layout_for_its_type() {
        let seeded = Seeded::new().await;
        let templates = SheetTemplates::new(seeded.store(), seeded.clock());

        let err = templates
            .put(
                &seeded.owner_ctx(),
                seeded.game.id,
                SheetType::LocationChoice,
                None,
                json!({ "max_options": 2 }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = templates
            .put(
                &seeded.owner_ctx(),
                seeded.game.id,
                SheetType::JoinGame,
                None,
                location_choice_layout(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidLayout(_)));
    }

    #[tokio::test]
    async fn test_put_replaces_the_slot() {
        let seeded = Seeded::new().await;
        let templates = SheetTemplates::new(seeded.store(), seeded.clock());
        let ctx = seeded.owner_ctx();
        let location = seeded.cave_mouth().id.to_uuid();

        let first = templates
            .put(&ctx, seeded.game.id, SheetType::LocationChoice, Some(location), location_choice_layout())
            .await
            .unwrap();
        let mut layout = location_choice_layout();
        layout["max_options"] = json!(2);
        let second = templates
            .put(&ctx, seeded.game.id, SheetType::LocationChoice, Some(location), layout)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let listed = templates.list(&ctx, seeded.game.id).await.unwrap();
        // Two game-level fixtures plus the location override
        assert_eq!(listed.len(), 3);
    }

    #[tokio::test]
    async fn test_published_game_rejects_template_edits() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let templates = SheetTemplates::new(seeded.store(), seeded.clock());

        let err = templates
            .put(
                &seeded.owner_ctx(),
                seeded.game.id,
                SheetType::LocationChoice,
                None,
                location_choice_layout(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "GameNotEditable");
    }

    #[tokio::test]
    async fn test_draft_resolution_falls_back_to_game_level() {
        let seeded = Seeded::new().await;
        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let location = seeded.cave_mouth().id.to_uuid();

        let resolved = resolve_draft(tx.as_mut(), seeded.game.id, SheetType::LocationChoice, Some(location))
            .await
            .unwrap();
        assert_eq!(resolved.record_id, None);

        let err = resolve_draft(tx.as_mut(), seeded.game.id, SheetType::InventoryManagement, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TemplateError::NoTemplate { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_resolution_prefers_exact_and_caches() {
        let seeded = Seeded::new().await;
        let store = seeded.store();
        let instance = seeded.create_instance().await;
        let location = seeded.cave_mouth().id.to_uuid();
        let cache = SnapshotCache::new();

        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let mut templates = tx.list_templates(seeded.game.id).await.unwrap();
        templates.push(SheetTemplate::new(
            seeded.game.id,
            SheetType::LocationChoice,
            Some(location),
            location_choice_layout(),
            t0(),
        ));
        tx.save_template_snapshots(&capture_snapshots(&templates, instance.id(), t0()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let exact = resolve_snapshot(tx.as_mut(), &cache, instance.id(), SheetType::LocationChoice, Some(location))
            .await
            .unwrap();
        assert_eq!(exact.record_id, Some(location));

        let other = seeded.location("Great Hall").id.to_uuid();
        let fallback = resolve_snapshot(tx.as_mut(), &cache, instance.id(), SheetType::LocationChoice, Some(other))
            .await
            .unwrap();
        assert_eq!(fallback.record_id, None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_inventory_layouts_only_need_an_object() {
        assert!(validate_layout(SheetType::InventoryManagement, &json!({ "slots": 6 })).is_ok());
        assert!(validate_layout(SheetType::InventoryManagement, &json!([1, 2])).is_err());
    }
}
