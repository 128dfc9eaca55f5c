//! Rendering sheets to PDF.
//!
//! Live sheets render from the instance's template snapshot; previews and
//! blank join sheets render from the draft templates of the game.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use playbymail_domain::{
    AuthoredWorld, DomainError, GameId, GameImage, GameInstanceId, JoinGameLayout,
    JoinGameSheetData, LocationChoiceLayout, LocationChoiceSheetData, LocationId,
    LocationInstanceId, LocationOption, ProcessingStatus, SheetCode, SheetToken, SheetType,
    SubscriptionId, SubscriptionKind, TurnSheetId, CHARACTER_STARTING_HEALTH,
};

use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::ports::{
    BackgroundImage, ClockPort, RenderError, RenderRequest, RendererPort, RepoError, Store,
    StoreTx,
};
use crate::use_cases::context::{AccessError, Interrupted, RequestContext};
use crate::use_cases::error::{access_reason, repo_reason, ErrorKind};
use crate::use_cases::images::find_background;
use crate::use_cases::templates::{resolve_draft, resolve_snapshot, TemplateError};

/// Character name printed on previews.
const PREVIEW_CHARACTER: &str = "Your character";

#[derive(Debug, thiserror::Error)]
pub enum RenderSheetError {
    #[error("Rendering failed: {0}")]
    RenderFailed(String),
    #[error("Renderer timed out after {0}s")]
    RenderTimeout(u64),
    #[error("Rendering cancelled")]
    Cancelled,
    #[error("Renderer unavailable: {0}")]
    RendererUnavailable(String),
    #[error("Stored sheet data is unusable: {0}")]
    SheetData(#[from] DomainError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<RenderError> for RenderSheetError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Failed(message) => Self::RenderFailed(message),
            RenderError::Timeout(secs) => Self::RenderTimeout(secs),
            RenderError::Cancelled => Self::Cancelled,
            RenderError::Unavailable(message) => Self::RendererUnavailable(message),
        }
    }
}

impl From<Interrupted> for RenderSheetError {
    fn from(interrupted: Interrupted) -> Self {
        match interrupted {
            Interrupted::TimedOut(limit) => Self::RenderTimeout(limit.as_secs()),
            Interrupted::Cancelled => Self::Cancelled,
        }
    }
}

impl RenderSheetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RenderFailed(_) | Self::RenderTimeout(_) => ErrorKind::Unprocessable,
            Self::Cancelled | Self::RendererUnavailable(_) | Self::SheetData(_) => {
                ErrorKind::Internal
            }
            Self::Template(e) => e.kind(),
            Self::Access(e) => ErrorKind::of_access(e),
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::RenderFailed(_) => "RenderFailed",
            Self::RenderTimeout(_) => "RenderTimeout",
            Self::Cancelled => "Cancelled",
            Self::RendererUnavailable(_) => "RendererUnavailable",
            Self::SheetData(_) => "Internal",
            Self::Template(e) => e.reason(),
            Self::Access(e) => access_reason(e),
            Self::Repo(e) => repo_reason(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Printed { turn_sheet_id: TurnSheetId, bytes: usize },
    /// Already printed or past printing; the job is a duplicate.
    Skipped { status: ProcessingStatus },
}

pub struct SheetRenderer {
    store: Arc<dyn Store>,
    renderer: Arc<dyn RendererPort>,
    clock: Arc<dyn ClockPort>,
    cache: Arc<SnapshotCache>,
    timeout: Duration,
}

impl SheetRenderer {
    pub fn new(
        store: Arc<dyn Store>,
        renderer: Arc<dyn RendererPort>,
        clock: Arc<dyn ClockPort>,
        cache: Arc<SnapshotCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            renderer,
            clock,
            cache,
            timeout,
        }
    }

    /// Render a pending live sheet, store its PDF and mark it printed.
    pub async fn render_sheet(
        &self,
        ctx: &RequestContext,
        turn_sheet_id: TurnSheetId,
    ) -> Result<RenderOutcome, RenderSheetError> {
        let mut tx = self.store.begin(&ctx.scope).await?;
        let mut sheet = tx.lock_turn_sheet(turn_sheet_id).await?;
        if sheet.status() != ProcessingStatus::Pending {
            return Ok(RenderOutcome::Skipped {
                status: sheet.status(),
            });
        }

        let instance = tx.get_instance(sheet.game_instance_id()).await?;
        let game_id = instance.game_id();
        let record_id = match sheet.sheet_type() {
            SheetType::LocationChoice => {
                let data = LocationChoiceSheetData::from_json(sheet.sheet_data())?;
                location_record(tx.as_mut(), instance.id(), data.location_instance_id).await?
            }
            _ => None,
        };

        let snapshot = resolve_snapshot(
            tx.as_mut(),
            &self.cache,
            instance.id(),
            sheet.sheet_type(),
            record_id,
        )
        .await?;
        let background =
            find_background(tx.as_mut(), game_id, sheet.sheet_type(), record_id).await?;

        let request = RenderRequest {
            sheet_type: sheet.sheet_type(),
            sheet_code: sheet.sheet_code().encode(),
            layout: snapshot.layout,
            sheet_data: sheet.sheet_data().clone(),
            background: background.map(to_background),
        };
        let pdf = self.render(ctx, request).await?;

        tx.save_sheet_document(turn_sheet_id, &pdf).await?;
        sheet.mark_printed(self.clock.now())?;
        tx.save_turn_sheet(&sheet).await?;
        if ctx.is_cancelled() {
            return Err(RenderSheetError::Cancelled);
        }
        tx.commit().await?;

        tracing::info!(
            turn_sheet_id = %turn_sheet_id,
            instance_id = %instance.id(),
            turn = sheet.turn_number(),
            bytes = pdf.len(),
            "Turn sheet printed"
        );
        Ok(RenderOutcome::Printed {
            turn_sheet_id,
            bytes: pdf.len(),
        })
    }

    /// Render a draft sheet with placeholder codes and sample data.
    pub async fn preview(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Vec<u8>, RenderSheetError> {
        ctx.require(
            game_id,
            &[SubscriptionKind::Designer, SubscriptionKind::Manager],
            "preview a sheet",
        )?;
        let mut tx = self.store.begin(&ctx.scope).await?;
        let template = resolve_draft(tx.as_mut(), game_id, sheet_type, record_id).await?;
        let world = tx.load_world(game_id).await?;

        let (sheet_code, sheet_data) = match sheet_type {
            SheetType::LocationChoice => {
                let layout = LocationChoiceLayout::from_json(&template.layout)?;
                let code = SheetCode::Live(SheetToken::PLACEHOLDER);
                let data = preview_location_choice(&world, record_id, &layout)?;
                (code, data.to_json())
            }
            SheetType::JoinGame => {
                let layout = JoinGameLayout::from_json(&template.layout)?;
                let code = SheetCode::Join(SheetToken::PLACEHOLDER);
                let data = JoinGameSheetData::from_layout(world.game.name.to_string(), &layout);
                (code, data.to_json())
            }
            SheetType::InventoryManagement => (
                SheetCode::Live(SheetToken::PLACEHOLDER),
                serde_json::json!({}),
            ),
        };
        let background = find_background(tx.as_mut(), game_id, sheet_type, record_id).await?;
        drop(tx);

        tracing::debug!(game_id = %game_id, sheet_type = %sheet_type, "Rendering preview");
        self.render(
            ctx,
            RenderRequest {
                sheet_type,
                sheet_code: sheet_code.encode(),
                layout: template.layout,
                sheet_data,
                background: background.map(to_background),
            },
        )
        .await
    }

    /// A blank join sheet carrying the real join code of a manager subscription.
    pub async fn join_sheet(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<u8>, RenderSheetError> {
        ctx.require(game_id, &[SubscriptionKind::Manager], "print join sheets")?;
        let mut tx = self.store.begin(&ctx.scope).await?;
        let subscription = tx.get_subscription(subscription_id).await?;
        if subscription.game_id != game_id
            || subscription.kind != SubscriptionKind::Manager
            || ctx.scope.account_id() != Some(subscription.account_id)
        {
            return Err(RepoError::not_found("Subscription", subscription_id).into());
        }
        let join_code = subscription.join_code.ok_or_else(|| {
            DomainError::constraint(format!(
                "manager subscription {} has no join code",
                subscription_id
            ))
        })?;

        let game = tx.get_game(game_id).await?;
        let template = resolve_draft(tx.as_mut(), game_id, SheetType::JoinGame, None).await?;
        let layout = JoinGameLayout::from_json(&template.layout)?;
        let background = find_background(tx.as_mut(), game_id, SheetType::JoinGame, None).await?;
        drop(tx);

        self.render(
            ctx,
            RenderRequest {
                sheet_type: SheetType::JoinGame,
                sheet_code: SheetCode::Join(join_code).encode(),
                layout: template.layout,
                sheet_data: JoinGameSheetData::from_layout(game.name.to_string(), &layout)
                    .to_json(),
                background: background.map(to_background),
            },
        )
        .await
    }

    async fn render(
        &self,
        ctx: &RequestContext,
        request: RenderRequest,
    ) -> Result<Vec<u8>, RenderSheetError> {
        let pdf = ctx
            .bounded(self.timeout, self.renderer.render(request))
            .await??;
        Ok(pdf)
    }
}

/// The authored location a live location belongs to, as a template record id.
async fn location_record(
    tx: &mut dyn StoreTx,
    instance_id: GameInstanceId,
    location_instance_id: LocationInstanceId,
) -> Result<Option<Uuid>, RepoError> {
    let live = tx.load_live_world(instance_id).await?;
    Ok(live
        .location_instance(location_instance_id)
        .map(|l| l.location_id.to_uuid()))
}

fn preview_location_choice(
    world: &AuthoredWorld,
    record_id: Option<Uuid>,
    layout: &LocationChoiceLayout,
) -> Result<LocationChoiceSheetData, DomainError> {
    let location = record_id
        .and_then(|id| world.location(LocationId::from(id)))
        .or_else(|| world.starting_locations().into_iter().next())
        .ok_or_else(|| DomainError::validation("The game has no location to preview"))?;

    let options = world
        .links_from(location.id)
        .into_iter()
        .take(layout.max_options)
        .enumerate()
        .map(|(index, link)| LocationOption {
            location_link_id: link.id,
            label: link.name.to_string(),
            destination: world
                .location(link.to_location_id)
                .map(|l| l.name.to_string())
                .unwrap_or_default(),
            mark_region: layout.option_region(index),
        })
        .collect();

    Ok(LocationChoiceSheetData {
        location_instance_id: LocationInstanceId::from_uuid(Uuid::nil()),
        location_name: location.name.to_string(),
        location_description: location.description.to_string(),
        character_name: PREVIEW_CHARACTER.to_string(),
        health: CHARACTER_STARTING_HEALTH,
        options,
        code_region: layout.code_region,
    })
}

fn to_background(image: GameImage) -> BackgroundImage {
    BackgroundImage {
        mime_type: image.mime_type,
        bytes: image.bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{AccessScope, MockRendererPort};
    use crate::test_fixtures::{png_bytes, Seeded};
    use playbymail_domain::{GameImageId, MimeType, TurnSheet};

    fn renderer(
        seeded: &Seeded,
        cache: Arc<SnapshotCache>,
        mock: MockRendererPort,
    ) -> SheetRenderer {
        SheetRenderer::new(
            seeded.store(),
            Arc::new(mock),
            seeded.clock(),
            cache,
            Duration::from_secs(5),
        )
    }

    async fn first_sheet(seeded: &Seeded, instance_id: GameInstanceId) -> TurnSheet {
        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        tx.list_turn_sheets(instance_id, 1).await.unwrap().remove(0)
    }

    async fn store_background(seeded: &Seeded, sheet_type: SheetType, record_id: Option<Uuid>) {
        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let now = seeded.clock().now();
        tx.upsert_image(&GameImage {
            id: GameImageId::new(),
            game_id: seeded.game.id,
            record_id,
            sheet_type,
            mime_type: MimeType::Png,
            width: 20,
            height: 20,
            file_size: 0,
            bytes: png_bytes(20, 20),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_render_sheet_stores_pdf_and_marks_printed() {
        let mut seeded = Seeded::new().await;
        store_background(&seeded, SheetType::LocationChoice, None).await;
        let (instance, _) = seeded.start_with_players(&["Ada"]).await;
        let sheet = first_sheet(&seeded, instance.id()).await;
        let expected_code = sheet.sheet_code().encode();

        let mut mock = MockRendererPort::new();
        mock.expect_render()
            .withf(move |request| {
                request.sheet_code == expected_code
                    && request.sheet_type == SheetType::LocationChoice
                    && request.background.is_some()
            })
            .times(1)
            .returning(|_| Ok(b"%PDF-1.7 sheet".to_vec()));
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        let outcome = renderer
            .render_sheet(&seeded.system_ctx(), sheet.id())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RenderOutcome::Printed {
                turn_sheet_id: sheet.id(),
                bytes: 14
            }
        );
        assert_eq!(seeded.sheet(sheet.id()).await.status(), ProcessingStatus::Printed);

        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        assert_eq!(
            tx.get_sheet_document(sheet.id()).await.unwrap().as_deref(),
            Some(&b"%PDF-1.7 sheet"[..])
        );
    }

    #[tokio::test]
    async fn test_render_sheet_skips_printed_sheets() {
        let mut seeded = Seeded::new().await;
        let (instance, _) = seeded.start_with_players(&["Ada"]).await;
        let sheet = first_sheet(&seeded, instance.id()).await;
        seeded.print_turn(instance.id(), 1).await;

        let mut mock = MockRendererPort::new();
        mock.expect_render().never();
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        let outcome = renderer
            .render_sheet(&seeded.system_ctx(), sheet.id())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RenderOutcome::Skipped {
                status: ProcessingStatus::Printed
            }
        );
    }

    #[tokio::test]
    async fn test_renderer_failure_leaves_sheet_pending() {
        let mut seeded = Seeded::new().await;
        let (instance, _) = seeded.start_with_players(&["Ada"]).await;
        let sheet = first_sheet(&seeded, instance.id()).await;

        let mut mock = MockRendererPort::new();
        mock.expect_render()
            .returning(|_| Err(RenderError::Unavailable("connection refused".to_string())));
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        let err = renderer
            .render_sheet(&seeded.system_ctx(), sheet.id())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "RendererUnavailable");
        assert_eq!(seeded.sheet(sheet.id()).await.status(), ProcessingStatus::Pending);
    }

    #[tokio::test]
    async fn test_live_render_uses_snapshot_not_later_draft() {
        let mut seeded = Seeded::new().await;
        let (instance, _) = seeded.start_with_players(&["Ada"]).await;
        let sheet = first_sheet(&seeded, instance.id()).await;

        // Draft edited behind the instance's back.
        let store = seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        let mut edited = tx
            .find_template(seeded.game.id, SheetType::LocationChoice, None)
            .await
            .unwrap()
            .unwrap();
        edited.layout["max_options"] = serde_json::json!(1);
        tx.save_template(&edited).await.unwrap();
        tx.commit().await.unwrap();

        let mut mock = MockRendererPort::new();
        mock.expect_render()
            .withf(|request| request.layout["max_options"] == serde_json::json!(4))
            .times(1)
            .returning(|_| Ok(b"%PDF".to_vec()));
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);
        renderer
            .render_sheet(&seeded.system_ctx(), sheet.id())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_preview_uses_placeholder_code_and_starting_location() {
        let seeded = Seeded::new().await;
        let mut mock = MockRendererPort::new();
        mock.expect_render()
            .withf(|request| {
                let data = LocationChoiceSheetData::from_json(&request.sheet_data).unwrap();
                let code = SheetCode::decode(&request.sheet_code).unwrap();
                data.location_name == "Cave Mouth"
                    && data.options.len() == 2
                    && data.character_name == PREVIEW_CHARACTER
                    && code == SheetCode::Live(SheetToken::PLACEHOLDER)
            })
            .times(1)
            .returning(|_| Ok(b"%PDF preview".to_vec()));
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        let pdf = renderer
            .preview(&seeded.owner_ctx(), seeded.game.id, SheetType::LocationChoice, None)
            .await
            .unwrap();
        assert_eq!(pdf, b"%PDF preview");
    }

    #[tokio::test]
    async fn test_preview_of_record_shows_that_location() {
        let seeded = Seeded::new().await;
        let hall = seeded.location("Great Hall").id.to_uuid();
        let mut mock = MockRendererPort::new();
        mock.expect_render()
            .withf(|request| {
                LocationChoiceSheetData::from_json(&request.sheet_data)
                    .map(|data| data.location_name == "Great Hall")
                    .unwrap_or(false)
            })
            .times(1)
            .returning(|_| Ok(b"%PDF".to_vec()));
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        renderer
            .preview(&seeded.owner_ctx(), seeded.game.id, SheetType::LocationChoice, Some(hall))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_preview_hidden_from_strangers() {
        let seeded = Seeded::new().await;
        let mut mock = MockRendererPort::new();
        mock.expect_render().never();
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        let err = renderer
            .preview(&seeded.stranger_ctx(), seeded.game.id, SheetType::JoinGame, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_preview_timeout_maps_to_render_timeout() {
        let seeded = Seeded::new().await;
        let mut mock = MockRendererPort::new();
        mock.expect_render()
            .returning(|_| Err(RenderError::Timeout(30)));
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        let err = renderer
            .preview(&seeded.owner_ctx(), seeded.game.id, SheetType::JoinGame, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unprocessable);
        assert_eq!(err.reason(), "RenderTimeout");
    }

    #[tokio::test]
    async fn test_join_sheet_carries_real_join_code() {
        let seeded = Seeded::new().await;
        let game_id = seeded.game.id;
        let subscription_id = seeded.manager_subscription.id;
        let join_code = seeded.manager_subscription.join_code.unwrap();
        let mut mock = MockRendererPort::new();
        mock.expect_render()
            .withf(move |request| {
                SheetCode::decode(&request.sheet_code) == Ok(SheetCode::Join(join_code))
            })
            .times(1)
            .returning(|_| Ok(b"%PDF join".to_vec()));
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        let pdf = renderer
            .join_sheet(&seeded.owner_ctx(), game_id, subscription_id)
            .await
            .unwrap();
        assert_eq!(pdf, b"%PDF join");
    }

    #[tokio::test]
    async fn test_join_sheet_rejects_foreign_subscription() {
        let seeded = Seeded::new().await;
        let mut mock = MockRendererPort::new();
        mock.expect_render().never();
        let renderer = renderer(&seeded, Arc::new(SnapshotCache::new()), mock);

        let err = renderer
            .join_sheet(&seeded.owner_ctx(), seeded.game.id, SubscriptionId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
