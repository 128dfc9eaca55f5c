//! Scanned sheet intake.
//!
//! One upload is one transaction. The printed code carries only a short
//! token; the sheet or manager subscription behind it is looked up inside
//! that transaction. A live code scans against its turn sheet under a
//! no-wait row lock, a join code records a join submission for the manager's
//! next instance. Follow-up jobs are enqueued only after commit; the deadline
//! sweeper re-enqueues any that were lost.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use playbymail_domain::{
    DomainError, GameId, GameInstanceId, JoinAnswers, JoinGameLayout, JoinGameSheetData,
    JoinSubmission, ScanRecord, SheetCode, SheetCodeError, SheetToken, SheetType,
    SubscriptionKind, TurnSheet, MAX_IMAGE_BYTES,
};

use crate::infrastructure::ports::{ClockPort, JobQueuePort, RepoError, ScanError, Store};
use crate::use_cases::context::{AccessError, RequestContext};
use crate::use_cases::error::{access_reason, repo_reason, ErrorKind};
use crate::use_cases::images::sniff_mime;
use crate::use_cases::jobs::{enqueue_advance, enqueue_join, upload_advance_tag};
use crate::use_cases::scanners::{ScannerRegistry, UnsupportedSheetType};
use crate::use_cases::templates::{resolve_draft, TemplateError};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload body is empty")]
    EmptyBody,
    #[error("Image is {size} bytes; the limit is {max}")]
    ImageTooLarge { size: usize, max: usize },
    #[error("Upload is not a PNG, JPEG or WebP image")]
    UnsupportedImageFormat,
    #[error(transparent)]
    Code(#[from] SheetCodeError),
    #[error("Sheet belongs elsewhere: {0}")]
    SheetBelongsElsewhere(String),
    #[error("Sheet is {0} and cannot be scanned")]
    NotProcessable(String),
    #[error(transparent)]
    UnsupportedSheetType(#[from] UnsupportedSheetType),
    #[error("Scan failed: {0}")]
    ScanFailed(String),
    #[error("Scan timed out after {0}s")]
    ScanTimeout(u64),
    #[error("Request cancelled")]
    Cancelled,
    #[error("Vision service unavailable: {0}")]
    ScannerUnavailable(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("Stored sheet is unusable: {0}")]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<ScanError> for UploadError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Failed(reason) => Self::ScanFailed(reason),
            ScanError::Timeout(secs) => Self::ScanTimeout(secs),
            ScanError::Cancelled => Self::Cancelled,
            ScanError::Unavailable(message) => Self::ScannerUnavailable(message),
        }
    }
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyBody
            | Self::ImageTooLarge { .. }
            | Self::UnsupportedImageFormat
            | Self::Code(_)
            | Self::SheetBelongsElsewhere(_)
            | Self::UnsupportedSheetType(_) => ErrorKind::BadRequest,
            Self::NotProcessable(_) | Self::ScanFailed(_) | Self::ScanTimeout(_) => {
                ErrorKind::Unprocessable
            }
            Self::Cancelled | Self::ScannerUnavailable(_) | Self::Domain(_) => ErrorKind::Internal,
            Self::Template(e) => e.kind(),
            Self::Access(e) => ErrorKind::of_access(e),
            Self::Repo(e) => ErrorKind::of_repo(e),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::EmptyBody => "EmptyBody",
            Self::ImageTooLarge { .. } => "ImageTooLarge",
            Self::UnsupportedImageFormat => "UnsupportedImageFormat",
            Self::Code(SheetCodeError::MalformedCode(_)) => "MalformedCode",
            Self::Code(SheetCodeError::ChecksumMismatch) => "ChecksumMismatch",
            Self::SheetBelongsElsewhere(_) => "SheetBelongsElsewhere",
            Self::NotProcessable(_) => "NotProcessable",
            Self::UnsupportedSheetType(_) => "UnsupportedSheetType",
            Self::ScanFailed(_) => "ScanFailed",
            Self::ScanTimeout(_) => "ScanTimeout",
            Self::Cancelled => "Cancelled",
            Self::ScannerUnavailable(_) => "ScannerUnavailable",
            Self::Template(e) => e.reason(),
            Self::Domain(_) => "Internal",
            Self::Access(e) => access_reason(e),
            Self::Repo(e) => repo_reason(e),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// A live sheet was scanned, or this exact image had already been.
    Scanned { sheet: TurnSheet, replayed: bool },
    /// A join sheet was read; enrolment runs in the background.
    JoinReceived(JoinSubmission),
}

/// Hex sha256 of an uploaded image.
pub fn image_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub struct TurnSheetUploads {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueuePort>,
    clock: Arc<dyn ClockPort>,
    registry: Arc<ScannerRegistry>,
}

impl TurnSheetUploads {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueuePort>,
        clock: Arc<dyn ClockPort>,
        registry: Arc<ScannerRegistry>,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            registry,
        }
    }

    /// Scan one uploaded page posted to an instance of `game_id`.
    ///
    /// The URL instance id only constrains live codes; a join code resolves
    /// to its manager subscription and targets that manager's next instance.
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        instance_id: GameInstanceId,
        image: &[u8],
    ) -> Result<UploadOutcome, UploadError> {
        if image.is_empty() {
            return Err(UploadError::EmptyBody);
        }
        if image.len() > MAX_IMAGE_BYTES {
            return Err(UploadError::ImageTooLarge {
                size: image.len(),
                max: MAX_IMAGE_BYTES,
            });
        }
        sniff_mime(image).ok_or(UploadError::UnsupportedImageFormat)?;
        ctx.require(
            game_id,
            &[SubscriptionKind::Player, SubscriptionKind::Manager],
            "upload a sheet",
        )?;

        let digest = image_digest(image);
        let text = self.registry.extract_code(ctx, image).await?;
        match SheetCode::decode(&text)? {
            SheetCode::Live(token) => {
                self.scan_live(ctx, game_id, instance_id, token, image, digest).await
            }
            SheetCode::Join(token) => self.receive_join(ctx, game_id, token, image, digest).await,
        }
    }

    async fn scan_live(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        instance_id: GameInstanceId,
        token: SheetToken,
        image: &[u8],
        digest: String,
    ) -> Result<UploadOutcome, UploadError> {
        let mut tx = self.store.begin(&ctx.scope).await?;
        let printed = tx
            .find_turn_sheet_by_code(token)
            .await?
            .ok_or_else(|| RepoError::not_found("TurnSheet", token))?;
        let instance = tx.get_instance(printed.game_instance_id()).await?;
        if instance.game_id() != game_id {
            return Err(UploadError::SheetBelongsElsewhere(format!(
                "sheet was printed for game {}",
                instance.game_id()
            )));
        }
        if instance.id() != instance_id {
            return Err(UploadError::SheetBelongsElsewhere(format!(
                "sheet was printed for instance {}",
                instance.id()
            )));
        }
        let mut sheet = tx.lock_turn_sheet(printed.id()).await?;
        // Players only ever see their own sheets; managers see all of them.
        if !ctx.scope.has_any(game_id, &[SubscriptionKind::Manager])
            && ctx.scope.account_id() != Some(sheet.account_id())
        {
            return Err(RepoError::not_found("TurnSheet", sheet.id()).into());
        }

        if sheet.prior_result_for(&digest).is_some() {
            drop(tx);
            tracing::debug!(
                turn_sheet_id = %sheet.id(),
                correlation_id = %ctx.correlation_id,
                "Image already processed; returning prior result"
            );
            self.enqueue_advance_check(&sheet).await;
            return Ok(UploadOutcome::Scanned {
                sheet,
                replayed: true,
            });
        }
        if !sheet.accepts_scan() {
            return Err(UploadError::NotProcessable(sheet.status().to_string()));
        }
        if instance.is_terminal() {
            return Err(UploadError::NotProcessable(format!(
                "{} (instance {})",
                sheet.status(),
                instance.status()
            )));
        }

        let scanner = self.registry.get(sheet.sheet_type())?;
        let now = self.clock.now();
        match scanner.scan(ctx, image, sheet.sheet_data()).await {
            Ok(scanned) => {
                sheet.record_scan(
                    ScanRecord {
                        scanned_data: scanned.answers,
                        scanned_at: now,
                        scan_quality: scanned.quality,
                        image_digest: Some(digest),
                    },
                    now,
                )?;
                tx.save_turn_sheet(&sheet).await?;
                if ctx.is_cancelled() {
                    return Err(UploadError::Cancelled);
                }
                tx.commit().await?;

                tracing::info!(
                    turn_sheet_id = %sheet.id(),
                    instance_id = %sheet.game_instance_id(),
                    turn = sheet.turn_number(),
                    quality = sheet.scan().map(|s| s.scan_quality.value()).unwrap_or_default(),
                    correlation_id = %ctx.correlation_id,
                    "Turn sheet processed"
                );
                self.enqueue_advance_check(&sheet).await;
                Ok(UploadOutcome::Scanned {
                    sheet,
                    replayed: false,
                })
            }
            Err(ScanError::Failed(reason)) => {
                sheet.record_failure(ScanRecord::failure(&reason, now, Some(digest)), now)?;
                tx.save_turn_sheet(&sheet).await?;
                if ctx.is_cancelled() {
                    return Err(UploadError::Cancelled);
                }
                tx.commit().await?;

                tracing::warn!(
                    turn_sheet_id = %sheet.id(),
                    reason = %reason,
                    correlation_id = %ctx.correlation_id,
                    "Turn sheet scan failed"
                );
                Err(UploadError::ScanFailed(reason))
            }
            // Timeouts, cancellation and outages roll back: the sheet stays as it was.
            Err(other) => Err(other.into()),
        }
    }

    async fn receive_join(
        &self,
        ctx: &RequestContext,
        game_id: GameId,
        token: SheetToken,
        image: &[u8],
        digest: String,
    ) -> Result<UploadOutcome, UploadError> {
        ctx.require(game_id, &[SubscriptionKind::Manager], "upload a join sheet")?;

        let mut tx = self.store.begin(&ctx.scope).await?;
        let manager = tx
            .find_manager_by_join_code(token)
            .await?
            .ok_or_else(|| RepoError::not_found("Subscription", token))?;
        if manager.game_id != game_id {
            return Err(UploadError::SheetBelongsElsewhere(format!(
                "join sheet was printed for game {}",
                manager.game_id
            )));
        }
        let game = tx.get_game(game_id).await?;
        let template = resolve_draft(tx.as_mut(), game_id, SheetType::JoinGame, None).await?;
        let layout = JoinGameLayout::from_json(&template.layout)?;
        let sheet_data = JoinGameSheetData::from_layout(game.name.to_string(), &layout).to_json();

        let scanner = self.registry.get(SheetType::JoinGame)?;
        let scanned = scanner.scan(ctx, image, &sheet_data).await?;
        let answers: JoinAnswers = serde_json::from_value(scanned.answers)
            .map_err(|e| DomainError::parse(format!("join answers: {}", e)))?;

        let submission = JoinSubmission::received(
            game_id,
            manager.id,
            answers,
            scanned.quality,
            digest,
            self.clock.now(),
        );
        tx.save_join_submission(&submission).await?;
        if ctx.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        tx.commit().await?;

        tracing::info!(
            join_submission_id = %submission.id,
            game_id = %submission.game_id,
            manager_subscription_id = %manager.id,
            correlation_id = %ctx.correlation_id,
            "Join sheet received"
        );
        if let Err(e) = enqueue_join(self.queue.as_ref(), submission.id).await {
            tracing::error!(
                join_submission_id = %submission.id,
                error = %e,
                "Failed to enqueue join; the sweeper will retry"
            );
        }
        Ok(UploadOutcome::JoinReceived(submission))
    }

    /// The sweeper re-checks overdue instances, so a lost enqueue only delays.
    async fn enqueue_advance_check(&self, sheet: &TurnSheet) {
        let tag = upload_advance_tag(sheet.id(), sheet.turn_number());
        if let Err(e) = enqueue_advance(
            self.queue.as_ref(),
            sheet.game_instance_id(),
            sheet.turn_number(),
            &tag,
        )
        .await
        {
            tracing::warn!(turn_sheet_id = %sheet.id(), error = %e, "Failed to enqueue advance check");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use playbymail_domain::{
        AccountId, GameInstance, JoinSubmissionStatus, LocationChoiceAnswer,
        LocationChoiceSheetData, ProcessingStatus,
    };

    use crate::infrastructure::ports::{AccessScope, JobKind};
    use crate::test_fixtures::{png_bytes, t0, FakeScan, RecordingQueue, ScriptedVision, Seeded};

    struct Harness {
        seeded: Seeded,
        queue: Arc<RecordingQueue>,
        uploads: TurnSheetUploads,
        instance: GameInstance,
        players: Vec<AccountId>,
    }

    async fn harness_with(vision: ScriptedVision, names: &[&str]) -> Harness {
        let mut seeded = Seeded::new().await;
        let (instance, players) = seeded.start_with_players(names).await;
        seeded.print_turn(instance.id(), 1).await;
        let queue = Arc::new(RecordingQueue::new());
        let registry = ScannerRegistry::standard(Arc::new(vision), Duration::from_millis(500));
        let uploads = TurnSheetUploads::new(
            seeded.store(),
            queue.clone(),
            seeded.clock(),
            Arc::new(registry),
        );
        Harness {
            seeded,
            queue,
            uploads,
            instance,
            players,
        }
    }

    async fn harness() -> Harness {
        harness_with(ScriptedVision::new(), &["Ada"]).await
    }

    impl Harness {
        async fn sheet_of(&self, account: AccountId) -> TurnSheet {
            let store = self.seeded.store();
            let mut tx = store.begin(&AccessScope::System).await.unwrap();
            tx.list_turn_sheets(self.instance.id(), 1)
                .await
                .unwrap()
                .into_iter()
                .find(|s| s.account_id() == account)
                .unwrap()
        }

        fn join_code(&self) -> String {
            let token = self.seeded.manager_subscription.join_code.unwrap();
            SheetCode::Join(token).encode()
        }

        fn code_of(&self, sheet: &TurnSheet) -> String {
            sheet.sheet_code().encode()
        }

        async fn upload_as(
            &self,
            account: AccountId,
            image: &[u8],
        ) -> Result<UploadOutcome, UploadError> {
            let ctx = self.seeded.account_ctx(account).await;
            self.uploads
                .upload(&ctx, self.seeded.game.id, self.instance.id(), image)
                .await
        }
    }

    #[tokio::test]
    async fn when_mark_is_read_then_sheet_is_processed_and_advance_enqueued() {
        let h = harness().await;
        let player = h.players[0];
        let sheet = h.sheet_of(player).await;
        // Options from the cave mouth: Descend, Wade.
        let code = h.code_of(&sheet);
        assert!(code.len() <= 32);
        let image = FakeScan::of(code).marking(&[0.9, 0.05]).to_image();

        let outcome = h.upload_as(player, &image).await.unwrap();
        let UploadOutcome::Scanned { sheet: scanned, replayed } = outcome else {
            panic!("expected a scanned sheet");
        };
        assert!(!replayed);
        assert_eq!(scanned.status(), ProcessingStatus::Processed);

        let data = LocationChoiceSheetData::from_json(sheet.sheet_data()).unwrap();
        let answer = LocationChoiceAnswer::from_json(&scanned.scan().unwrap().scanned_data).unwrap();
        assert_eq!(answer.location_link_id, Some(data.options[0].location_link_id));

        let stored = h.seeded.sheet(sheet.id()).await;
        assert_eq!(stored.status(), ProcessingStatus::Processed);
        assert_eq!(
            h.queue.tags_of(JobKind::AdvanceIfReady),
            vec![upload_advance_tag(sheet.id(), 1)]
        );
    }

    #[tokio::test]
    async fn when_code_names_another_instance_then_sheet_belongs_elsewhere() {
        let h = harness().await;
        let player = h.players[0];
        let other = h.seeded.create_instance().await;
        let stray = TurnSheet::pending(
            other.id(),
            player,
            None,
            SheetType::LocationChoice,
            1,
            h.sheet_of(player).await.sheet_data().clone(),
            t0(),
        );
        let store = h.seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        tx.insert_turn_sheet(&stray).await.unwrap();
        tx.commit().await.unwrap();
        let image = FakeScan::of(h.code_of(&stray)).marking(&[0.9]).to_image();

        let err = h.upload_as(player, &image).await.unwrap_err();
        assert_eq!(err.reason(), "SheetBelongsElsewhere");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(h.seeded.sheet(stray.id()).await, stray);
        assert!(h.queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn when_code_was_never_issued_then_not_found() {
        let h = harness().await;
        let player = h.players[0];
        // What a preview prints.
        let code = SheetCode::Live(SheetToken::PLACEHOLDER).encode();
        let image = FakeScan::of(code).marking(&[0.9]).to_image();

        let err = h.upload_as(player, &image).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let code = SheetCode::Join(SheetToken::PLACEHOLDER).encode();
        let image = FakeScan::of(code)
            .writing("Grace", "grace@example.org", "1 Harbour Row")
            .to_image();
        let err = h
            .uploads
            .upload(&h.seeded.owner_ctx(), h.seeded.game.id, h.instance.id(), &image)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn when_two_uploads_race_then_one_is_busy() {
        let h = harness_with(ScriptedVision::with_delay(Duration::from_millis(50)), &["Ada"]).await;
        let player = h.players[0];
        let sheet = h.sheet_of(player).await;
        let image = FakeScan::of(h.code_of(&sheet)).marking(&[0.9, 0.0]).to_image();

        let (a, b) = tokio::join!(h.upload_as(player, &image), h.upload_as(player, &image));
        let busy = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(e) if e.reason() == "Busy"))
            .count();
        let ok = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!((ok, busy), (1, 1));
        assert_eq!(h.queue.pending_of(JobKind::AdvanceIfReady), 1);
    }

    #[tokio::test]
    async fn when_same_image_is_uploaded_again_then_prior_result_is_returned() {
        let h = harness().await;
        let player = h.players[0];
        let sheet = h.sheet_of(player).await;
        let image = FakeScan::of(h.code_of(&sheet)).marking(&[0.0, 0.95]).to_image();

        let UploadOutcome::Scanned { sheet: first, .. } = h.upload_as(player, &image).await.unwrap()
        else {
            panic!("expected a scanned sheet");
        };
        let UploadOutcome::Scanned { sheet: again, replayed } =
            h.upload_as(player, &image).await.unwrap()
        else {
            panic!("expected a scanned sheet");
        };
        assert!(replayed);
        assert_eq!(again, first);
        assert_eq!(h.queue.pending_of(JobKind::AdvanceIfReady), 1);
    }

    #[tokio::test]
    async fn when_a_different_image_arrives_after_processing_then_not_processable() {
        let h = harness().await;
        let player = h.players[0];
        let sheet = h.sheet_of(player).await;
        let code = h.code_of(&sheet);
        h.upload_as(player, &FakeScan::of(code.clone()).marking(&[0.9]).to_image())
            .await
            .unwrap();

        let err = h
            .upload_as(player, &FakeScan::of(code).marking(&[0.0, 0.9]).to_image())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "NotProcessable");
        assert_eq!(err.kind(), ErrorKind::Unprocessable);
    }

    #[tokio::test]
    async fn when_scan_fails_then_sheet_is_failed_and_may_be_retried() {
        let h = harness().await;
        let player = h.players[0];
        let sheet = h.sheet_of(player).await;
        let code = h.code_of(&sheet);

        let err = h
            .upload_as(player, &FakeScan::of(code.clone()).marking(&[0.9, 0.9]).to_image())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "ScanFailed");
        let failed = h.seeded.sheet(sheet.id()).await;
        assert_eq!(failed.status(), ProcessingStatus::Failed);
        assert_eq!(failed.scan().unwrap().scan_quality.value(), 0.0);

        h.upload_as(player, &FakeScan::of(code).marking(&[0.0, 0.0]).to_image())
            .await
            .unwrap();
        let processed = h.seeded.sheet(sheet.id()).await;
        assert_eq!(processed.status(), ProcessingStatus::Processed);
        let answer =
            LocationChoiceAnswer::from_json(&processed.scan().unwrap().scanned_data).unwrap();
        assert_eq!(answer.location_link_id, None);
    }

    #[tokio::test]
    async fn when_vision_times_out_then_nothing_is_written() {
        let mut seeded = Seeded::new().await;
        let (instance, players) = seeded.start_with_players(&["Ada"]).await;
        seeded.print_turn(instance.id(), 1).await;
        let registry = ScannerRegistry::standard(
            Arc::new(ScriptedVision::with_delay(Duration::from_millis(200))),
            Duration::from_millis(20),
        );
        let queue = Arc::new(RecordingQueue::new());
        let uploads =
            TurnSheetUploads::new(seeded.store(), queue.clone(), seeded.clock(), Arc::new(registry));
        let h = Harness {
            seeded,
            queue,
            uploads,
            instance,
            players,
        };
        let player = h.players[0];
        let sheet = h.sheet_of(player).await;
        let image = FakeScan::of(h.code_of(&sheet)).marking(&[0.9]).to_image();

        let err = h.upload_as(player, &image).await.unwrap_err();
        assert!(matches!(err, UploadError::ScanTimeout(_)));
        assert_eq!(h.seeded.sheet(sheet.id()).await, sheet);

        // The lock went with the rolled-back transaction.
        let store = h.seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        assert!(tx.lock_turn_sheet(sheet.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_bodies_are_rejected_before_scanning() {
        let h = harness().await;
        let player = h.players[0];

        let err = h.upload_as(player, &[]).await.unwrap_err();
        assert_eq!(err.reason(), "EmptyBody");

        let mut huge = png_bytes(2, 2);
        huge.resize(MAX_IMAGE_BYTES + 1, 0);
        let err = h.upload_as(player, &huge).await.unwrap_err();
        assert_eq!(err.reason(), "ImageTooLarge");

        let err = h.upload_as(player, b"GIF89a....").await.unwrap_err();
        assert_eq!(err.reason(), "UnsupportedImageFormat");
    }

    #[tokio::test]
    async fn test_garbled_code_is_malformed() {
        let h = harness().await;
        let player = h.players[0];
        let sheet = h.sheet_of(player).await;
        let mut code = h.code_of(&sheet);
        // Flip one body symbol.
        let flipped = if code.as_bytes()[5] == b'A' { "B" } else { "A" };
        code.replace_range(5..6, flipped);

        let err = h
            .upload_as(player, &FakeScan::of(code).to_image())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.reason(), "ChecksumMismatch");

        let err = h
            .upload_as(player, &FakeScan::of("not a code").to_image())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "MalformedCode");
    }

    #[tokio::test]
    async fn test_players_cannot_upload_each_others_sheets() {
        let h = harness_with(ScriptedVision::new(), &["Ada", "Brunel"]).await;
        let (ada, brunel) = (h.players[0], h.players[1]);
        let sheet = h.sheet_of(brunel).await;
        let image = FakeScan::of(h.code_of(&sheet)).marking(&[0.9]).to_image();

        let err = h.upload_as(ada, &image).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // The manager may upload on anyone's behalf.
        let ctx = h.seeded.owner_ctx();
        h.uploads
            .upload(&ctx, h.seeded.game.id, h.instance.id(), &image)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_strangers_cannot_upload() {
        let h = harness().await;
        let sheet = h.sheet_of(h.players[0]).await;
        let image = FakeScan::of(h.code_of(&sheet)).marking(&[0.9]).to_image();

        let err = h
            .uploads
            .upload(&h.seeded.stranger_ctx(), h.seeded.game.id, h.instance.id(), &image)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_join_sheet_is_received_and_enrolment_enqueued() {
        let h = harness().await;
        let code = h.join_code();
        let image = FakeScan::of(code)
            .writing(" Grace Hopper ", "Grace@Example.org", "1 Harbour Row")
            .to_image();

        let outcome = h
            .uploads
            .upload(&h.seeded.owner_ctx(), h.seeded.game.id, GameInstanceId::new(), &image)
            .await
            .unwrap();
        let UploadOutcome::JoinReceived(submission) = outcome else {
            panic!("expected a join submission");
        };
        assert_eq!(submission.status, JoinSubmissionStatus::Received);
        assert_eq!(submission.answers.name, "Grace Hopper");
        assert_eq!(submission.answers.email, "grace@example.org");
        assert_eq!(submission.image_digest, image_digest(&image));
        assert_eq!(h.queue.tags_of(JobKind::JoinPlayer), vec![format!("join:{}", submission.id)]);

        let store = h.seeded.store();
        let mut tx = store.begin(&AccessScope::System).await.unwrap();
        assert_eq!(tx.get_join_submission(submission.id).await.unwrap(), submission);
    }

    #[tokio::test]
    async fn test_players_cannot_upload_join_sheets() {
        let h = harness().await;
        let code = h.join_code();
        let image = FakeScan::of(code)
            .writing("Grace", "grace@example.org", "1 Harbour Row")
            .to_image();

        let err = h.upload_as(h.players[0], &image).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn test_unreadable_join_fields_fail_the_scan() {
        let h = harness().await;
        let code = h.join_code();
        let image = FakeScan::of(code).writing("Grace", "not-an-email", "1 Harbour Row").to_image();

        let err = h
            .uploads
            .upload(&h.seeded.owner_ctx(), h.seeded.game.id, h.instance.id(), &image)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "ScanFailed");
        assert!(h.queue.jobs().is_empty());
    }
}
