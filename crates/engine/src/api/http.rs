//! HTTP routes.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use playbymail_domain::{
    Game, GameId, GameImage, GameInstance, GameInstanceId, InstanceAction, SheetTemplate,
    SheetType, SubscriptionId, SubscriptionKind, TurnSheet, TurnSheetId, MAX_IMAGE_BYTES,
};
use playbymail_shared::{
    CreateGameRequest, GameResponse, HealthResponse, ImageUploadResponse, InstanceResponse,
    JoinAccepted, PutTemplateRequest, TemplateResponse, TurnSheetResponse, UploadSummary,
    WorldDocument, WorldImportResponse,
};

use crate::api::caller::Caller;
use crate::api::error::ApiError;
use crate::app::App;
use crate::use_cases::{CreatedGame, ImageUpload, ImportSummary, NewGame, UploadOutcome};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/v1/games", post(create_game))
        .route("/api/v1/games/{game_id}", get(get_game))
        .route("/api/v1/games/{game_id}/world", put(import_world))
        .route("/api/v1/games/{game_id}/publish", post(publish_game))
        .route("/api/v1/games/{game_id}/templates", get(list_templates))
        .route(
            "/api/v1/games/{game_id}/templates/{sheet_type}",
            put(put_template),
        )
        .route(
            "/api/v1/games/{game_id}/turn-sheet-image",
            get(get_background).post(upload_background),
        )
        .route("/api/v1/games/{game_id}/turn-sheets/preview", get(preview))
        .route(
            "/api/v1/games/{game_id}/subscriptions/{subscription_id}/join-sheet",
            get(join_sheet),
        )
        .route("/api/v1/games/{game_id}/instances", post(create_instance))
        .route(
            "/api/v1/games/{game_id}/instances/{instance_id}",
            get(get_instance),
        )
        .route(
            "/api/v1/games/{game_id}/instances/{instance_id}/start",
            post(start_instance),
        )
        .route(
            "/api/v1/games/{game_id}/instances/{instance_id}/pause",
            post(pause_instance),
        )
        .route(
            "/api/v1/games/{game_id}/instances/{instance_id}/resume",
            post(resume_instance),
        )
        .route(
            "/api/v1/games/{game_id}/instances/{instance_id}/cancel",
            post(cancel_instance),
        )
        .route(
            "/api/v1/games/{game_id}/instances/{instance_id}/turn-sheets/upload",
            post(upload_turn_sheet),
        )
        .route(
            "/api/v1/games/{game_id}/instances/{instance_id}/turn-sheets/{turn_sheet_id}",
            get(get_turn_sheet),
        )
        .route(
            "/api/v1/games/{game_id}/instances/{instance_id}/turn-sheets/{turn_sheet_id}/document",
            get(turn_sheet_document),
        )
        // Oversized scans should reach the use case and fail with ImageTooLarge.
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES * 4))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Games
// =============================================================================

async fn create_game(
    State(app): State<Arc<App>>,
    caller: Caller,
    Json(request): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<GameResponse>), ApiError> {
    let created = app
        .use_cases
        .games
        .create(
            &caller.ctx,
            NewGame {
                name: request.name,
                description: request.description,
                turn_duration_hours: request.turn_duration_hours,
                turn_limit: request.turn_limit,
            },
        )
        .await
        .map_err(|e| caller.fail(e))?;
    let CreatedGame {
        game,
        designer,
        manager,
    } = created;
    Ok((
        StatusCode::CREATED,
        Json(game_response(&game, Some(designer.id), Some(manager.id))),
    ))
}

async fn get_game(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path(game_id): Path<Uuid>,
) -> Result<Json<GameResponse>, ApiError> {
    let game_id = GameId::from_uuid(game_id);
    let game = app
        .use_cases
        .games
        .get(&caller.ctx, game_id)
        .await
        .map_err(|e| caller.fail(e))?;
    let designer = caller.subscription(game_id, SubscriptionKind::Designer);
    let manager = caller.subscription(game_id, SubscriptionKind::Manager);
    Ok(Json(game_response(
        &game,
        designer.map(|s| s.id),
        manager.map(|s| s.id),
    )))
}

async fn import_world(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path(game_id): Path<Uuid>,
    Json(document): Json<WorldDocument>,
) -> Result<Json<WorldImportResponse>, ApiError> {
    let ImportSummary {
        locations,
        links,
        requirements,
        creatures,
        items,
        placements,
    } = app
        .use_cases
        .games
        .import_world(&caller.ctx, GameId::from_uuid(game_id), &document)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(WorldImportResponse {
        game_id,
        locations,
        links,
        requirements,
        creatures,
        items,
        placements,
    }))
}

async fn publish_game(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path(game_id): Path<Uuid>,
) -> Result<Json<GameResponse>, ApiError> {
    let game_id = GameId::from_uuid(game_id);
    let game = app
        .use_cases
        .games
        .publish(&caller.ctx, game_id)
        .await
        .map_err(|e| caller.fail(e))?;
    let designer = caller.subscription(game_id, SubscriptionKind::Designer);
    let manager = caller.subscription(game_id, SubscriptionKind::Manager);
    Ok(Json(game_response(
        &game,
        designer.map(|s| s.id),
        manager.map(|s| s.id),
    )))
}

// =============================================================================
// Templates and background images
// =============================================================================

async fn list_templates(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path(game_id): Path<Uuid>,
) -> Result<Json<Vec<TemplateResponse>>, ApiError> {
    let templates = app
        .use_cases
        .templates
        .list(&caller.ctx, GameId::from_uuid(game_id))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(templates.iter().map(template_response).collect()))
}

async fn put_template(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path((game_id, sheet_type)): Path<(Uuid, SheetType)>,
    Json(request): Json<PutTemplateRequest>,
) -> Result<Json<TemplateResponse>, ApiError> {
    let template = app
        .use_cases
        .templates
        .put(
            &caller.ctx,
            GameId::from_uuid(game_id),
            sheet_type,
            request.record_id,
            request.layout,
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(template_response(&template)))
}

/// Which template or background a request addresses.
#[derive(Debug, Deserialize)]
struct SheetSlot {
    sheet_type: SheetType,
    #[serde(default)]
    record_id: Option<Uuid>,
}

async fn upload_background(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path(game_id): Path<Uuid>,
    Query(slot): Query<SheetSlot>,
    mut multipart: Multipart,
) -> Result<Json<ImageUploadResponse>, ApiError> {
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| caller.fail(ApiError::bad_request("InvalidMultipart", e.body_text())))?
    {
        if field.name() == Some("image") {
            let bytes = field.bytes().await.map_err(|e| {
                caller.fail(ApiError::bad_request("InvalidMultipart", e.body_text()))
            })?;
            image = Some(bytes.to_vec());
        }
    }
    let image = image.ok_or_else(|| {
        caller.fail(ApiError::bad_request(
            "MissingImage",
            "multipart field `image` is required",
        ))
    })?;

    let ImageUpload { image, warning } = app
        .use_cases
        .images
        .upload(
            &caller.ctx,
            GameId::from_uuid(game_id),
            slot.sheet_type,
            slot.record_id,
            image,
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(image_response(&image, warning)))
}

async fn get_background(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path(game_id): Path<Uuid>,
    Query(slot): Query<SheetSlot>,
) -> Result<Response, ApiError> {
    let image = app
        .use_cases
        .images
        .background(
            &caller.ctx,
            GameId::from_uuid(game_id),
            slot.sheet_type,
            slot.record_id,
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((
        [(header::CONTENT_TYPE, image.mime_type.as_str())],
        image.bytes,
    )
        .into_response())
}

// =============================================================================
// Rendered documents
// =============================================================================

async fn preview(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path(game_id): Path<Uuid>,
    Query(slot): Query<SheetSlot>,
) -> Result<Response, ApiError> {
    let pdf = app
        .use_cases
        .renderer
        .preview(
            &caller.ctx,
            GameId::from_uuid(game_id),
            slot.sheet_type,
            slot.record_id,
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(pdf_response(pdf, "preview.pdf"))
}

async fn join_sheet(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path((game_id, subscription_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let pdf = app
        .use_cases
        .renderer
        .join_sheet(
            &caller.ctx,
            GameId::from_uuid(game_id),
            SubscriptionId::from_uuid(subscription_id),
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(pdf_response(pdf, "join-sheet.pdf"))
}

fn pdf_response(pdf: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
        ],
        pdf,
    )
        .into_response()
}

// =============================================================================
// Instances
// =============================================================================

async fn create_instance(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path(game_id): Path<Uuid>,
) -> Result<(StatusCode, Json<InstanceResponse>), ApiError> {
    let instance = app
        .use_cases
        .instances
        .create(&caller.ctx, GameId::from_uuid(game_id))
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(instance_response(&instance))))
}

async fn get_instance(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path((game_id, instance_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<InstanceResponse>, ApiError> {
    let instance = app
        .use_cases
        .instances
        .get(
            &caller.ctx,
            GameId::from_uuid(game_id),
            GameInstanceId::from_uuid(instance_id),
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(instance_response(&instance)))
}

async fn start_instance(
    state: State<Arc<App>>,
    caller: Caller,
    path: Path<(Uuid, Uuid)>,
) -> Result<Json<InstanceResponse>, ApiError> {
    transition(state, caller, path, InstanceAction::Start).await
}

async fn pause_instance(
    state: State<Arc<App>>,
    caller: Caller,
    path: Path<(Uuid, Uuid)>,
) -> Result<Json<InstanceResponse>, ApiError> {
    transition(state, caller, path, InstanceAction::Pause).await
}

async fn resume_instance(
    state: State<Arc<App>>,
    caller: Caller,
    path: Path<(Uuid, Uuid)>,
) -> Result<Json<InstanceResponse>, ApiError> {
    transition(state, caller, path, InstanceAction::Resume).await
}

async fn cancel_instance(
    state: State<Arc<App>>,
    caller: Caller,
    path: Path<(Uuid, Uuid)>,
) -> Result<Json<InstanceResponse>, ApiError> {
    transition(state, caller, path, InstanceAction::Cancel).await
}

async fn transition(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path((game_id, instance_id)): Path<(Uuid, Uuid)>,
    action: InstanceAction,
) -> Result<Json<InstanceResponse>, ApiError> {
    let instance = app
        .use_cases
        .instances
        .transition(
            &caller.ctx,
            GameId::from_uuid(game_id),
            GameInstanceId::from_uuid(instance_id),
            action,
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(instance_response(&instance)))
}

// =============================================================================
// Turn sheets
// =============================================================================

async fn upload_turn_sheet(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path((game_id, instance_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let outcome = app
        .use_cases
        .uploads
        .upload(
            &caller.ctx,
            GameId::from_uuid(game_id),
            GameInstanceId::from_uuid(instance_id),
            &body,
        )
        .await
        .map_err(|e| caller.fail(e))?;

    let response = match outcome {
        UploadOutcome::Scanned { sheet, .. } => {
            let scan = sheet.scan();
            Json(UploadSummary {
                turn_sheet_id: sheet.id().to_uuid(),
                sheet_type: sheet.sheet_type(),
                processing_status: sheet.status(),
                scan_quality: scan.map(|s| s.scan_quality.value()),
                scanned_data: scan.map(|s| s.scanned_data.clone()),
            })
            .into_response()
        }
        UploadOutcome::JoinReceived(submission) => (
            StatusCode::ACCEPTED,
            Json(JoinAccepted {
                join_submission_id: submission.id.to_uuid(),
                game_id: submission.game_id.to_uuid(),
                status: submission.status.as_str().to_string(),
                scan_quality: submission.scan_quality.value(),
            }),
        )
            .into_response(),
    };
    Ok(response)
}

async fn get_turn_sheet(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path((game_id, instance_id, turn_sheet_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<TurnSheetResponse>, ApiError> {
    let sheet = app
        .use_cases
        .sheets
        .get(
            &caller.ctx,
            GameId::from_uuid(game_id),
            GameInstanceId::from_uuid(instance_id),
            TurnSheetId::from_uuid(turn_sheet_id),
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(turn_sheet_response(&sheet)))
}

async fn turn_sheet_document(
    State(app): State<Arc<App>>,
    caller: Caller,
    Path((game_id, instance_id, turn_sheet_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let pdf = app
        .use_cases
        .sheets
        .document(
            &caller.ctx,
            GameId::from_uuid(game_id),
            GameInstanceId::from_uuid(instance_id),
            TurnSheetId::from_uuid(turn_sheet_id),
        )
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(pdf_response(pdf, &format!("turn-sheet-{}.pdf", turn_sheet_id)))
}

// =============================================================================
// Response mapping
// =============================================================================

fn game_response(
    game: &Game,
    designer: Option<SubscriptionId>,
    manager: Option<SubscriptionId>,
) -> GameResponse {
    GameResponse {
        id: game.id.to_uuid(),
        name: game.name.to_string(),
        description: game.description.to_string(),
        status: game.status.as_str().to_string(),
        turn_duration_hours: game.turn_duration_hours,
        turn_limit: game.turn_limit,
        designer_subscription_id: designer.map(|id| id.to_uuid()),
        manager_subscription_id: manager.map(|id| id.to_uuid()),
        created_at: game.created_at,
        updated_at: game.updated_at,
    }
}

fn instance_response(instance: &GameInstance) -> InstanceResponse {
    InstanceResponse {
        id: instance.id().to_uuid(),
        game_id: instance.game_id().to_uuid(),
        manager_subscription_id: instance.manager_subscription_id().to_uuid(),
        status: instance.status(),
        current_turn: instance.current_turn(),
        turn_limit: instance.turn_limit(),
        started_at: instance.started_at(),
        last_turn_at: instance.last_turn_at(),
        turn_deadline_at: instance.turn_deadline_at(),
        created_at: instance.created_at(),
        updated_at: instance.updated_at(),
    }
}

fn template_response(template: &SheetTemplate) -> TemplateResponse {
    TemplateResponse {
        id: template.id.to_uuid(),
        game_id: template.game_id.to_uuid(),
        sheet_type: template.sheet_type,
        record_id: template.record_id,
        layout: template.layout.clone(),
        updated_at: template.updated_at,
    }
}

fn image_response(image: &GameImage, warning: Option<String>) -> ImageUploadResponse {
    ImageUploadResponse {
        id: image.id.to_uuid(),
        game_id: image.game_id.to_uuid(),
        record_id: image.record_id,
        sheet_type: image.sheet_type,
        mime_type: image.mime_type.as_str().to_string(),
        width: image.width,
        height: image.height,
        file_size: image.file_size,
        warning,
    }
}

fn turn_sheet_response(sheet: &TurnSheet) -> TurnSheetResponse {
    let scan = sheet.scan();
    TurnSheetResponse {
        id: sheet.id().to_uuid(),
        game_instance_id: sheet.game_instance_id().to_uuid(),
        account_id: sheet.account_id().to_uuid(),
        character_instance_id: sheet.character_instance_id().map(|id| id.to_uuid()),
        sheet_type: sheet.sheet_type(),
        turn_number: sheet.turn_number(),
        sheet_code: sheet.sheet_code().encode(),
        sheet_data: sheet.sheet_data().clone(),
        processing_status: sheet.status(),
        scanned_data: scan.map(|s| s.scanned_data.clone()),
        scanned_at: scan.map(|s| s.scanned_at),
        scan_quality: scan.map(|s| s.scan_quality.value()),
        created_at: sheet.created_at(),
        updated_at: sheet.updated_at(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use playbymail_domain::{AccountId, SheetCode};

    use crate::api::caller::ACCOUNT_HEADER;
    use crate::app::Ports;
    use crate::infrastructure::clock::FixedRandom;
    use crate::infrastructure::config::EngineConfig;
    use crate::infrastructure::ports::{
        JobKind, MockAccountDirectoryPort, MockRendererPort,
    };
    use crate::test_fixtures::{FakeScan, RecordingQueue, ScriptedVision, Seeded};

    fn test_app(seeded: &Seeded) -> (Router, Arc<RecordingQueue>) {
        let queue = Arc::new(RecordingQueue::new());
        let app = App::new(
            Ports {
                store: seeded.store(),
                queue: queue.clone(),
                vision: Arc::new(ScriptedVision::new()),
                renderer: Arc::new(MockRendererPort::new()),
                directory: Arc::new(MockAccountDirectoryPort::new()),
                clock: seeded.clock(),
                random: Arc::new(FixedRandom(0)),
            },
            EngineConfig::default(),
        );
        (routes().with_state(Arc::new(app)), queue)
    }

    fn request(method: &str, uri: &str, account: Option<AccountId>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match account {
            Some(account) => builder.header(ACCOUNT_HEADER, account.to_string()),
            None => builder,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health_needs_no_account() {
        let seeded = Seeded::new().await;
        let (router, _) = test_app(&seeded);
        let (status, body) = send(
            &router,
            request("GET", "/api/health", None).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_account_header_is_unauthorized() {
        let seeded = Seeded::new().await;
        let (router, _) = test_app(&seeded);
        let uri = format!("/api/v1/games/{}", seeded.game.id);
        let (status, body) = send(&router, request("GET", &uri, None).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_games_of_other_accounts_read_as_missing() {
        let seeded = Seeded::new().await;
        let (router, _) = test_app(&seeded);
        let uri = format!("/api/v1/games/{}", seeded.game.id);

        let (status, body) = send(
            &router,
            request("GET", &uri, Some(seeded.owner)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["manager_subscription_id"],
            seeded.manager_subscription.id.to_string()
        );

        let (status, body) = send(
            &router,
            request("GET", &uri, Some(AccountId::new())).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["correlation_id"].is_string());
    }

    #[tokio::test]
    async fn test_created_game_is_visible_to_its_creator() {
        let seeded = Seeded::new().await;
        let (router, _) = test_app(&seeded);
        let account = AccountId::new();
        let create = request("POST", "/api/v1/games", Some(account))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"Sunken Keep","turn_limit":5}"#))
            .unwrap();
        let (status, created) = send(&router, create).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "draft");
        assert_eq!(created["turn_duration_hours"], 168);

        let uri = format!("/api/v1/games/{}", created["id"].as_str().unwrap());
        let (status, fetched) = send(
            &router,
            request("GET", &uri, Some(account)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Sunken Keep");
        assert_eq!(fetched["designer_subscription_id"], created["designer_subscription_id"]);
    }

    #[tokio::test]
    async fn test_start_without_players_lists_readiness_issues() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let instance = seeded.create_instance().await;
        let (router, queue) = test_app(&seeded);
        let uri = format!(
            "/api/v1/games/{}/instances/{}/start",
            seeded.game.id,
            instance.id()
        );

        let (status, body) = send(
            &router,
            request("POST", &uri, Some(seeded.owner)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["reason"], "NotReady");
        assert_eq!(body["details"]["issues"][0]["issue"], "no_players_joined");
        assert_eq!(queue.pending_of(JobKind::RenderSheet), 0);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_a_conflict() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let instance = seeded.create_instance().await;
        let (router, _) = test_app(&seeded);
        let uri = format!(
            "/api/v1/games/{}/instances/{}/resume",
            seeded.game.id,
            instance.id()
        );

        let (status, body) = send(
            &router,
            request("POST", &uri, Some(seeded.owner)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["reason"], "IllegalTransition");
    }

    #[tokio::test]
    async fn test_join_sheet_upload_is_accepted_for_later_enrolment() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let instance = seeded.create_instance().await;
        let (router, queue) = test_app(&seeded);
        let code = SheetCode::Join(seeded.manager_subscription.join_code.unwrap()).encode();
        let scan = FakeScan::of(code).writing("Ada", "ada@example.org", "1 Engine Row");
        let uri = format!(
            "/api/v1/games/{}/instances/{}/turn-sheets/upload",
            seeded.game.id,
            instance.id()
        );

        let upload = request("POST", &uri, Some(seeded.owner))
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from(scan.to_image()))
            .unwrap();
        let (status, body) = send(&router, upload).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "received");
        assert_eq!(queue.pending_of(JobKind::JoinPlayer), 1);
    }

    #[tokio::test]
    async fn test_upload_that_is_not_an_image_is_rejected() {
        let mut seeded = Seeded::new().await;
        seeded.publish().await;
        let instance = seeded.create_instance().await;
        let (router, _) = test_app(&seeded);
        let uri = format!(
            "/api/v1/games/{}/instances/{}/turn-sheets/upload",
            seeded.game.id,
            instance.id()
        );

        let upload = request("POST", &uri, Some(seeded.owner))
            .body(Body::from("plain text"))
            .unwrap();
        let (status, body) = send(&router, upload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "UnsupportedImageFormat");
    }
}
