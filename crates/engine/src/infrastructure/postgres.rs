//! Postgres store.
//!
//! Authored worlds and live worlds are JSONB documents keyed by game and
//! instance. Everything the HTTP surface filters or locks on gets real columns.
//!
//! Visibility is enforced by row-level security. Account transactions switch to
//! the `playbymail_app` role and set `app.account_id`; the policies admit rows
//! of games the account holds a subscription for. System transactions keep the
//! connecting role, which owns the tables and bypasses the policies.
//!
//! Requires Postgres 15 or newer (`NULLS NOT DISTINCT`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use playbymail_domain::{
    AccountId, AuthoredWorld, Character, CharacterName, Description, Game, GameId, GameImage,
    GameInstance, GameInstanceId, GameInstanceRecord, GameName, JoinSubmission, JoinSubmissionId,
    LiveWorld, SheetTemplate, SheetToken, SheetType, Subscription, SubscriptionId, TemplateSnapshot,
    TurnSheet, TurnSheetId, TurnSheetRecord,
};

use crate::infrastructure::ports::{AccessScope, RepoError, Store, StoreTx};

const APP_ROLE: &str = "playbymail_app";

/// SQLSTATE raised by `NOWAIT` when the row is locked.
const LOCK_NOT_AVAILABLE: &str = "55P03";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    turn_duration_hours BIGINT NOT NULL,
    turn_limit BIGINT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS authored_worlds (
    game_id UUID PRIMARY KEY REFERENCES games(id) ON DELETE CASCADE,
    document JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS characters (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    account_id UUID NOT NULL,
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE (game_id, account_id)
);

CREATE TABLE IF NOT EXISTS subscriptions (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    account_id UUID NOT NULL,
    kind TEXT NOT NULL,
    game_instance_id UUID,
    join_code BIGINT UNIQUE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_subscriptions_account ON subscriptions (account_id);
CREATE INDEX IF NOT EXISTS idx_subscriptions_instance ON subscriptions (game_instance_id);

CREATE TABLE IF NOT EXISTS game_instances (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    manager_subscription_id UUID NOT NULL REFERENCES subscriptions(id),
    status TEXT NOT NULL,
    current_turn BIGINT NOT NULL,
    turn_limit BIGINT,
    turn_duration_hours BIGINT NOT NULL,
    started_at TIMESTAMPTZ,
    last_turn_at TIMESTAMPTZ,
    turn_deadline_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_game_instances_deadline
    ON game_instances (turn_deadline_at) WHERE status = 'started';

CREATE TABLE IF NOT EXISTS live_worlds (
    game_instance_id UUID PRIMARY KEY REFERENCES game_instances(id) ON DELETE CASCADE,
    document JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS sheet_templates (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    sheet_type TEXT NOT NULL,
    record_id UUID,
    layout JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE NULLS NOT DISTINCT (game_id, sheet_type, record_id)
);

CREATE TABLE IF NOT EXISTS template_snapshots (
    game_instance_id UUID NOT NULL REFERENCES game_instances(id) ON DELETE CASCADE,
    template_id UUID NOT NULL,
    sheet_type TEXT NOT NULL,
    record_id UUID,
    layout JSONB NOT NULL,
    captured_at TIMESTAMPTZ NOT NULL,
    UNIQUE NULLS NOT DISTINCT (game_instance_id, sheet_type, record_id)
);

CREATE TABLE IF NOT EXISTS game_images (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    record_id UUID,
    sheet_type TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    width BIGINT NOT NULL,
    height BIGINT NOT NULL,
    file_size BIGINT NOT NULL,
    bytes BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE NULLS NOT DISTINCT (game_id, record_id, sheet_type)
);

CREATE TABLE IF NOT EXISTS turn_sheets (
    id UUID PRIMARY KEY,
    code BIGINT NOT NULL UNIQUE,
    game_instance_id UUID NOT NULL REFERENCES game_instances(id) ON DELETE CASCADE,
    account_id UUID NOT NULL,
    character_instance_id UUID,
    sheet_type TEXT NOT NULL,
    turn_number BIGINT NOT NULL,
    sheet_data JSONB NOT NULL,
    processing_status TEXT NOT NULL,
    scanned_data JSONB,
    scanned_at TIMESTAMPTZ,
    scan_quality DOUBLE PRECISION,
    image_digest TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    UNIQUE (game_instance_id, account_id, turn_number, sheet_type)
);
CREATE INDEX IF NOT EXISTS idx_turn_sheets_pending
    ON turn_sheets (created_at) WHERE processing_status = 'pending';

CREATE TABLE IF NOT EXISTS sheet_documents (
    turn_sheet_id UUID PRIMARY KEY REFERENCES turn_sheets(id) ON DELETE CASCADE,
    pdf BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS join_submissions (
    id UUID PRIMARY KEY,
    game_id UUID NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    status TEXT NOT NULL,
    document JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE OR REPLACE FUNCTION app_account_id() RETURNS UUID
LANGUAGE sql STABLE AS $$
    SELECT NULLIF(current_setting('app.account_id', true), '')::uuid
$$;

-- Runs as the table owner so the subscriptions policy does not recurse.
CREATE OR REPLACE FUNCTION app_visible_games() RETURNS SETOF UUID
LANGUAGE sql STABLE SECURITY DEFINER SET search_path = public AS $$
    SELECT game_id FROM subscriptions WHERE account_id = app_account_id()
$$;

DO $$
BEGIN
    IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = 'playbymail_app') THEN
        CREATE ROLE playbymail_app NOLOGIN;
    END IF;
END
$$;
GRANT playbymail_app TO CURRENT_USER;
GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO playbymail_app;

ALTER TABLE games ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS games_visible ON games;
CREATE POLICY games_visible ON games
    USING (id IN (SELECT app_visible_games()));

ALTER TABLE authored_worlds ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS authored_worlds_visible ON authored_worlds;
CREATE POLICY authored_worlds_visible ON authored_worlds
    USING (game_id IN (SELECT app_visible_games()));

ALTER TABLE characters ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS characters_visible ON characters;
CREATE POLICY characters_visible ON characters
    USING (game_id IN (SELECT app_visible_games()));

ALTER TABLE subscriptions ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS subscriptions_visible ON subscriptions;
CREATE POLICY subscriptions_visible ON subscriptions
    USING (account_id = app_account_id() OR game_id IN (SELECT app_visible_games()));

ALTER TABLE game_instances ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS game_instances_visible ON game_instances;
CREATE POLICY game_instances_visible ON game_instances
    USING (game_id IN (SELECT app_visible_games()));

ALTER TABLE live_worlds ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS live_worlds_visible ON live_worlds;
CREATE POLICY live_worlds_visible ON live_worlds
    USING (game_instance_id IN (SELECT id FROM game_instances));

ALTER TABLE sheet_templates ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS sheet_templates_visible ON sheet_templates;
CREATE POLICY sheet_templates_visible ON sheet_templates
    USING (game_id IN (SELECT app_visible_games()));

ALTER TABLE template_snapshots ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS template_snapshots_visible ON template_snapshots;
CREATE POLICY template_snapshots_visible ON template_snapshots
    USING (game_instance_id IN (SELECT id FROM game_instances));

ALTER TABLE game_images ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS game_images_visible ON game_images;
CREATE POLICY game_images_visible ON game_images
    USING (game_id IN (SELECT app_visible_games()));

ALTER TABLE turn_sheets ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS turn_sheets_visible ON turn_sheets;
CREATE POLICY turn_sheets_visible ON turn_sheets
    USING (game_instance_id IN (SELECT id FROM game_instances));

ALTER TABLE sheet_documents ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS sheet_documents_visible ON sheet_documents;
CREATE POLICY sheet_documents_visible ON sheet_documents
    USING (turn_sheet_id IN (SELECT id FROM turn_sheets));

ALTER TABLE join_submissions ENABLE ROW LEVEL SECURITY;
DROP POLICY IF EXISTS join_submissions_visible ON join_submissions;
CREATE POLICY join_submissions_visible ON join_submissions
    USING (game_id IN (SELECT app_visible_games()));
"#;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, RepoError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| RepoError::database("connect", e))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| RepoError::database("migrate", e))?;
        tracing::info!("Postgres schema ready");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self, scope: &AccessScope) -> Result<Box<dyn StoreTx>, RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("begin", e))?;

        if let Some(account_id) = scope.account_id() {
            sqlx::query(&format!("SET LOCAL ROLE {}", APP_ROLE))
                .execute(&mut *tx)
                .await
                .map_err(|e| RepoError::database("set_role", e))?;
            sqlx::query("SELECT set_config('app.account_id', $1, true)")
                .bind(account_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| RepoError::database("set_account", e))?;
        }

        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// Map a driver error, surfacing unique violations as constraint errors.
fn db_error(operation: &'static str) -> impl Fn(sqlx::Error) -> RepoError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::constraint(db.message())
        }
        _ => RepoError::database(operation, e),
    }
}

fn is_lock_not_available(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE))
}

fn to_u32(value: i64, column: &str) -> Result<u32, RepoError> {
    u32::try_from(value)
        .map_err(|_| RepoError::serialization(format!("{} out of range: {}", column, value)))
}

fn to_token(value: i64) -> Result<SheetToken, RepoError> {
    u64::try_from(value)
        .ok()
        .and_then(|bits| SheetToken::from_bits(bits).ok())
        .ok_or_else(|| RepoError::serialization(format!("sheet code out of range: {}", value)))
}

// Tokens are 40 bits wide, so the cast never wraps.
fn from_token(token: SheetToken) -> i64 {
    token.bits() as i64
}

fn advisory_key(id: GameInstanceId) -> i64 {
    let (hi, lo) = id.as_uuid().as_u64_pair();
    (hi ^ lo) as i64
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct GameRow {
    id: Uuid,
    name: String,
    description: String,
    status: String,
    turn_duration_hours: i64,
    turn_limit: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GameRow> for Game {
    type Error = RepoError;

    fn try_from(row: GameRow) -> Result<Self, Self::Error> {
        Ok(Game {
            id: row.id.into(),
            name: GameName::new(row.name)?,
            description: Description::new(row.description)?,
            status: row.status.parse()?,
            turn_duration_hours: to_u32(row.turn_duration_hours, "turn_duration_hours")?,
            turn_limit: row
                .turn_limit
                .map(|v| to_u32(v, "turn_limit"))
                .transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CharacterRow {
    id: Uuid,
    game_id: Uuid,
    account_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CharacterRow> for Character {
    type Error = RepoError;

    fn try_from(row: CharacterRow) -> Result<Self, Self::Error> {
        Ok(Character {
            id: row.id.into(),
            game_id: row.game_id.into(),
            account_id: row.account_id.into(),
            name: CharacterName::new(row.name)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    game_id: Uuid,
    account_id: Uuid,
    kind: String,
    game_instance_id: Option<Uuid>,
    join_code: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = RepoError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id.into(),
            game_id: row.game_id.into(),
            account_id: row.account_id.into(),
            kind: row.kind.parse()?,
            game_instance_id: row.game_instance_id.map(Into::into),
            join_code: row.join_code.map(to_token).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: Uuid,
    game_id: Uuid,
    manager_subscription_id: Uuid,
    status: String,
    current_turn: i64,
    turn_limit: Option<i64>,
    turn_duration_hours: i64,
    started_at: Option<DateTime<Utc>>,
    last_turn_at: Option<DateTime<Utc>>,
    turn_deadline_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InstanceRow> for GameInstance {
    type Error = RepoError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        let record = GameInstanceRecord {
            id: row.id.into(),
            game_id: row.game_id.into(),
            manager_subscription_id: row.manager_subscription_id.into(),
            status: row.status.parse()?,
            current_turn: to_u32(row.current_turn, "current_turn")?,
            turn_limit: row
                .turn_limit
                .map(|v| to_u32(v, "turn_limit"))
                .transpose()?,
            turn_duration_hours: to_u32(row.turn_duration_hours, "turn_duration_hours")?,
            started_at: row.started_at,
            last_turn_at: row.last_turn_at,
            turn_deadline_at: row.turn_deadline_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        Ok(GameInstance::try_from(record)?)
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    game_id: Uuid,
    sheet_type: String,
    record_id: Option<Uuid>,
    layout: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for SheetTemplate {
    type Error = RepoError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(SheetTemplate {
            id: row.id.into(),
            game_id: row.game_id.into(),
            sheet_type: row.sheet_type.parse()?,
            record_id: row.record_id,
            layout: row.layout,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    game_instance_id: Uuid,
    template_id: Uuid,
    sheet_type: String,
    record_id: Option<Uuid>,
    layout: serde_json::Value,
    captured_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for TemplateSnapshot {
    type Error = RepoError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(TemplateSnapshot {
            game_instance_id: row.game_instance_id.into(),
            template_id: row.template_id.into(),
            sheet_type: row.sheet_type.parse()?,
            record_id: row.record_id,
            layout: row.layout,
            captured_at: row.captured_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    game_id: Uuid,
    record_id: Option<Uuid>,
    sheet_type: String,
    mime_type: String,
    width: i64,
    height: i64,
    file_size: i64,
    bytes: Vec<u8>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ImageRow> for GameImage {
    type Error = RepoError;

    fn try_from(row: ImageRow) -> Result<Self, Self::Error> {
        Ok(GameImage {
            id: row.id.into(),
            game_id: row.game_id.into(),
            record_id: row.record_id,
            sheet_type: row.sheet_type.parse()?,
            mime_type: row.mime_type.parse()?,
            width: to_u32(row.width, "width")?,
            height: to_u32(row.height, "height")?,
            file_size: to_u32(row.file_size, "file_size")?,
            bytes: row.bytes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TurnSheetRow {
    id: Uuid,
    code: i64,
    game_instance_id: Uuid,
    account_id: Uuid,
    character_instance_id: Option<Uuid>,
    sheet_type: String,
    turn_number: i64,
    sheet_data: serde_json::Value,
    processing_status: String,
    scanned_data: Option<serde_json::Value>,
    scanned_at: Option<DateTime<Utc>>,
    scan_quality: Option<f64>,
    image_digest: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TurnSheetRow> for TurnSheet {
    type Error = RepoError;

    fn try_from(row: TurnSheetRow) -> Result<Self, Self::Error> {
        let record = TurnSheetRecord {
            id: row.id.into(),
            code: to_token(row.code)?,
            game_instance_id: row.game_instance_id.into(),
            account_id: row.account_id.into(),
            character_instance_id: row.character_instance_id.map(Into::into),
            sheet_type: row.sheet_type.parse()?,
            turn_number: to_u32(row.turn_number, "turn_number")?,
            sheet_data: row.sheet_data,
            processing_status: row.processing_status.parse()?,
            scanned_data: row.scanned_data,
            scanned_at: row.scanned_at,
            scan_quality: row.scan_quality,
            image_digest: row.image_digest,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };
        Ok(TurnSheet::try_from(record)?)
    }
}

const TURN_SHEET_COLUMNS: &str = "id, code, game_instance_id, account_id, character_instance_id, \
     sheet_type, turn_number, sheet_data, processing_status, scanned_data, scanned_at, \
     scan_quality, image_digest, created_at, updated_at";

const INSTANCE_COLUMNS: &str = "id, game_id, manager_subscription_id, status, current_turn, \
     turn_limit, turn_duration_hours, started_at, last_turn_at, turn_deadline_at, \
     created_at, updated_at";

#[async_trait]
impl StoreTx for PgTx {
    // =========================================================================
    // Games and authored content
    // =========================================================================

    async fn get_game(&mut self, id: GameId) -> Result<Game, RepoError> {
        let row: Option<GameRow> = sqlx::query_as("SELECT * FROM games WHERE id = $1")
            .bind(id.to_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("get_game"))?;
        row.ok_or_else(|| RepoError::not_found("Game", id))?
            .try_into()
    }

    async fn save_game(&mut self, game: &Game) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO games (id, name, description, status, turn_duration_hours, turn_limit, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                status = EXCLUDED.status,
                turn_duration_hours = EXCLUDED.turn_duration_hours,
                turn_limit = EXCLUDED.turn_limit,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(game.id.to_uuid())
        .bind(game.name.as_str())
        .bind(game.description.as_str())
        .bind(game.status.as_str())
        .bind(i64::from(game.turn_duration_hours))
        .bind(game.turn_limit.map(i64::from))
        .bind(game.created_at)
        .bind(game.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_game"))?;
        Ok(())
    }

    async fn save_world(&mut self, world: &AuthoredWorld) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO authored_worlds (game_id, document, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (game_id) DO UPDATE SET
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(world.game.id.to_uuid())
        .bind(Json(world))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_world"))?;
        Ok(())
    }

    async fn load_world(&mut self, game_id: GameId) -> Result<AuthoredWorld, RepoError> {
        let game = self.get_game(game_id).await?;
        let document: Option<(Json<AuthoredWorld>,)> =
            sqlx::query_as("SELECT document FROM authored_worlds WHERE game_id = $1")
                .bind(game_id.to_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_error("load_world"))?;

        let mut world = match document {
            Some((Json(world),)) => world,
            None => AuthoredWorld::empty(game.clone()),
        };
        world.game = game;
        Ok(world)
    }

    async fn save_character(&mut self, character: &Character) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO characters (id, game_id, account_id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(character.id.to_uuid())
        .bind(character.game_id.to_uuid())
        .bind(character.account_id.to_uuid())
        .bind(character.name.as_str())
        .bind(character.created_at)
        .bind(character.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_character"))?;
        Ok(())
    }

    async fn find_character(
        &mut self,
        game_id: GameId,
        account_id: AccountId,
    ) -> Result<Option<Character>, RepoError> {
        let row: Option<CharacterRow> =
            sqlx::query_as("SELECT * FROM characters WHERE game_id = $1 AND account_id = $2")
                .bind(game_id.to_uuid())
                .bind(account_id.to_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_error("find_character"))?;
        row.map(Character::try_from).transpose()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    async fn save_subscription(&mut self, subscription: &Subscription) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, game_id, account_id, kind, game_instance_id, join_code,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                game_instance_id = EXCLUDED.game_instance_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(subscription.id.to_uuid())
        .bind(subscription.game_id.to_uuid())
        .bind(subscription.account_id.to_uuid())
        .bind(subscription.kind.as_str())
        .bind(subscription.game_instance_id.map(|id| id.to_uuid()))
        .bind(subscription.join_code.map(from_token))
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_subscription"))?;
        Ok(())
    }

    async fn get_subscription(&mut self, id: SubscriptionId) -> Result<Subscription, RepoError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as("SELECT * FROM subscriptions WHERE id = $1")
                .bind(id.to_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_error("get_subscription"))?;
        row.ok_or_else(|| RepoError::not_found("Subscription", id))?
            .try_into()
    }

    async fn find_manager_by_join_code(
        &mut self,
        code: SheetToken,
    ) -> Result<Option<Subscription>, RepoError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            "SELECT * FROM subscriptions WHERE join_code = $1 AND kind = 'manager'",
        )
        .bind(from_token(code))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("find_manager_by_join_code"))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn list_account_subscriptions(
        &mut self,
        account_id: AccountId,
    ) -> Result<Vec<Subscription>, RepoError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            "SELECT * FROM subscriptions WHERE account_id = $1 ORDER BY created_at, id",
        )
        .bind(account_id.to_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list_account_subscriptions"))?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn list_instance_players(
        &mut self,
        instance_id: GameInstanceId,
    ) -> Result<Vec<Subscription>, RepoError> {
        self.get_instance(instance_id).await?;
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT * FROM subscriptions
            WHERE game_instance_id = $1 AND kind = 'player'
            ORDER BY created_at, id
            "#,
        )
        .bind(instance_id.to_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list_instance_players"))?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    // =========================================================================
    // Game instances
    // =========================================================================

    async fn save_instance(&mut self, instance: &GameInstance) -> Result<(), RepoError> {
        let record = GameInstanceRecord::from(instance.clone());
        sqlx::query(
            r#"
            INSERT INTO game_instances (id, game_id, manager_subscription_id, status, current_turn,
                turn_limit, turn_duration_hours, started_at, last_turn_at, turn_deadline_at,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                current_turn = EXCLUDED.current_turn,
                started_at = EXCLUDED.started_at,
                last_turn_at = EXCLUDED.last_turn_at,
                turn_deadline_at = EXCLUDED.turn_deadline_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.id.to_uuid())
        .bind(record.game_id.to_uuid())
        .bind(record.manager_subscription_id.to_uuid())
        .bind(record.status.as_str())
        .bind(i64::from(record.current_turn))
        .bind(record.turn_limit.map(i64::from))
        .bind(i64::from(record.turn_duration_hours))
        .bind(record.started_at)
        .bind(record.last_turn_at)
        .bind(record.turn_deadline_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_instance"))?;
        Ok(())
    }

    async fn get_instance(&mut self, id: GameInstanceId) -> Result<GameInstance, RepoError> {
        let row: Option<InstanceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM game_instances WHERE id = $1",
            INSTANCE_COLUMNS
        ))
        .bind(id.to_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("get_instance"))?;
        row.ok_or_else(|| RepoError::not_found("GameInstance", id))?
            .try_into()
    }

    async fn lock_instance(&mut self, id: GameInstanceId) -> Result<(), RepoError> {
        self.get_instance(id).await?;
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_xact_lock($1)")
            .bind(advisory_key(id))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("lock_instance"))?;
        if !acquired {
            return Err(RepoError::busy("GameInstance", id));
        }
        Ok(())
    }

    async fn list_manager_instances(
        &mut self,
        manager_subscription_id: SubscriptionId,
    ) -> Result<Vec<GameInstance>, RepoError> {
        let rows: Vec<InstanceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM game_instances WHERE manager_subscription_id = $1 ORDER BY created_at, id",
            INSTANCE_COLUMNS
        ))
        .bind(manager_subscription_id.to_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list_manager_instances"))?;
        rows.into_iter().map(GameInstance::try_from).collect()
    }

    async fn list_overdue_instances(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<GameInstance>, RepoError> {
        let rows: Vec<InstanceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM game_instances
            WHERE status = 'started' AND turn_deadline_at <= $1
            ORDER BY turn_deadline_at, id
            "#,
            INSTANCE_COLUMNS
        ))
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list_overdue_instances"))?;
        rows.into_iter().map(GameInstance::try_from).collect()
    }

    // =========================================================================
    // Live world
    // =========================================================================

    async fn save_live_world(
        &mut self,
        instance_id: GameInstanceId,
        live: &LiveWorld,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO live_worlds (game_instance_id, document, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (game_instance_id) DO UPDATE SET
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(instance_id.to_uuid())
        .bind(Json(live))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_live_world"))?;
        Ok(())
    }

    async fn load_live_world(
        &mut self,
        instance_id: GameInstanceId,
    ) -> Result<LiveWorld, RepoError> {
        let document: Option<(Json<LiveWorld>,)> =
            sqlx::query_as("SELECT document FROM live_worlds WHERE game_instance_id = $1")
                .bind(instance_id.to_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_error("load_live_world"))?;
        document
            .map(|(Json(live),)| live)
            .ok_or_else(|| RepoError::not_found("LiveWorld", instance_id))
    }

    // =========================================================================
    // Sheet templates
    // =========================================================================

    async fn save_template(&mut self, template: &SheetTemplate) -> Result<SheetTemplate, RepoError> {
        let row: TemplateRow = sqlx::query_as(
            r#"
            INSERT INTO sheet_templates (id, game_id, sheet_type, record_id, layout, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (game_id, sheet_type, record_id) DO UPDATE SET
                layout = EXCLUDED.layout,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(template.id.to_uuid())
        .bind(template.game_id.to_uuid())
        .bind(template.sheet_type.as_str())
        .bind(template.record_id)
        .bind(&template.layout)
        .bind(template.created_at)
        .bind(template.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("save_template"))?;
        row.try_into()
    }

    async fn find_template(
        &mut self,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<SheetTemplate>, RepoError> {
        let row: Option<TemplateRow> = sqlx::query_as(
            r#"
            SELECT * FROM sheet_templates
            WHERE game_id = $1 AND sheet_type = $2 AND record_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(game_id.to_uuid())
        .bind(sheet_type.as_str())
        .bind(record_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("find_template"))?;
        row.map(SheetTemplate::try_from).transpose()
    }

    async fn list_templates(&mut self, game_id: GameId) -> Result<Vec<SheetTemplate>, RepoError> {
        let rows: Vec<TemplateRow> = sqlx::query_as(
            "SELECT * FROM sheet_templates WHERE game_id = $1 ORDER BY sheet_type, record_id NULLS FIRST, id",
        )
        .bind(game_id.to_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list_templates"))?;
        rows.into_iter().map(SheetTemplate::try_from).collect()
    }

    async fn save_template_snapshots(
        &mut self,
        snapshots: &[TemplateSnapshot],
    ) -> Result<(), RepoError> {
        for snapshot in snapshots {
            sqlx::query(
                r#"
                INSERT INTO template_snapshots (game_instance_id, template_id, sheet_type, record_id, layout, captured_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(snapshot.game_instance_id.to_uuid())
            .bind(snapshot.template_id.to_uuid())
            .bind(snapshot.sheet_type.as_str())
            .bind(snapshot.record_id)
            .bind(&snapshot.layout)
            .bind(snapshot.captured_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("save_template_snapshots"))?;
        }
        Ok(())
    }

    async fn find_template_snapshot(
        &mut self,
        instance_id: GameInstanceId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<TemplateSnapshot>, RepoError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT * FROM template_snapshots
            WHERE game_instance_id = $1 AND sheet_type = $2 AND record_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(instance_id.to_uuid())
        .bind(sheet_type.as_str())
        .bind(record_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("find_template_snapshot"))?;
        row.map(TemplateSnapshot::try_from).transpose()
    }

    // =========================================================================
    // Game images
    // =========================================================================

    async fn upsert_image(&mut self, image: &GameImage) -> Result<GameImage, RepoError> {
        let row: ImageRow = sqlx::query_as(
            r#"
            INSERT INTO game_images (id, game_id, record_id, sheet_type, mime_type, width, height,
                file_size, bytes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (game_id, record_id, sheet_type) DO UPDATE SET
                mime_type = EXCLUDED.mime_type,
                width = EXCLUDED.width,
                height = EXCLUDED.height,
                file_size = EXCLUDED.file_size,
                bytes = EXCLUDED.bytes,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(image.id.to_uuid())
        .bind(image.game_id.to_uuid())
        .bind(image.record_id)
        .bind(image.sheet_type.as_str())
        .bind(image.mime_type.as_str())
        .bind(i64::from(image.width))
        .bind(i64::from(image.height))
        .bind(i64::from(image.file_size))
        .bind(&image.bytes)
        .bind(image.created_at)
        .bind(image.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("upsert_image"))?;
        row.try_into()
    }

    async fn find_image(
        &mut self,
        game_id: GameId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Result<Option<GameImage>, RepoError> {
        let row: Option<ImageRow> = sqlx::query_as(
            r#"
            SELECT * FROM game_images
            WHERE game_id = $1 AND sheet_type = $2 AND record_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(game_id.to_uuid())
        .bind(sheet_type.as_str())
        .bind(record_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("find_image"))?;
        row.map(GameImage::try_from).transpose()
    }

    // =========================================================================
    // Turn sheets
    // =========================================================================

    async fn insert_turn_sheet(&mut self, sheet: &TurnSheet) -> Result<(), RepoError> {
        let record = TurnSheetRecord::from(sheet);
        sqlx::query(&format!(
            "INSERT INTO turn_sheets ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            TURN_SHEET_COLUMNS
        ))
        .bind(record.id.to_uuid())
        .bind(from_token(record.code))
        .bind(record.game_instance_id.to_uuid())
        .bind(record.account_id.to_uuid())
        .bind(record.character_instance_id.map(|id| id.to_uuid()))
        .bind(record.sheet_type.as_str())
        .bind(i64::from(record.turn_number))
        .bind(&record.sheet_data)
        .bind(record.processing_status.as_str())
        .bind(&record.scanned_data)
        .bind(record.scanned_at)
        .bind(record.scan_quality)
        .bind(&record.image_digest)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("insert_turn_sheet"))?;
        Ok(())
    }

    async fn save_turn_sheet(&mut self, sheet: &TurnSheet) -> Result<(), RepoError> {
        let record = TurnSheetRecord::from(sheet);
        let result = sqlx::query(
            r#"
            UPDATE turn_sheets SET
                processing_status = $2,
                scanned_data = $3,
                scanned_at = $4,
                scan_quality = $5,
                image_digest = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(record.id.to_uuid())
        .bind(record.processing_status.as_str())
        .bind(&record.scanned_data)
        .bind(record.scanned_at)
        .bind(record.scan_quality)
        .bind(&record.image_digest)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_turn_sheet"))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("TurnSheet", record.id));
        }
        Ok(())
    }

    async fn get_turn_sheet(&mut self, id: TurnSheetId) -> Result<TurnSheet, RepoError> {
        let row: Option<TurnSheetRow> = sqlx::query_as(&format!(
            "SELECT {} FROM turn_sheets WHERE id = $1",
            TURN_SHEET_COLUMNS
        ))
        .bind(id.to_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("get_turn_sheet"))?;
        row.ok_or_else(|| RepoError::not_found("TurnSheet", id))?
            .try_into()
    }

    async fn find_turn_sheet_by_code(
        &mut self,
        code: SheetToken,
    ) -> Result<Option<TurnSheet>, RepoError> {
        let row: Option<TurnSheetRow> = sqlx::query_as(&format!(
            "SELECT {} FROM turn_sheets WHERE code = $1",
            TURN_SHEET_COLUMNS
        ))
        .bind(from_token(code))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("find_turn_sheet_by_code"))?;
        row.map(TurnSheet::try_from).transpose()
    }

    async fn lock_turn_sheet(&mut self, id: TurnSheetId) -> Result<TurnSheet, RepoError> {
        let row: Option<TurnSheetRow> = sqlx::query_as(&format!(
            "SELECT {} FROM turn_sheets WHERE id = $1 FOR UPDATE NOWAIT",
            TURN_SHEET_COLUMNS
        ))
        .bind(id.to_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_lock_not_available(&e) {
                RepoError::busy("TurnSheet", id)
            } else {
                db_error("lock_turn_sheet")(e)
            }
        })?;
        row.ok_or_else(|| RepoError::not_found("TurnSheet", id))?
            .try_into()
    }

    async fn list_turn_sheets(
        &mut self,
        instance_id: GameInstanceId,
        turn_number: u32,
    ) -> Result<Vec<TurnSheet>, RepoError> {
        self.get_instance(instance_id).await?;
        let rows: Vec<TurnSheetRow> = sqlx::query_as(&format!(
            "SELECT {} FROM turn_sheets WHERE game_instance_id = $1 AND turn_number = $2 ORDER BY account_id, id",
            TURN_SHEET_COLUMNS
        ))
        .bind(instance_id.to_uuid())
        .bind(i64::from(turn_number))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list_turn_sheets"))?;
        rows.into_iter().map(TurnSheet::try_from).collect()
    }

    async fn list_unprinted_sheets(
        &mut self,
        before: DateTime<Utc>,
    ) -> Result<Vec<TurnSheet>, RepoError> {
        let rows: Vec<TurnSheetRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM turn_sheets
            WHERE processing_status = 'pending'
                AND created_at <= $1
                AND game_instance_id IN (SELECT id FROM game_instances WHERE status = 'started')
            ORDER BY created_at, id
            "#,
            TURN_SHEET_COLUMNS
        ))
        .bind(before)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list_unprinted_sheets"))?;
        rows.into_iter().map(TurnSheet::try_from).collect()
    }

    // =========================================================================
    // Rendered documents
    // =========================================================================

    async fn save_sheet_document(
        &mut self,
        turn_sheet_id: TurnSheetId,
        pdf: &[u8],
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sheet_documents (turn_sheet_id, pdf)
            VALUES ($1, $2)
            ON CONFLICT (turn_sheet_id) DO UPDATE SET pdf = EXCLUDED.pdf
            "#,
        )
        .bind(turn_sheet_id.to_uuid())
        .bind(pdf)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_sheet_document"))?;
        Ok(())
    }

    async fn get_sheet_document(
        &mut self,
        turn_sheet_id: TurnSheetId,
    ) -> Result<Option<Vec<u8>>, RepoError> {
        self.get_turn_sheet(turn_sheet_id).await?;
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT pdf FROM sheet_documents WHERE turn_sheet_id = $1")
                .bind(turn_sheet_id.to_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_error("get_sheet_document"))?;
        Ok(row.map(|(pdf,)| pdf))
    }

    // =========================================================================
    // Join submissions
    // =========================================================================

    async fn save_join_submission(
        &mut self,
        submission: &JoinSubmission,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO join_submissions (id, game_id, status, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(submission.id.to_uuid())
        .bind(submission.game_id.to_uuid())
        .bind(submission.status.as_str())
        .bind(Json(submission))
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save_join_submission"))?;
        Ok(())
    }

    async fn get_join_submission(
        &mut self,
        id: JoinSubmissionId,
    ) -> Result<JoinSubmission, RepoError> {
        let row: Option<(Json<JoinSubmission>,)> =
            sqlx::query_as("SELECT document FROM join_submissions WHERE id = $1")
                .bind(id.to_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_error("get_join_submission"))?;
        row.map(|(Json(submission),)| submission)
            .ok_or_else(|| RepoError::not_found("JoinSubmission", id))
    }

    async fn list_received_join_submissions(
        &mut self,
        before: DateTime<Utc>,
    ) -> Result<Vec<JoinSubmission>, RepoError> {
        let rows: Vec<(Json<JoinSubmission>,)> = sqlx::query_as(
            r#"
            SELECT document FROM join_submissions
            WHERE status = 'received' AND created_at <= $1
            ORDER BY created_at, id
            "#,
        )
        .bind(before)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("list_received_join_submissions"))?;
        Ok(rows.into_iter().map(|(Json(submission),)| submission).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx
            .commit()
            .await
            .map_err(|e| RepoError::database("commit", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_keys_are_stable_per_instance() {
        let id = GameInstanceId::new();
        assert_eq!(advisory_key(id), advisory_key(id));
        assert_ne!(advisory_key(id), advisory_key(GameInstanceId::new()));
    }

    #[test]
    fn out_of_range_counters_are_rejected() {
        assert_eq!(to_u32(7, "turn_number").unwrap(), 7);
        assert!(to_u32(-1, "turn_number").is_err());
        assert!(to_u32(i64::from(u32::MAX) + 1, "turn_number").is_err());
    }

    #[test]
    fn sheet_codes_survive_the_bigint_column() {
        let token = SheetToken::generate();
        assert_eq!(to_token(from_token(token)).unwrap(), token);
        assert!(to_token(-1).is_err());
        assert!(to_token(1 << 40).is_err());
    }
}
