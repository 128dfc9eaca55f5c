//! A seeded cave world in the in-memory store.
//!
//! Layout:
//!
//! ```text
//! Cave Mouth (start) --Descend--> Great Hall --Climb--> Cave Mouth
//! Cave Mouth --Wade--> Deep Pool
//! ```

use std::sync::Arc;

use playbymail_domain::{
    AccountId, AuthoredWorld, Character, CharacterName, Game, GameInstance, GameInstanceId,
    GameName, InstanceAction, Item, ItemId, ItemName, ItemPlacement, LinkName, Location,
    LocationLink, LocationName, ScanQuality, ScanRecord, SheetTemplate, SheetType, Subscription,
    TurnSheet, TurnSheetId,
};

use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::correlation::CorrelationId;
use crate::infrastructure::memory::MemoryStore;
use crate::infrastructure::ports::{AccessScope, ClockPort, Store};
use crate::use_cases::context::RequestContext;
use crate::use_cases::instances::Instances;

use super::{join_game_layout, location_choice_layout, t0, RecordingQueue};

pub struct Seeded {
    store: MemoryStore,
    clock: Arc<ManualClock>,
    pub owner: AccountId,
    pub game: Game,
    pub manager_subscription: Subscription,
    pub world: AuthoredWorld,
}

impl Seeded {
    /// A draft game with the cave world and game-level templates.
    pub async fn new() -> Self {
        let now = t0();
        let store = MemoryStore::new();
        let owner = AccountId::new();
        let game = Game::new(GameName::new("The Caves").expect("name"), now).with_turn_limit(10);
        let [designer, manager] = Subscription::minted_for_creator(game.id, owner, now);

        let mouth = Location::new(game.id, LocationName::new("Cave Mouth").expect("name"), now)
            .starting();
        let hall = Location::new(game.id, LocationName::new("Great Hall").expect("name"), now);
        let pool = Location::new(game.id, LocationName::new("Deep Pool").expect("name"), now);
        let link = |from: &Location, to: &Location, name: &str| {
            LocationLink::new(from, to, LinkName::new(name).expect("name"), now).expect("link")
        };
        let mut world = AuthoredWorld::empty(game.clone());
        world.links = vec![
            link(&mouth, &hall, "Descend"),
            link(&hall, &mouth, "Climb"),
            link(&mouth, &pool, "Wade"),
        ];
        world.locations = vec![mouth, hall, pool];

        let mut tx = store.begin(&AccessScope::System).await.expect("begin");
        tx.save_game(&game).await.expect("game");
        tx.save_subscription(&designer).await.expect("designer");
        tx.save_subscription(&manager).await.expect("manager");
        tx.save_world(&world).await.expect("world");
        for (sheet_type, layout) in [
            (SheetType::LocationChoice, location_choice_layout()),
            (SheetType::JoinGame, join_game_layout()),
        ] {
            tx.save_template(&SheetTemplate::new(game.id, sheet_type, None, layout, now))
                .await
                .expect("template");
        }
        tx.commit().await.expect("commit");

        Self {
            store,
            clock: Arc::new(ManualClock::new(now)),
            owner,
            game,
            manager_subscription: manager,
            world,
        }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::new(self.store.clone())
    }

    pub fn clock(&self) -> Arc<dyn ClockPort> {
        self.clock.clone()
    }

    pub fn manual_clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn owner_ctx(&self) -> RequestContext {
        let subs = Subscription::minted_for_creator(self.game.id, self.owner, t0());
        RequestContext::new(
            AccessScope::for_account(self.owner, &subs),
            CorrelationId::new(),
        )
    }

    pub fn stranger_ctx(&self) -> RequestContext {
        RequestContext::new(
            AccessScope::for_account(AccountId::new(), &[]),
            CorrelationId::new(),
        )
    }

    pub fn system_ctx(&self) -> RequestContext {
        RequestContext::system(CorrelationId::new())
    }

    /// Context built from whatever subscriptions the account holds now.
    pub async fn account_ctx(&self, account: AccountId) -> RequestContext {
        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        let subs = tx
            .list_account_subscriptions(account)
            .await
            .expect("subscriptions");
        RequestContext::new(AccessScope::for_account(account, &subs), CorrelationId::new())
    }

    pub async fn publish(&mut self) {
        self.game.publish(self.clock.now());
        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        tx.save_game(&self.game).await.expect("publish");
        tx.commit().await.expect("commit");
    }

    /// A `created` instance opened by the owner's manager subscription.
    pub async fn create_instance(&self) -> GameInstance {
        let instance = GameInstance::new(&self.game, self.manager_subscription.id, self.clock.now());
        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        tx.save_instance(&instance).await.expect("instance");
        tx.commit().await.expect("commit");
        instance
    }

    /// Bind a new player and character to `instance`, as the join worker would.
    pub async fn enroll_player(&self, instance: &GameInstance, name: &str) -> AccountId {
        let account = AccountId::new();
        self.enroll_account(instance, account, name).await;
        account
    }

    pub async fn enroll_account(&self, instance: &GameInstance, account: AccountId, name: &str) {
        let now = self.clock.now();
        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        tx.save_subscription(&Subscription::player_for(
            self.game.id,
            account,
            instance.id(),
            now,
        ))
        .await
        .expect("player");
        tx.save_character(&Character::new(
            self.game.id,
            account,
            CharacterName::new(name).expect("name"),
            now,
        ))
        .await
        .expect("character");
        tx.commit().await.expect("commit");
    }

    /// Publish, open an instance, enroll one player per name and start it.
    ///
    /// Players are returned in the order given.
    pub async fn start_with_players(&mut self, names: &[&str]) -> (GameInstance, Vec<AccountId>) {
        self.publish().await;
        let instance = self.create_instance().await;
        let mut players = Vec::new();
        for name in names {
            players.push(self.enroll_player(&instance, name).await);
        }
        let instances = Instances::new(
            self.store(),
            Arc::new(RecordingQueue::new()),
            self.clock(),
            Arc::new(SnapshotCache::new()),
        );
        let started = instances
            .transition(&self.owner_ctx(), self.game.id, instance.id(), InstanceAction::Start)
            .await
            .expect("start instance");
        (started, players)
    }

    /// Mark every pending sheet of a turn printed, as the render worker would.
    pub async fn print_turn(&self, instance_id: GameInstanceId, turn: u32) -> Vec<TurnSheet> {
        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        let mut printed = Vec::new();
        for mut sheet in tx.list_turn_sheets(instance_id, turn).await.expect("sheets") {
            if sheet.mark_printed(self.clock.now()).is_ok() {
                tx.save_turn_sheet(&sheet).await.expect("save sheet");
            }
            printed.push(sheet);
        }
        tx.commit().await.expect("commit");
        printed
    }

    /// Author one item lying at `location` from the start. Draft games only.
    pub async fn place_item(&mut self, name: &str, location: &str) -> ItemId {
        let now = self.clock.now();
        let item = Item::new(self.game.id, ItemName::new(name).expect("name"), now);
        let location_id = self.location(location).id;
        self.world
            .item_placements
            .push(ItemPlacement::new(self.game.id, item.id, location_id, 1, now));
        let item_id = item.id;
        self.world.items.push(item);

        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        tx.save_world(&self.world).await.expect("world");
        tx.commit().await.expect("commit");
        item_id
    }

    /// Record a successful scan directly, as the upload pipeline would.
    pub async fn process_sheet(&self, id: TurnSheetId, answers: serde_json::Value) {
        let now = self.clock.now();
        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        let mut sheet = tx.get_turn_sheet(id).await.expect("sheet");
        let _ = sheet.mark_printed(now);
        sheet
            .record_scan(
                ScanRecord {
                    scanned_data: answers,
                    scanned_at: now,
                    scan_quality: ScanQuality::clamped(0.9),
                    image_digest: None,
                },
                now,
            )
            .expect("record scan");
        tx.save_turn_sheet(&sheet).await.expect("save sheet");
        tx.commit().await.expect("commit");
    }

    pub async fn sheet(&self, id: TurnSheetId) -> TurnSheet {
        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        tx.get_turn_sheet(id).await.expect("sheet")
    }

    pub async fn instance(&self, id: GameInstanceId) -> GameInstance {
        let mut tx = self.store.begin(&AccessScope::System).await.expect("begin");
        tx.get_instance(id).await.expect("instance")
    }

    pub fn location(&self, name: &str) -> &Location {
        self.world
            .locations
            .iter()
            .find(|l| l.name.as_str() == name)
            .expect("fixture location")
    }

    pub fn cave_mouth(&self) -> &Location {
        self.location("Cave Mouth")
    }

    pub fn link(&self, name: &str) -> &LocationLink {
        self.world
            .links
            .iter()
            .find(|l| l.name.as_str() == name)
            .expect("fixture link")
    }
}
