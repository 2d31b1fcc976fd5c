//! In-memory wiring shared by tests.
use std::sync::Arc;

use crate::AppState;
use crate::clock::{Clock, FixedClock};
use crate::config::Configuration;
use crate::crypto;
use crate::database::memory::MemoryRepository;
use crate::event::memory::MemoryBus;
use crate::event::{EventPublisher, EventSubscriber};
use crate::middleware::AuthorizationGate;
use crate::role::{Role, RoleStore};
use crate::store::MutationStore;
use crate::token::{ClaimsCodec, UserClaims};
use crate::user::{User, UserService, UserStore};

pub const NOW: i64 = 1_760_000_000;

/// Application backed by memory stores and bus.
///
/// Roles `1` (admin) and `2` (member) exist from the start.
pub struct Harness {
    pub state: AppState,
    pub service: UserService,
    pub users: Arc<MemoryRepository<User>>,
    pub bus: MemoryBus,
    pub clock: Arc<FixedClock>,
    user_store: UserStore,
    role_store: RoleStore,
}

impl Harness {
    pub fn new() -> Self {
        let config = Arc::new(Configuration::default());
        let clock = Arc::new(FixedClock::new(NOW));
        let at = clock.now();

        let users = Arc::new(MemoryRepository::<User>::default());
        let roles = Arc::new(MemoryRepository::with([
            Role::new("1", "admin", at),
            Role::new("2", "member", at),
        ]));
        let user_store = MutationStore::<User>::new(users.clone());
        let role_store = MutationStore::<Role>::new(roles);

        let bus = MemoryBus::default();
        let publisher = EventPublisher::new(
            Arc::new(bus.clone()),
            config.kafka.topics.clone(),
            config.kafka.delivery_timeout(),
        );

        let codec = ClaimsCodec::new(
            b"test-secret",
            config.token.session_duration,
            clock.clone(),
        )
        .unwrap();
        let gate = AuthorizationGate::new(codec, &config.token.admin_role);

        let service = UserService::new(
            user_store.clone(),
            role_store.clone(),
            publisher,
            crypto::cheap(),
            clock.clone(),
        );

        Self {
            state: AppState {
                config,
                gate,
                users: service.clone(),
            },
            service,
            users,
            bus,
            clock,
            user_store,
            role_store,
        }
    }

    /// Signed token for a user.
    pub fn token(&self, id: &str, role_id: &str) -> String {
        self.state
            .gate
            .codec()
            .issue(
                &self.state.config.name,
                UserClaims {
                    id: id.into(),
                    username: id.into(),
                    role_id: role_id.into(),
                },
            )
            .unwrap()
    }

    /// Store a member directly, without any event. Password is `secret`.
    pub async fn seed_user(&self, id: &str, username: &str) {
        let at = self.clock.now();
        self.user_store
            .create(User {
                id: id.into(),
                name: username.into(),
                username: username.into(),
                email: format!("{username}@x.io"),
                password: crypto::cheap().hash_password("secret").unwrap(),
                phone: String::new(),
                role_id: "2".into(),
                created_at: at,
                updated_at: at,
            })
            .await
            .unwrap();
    }

    /// Subscriber applying events to this harness stores.
    pub fn subscriber(&self) -> EventSubscriber {
        EventSubscriber::new(
            self.user_store.clone(),
            self.role_store.clone(),
            self.clock.clone(),
        )
    }
}
