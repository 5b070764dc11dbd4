//! Shared process state (spec §2 "Runtime composition"). Routing config and
//! the API-key table are hot-reloadable behind `ArcSwap` the way the
//! teacher's `AppState` holds `providers`/`global` (`gproxy-core/src/state/mod.rs`)
//! so an admin reload never has to restart the process; everything else here
//! is a single long-lived handle into a lower crate.

use std::sync::Arc;

use arc_swap::ArcSwap;
use plexus_a2a::A2aService;
use plexus_common::GlobalConfig;
use plexus_providers::{CooldownParserRegistry, CredentialPool, UpstreamClient};
use plexus_router_core::{CooldownManager, RateLimiter, RoutingConfig};
use plexus_storage::{SeaOrmCooldownStore, UsageRepository};

use crate::auth::AuthTable;

pub struct AppState {
    pub global: GlobalConfig,
    pub admin_key_hash: String,
    pub routing: ArcSwap<RoutingConfig>,
    pub auth: ArcSwap<AuthTable>,
    pub cooldowns: CooldownManager<SeaOrmCooldownStore>,
    pub credential_pool: CredentialPool,
    pub cooldown_parsers: CooldownParserRegistry,
    pub client: Arc<dyn UpstreamClient>,
    pub usage: UsageRepository,
    pub a2a: A2aService,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        global: GlobalConfig,
        admin_key_hash: String,
        routing: RoutingConfig,
        auth: AuthTable,
        cooldowns: CooldownManager<SeaOrmCooldownStore>,
        credential_pool: CredentialPool,
        cooldown_parsers: CooldownParserRegistry,
        client: Arc<dyn UpstreamClient>,
        usage: UsageRepository,
        a2a: A2aService,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            global,
            admin_key_hash,
            routing: ArcSwap::from_pointee(routing),
            auth: ArcSwap::from_pointee(auth),
            cooldowns,
            credential_pool,
            cooldown_parsers,
            client,
            usage,
            a2a,
            rate_limiter,
        }
    }

    pub fn apply_routing(&self, routing: RoutingConfig) {
        self.routing.store(Arc::new(routing));
    }

    pub fn apply_auth(&self, auth: AuthTable) {
        self.auth.store(Arc::new(auth));
    }
}
