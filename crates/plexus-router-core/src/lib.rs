//! Alias resolution, cooldown bookkeeping, and the per-route rate limiter
//! (spec §4.1, §4.3, §4.6). The OAuth account pool and dispatch execution
//! live one layer up in `plexus-providers`, which depends on this crate
//! for cooldown health checks.

pub mod config;
pub mod cooldown;
pub mod ratelimit;
pub mod router;

pub use config::{BaseUrl, CredentialKind, ModelConfig, ModelTarget, ProviderConfig, RoutingConfig, Selector};
pub use cooldown::{CooldownKey, CooldownManager, CooldownRow, CooldownStore, NullCooldownStore};
pub use ratelimit::{RateLimitConfig, RateLimitDecision, RateLimiter};
pub use router::{ResolvedRoute, Router, RouterError};
