pub mod cooldown_parsers;
pub mod credential_pool;
pub mod dispatcher;
pub mod http_client;

pub use cooldown_parsers::CooldownParserRegistry;
pub use credential_pool::{CredentialPool, CredentialPoolError, OAuthCredential};
pub use dispatcher::{select_target_api_type, DispatchError, DispatchOutcome, Dispatcher};
pub use http_client::{UpstreamClient, UpstreamHttpRequest, UpstreamHttpResponse, WreqUpstreamClient};
