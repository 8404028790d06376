pub mod bootstrap;
pub mod error;
pub mod identity;
pub mod logging;
pub mod routes;

pub use bootstrap::{run_server, ServerConfig};
pub use error::ApiError;
pub use identity::{IdentityVerifier, PassThroughVerifier, VerifiedUser};
pub use routes::{build_router, ServerContext};
