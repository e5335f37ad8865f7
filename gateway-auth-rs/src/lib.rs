//! Gateway Auth
//!
//! Opaque bearer-token gate for the butler HTTP services, plus the CORS
//! layer and JSON error body they share.

mod jwt;
mod middleware;
mod response;

pub use jwt::{issue_token, AuthError, AuthenticatedCaller, Claims, JwtVerifier};
pub use middleware::{cors_layer, require_bearer};
pub use response::{error_response, ErrorResponse};
