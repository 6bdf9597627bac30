pub mod auth;

pub use auth::{authentication_middleware, require_role, Authenticated, Authenticator};
