pub mod registration;
pub mod session;
pub mod user;

pub use registration::{LoginRequest, Password, RefreshRequest, RegistrationRequest};
pub use session::{Session, TokenPair};
pub use user::{canonical_identifier, LocalUser, NewLocalUser, Profile};
