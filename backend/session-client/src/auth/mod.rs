/// Credentials, single-flight refresh, and session lifecycle
pub mod refresh;
pub mod session;
pub mod token_store;

pub use refresh::RefreshCoordinator;
pub use session::{Session, SessionEndedHandler};
pub use token_store::{TokenPair, TokenStore};
