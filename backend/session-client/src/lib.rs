pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod notifications;
pub mod realtime;

pub use auth::{RefreshCoordinator, Session, SessionEndedHandler, TokenPair, TokenStore};
pub use config::Config;
pub use error::{Result, SessionError};
pub use http::{ApiRequest, ApiResponse, HttpTransport, RequestPipeline, ReqwestTransport};
pub use notifications::{Notification, NotificationService, NotificationStore};
pub use realtime::{ChannelConnector, ConnectionManager, ConnectionState, ConnectionStatus};
