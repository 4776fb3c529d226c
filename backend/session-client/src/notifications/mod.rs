/// Notification feed: wire model, local cache, REST calls, and the service tying them to the push channel
pub mod api;
pub mod model;
pub mod service;
pub mod store;

pub use api::NotificationApi;
pub use model::{Notification, NotificationPage, NotificationType, UnreadCount};
pub use service::NotificationService;
pub use store::{NotificationSnapshot, NotificationStore};
