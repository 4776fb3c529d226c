/// Realtime push channel: lifecycle machine, socket transport, and the manager that joins them
pub mod channel;
pub mod manager;
pub mod messages;
pub mod state;

pub use channel::{ChannelConnector, ChannelFrame, ChannelHandle, TungsteniteConnector, NORMAL_CLOSURE};
pub use manager::{notifications_ws_url, ConnectionManager};
pub use state::{ConnectionEvent, ConnectionMachine, ConnectionState, ConnectionStatus, Effect};
