pub mod messages;
pub mod session;

pub use messages::{InboundMessage, OutboundMessage};
pub use session::{spawn_table, ConnectionId, HubConfig, HubEvent, TableHandle, TableRegistry};
