pub mod app_state;
pub mod chat;
pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod registry;
pub mod scope;
pub mod session;
pub mod simulator;
pub mod web_server;

pub use app_state::{AppState, StateEvent, StateSnapshot};
pub use config::GatewayConfig;
pub use gateway::{AppwriteGateway, Identity, IdentityGateway, Provider};
pub use session::{AuthStore, SessionState, UserInfo};
pub use simulator::ResponseSimulator;
