pub mod ack;
pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod presence;
pub mod registry;
pub mod router;
pub mod store;
pub mod typing;

pub use error::ChatError;
pub use gateway::{Gateway, GatewayConfig};
