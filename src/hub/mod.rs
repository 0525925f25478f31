pub mod hub_config;
pub mod hub_context;
pub mod handshake;
pub mod dispatch;
pub mod requester_handlers;
pub mod executor_handlers;
pub mod hub;
