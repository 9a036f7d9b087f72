pub mod api;
pub mod config;
pub mod events;
pub mod protocol;  // RCON 통신
pub mod status;
pub mod supervisor;
