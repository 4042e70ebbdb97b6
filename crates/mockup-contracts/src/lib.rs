pub mod artifacts;
pub mod chat;
pub mod events;
pub mod generation;
pub mod settings;
