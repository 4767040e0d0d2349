pub mod challenge;
pub mod events;
pub mod models;
