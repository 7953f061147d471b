pub mod types;
pub mod error;
pub mod config;
pub mod normalize;
pub mod sources;
pub mod data;
pub mod join;
pub mod palette;
pub mod layers;
pub mod control;
pub mod search;
pub mod compose;
pub mod pipeline;
pub mod render;
pub mod server;
