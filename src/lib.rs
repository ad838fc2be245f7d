//! Vola: containers of grouped, polymorphic content plugins with
//! generation-scoped fragment caching and atomic preview transfer.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod plugins;
