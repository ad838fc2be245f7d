//! Application services: resolution, fragments, previews and editing.

pub mod containers;
pub mod editing;
pub mod error;
pub mod events;
pub mod fragments;
pub mod permissions;
pub mod plugin;
pub mod preview;
pub mod registry;
pub mod repos;
pub mod resolver;
pub mod validation;
