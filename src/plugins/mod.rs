//! Plugin kinds shipped with the crate.

mod link;
mod snippet;

pub use link::Link;
pub use snippet::Snippet;

use crate::application::registry::{PluginRegistry, PluginRegistryBuilder};
use crate::application::validation::{
    FrozenOrderValidator, PluginCountValidator, ValidatorRegistry,
};

/// Registry builder with every built-in kind registered. Callers may add
/// their own kinds before building.
pub fn builtin() -> PluginRegistryBuilder {
    PluginRegistry::builder()
        .register::<Snippet>()
        .register::<Link>()
}

/// Group validators addressable from `Group.validation`.
pub fn builtin_validators() -> ValidatorRegistry {
    ValidatorRegistry::new()
        .with("frozen_order", FrozenOrderValidator)
        .with("exactly_three", PluginCountValidator { expected: 3 })
}
