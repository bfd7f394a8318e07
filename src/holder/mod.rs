//! Configuration holders: composition of a configuration with its
//! components, and the live holder that diffs successive activations.

mod active;
mod config_holder;
mod description;

pub use active::{ActiveConfigHolder, IocChanges};
pub use config_holder::{check_name, ConfigHolder};
pub use description::{BlockDescription, ComponentRef, ConfigDescription, ConfigDetails};
