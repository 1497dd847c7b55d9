//! Built-in addons
//!
//! - `input-boolean` - a switch the user can flip
//! - `input-number` - a number kept within a range

mod input_boolean;
mod input_number;

use std::sync::Arc;

use cq_addons::StaticAddonLoader;

pub use input_boolean::{InputBoolean, InputBooleanInitialiser, INPUT_BOOLEAN};
pub use input_number::{InputNumber, InputNumberInitialiser, INPUT_NUMBER};

/// A loader offering every built-in addon
pub fn builtin_loader() -> StaticAddonLoader {
    StaticAddonLoader::new()
        .with_initialiser(INPUT_BOOLEAN, Arc::new(InputBooleanInitialiser::new()))
        .with_initialiser(INPUT_NUMBER, Arc::new(InputNumberInitialiser::new()))
}
