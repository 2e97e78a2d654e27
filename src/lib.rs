pub mod catalogue;
pub mod driver;
pub mod error;
pub mod render;
pub mod session;
pub mod validate;
pub mod visibility;
pub mod wasm;
