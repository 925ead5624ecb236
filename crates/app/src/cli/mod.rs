pub mod args;
pub mod input;
pub mod op;
pub mod ops;

pub use ops::{Init, Open, Push, Seal, Version, Whoami};
