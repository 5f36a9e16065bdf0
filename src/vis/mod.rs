mod config;
mod visible_set;
mod walker;

pub use config::*;
pub use visible_set::*;
pub use walker::*;
