pub mod linalg;
pub mod types;
pub mod volume;

pub use types::*;
pub use volume::*;
