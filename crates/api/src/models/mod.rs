pub mod build;
pub mod dependency;
pub mod diagnostic;
pub mod phase;
pub mod symbol;

pub use build::*;
pub use dependency::*;
pub use diagnostic::*;
pub use phase::*;
pub use symbol::*;
