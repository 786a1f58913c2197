pub mod breakpoint;
pub mod config;
pub mod dom;
pub mod errors;
pub mod filler;
pub mod passes;
pub mod search;
pub mod slot;

pub use errors::SpacefinderError;
pub use filler::{ErrorReporter, FnWriter, SpaceFiller, SpaceWriter, TracingReporter};
pub use search::{FindOptions, RuleSet, Spacefinder};
