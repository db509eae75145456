pub mod analyzer;
pub mod device;
pub mod engine;
pub mod filter;
pub mod player;
pub mod queue;
pub mod source;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineConfig, PlaybackEngine, PlaybackOutcome};
pub use source::{LoadError, SampleBuffer};
