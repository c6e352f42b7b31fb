pub mod fallback;
pub mod generator;
pub mod openai;

pub use fallback::ProviderChain;
pub use generator::{SignalGenerator, SignalOutcome};
pub use openai::OpenAiProvider;
