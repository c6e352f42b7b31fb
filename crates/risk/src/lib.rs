pub mod gate;

pub use gate::{RiskGate, RiskInputs};
