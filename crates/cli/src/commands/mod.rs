mod admin;
mod run;
mod signal_once;
mod wiring;

pub use admin::{halt, resume};
pub use run::run_daemon;
pub use signal_once::signal_once;
