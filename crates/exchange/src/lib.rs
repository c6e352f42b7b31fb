pub mod http;
pub mod paper;

pub use http::HttpExchange;
pub use paper::PaperExchange;
