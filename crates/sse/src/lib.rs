pub mod client;
pub mod parser;

pub use client::SseTransport;
pub use parser::{Event, EventParser};
