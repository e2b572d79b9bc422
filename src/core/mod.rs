pub mod character;
pub mod chat_stream;
pub mod config;
pub mod events;
pub mod message;
pub mod session;
pub mod sibling;
pub mod sse;
