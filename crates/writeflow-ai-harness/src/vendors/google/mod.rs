//! Gemini binding. Streams carry no terminal event; completion is emitted
//! when the body ends.
mod adapter;
mod transport;

pub use adapter::GoogleProvider;
