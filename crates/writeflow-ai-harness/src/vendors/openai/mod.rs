//! OpenAI binding: Responses API for text, Images API for pictures.
//!
//! The only bundled vendor that reports cached prompt tokens.
mod adapter;
mod images;
mod transport;

pub use adapter::OpenAiProvider;
