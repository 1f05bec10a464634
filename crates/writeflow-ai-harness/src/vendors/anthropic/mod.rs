mod adapter;
mod transport;

pub use adapter::AnthropicProvider;
