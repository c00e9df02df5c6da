//! `LlmProvider` implementations: a real Anthropic-backed provider for
//! production, and a deterministic mock for tests and local development.

mod anthropic_provider;
mod mock_provider;

pub use anthropic_provider::{AnthropicProvider, AnthropicProviderConfig};
pub use mock_provider::{MockLlmProvider, MockResponse};
