//! Generation backends implementing [`GenerationProvider`](crate::traits::GenerationProvider).

pub mod openai;
#[cfg(test)]
pub(crate) mod scripted;

pub use openai::{OpenAiConfig, OpenAiProvider, DEFAULT_BASE_URL};
