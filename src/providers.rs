//! LLM providers the daemon can route a pipeline through.
//!
//! The client never talks to these itself. It only needs the provider's
//! wire name for the `args` list and the environment variable the caller
//! reads the credential from.

use std::fmt;
use std::str::FromStr;

use crate::error::RpcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provider {
    #[default]
    Groq,
    OpenAi,
    Anthropic,
    Mistral,
    OpenRouter,
    HuggingFace,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Groq,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Mistral,
        Provider::OpenRouter,
        Provider::HuggingFace,
    ];

    /// Name sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Mistral => "mistral",
            Provider::OpenRouter => "openrouter",
            Provider::HuggingFace => "huggingface",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Mistral => "MISTRAL_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::HuggingFace => "HUGGINGFACE_API_KEY",
        }
    }

    /// Model the daemon picks when none is given.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Groq => "moonshotai/kimi-k2-instruct-0905",
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-sonnet-4-5",
            Provider::Mistral => "mistral-large-latest",
            Provider::OpenRouter => "openai/gpt-4o",
            Provider::HuggingFace => "mistralai/Mistral-7B-Instruct-v0.3",
        }
    }

    /// Look up the API key through `lookup` (usually `std::env::var`).
    ///
    /// Empty and whitespace-only values count as absent.
    pub fn api_key_from<F>(&self, lookup: F) -> Option<String>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        lookup(self.env_var()).filter(|key| !key.trim().is_empty())
    }

    /// Read the API key from the process environment.
    pub fn api_key_from_env(&self) -> Option<String> {
        self.api_key_from(|name| std::env::var(name).ok())
    }

    /// Wire names of every provider.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Provider::as_str).collect()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| {
                RpcError::invalid_request(format!(
                    "Unsupported provider '{}'. Use one of: {}",
                    s,
                    Self::names().join(", ")
                ))
            })
    }
}
