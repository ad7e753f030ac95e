use serde::{Deserialize, Serialize};
use url::Url;

use crate::{AppIdea, CoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    ChatGpt,
    Grok,
    Claude,
    Perplexity,
    Gemini,
}

impl LlmProvider {
    pub const ALL: [Self; 5] = [
        Self::ChatGpt,
        Self::Grok,
        Self::Claude,
        Self::Perplexity,
        Self::Gemini,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ChatGpt => "ChatGPT",
            Self::Grok => "Grok",
            Self::Claude => "Claude",
            Self::Perplexity => "Perplexity",
            Self::Gemini => "Gemini",
        }
    }

    fn base_url(self) -> &'static str {
        match self {
            Self::ChatGpt => "https://chatgpt.com/",
            Self::Grok => "https://grok.x.ai/",
            Self::Claude => "https://claude.ai/chat",
            Self::Perplexity => "https://www.perplexity.ai/",
            Self::Gemini => "https://gemini.google.com/app",
        }
    }

    fn prompt_param(self) -> &'static str {
        match self {
            Self::ChatGpt | Self::Claude | Self::Gemini => "prompt",
            Self::Grok | Self::Perplexity => "q",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct QuickLaunchLink {
    pub provider: LlmProvider,
    pub label: String,
    pub url: Url,
}

/// Build a link that opens `provider` with `prompt` prefilled.
///
/// # Errors
/// Returns [`CoreError::InvalidUrl`] when the provider URL cannot be parsed.
pub fn quick_launch_link(
    provider: LlmProvider,
    prompt: &str,
) -> Result<QuickLaunchLink, CoreError> {
    let params = [(provider.prompt_param(), prompt)];
    let url = Url::parse_with_params(provider.base_url(), params)
        .map_err(|err| CoreError::InvalidUrl(format!("{}: {err}", provider.label())))?;

    Ok(QuickLaunchLink {
        provider,
        label: provider.label().to_string(),
        url,
    })
}

/// One quick-launch link per provider, each carrying the idea's detail text.
///
/// # Errors
/// Returns [`CoreError::InvalidUrl`] when any provider URL cannot be parsed.
pub fn quick_launch_links(idea: &AppIdea) -> Result<Vec<QuickLaunchLink>, CoreError> {
    LlmProvider::ALL.into_iter().map(|provider| quick_launch_link(provider, &idea.detail)).collect()
}
