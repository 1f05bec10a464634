use crate::model::ProviderId;

/// Errors returned by a vendor binding or by the harness dispatch itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Vendor returned an application-level failure (HTTP status, auth, etc.).
    #[error("provider error ({provider}): {message}")]
    Provider {
        provider: ProviderId,
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error ({provider}): {message}")]
    Transport {
        provider: ProviderId,
        message: String,
    },
    /// Vendor response shape or event sequencing was invalid.
    #[error("protocol error ({provider}): {message}")]
    Protocol {
        provider: ProviderId,
        message: String,
    },
    /// The call was abandoned because its cancellation token fired.
    #[error("request cancelled ({provider})")]
    Cancelled { provider: ProviderId },
}

impl ProviderError {
    /// Creates a provider-level error.
    pub fn provider(
        provider: impl Into<ProviderId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a 400-class error for a request the vendor would reject anyway.
    pub fn invalid(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::provider(provider, message, Some(400))
    }

    /// The vendor id is not registered on the harness.
    pub fn unknown_provider(provider: impl Into<ProviderId>) -> Self {
        let provider = provider.into();
        let message = format!("unknown provider: {provider}");
        Self::provider(provider, message, Some(400))
    }

    /// The vendor exists but does not offer the requested capability.
    pub fn unsupported(provider: impl Into<ProviderId>, capability: &str) -> Self {
        let provider = provider.into();
        let message = format!("{provider} does not support {capability}");
        Self::provider(provider, message, Some(400))
    }

    /// Creates a transport-level error.
    pub fn transport(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn cancelled(provider: impl Into<ProviderId>) -> Self {
        Self::Cancelled {
            provider: provider.into(),
        }
    }

    /// Returns the provider associated with this error.
    pub fn provider_id(&self) -> &ProviderId {
        match self {
            Self::Provider { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::Cancelled { provider } => provider,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. } => message,
            Self::Cancelled { .. } => "request cancelled",
        }
    }

    /// HTTP status reported by the vendor, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status_code, .. } => *status_code,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Caller-facing category. The harness never retries on its own.
    pub fn class(&self) -> ErrorClass {
        match self.status() {
            Some(401 | 403) => ErrorClass::Configuration,
            Some(429) => ErrorClass::RetryLater,
            _ => ErrorClass::Upstream,
        }
    }
}

/// Caller-visible classification of a vendor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// Credentials are missing, invalid, or lack permission.
    Configuration,
    /// Vendor rate limit; the caller may try again later.
    RetryLater,
    /// Any other vendor failure.
    Upstream,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::RetryLater => "retry-later",
            Self::Upstream => "upstream",
        }
    }
}

/// Errors raised while assembling a harness (not during calls).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// Invalid harness/provider configuration.
    #[error("config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_configuration_class() {
        assert_eq!(
            ProviderError::provider("openai", "bad key", Some(401)).class(),
            ErrorClass::Configuration
        );
        assert_eq!(
            ProviderError::provider("google", "forbidden", Some(403)).class(),
            ErrorClass::Configuration
        );
    }

    #[test]
    fn rate_limits_are_retry_later_and_everything_else_upstream() {
        assert_eq!(
            ProviderError::provider("anthropic", "slow down", Some(429)).class(),
            ErrorClass::RetryLater
        );
        assert_eq!(
            ProviderError::provider("mistral", "boom", Some(500)).class(),
            ErrorClass::Upstream
        );
        assert_eq!(
            ProviderError::transport("openai", "reset").class(),
            ErrorClass::Upstream
        );
    }

    #[test]
    fn unknown_provider_carries_400() {
        let err = ProviderError::unknown_provider("cohere");
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.provider_id().as_str(), "cohere");
        assert!(err.message().contains("cohere"));
    }
}
