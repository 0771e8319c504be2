use thiserror::Error;

/// Errors raised while constructing the shared HTTP client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid proxy URL '{url}': {source}")]
    InvalidProxyUrl {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to build HTTP client: {source}")]
    Build {
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised by a [`Targeter`](crate::target::Targeter) or while turning
/// a target into a wire request. Targeter errors are terminal for the whole
/// attack; request-construction errors fail only the hit that saw them.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("no targets to attack")]
    NoTargets,
    #[error("Invalid method '{method}': {source}")]
    InvalidMethod {
        method: String,
        #[source]
        source: http::method::InvalidMethod,
    },
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{0}")]
    Fatal(String),
}

/// Injected into the redirect policy when a hit chases more redirects than
/// the configured cap allows.
#[derive(Debug, Error)]
#[error("stopped after {cap} redirects")]
pub struct RedirectCapExceeded {
    pub(crate) cap: usize,
}
