//! Slack API base URL resolution and outbound URL rewriting.
//!
//! With an API override configured, webhook and `response_url` targets keep their path but take
//! the override's scheme, host and port, so recorded traffic can be replayed locally.

use thiserror::Error;
use url::Url;

const DEFAULT_HOST: &str = "slack.com";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("`{url}` is not a valid URL: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("`{url}` cannot be rewritten onto `{base}`")]
    Rewrite { url: String, base: String },
}

#[derive(Clone, Debug)]
pub struct SlackEndpoints {
    base: Url,
    overridden: bool,
}

impl SlackEndpoints {
    /// `api_url` wins over `env`; with neither the public `https://slack.com` is used.
    pub fn from_settings(api_url: Option<&str>, env: Option<&str>) -> Result<Self, EndpointError> {
        let api_url = api_url.map(str::trim).filter(|value| !value.is_empty());
        let env = env.map(str::trim).filter(|value| !value.is_empty());

        let (raw, overridden) = match (api_url, env) {
            (Some(api_url), _) => (api_url.to_owned(), true),
            (None, Some(env)) => (format!("https://{env}.{DEFAULT_HOST}"), false),
            (None, None) => (format!("https://{DEFAULT_HOST}"), false),
        };
        Ok(Self { base: parse(&raw)?, overridden })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/api/{method}", self.base_url())
    }

    /// Rewrites `input` onto the override's scheme, host and port. Without an override the
    /// input is returned unchanged.
    pub fn rewrite(&self, input: &str) -> Result<String, EndpointError> {
        if !self.overridden {
            return Ok(input.to_owned());
        }

        let mut output = parse(input)?;
        let failure =
            || EndpointError::Rewrite { url: input.to_owned(), base: self.base_url().to_owned() };

        output.set_scheme(self.base.scheme()).map_err(|_| failure())?;
        output.set_host(self.base.host_str()).map_err(|_| failure())?;
        output.set_port(self.base.port()).map_err(|_| failure())?;
        Ok(output.into())
    }
}

fn parse(raw: &str) -> Result<Url, EndpointError> {
    Url::parse(raw)
        .map_err(|error| EndpointError::InvalidUrl { url: raw.to_owned(), reason: error.to_string() })
}
