use std::fs;

use reqwest::{Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use url::Url;
use vitrine_api_types::{ErrorResponse, ParseCollectionError};

use crate::args::Cli;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("missing site URL (use --site or VITRINE_SITE_URL)")]
    MissingSite,
    #[error("missing refresh secret (use --secret-file or VITRINE_REFRESH_SECRET)")]
    MissingSecret,
    #[error("failed to read secret file: {0}")]
    SecretFile(std::io::Error),
    #[error("invalid site URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("unknown collection: {0}")]
    UnknownCollection(#[from] ParseCollectionError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded {status}: {message} ({code})")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
    #[error("refresh incomplete: {failed} collection(s) failed")]
    Incomplete { failed: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connection details shared by every command.
#[derive(Debug, Clone)]
pub struct Ctx {
    http: reqwest::Client,
    base: Url,
    secret: Option<String>,
}

impl Ctx {
    pub fn new(site: &str, secret: Option<String>) -> Result<Self, CliError> {
        let mut base = Url::parse(site.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(Self::user_agent())
            .build()?;
        Ok(Self { http, base, secret })
    }

    pub fn user_agent() -> &'static str {
        concat!("vitrine-cli/", env!("CARGO_PKG_VERSION"))
    }

    /// `path` relative to the site root, with query pairs appended in order.
    pub fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, CliError> {
        let mut url = self.base.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn secret_pair(&self) -> Result<(&'static str, String), CliError> {
        self.secret
            .clone()
            .map(|secret| ("secret", secret))
            .ok_or(CliError::MissingSecret)
    }

    /// GET a route guarded by the refresh secret.
    pub async fn get_authorized<T: DeserializeOwned>(
        &self,
        path: &str,
        mut query: Vec<(&str, String)>,
    ) -> Result<T, CliError> {
        query.insert(0, self.secret_pair()?);
        self.request(Method::GET, self.url(path, &query)?, None::<&()>)
            .await
    }

    pub async fn post_authorized<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CliError> {
        let query = [self.secret_pair()?];
        self.request(Method::POST, self.url(path, &query)?, Some(body))
            .await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(&str, String)>,
    ) -> Result<T, CliError> {
        self.request(Method::GET, self.url(path, &query)?, None::<&()>)
            .await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(&str, String)>,
        body: &B,
    ) -> Result<T, CliError> {
        self.request(Method::POST, self.url(path, &query)?, Some(body))
            .await
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, CliError> {
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ErrorResponse>(&bytes) {
                Ok(error) => CliError::Api {
                    status,
                    code: error.code,
                    message: error.error,
                },
                Err(_) => CliError::Api {
                    status,
                    code: "unknown".to_string(),
                    message: String::from_utf8_lossy(&bytes).trim().to_string(),
                },
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// `--secret-file` wins over `--secret`; surrounding whitespace is dropped.
/// The secret may be absent; only the cache commands require it.
pub fn build_ctx_from_cli(cli: &Cli) -> Result<Ctx, CliError> {
    let site = cli
        .site
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .ok_or(CliError::MissingSite)?;

    let secret = if let Some(path) = &cli.secret_file {
        let contents = fs::read_to_string(path).map_err(CliError::SecretFile)?;
        Some(contents.trim().to_string())
    } else {
        cli.secret.as_deref().map(|value| value.trim().to_string())
    };

    Ctx::new(site, secret.filter(|value| !value.is_empty()))
}
