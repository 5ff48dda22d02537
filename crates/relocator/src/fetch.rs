//! Retrieval of auxiliary entries.
//!
//! The pipeline only depends on the [`Fetch`] trait. [`DefaultFetcher`]
//! resolves `http`, `https`, `file` and `data` locators; tests and embedders
//! can pass a plain async closure instead.

use crate::error::FetchError;
use base64::prelude::*;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinSet};
use tracing::debug;
use url::Url;

/// Resolves a locator into the bytes of an auxiliary entry.
pub trait Fetch: Send + Sync {
    fn fetch(&self, locator: &Url) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

impl<F, Fut> Fetch for F
where
    F: Fn(Url) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>, FetchError>> + Send,
{
    fn fetch(&self, locator: &Url) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send {
        (self)(locator.clone())
    }
}

/// Fetcher supporting network, local file and inline locators.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    /// Default HTTP timeout per request.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Some(Self::DEFAULT_TIMEOUT))
    }

    /// Build a fetcher whose HTTP requests give up after `timeout`
    /// (`None` waits indefinitely).
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Fetch for DefaultFetcher {
    async fn fetch(&self, locator: &Url) -> Result<Vec<u8>, FetchError> {
        match locator.scheme() {
            "http" | "https" => {
                let response = self.client.get(locator.clone()).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                Ok(response.bytes().await?.to_vec())
            }
            "file" => {
                let path = locator
                    .to_file_path()
                    .map_err(|_| FetchError::InvalidData(format!("not a local path: {}", locator)))?;
                Ok(tokio::fs::read(path).await?)
            }
            "data" => decode_data_url(locator),
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Decode an RFC 2397 `data:` URL into its payload bytes.
///
/// ```
/// use relocator::fetch::decode_data_url;
/// use url::Url;
///
/// let url = Url::parse("data:text/plain,hello%20world").unwrap();
/// assert_eq!(decode_data_url(&url).unwrap(), b"hello world");
///
/// let url = Url::parse("data:text/plain;base64,aGk=").unwrap();
/// assert_eq!(decode_data_url(&url).unwrap(), b"hi");
/// ```
pub fn decode_data_url(locator: &Url) -> Result<Vec<u8>, FetchError> {
    let full = locator.as_str();
    let end = full.len() - locator.fragment().map_or(0, |f| f.len() + 1);
    let body = full
        .get("data:".len()..end)
        .ok_or_else(|| FetchError::InvalidData("not a data URL".to_string()))?;

    let (header, data) = body
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidData("data URL has no ',' separator".to_string()))?;

    let decoded: Vec<u8> = percent_decode_str(data).collect();

    let is_base64 = header
        .rsplit(';')
        .next()
        .is_some_and(|param| param.eq_ignore_ascii_case("base64"));
    if is_base64 {
        let compact: Vec<u8> = decoded
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        BASE64_STANDARD
            .decode(compact)
            .map_err(|e| FetchError::InvalidData(e.to_string()))
    } else {
        Ok(decoded)
    }
}

/// Fetches running concurrently, keyed back to their position in the
/// auxiliary list. Dropping the set aborts any fetch still in flight.
pub(crate) struct PendingFetches {
    set: JoinSet<Result<Vec<u8>, FetchError>>,
    indices: HashMap<task::Id, usize>,
}

impl PendingFetches {
    pub(crate) fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for the next fetch to finish, returning its index and outcome.
    /// A task that panicked or was aborted reports [`FetchError::Task`].
    pub(crate) async fn next(&mut self) -> Option<(usize, Result<Vec<u8>, FetchError>)> {
        let joined = self.set.join_next_with_id().await?;
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => (e.id(), Err(FetchError::Task(e.to_string()))),
        };
        let index = self.indices.get(&id).copied()?;
        Some((index, result))
    }
}

/// Start every fetch concurrently.
pub(crate) fn spawn_fetches<F>(fetcher: Arc<F>, locators: &[Url]) -> PendingFetches
where
    F: Fetch + 'static,
{
    let mut set = JoinSet::new();
    let mut indices = HashMap::with_capacity(locators.len());
    for (index, locator) in locators.iter().cloned().enumerate() {
        let fetcher = Arc::clone(&fetcher);
        let handle = set.spawn(async move {
            debug!(%locator, "fetching auxiliary");
            fetcher.fetch(&locator).await
        });
        indices.insert(handle.id(), index);
    }
    PendingFetches { set, indices }
}
