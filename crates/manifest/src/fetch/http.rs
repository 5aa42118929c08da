use super::{Fetched, Fetcher};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::{Client, ClientBuilder};
use reqwest::header::CONTENT_TYPE;
use tracing::instrument;

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: Option<&str>) -> Result<Self> {
        let client = client_builder(user_agent).build().or_raise(|| ErrorKind::Client)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn client_builder(user_agent: Option<&str>) -> ClientBuilder {
    let builder = Client::builder();
    match user_agent {
        Some(user_agent) => builder.user_agent(user_agent),
        None => builder,
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self), fields(status, bytes))]
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        let response = self.client.get(url).send().await.or_raise(|| ErrorKind::Fetch(url.to_string()))?;
        let status = response.status();
        tracing::Span::current().record("status", status.as_u16());
        if !status.is_success() {
            exn::bail!(ErrorKind::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let content = response.bytes().await.or_raise(|| ErrorKind::Fetch(url.to_string()))?;
        tracing::Span::current().record("bytes", content.len());

        Ok(Fetched {
            content: content.to_vec(),
            mime_type,
        })
    }
}
