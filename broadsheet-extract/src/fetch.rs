use async_trait::async_trait;
use broadsheet_common::SessionState;
use broadsheet_http::{FetchClient, FetchError, FetchedPage, PageOpts};
use url::Url;

/// The one seam between strategies and the network. Production uses
/// [`HttpPageFetcher`]; the cascade tests substitute scripted fakes.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        session: Option<&SessionState>,
    ) -> Result<FetchedPage, FetchError>;
}

pub struct HttpPageFetcher {
    client: FetchClient,
}

impl HttpPageFetcher {
    pub fn new(client: FetchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(
        &self,
        url: &Url,
        session: Option<&SessionState>,
    ) -> Result<FetchedPage, FetchError> {
        self.client
            .get_page(
                url.as_str(),
                PageOpts {
                    session,
                    ..Default::default()
                },
            )
            .await
    }
}
