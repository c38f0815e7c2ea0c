//! [`ICatalogProvider`] adapter over [`PhotosClient`]

use async_trait::async_trait;
use tracing::instrument;

use lnxphotos_core::domain::{MediaItem, PageToken};
use lnxphotos_core::ports::{
    AuthContext, CatalogPage, DownloadBody, ICatalogProvider, ProviderError,
};

use crate::client::PhotosClient;

/// Remote photo library backed by the HTTP API
#[derive(Clone, Default)]
pub struct PhotosCatalogProvider {
    client: PhotosClient,
}

impl PhotosCatalogProvider {
    pub fn new(client: PhotosClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &PhotosClient {
        &self.client
    }
}

#[async_trait]
impl ICatalogProvider for PhotosCatalogProvider {
    #[instrument(skip(self, auth, page_token), fields(user = %auth.user_id))]
    async fn list_page(
        &self,
        auth: &AuthContext,
        page_size: u32,
        page_token: Option<&PageToken>,
    ) -> Result<CatalogPage, ProviderError> {
        Ok(self
            .client
            .list_media_items(&auth.access_token, page_size, page_token)
            .await?)
    }

    #[instrument(skip(self, auth, item), fields(item_id = %item.id()))]
    async fn open_download(
        &self,
        auth: &AuthContext,
        item: &MediaItem,
    ) -> Result<Box<dyn DownloadBody>, ProviderError> {
        let body = self
            .client
            .open_download(item.download_url(), &auth.access_token)
            .await?;
        Ok(Box::new(body))
    }
}
