use crate::asset::Asset;
use crate::error::GenerationError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// プロンプトから画像を生成し、その URL を返す
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// リモート URL の中身を取得する
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, GenerationError>;
}

/// 画像の出どころ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    LocalFile,
    Generated { url: String },
}

/// フォームにセットする画像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub asset: Asset,
    pub origin: ImageOrigin,
}

impl SelectedImage {
    pub fn generated_url(&self) -> Option<&str> {
        match &self.origin {
            ImageOrigin::Generated { url } => Some(url),
            ImageOrigin::LocalFile => None,
        }
    }
}

#[derive(Clone)]
pub struct ImageResolver {
    generator: Arc<dyn ImageGenerator>,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl ImageResolver {
    pub fn new(generator: Arc<dyn ImageGenerator>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self { generator, fetcher }
    }

    /// ユーザーが選んだファイルはそのまま使う（MIME の絞り込みは入力側の責務）
    pub fn from_local_file(asset: Asset) -> SelectedImage {
        SelectedImage {
            asset,
            origin: ImageOrigin::LocalFile,
        }
    }

    /// 生成 → 取得 → `generated-nft.png` として asset 化
    pub async fn from_generation(&self, prompt: &str) -> Result<SelectedImage, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let url = self.generator.generate(prompt).await?;
        if url.is_empty() {
            return Err(GenerationError::NoImageUrl);
        }
        info!(%url, "image generated");

        let bytes = self.fetcher.fetch(&url).await?;
        info!(bytes = bytes.len(), "generated image fetched");

        Ok(SelectedImage {
            asset: Asset::generated(bytes),
            origin: ImageOrigin::Generated { url },
        })
    }
}
