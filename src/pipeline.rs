//! 発行パイプライン: 画像アップロード → メタデータアップロード → ミント
//!
//! 各ステージは前のステージが返した URI を入力に取るので、厳密に逐次で実行する。
//! どこかで失敗したら残りは実行しない。アップロード済みのものは消さない。

use crate::asset::Asset;
use crate::error::{MintError, PublishError, UploadError};
use crate::form::MetadataSnapshot;
use crate::ledger::{Ledger, MintInstruction, Transaction};
use crate::metadata::MetadataDocument;
use crate::storage::{Storage, StorageError};
use crate::wallet::{Keypair, Signer};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    UploadImage,
    UploadMetadata,
    Mint,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::UploadImage => "upload image",
            PipelineStage::UploadMetadata => "upload metadata",
            PipelineStage::Mint => "mint",
        };
        f.write_str(s)
    }
}

/// ステージごとの成果物
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    ImageUri(String),
    MetadataUri(String),
    MintIdentifier(String),
}

/// 進捗の通知先
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, _stage: PipelineStage) {}
    fn stage_completed(&self, _output: &StageOutput) {}
}

impl PipelineObserver for () {}

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// 設定されていれば PNG をこのレベルで再圧縮してからアップロードする
    pub png_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minted {
    pub mint: String,
    pub signature: String,
    pub image_uri: String,
    pub metadata_uri: String,
}

/// 失敗と、それまでに出来上がっていた URI
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct PublishFailure {
    #[source]
    pub error: PublishError,
    pub image_uri: Option<String>,
    pub metadata_uri: Option<String>,
}

impl PublishFailure {
    fn at(error: impl Into<PublishError>, image_uri: Option<String>, metadata_uri: Option<String>) -> Self {
        Self {
            error: error.into(),
            image_uri,
            metadata_uri,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    ledger: Arc<dyn Ledger>,
    options: PublishOptions,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn Storage>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            storage,
            ledger,
            options: PublishOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn publish(
        &self,
        metadata: &MetadataSnapshot,
        signer: &dyn Signer,
        observer: &dyn PipelineObserver,
    ) -> Result<Minted, PublishFailure> {
        observer.stage_started(PipelineStage::UploadImage);
        let image_uri = upload_image(self.storage.as_ref(), metadata.image(), self.options)
            .await
            .map_err(|e| PublishFailure::at(e, None, None))?;
        observer.stage_completed(&StageOutput::ImageUri(image_uri.clone()));

        observer.stage_started(PipelineStage::UploadMetadata);
        let metadata_uri = upload_metadata(self.storage.as_ref(), metadata, &image_uri)
            .await
            .map_err(|e| PublishFailure::at(e, Some(image_uri.clone()), None))?;
        observer.stage_completed(&StageOutput::MetadataUri(metadata_uri.clone()));

        observer.stage_started(PipelineStage::Mint);
        let (mint, signature) = mint_nft(self.ledger.as_ref(), signer, metadata, &metadata_uri)
            .await
            .map_err(|e| {
                warn!(%image_uri, %metadata_uri, "uploads left without a mint");
                PublishFailure::at(e, Some(image_uri.clone()), Some(metadata_uri.clone()))
            })?;
        observer.stage_completed(&StageOutput::MintIdentifier(mint.clone()));

        Ok(Minted {
            mint,
            signature,
            image_uri,
            metadata_uri,
        })
    }
}

fn non_empty(uri: String) -> Result<String, StorageError> {
    if uri.trim().is_empty() {
        Err(StorageError::EmptyUri)
    } else {
        Ok(uri)
    }
}

/// ステージ1: 画像を `<timestamp>-<filename>` でアップロード
pub async fn upload_image(
    storage: &dyn Storage,
    asset: &Asset,
    options: PublishOptions,
) -> Result<String, UploadError> {
    let optimized;
    let asset = match options.png_level {
        Some(level) => match asset.optimized_png(level) {
            Ok(a) => {
                info!(before = asset.len(), after = a.len(), "png recompressed");
                optimized = a;
                &optimized
            }
            Err(e) => {
                warn!(error = %e, "png recompression failed, uploading original");
                asset
            }
        },
        None => asset,
    };

    let unique_name = asset.unique_name(chrono::Utc::now().timestamp_millis());
    info!(name = %unique_name, mime = asset.mime(), bytes = asset.len(), "uploading image");

    let uri = storage
        .upload(asset, &unique_name)
        .await
        .and_then(non_empty)
        .map_err(|e| {
            error!(error = %e, "image upload failed");
            UploadError::Image(e)
        })?;
    info!(%uri, "image uploaded");
    Ok(uri)
}

/// ステージ2: 画像 URI を埋め込んだメタデータ JSON をアップロード
pub async fn upload_metadata(
    storage: &dyn Storage,
    metadata: &MetadataSnapshot,
    image_uri: &str,
) -> Result<String, UploadError> {
    let document = MetadataDocument::build(
        metadata.name(),
        metadata.symbol(),
        metadata.description(),
        metadata.attributes(),
        metadata.image().mime(),
        image_uri,
    );
    let value = serde_json::to_value(&document)
        .map_err(|e| UploadError::Metadata(StorageError::Encode(e)))?;

    info!(attributes = document.attributes.len(), "uploading metadata");
    let uri = storage
        .upload_json(&value)
        .await
        .and_then(non_empty)
        .map_err(|e| {
            error!(error = %e, "metadata upload failed");
            UploadError::Metadata(e)
        })?;
    info!(%uri, "metadata uploaded");
    Ok(uri)
}

/// ステージ3: 新しいミント鍵を作り、ウォレットを唯一のクリエイターとしてミントする
pub async fn mint_nft(
    ledger: &dyn Ledger,
    signer: &dyn Signer,
    metadata: &MetadataSnapshot,
    metadata_uri: &str,
) -> Result<(String, String), MintError> {
    let mint = Keypair::generate();
    let wallet = signer.public_key();
    let instruction = MintInstruction::new(
        mint.pubkey(),
        wallet,
        metadata.name(),
        metadata.symbol(),
        metadata_uri,
        metadata.royalty(),
    );
    info!(
        mint = %mint.pubkey(),
        creator = %wallet,
        basis_points = instruction.seller_fee_basis_points,
        "minting"
    );

    let mut tx = Transaction::new(instruction);
    mint.sign_transaction(&mut tx).await?;
    signer.sign_transaction(&mut tx).await.map_err(|e| {
        error!(error = %e, "wallet did not sign");
        e
    })?;

    let signature = ledger.send_and_confirm(&tx).await.map_err(|e| {
        error!(error = %e, "mint transaction failed");
        e
    })?;
    info!(mint = %mint.pubkey(), %signature, "minted");
    Ok((mint.pubkey().to_string(), signature))
}
