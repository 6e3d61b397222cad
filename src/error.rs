//! 発行パイプラインのエラー分類

use crate::ledger::LedgerError;
use crate::pipeline::PipelineStage;
use crate::storage::StorageError;
use crate::wallet::SignerError;

/// パイプライン開始前の前提条件違反
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Please connect your wallet first")]
    NoSigner,
    #[error("Please select or generate an image first")]
    NoAsset,
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// どのアップロードで失敗したか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Image,
    Metadata,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to upload image: {0}")]
    Image(#[source] StorageError),
    #[error("Failed to upload metadata: {0}")]
    Metadata(#[source] StorageError),
}

impl UploadError {
    pub fn target(&self) -> UploadTarget {
        match self {
            UploadError::Image(_) => UploadTarget::Image,
            UploadError::Metadata(_) => UploadTarget::Metadata,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MintError {
    #[error("Failed to mint NFT: {0}")]
    Signer(#[from] SignerError),
    #[error("Failed to mint NFT: {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("Failed to generate image: {0}")]
    Upstream(String),
    #[error("Failed to generate image: no image URL received")]
    NoImageUrl,
    #[error("Failed to fetch generated image: {0}")]
    Fetch(String),
}

/// エラー種別（表示層向けのタグ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Upload,
    Mint,
    Busy,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Precondition => "PreconditionError",
            ErrorKind::Upload => "UploadError",
            ErrorKind::Mint => "MintError",
            ErrorKind::Busy => "Busy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Mint(#[from] MintError),
    #[error("A publish is already in progress")]
    Busy,
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::Precondition(_) => ErrorKind::Precondition,
            PublishError::Upload(_) => ErrorKind::Upload,
            PublishError::Mint(_) => ErrorKind::Mint,
            PublishError::Busy => ErrorKind::Busy,
        }
    }

    /// 失敗したステージ。前提条件エラーはどのステージにも入っていない
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PublishError::Upload(e) => match e.target() {
                UploadTarget::Image => Some(PipelineStage::UploadImage),
                UploadTarget::Metadata => Some(PipelineStage::UploadMetadata),
            },
            PublishError::Mint(_) => Some(PipelineStage::Mint),
            PublishError::Precondition(_) | PublishError::Busy => None,
        }
    }
}
