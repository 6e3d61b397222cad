//! 発行の進捗を持つ状態機械
//!
//! `Idle -> UploadingImage -> UploadingMetadata -> Minting -> Success`
//! 途中のどこで失敗しても `Failed` に入る。表示層は `subscribe()` で受け取った
//! watch チャネルから状態を読む。同時に走らせられる発行は1つだけ。

use crate::error::{ErrorKind, PublishError};
use crate::form::MetadataForm;
use crate::pipeline::{Minted, Pipeline, PipelineObserver, PipelineStage, PublishFailure, StageOutput};
use crate::wallet::WalletSession;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStage {
    #[default]
    Idle,
    UploadingImage,
    UploadingMetadata,
    Minting,
    Success {
        mint: String,
    },
    Failed(Failure),
}

impl SessionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStage::Success { .. } | SessionStage::Failed(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SessionStage::UploadingImage | SessionStage::UploadingMetadata | SessionStage::Minting
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub stage: Option<PipelineStage>,
    pub message: String,
    /// 失敗時点でアップロード済みだった画像
    pub image_uri: Option<String>,
    /// 失敗時点でアップロード済みだったメタデータ
    pub metadata_uri: Option<String>,
}

impl Failure {
    fn from_error(error: &PublishError) -> Self {
        Self {
            kind: error.kind(),
            stage: error.stage(),
            message: error.to_string(),
            image_uri: None,
            metadata_uri: None,
        }
    }

    fn from_pipeline(failure: &PublishFailure) -> Self {
        Self {
            image_uri: failure.image_uri.clone(),
            metadata_uri: failure.metadata_uri.clone(),
            ..Self::from_error(&failure.error)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub stage: SessionStage,
    pub status: Option<String>,
    pub error: Option<String>,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        self.stage.is_running()
    }

    pub fn mint(&self) -> Option<&str> {
        match &self.stage {
            SessionStage::Success { mint } => Some(mint),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.stage {
            SessionStage::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// ステージ開始を状態遷移に変換する
struct StageReporter<'a> {
    state: &'a watch::Sender<SessionState>,
}

impl PipelineObserver for StageReporter<'_> {
    fn stage_started(&self, stage: PipelineStage) {
        let (next, status) = match stage {
            PipelineStage::UploadImage => (SessionStage::UploadingImage, "Uploading image..."),
            PipelineStage::UploadMetadata => {
                (SessionStage::UploadingMetadata, "Uploading metadata...")
            }
            PipelineStage::Mint => (SessionStage::Minting, "Minting NFT..."),
        };
        self.state.send_modify(|s| {
            s.stage = next;
            s.status = Some(status.to_string());
        });
    }

    fn stage_completed(&self, output: &StageOutput) {
        info!(?output, "stage completed");
    }
}

/// 実行中フラグ。drop で必ず下ろす
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SessionController {
    pipeline: Pipeline,
    state: watch::Sender<SessionState>,
    in_flight: AtomicBool,
}

impl SessionController {
    pub fn new(pipeline: Pipeline) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            pipeline,
            state,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 終端状態から Idle に戻す。実行中は何もしない
    pub fn reset(&self) {
        if !self.is_busy() {
            self.state.send_replace(SessionState::default());
        }
    }

    fn fail(&self, failure: Failure) {
        warn!(kind = %failure.kind, stage = ?failure.stage, message = %failure.message, "publish failed");
        self.state.send_replace(SessionState {
            stage: SessionStage::Failed(failure.clone()),
            status: None,
            error: Some(failure.message),
        });
    }

    /// フォームの内容で発行を1回走らせる
    ///
    /// 実行中に呼ばれた場合は状態に触れずに `PublishError::Busy` を返す。
    pub async fn publish(
        &self,
        form: &MetadataForm,
        wallet: &WalletSession,
    ) -> Result<Minted, PublishError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(PublishError::Busy);
        }
        let _guard = InFlight(&self.in_flight);

        self.state.send_replace(SessionState::default());

        let signer = match wallet.require_signer() {
            Ok(s) => s,
            Err(e) => {
                let error = PublishError::from(e);
                self.fail(Failure::from_error(&error));
                return Err(error);
            }
        };
        let snapshot = match form.snapshot() {
            Ok(s) => s,
            Err(e) => {
                let error = PublishError::from(e);
                self.fail(Failure::from_error(&error));
                return Err(error);
            }
        };

        info!(name = snapshot.name(), symbol = snapshot.symbol(), wallet = %signer.public_key(), "publish started");
        let reporter = StageReporter { state: &self.state };
        match self.pipeline.publish(&snapshot, signer.as_ref(), &reporter).await {
            Ok(minted) => {
                self.state.send_replace(SessionState {
                    stage: SessionStage::Success {
                        mint: minted.mint.clone(),
                    },
                    status: Some(format!("Success! Minted NFT: {}", minted.mint)),
                    error: None,
                });
                Ok(minted)
            }
            Err(failure) => {
                self.fail(Failure::from_pipeline(&failure));
                Err(failure.error)
            }
        }
    }
}
