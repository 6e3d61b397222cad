mod common;

use common::{Call, Recorder, bloated_png, cosmic_cat_form};
use nft_minter::asset::Asset;
use nft_minter::error::{MintError, UploadError};
use nft_minter::ledger::{LedgerError, LocalLedger};
use nft_minter::pipeline::{
    Pipeline, PipelineObserver, PipelineStage, PublishOptions, StageOutput, upload_image,
};
use nft_minter::storage::MockStorage;
use nft_minter::wallet::Keypair;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Trace {
    started: Mutex<Vec<PipelineStage>>,
    outputs: Mutex<Vec<StageOutput>>,
}

impl PipelineObserver for Trace {
    fn stage_started(&self, stage: PipelineStage) {
        self.started.lock().unwrap().push(stage);
    }

    fn stage_completed(&self, output: &StageOutput) {
        self.outputs.lock().unwrap().push(output.clone());
    }
}

#[tokio::test]
async fn stages_run_in_order_and_feed_each_other() {
    let recorder = Arc::new(Recorder::succeeding());
    let pipeline = Pipeline::new(recorder.clone(), recorder.clone());
    let wallet = Keypair::generate();
    let snapshot = cosmic_cat_form().snapshot().unwrap();
    let trace = Trace::default();

    let minted = pipeline.publish(&snapshot, &wallet, &trace).await.unwrap();

    assert_eq!(
        *trace.started.lock().unwrap(),
        vec![
            PipelineStage::UploadImage,
            PipelineStage::UploadMetadata,
            PipelineStage::Mint
        ]
    );
    assert_eq!(
        *trace.outputs.lock().unwrap(),
        vec![
            StageOutput::ImageUri("ipfs://img1".into()),
            StageOutput::MetadataUri("ipfs://meta1".into()),
            StageOutput::MintIdentifier(minted.mint.clone()),
        ]
    );

    let calls = recorder.calls();
    assert_eq!(calls.len(), 3);
    match &calls[0] {
        Call::Upload { name, mime, .. } => {
            assert!(name.ends_with("-cat.png"));
            let stamp = name.trim_end_matches("-cat.png");
            assert!(stamp.parse::<i64>().is_ok());
            assert_eq!(mime, "image/png");
        }
        other => panic!("expected image upload first, got {:?}", other),
    }

    let doc = recorder.uploaded_json().unwrap();
    assert_eq!(doc["image"], "ipfs://img1");
    assert_eq!(doc["properties"]["files"][0]["uri"], "ipfs://img1");
    assert_eq!(doc["properties"]["files"][0]["type"], "image/png");

    let tx = recorder.minted().unwrap();
    assert_eq!(tx.instruction().uri, "ipfs://meta1");
    assert_eq!(tx.instruction().mint.to_string(), minted.mint);
    assert_eq!(minted.signature, "sig1");
}

#[tokio::test]
async fn image_upload_failure_stops_pipeline() {
    let recorder = Arc::new(Recorder::succeeding());
    *recorder.image_result.lock().unwrap() = Some(Err("connection refused".into()));
    let pipeline = Pipeline::new(recorder.clone(), recorder.clone());
    let snapshot = cosmic_cat_form().snapshot().unwrap();

    let failure = pipeline
        .publish(&snapshot, &Keypair::generate(), &())
        .await
        .unwrap_err();

    assert_eq!(failure.error.stage(), Some(PipelineStage::UploadImage));
    assert!(failure.to_string().contains("connection refused"));
    assert!(failure.image_uri.is_none());
    assert_eq!(recorder.calls().len(), 1);
}

#[tokio::test]
async fn empty_image_uri_never_reaches_metadata_stage() {
    let recorder = Arc::new(Recorder::succeeding());
    *recorder.image_result.lock().unwrap() = Some(Ok(String::new()));
    let pipeline = Pipeline::new(recorder.clone(), recorder.clone());
    let snapshot = cosmic_cat_form().snapshot().unwrap();

    let failure = pipeline
        .publish(&snapshot, &Keypair::generate(), &())
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        nft_minter::error::PublishError::Upload(UploadError::Image(_))
    ));
    assert!(recorder.uploaded_json().is_none());
    assert!(recorder.minted().is_none());
}

#[tokio::test]
async fn empty_metadata_uri_never_reaches_mint_stage() {
    let recorder = Arc::new(Recorder::succeeding());
    *recorder.json_result.lock().unwrap() = Some(Ok("  ".into()));
    let pipeline = Pipeline::new(recorder.clone(), recorder.clone());
    let snapshot = cosmic_cat_form().snapshot().unwrap();

    let failure = pipeline
        .publish(&snapshot, &Keypair::generate(), &())
        .await
        .unwrap_err();

    assert_eq!(failure.error.stage(), Some(PipelineStage::UploadMetadata));
    assert_eq!(failure.image_uri.as_deref(), Some("ipfs://img1"));
    assert!(recorder.minted().is_none());
}

#[tokio::test]
async fn mint_failure_reports_uploads_left_behind() {
    let recorder = Arc::new(Recorder::succeeding());
    *recorder.ledger_result.lock().unwrap() = Some(Err(LedgerError::Timeout));
    let pipeline = Pipeline::new(recorder.clone(), recorder.clone());
    let snapshot = cosmic_cat_form().snapshot().unwrap();

    let failure = pipeline
        .publish(&snapshot, &Keypair::generate(), &())
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        nft_minter::error::PublishError::Mint(MintError::Ledger(LedgerError::Timeout))
    ));
    assert_eq!(failure.image_uri.as_deref(), Some("ipfs://img1"));
    assert_eq!(failure.metadata_uri.as_deref(), Some("ipfs://meta1"));
}

#[tokio::test]
async fn mints_against_local_ledger_and_mock_storage() {
    let storage = Arc::new(MockStorage::new());
    let ledger = Arc::new(LocalLedger::new(1_000));
    let wallet = Keypair::generate();
    ledger.airdrop(wallet.pubkey(), 10_000);

    let pipeline = Pipeline::new(storage.clone(), ledger.clone());
    let snapshot = cosmic_cat_form().snapshot().unwrap();
    let minted = pipeline.publish(&snapshot, &wallet, &()).await.unwrap();

    let mint_key = minted.mint.parse().unwrap();
    let record = ledger.mint_record(&mint_key).unwrap();
    assert_eq!(record.instruction.uri, minted.metadata_uri);
    assert_eq!(record.instruction.seller_fee_basis_points, 250);
    assert_eq!(record.instruction.creators[0].address, wallet.pubkey());
    assert_eq!(ledger.balance(&wallet.pubkey()), 9_000);

    let stored = storage.get(&minted.metadata_uri).unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&stored.bytes).unwrap();
    assert_eq!(doc["image"], serde_json::Value::String(minted.image_uri.clone()));
    assert_eq!(storage.get(&minted.image_uri).unwrap().bytes, snapshot.image().bytes());
}

#[tokio::test]
async fn unfunded_wallet_fails_at_mint() {
    let storage = Arc::new(MockStorage::new());
    let ledger = Arc::new(LocalLedger::new(1_000));
    let pipeline = Pipeline::new(storage.clone(), ledger.clone());
    let snapshot = cosmic_cat_form().snapshot().unwrap();

    let failure = pipeline
        .publish(&snapshot, &Keypair::generate(), &())
        .await
        .unwrap_err();

    assert_eq!(failure.error.stage(), Some(PipelineStage::Mint));
    assert!(failure.to_string().contains("insufficient funds"));
    assert_eq!(storage.len(), 2);
    assert_eq!(ledger.mint_count(), 0);
}

#[tokio::test]
async fn png_recompression_falls_back_on_invalid_png() {
    let recorder = Recorder::succeeding();
    let snapshot = cosmic_cat_form().snapshot().unwrap();

    let uri = upload_image(&recorder, snapshot.image(), PublishOptions { png_level: Some(2) })
        .await
        .unwrap();

    assert_eq!(uri, "ipfs://img1");
    assert_eq!(recorder.calls().len(), 1);
    assert_eq!(recorder.uploaded_bytes().unwrap(), snapshot.image().bytes());
}

#[tokio::test]
async fn valid_png_is_recompressed_before_upload() {
    let recorder = Recorder::succeeding();
    let original = Asset::new(bloated_png(), "image/png", "big.png");

    upload_image(&recorder, &original, PublishOptions { png_level: Some(2) })
        .await
        .unwrap();

    let uploaded = recorder.uploaded_bytes().unwrap();
    assert!(uploaded.len() < original.len());
    let reloaded = Asset::new(uploaded, "image/png", "big.png");
    assert_eq!(reloaded.dimensions().unwrap(), (64, 64));
}

#[tokio::test]
async fn recompression_disabled_uploads_bytes_untouched() {
    let recorder = Recorder::succeeding();
    let original = Asset::new(bloated_png(), "image/png", "big.png");

    upload_image(&recorder, &original, PublishOptions { png_level: None })
        .await
        .unwrap();

    assert_eq!(recorder.uploaded_bytes().unwrap(), original.bytes());
}
