#![allow(dead_code)]

use async_trait::async_trait;
use nft_minter::asset::Asset;
use nft_minter::form::MetadataForm;
use nft_minter::ledger::{Ledger, LedgerError, Transaction};
use nft_minter::resolver::ImageResolver;
use nft_minter::storage::{Storage, StorageError};
use nft_minter::wallet::{Pubkey, Signer, SignerError};
use std::sync::Mutex;
use image::ImageEncoder;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub enum Call {
    Upload {
        name: String,
        mime: String,
        bytes: Vec<u8>,
    },
    UploadJson(serde_json::Value),
    Mint(Transaction),
}

/// 呼び出しを記録するだけのストレージ / 台帳
#[derive(Default)]
pub struct Recorder {
    pub calls: Mutex<Vec<Call>>,
    pub image_result: Mutex<Option<Result<String, String>>>,
    pub json_result: Mutex<Option<Result<String, String>>>,
    pub ledger_result: Mutex<Option<Result<String, LedgerError>>>,
}

impl Recorder {
    pub fn succeeding() -> Self {
        let r = Recorder::default();
        *r.image_result.lock().unwrap() = Some(Ok("ipfs://img1".into()));
        *r.json_result.lock().unwrap() = Some(Ok("ipfs://meta1".into()));
        *r.ledger_result.lock().unwrap() = Some(Ok("sig1".into()));
        r
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploaded_json(&self) -> Option<serde_json::Value> {
        self.calls().into_iter().find_map(|c| match c {
            Call::UploadJson(v) => Some(v),
            _ => None,
        })
    }

    pub fn uploaded_bytes(&self) -> Option<Vec<u8>> {
        self.calls().into_iter().find_map(|c| match c {
            Call::Upload { bytes, .. } => Some(bytes),
            _ => None,
        })
    }

    pub fn minted(&self) -> Option<Transaction> {
        self.calls().into_iter().find_map(|c| match c {
            Call::Mint(tx) => Some(tx),
            _ => None,
        })
    }
}

#[async_trait]
impl Storage for Recorder {
    async fn upload(&self, asset: &Asset, unique_name: &str) -> Result<String, StorageError> {
        self.calls.lock().unwrap().push(Call::Upload {
            name: unique_name.to_string(),
            mime: asset.mime().to_string(),
            bytes: asset.bytes().to_vec(),
        });
        self.image_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err("no response configured".into()))
            .map_err(StorageError::Network)
    }

    async fn upload_json(&self, document: &serde_json::Value) -> Result<String, StorageError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::UploadJson(document.clone()));
        self.json_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err("no response configured".into()))
            .map_err(StorageError::Network)
    }
}

#[async_trait]
impl Ledger for Recorder {
    async fn send_and_confirm(&self, tx: &Transaction) -> Result<String, LedgerError> {
        self.calls.lock().unwrap().push(Call::Mint(tx.clone()));
        self.ledger_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Err(LedgerError::Timeout))
    }
}

/// 署名を常に拒否するウォレット
pub struct RejectingSigner(pub Pubkey);

#[async_trait]
impl Signer for RejectingSigner {
    fn public_key(&self) -> Pubkey {
        self.0
    }

    async fn sign_transaction(&self, _tx: &mut Transaction) -> Result<(), SignerError> {
        Err(SignerError::Rejected)
    }
}

/// 画像アップロードの途中で止まるストレージ
#[derive(Default)]
pub struct GatedStorage {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl Storage for GatedStorage {
    async fn upload(&self, _asset: &Asset, _unique_name: &str) -> Result<String, StorageError> {
        self.entered.notify_one();
        self.release.notified().await;
        Err(StorageError::Quota)
    }

    async fn upload_json(&self, _document: &serde_json::Value) -> Result<String, StorageError> {
        Err(StorageError::Quota)
    }
}

pub fn cosmic_cat_form() -> MetadataForm {
    let mut form = MetadataForm::new();
    form.set_name("Cosmic Cat");
    form.set_symbol("CAT");
    form.set_description("A cat in space");
    form.set_royalty_percent(2.5);
    form.add_attribute("Background", "Nebula");
    form.set_image(ImageResolver::from_local_file(Asset::new(
        vec![0x89, b'P', b'N', b'G'],
        "image/png",
        "cat.png",
    )));
    form
}

/// 単色 RGBA を低圧縮で書いた PNG。oxipng で縮む
pub fn bloated_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(64, 64, image::Rgba([10, 120, 200, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::codecs::png::PngEncoder::new_with_quality(
        &mut out,
        image::codecs::png::CompressionType::Fast,
        image::codecs::png::FilterType::NoFilter,
    )
    .write_image(img.as_raw(), 64, 64, image::ExtendedColorType::Rgba8)
    .unwrap();
    out.into_inner()
}
