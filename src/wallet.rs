//! ウォレット（署名者）
//!
//! `Signer` は公開鍵の取得とトランザクション署名の2メソッドだけを持つ。

use crate::error::PreconditionError;
use crate::ledger::Transaction;
use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// 32バイトの公開鍵。表示は base58
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    /// `signature` がこの鍵による `message` の署名か検証する
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        key.verify(message, &Signature::from_bytes(signature)).is_ok()
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PubkeyParseError {
    #[error("invalid base58: {0}")]
    Base58(String),
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Pubkey {
    type Err = PubkeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| PubkeyParseError::Base58(e.to_string()))?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PubkeyParseError::Length(bytes.len()))?;
        Ok(Pubkey(array))
    }
}

impl serde::Serialize for Pubkey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Pubkey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("signature request rejected by wallet")]
    Rejected,
    #[error("signing failed: {0}")]
    Failed(String),
}

/// 接続済みウォレットの能力
#[async_trait]
pub trait Signer: Send + Sync {
    fn public_key(&self) -> Pubkey;

    /// トランザクションに自分の署名を追加する
    async fn sign_transaction(&self, tx: &mut Transaction) -> Result<(), SignerError>;
}

/// ed25519 キーペア
pub struct Keypair {
    signing: SigningKey,
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeypairError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("keypair file is not a JSON byte array: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected 64 bytes, got {0}")]
    Length(usize),
    #[error("public half does not match secret half")]
    Mismatch,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// 秘密鍵32バイト + 公開鍵32バイトの形式から復元する
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        let array: [u8; 64] = bytes
            .try_into()
            .map_err(|_| KeypairError::Length(bytes.len()))?;
        let signing = SigningKey::from_keypair_bytes(&array).map_err(|_| KeypairError::Mismatch)?;
        Ok(Self { signing })
    }

    /// `[12, 34, ...]` 形式の JSON キーペアファイルを読む
    pub fn read_from_file(path: &Path) -> Result<Self, KeypairError> {
        let text = std::fs::read_to_string(path)?;
        let bytes: Vec<u8> = serde_json::from_str(&text)?;
        Self::from_bytes(&bytes)
    }

    /// JSON キーペアファイルを新規作成する。unix では所有者のみ読み書き可
    pub fn write_to_file(&self, path: &Path) -> Result<(), KeypairError> {
        let json = serde_json::to_string(&self.to_bytes().to_vec())?;
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// ファイルがあれば読み、無ければ新しく作る。作ったときは `true` を返す
    pub fn load_or_create(path: &Path) -> Result<(Self, bool), KeypairError> {
        if path.exists() {
            return Ok((Self::read_from_file(path)?, false));
        }
        let keypair = Self::generate();
        keypair.write_to_file(path)?;
        Ok((keypair, true))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing.to_keypair_bytes()
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

#[async_trait]
impl Signer for Keypair {
    fn public_key(&self) -> Pubkey {
        self.pubkey()
    }

    async fn sign_transaction(&self, tx: &mut Transaction) -> Result<(), SignerError> {
        let message = tx
            .message_bytes()
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        tx.add_signature(self.pubkey(), self.sign(&message));
        Ok(())
    }
}

/// ウォレット接続状態
#[derive(Clone, Default)]
pub struct WalletSession {
    signer: Option<Arc<dyn Signer>>,
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl WalletSession {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn connected(signer: Arc<dyn Signer>) -> Self {
        Self {
            signer: Some(signer),
        }
    }

    pub fn connect(&mut self, signer: Arc<dyn Signer>) {
        self.signer = Some(signer);
    }

    pub fn disconnect(&mut self) {
        self.signer = None;
    }

    pub fn signer(&self) -> Option<Arc<dyn Signer>> {
        self.signer.clone()
    }

    /// 未接続なら `NoSigner`
    pub fn require_signer(&self) -> Result<Arc<dyn Signer>, PreconditionError> {
        self.signer.clone().ok_or(PreconditionError::NoSigner)
    }

    pub fn public_key(&self) -> Option<Pubkey> {
        self.signer.as_ref().map(|s| s.public_key())
    }

    pub fn is_connected(&self) -> bool {
        self.signer.is_some()
    }
}
