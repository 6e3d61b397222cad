//! 台帳とミント命令
//!
//! `LocalLedger` はプロセス内で動く台帳。署名検証、残高の引き落とし、
//! ミントアドレスの重複拒否だけを行う。

use crate::metadata::Royalty;
use crate::wallet::Pubkey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_SYMBOL_LENGTH: usize = 10;
pub const MAX_URI_LENGTH: usize = 200;

/// ミントアカウントの rent + 手数料の既定値
pub const DEFAULT_MINT_COST_LAMPORTS: u64 = 15_115_600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub address: Pubkey,
    pub verified: bool,
    pub share: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInstruction {
    pub mint: Pubkey,
    pub fee_payer: Pubkey,
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
    pub creators: Vec<Creator>,
}

impl MintInstruction {
    /// 接続ウォレットを唯一のクリエイター（share 100, verified）にした命令を作る
    pub fn new(
        mint: Pubkey,
        wallet: Pubkey,
        name: &str,
        symbol: &str,
        uri: &str,
        royalty: Royalty,
    ) -> Self {
        Self {
            mint,
            fee_payer: wallet,
            name: name.to_string(),
            symbol: symbol.to_string(),
            uri: uri.to_string(),
            seller_fee_basis_points: royalty.basis_points(),
            creators: vec![Creator {
                address: wallet,
                verified: true,
                share: 100,
            }],
        }
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.name.chars().count() > MAX_NAME_LENGTH {
            return Err(LedgerError::InvalidInstruction(format!(
                "name longer than {} characters",
                MAX_NAME_LENGTH
            )));
        }
        if self.symbol.chars().count() > MAX_SYMBOL_LENGTH {
            return Err(LedgerError::InvalidInstruction(format!(
                "symbol longer than {} characters",
                MAX_SYMBOL_LENGTH
            )));
        }
        if self.uri.len() > MAX_URI_LENGTH {
            return Err(LedgerError::InvalidInstruction(format!(
                "uri longer than {} bytes",
                MAX_URI_LENGTH
            )));
        }
        if self.seller_fee_basis_points > Royalty::MAX_BASIS_POINTS {
            return Err(LedgerError::InvalidInstruction(
                "seller fee exceeds 10000 basis points".into(),
            ));
        }
        let total: u32 = self.creators.iter().map(|c| u32::from(c.share)).sum();
        if !self.creators.is_empty() && total != 100 {
            return Err(LedgerError::InvalidInstruction(format!(
                "creator shares sum to {}, expected 100",
                total
            )));
        }
        Ok(())
    }
}

/// 署名付きトランザクション。署名対象は命令の JSON 表現
#[derive(Debug, Clone)]
pub struct Transaction {
    instruction: MintInstruction,
    signatures: Vec<(Pubkey, [u8; 64])>,
}

impl Transaction {
    pub fn new(instruction: MintInstruction) -> Self {
        Self {
            instruction,
            signatures: Vec::new(),
        }
    }

    pub fn instruction(&self) -> &MintInstruction {
        &self.instruction
    }

    pub fn message_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.instruction)
    }

    /// 同じ鍵の署名は差し替える
    pub fn add_signature(&mut self, signer: Pubkey, signature: [u8; 64]) {
        self.signatures.retain(|(key, _)| *key != signer);
        self.signatures.push((signer, signature));
    }

    pub fn signature_for(&self, signer: &Pubkey) -> Option<&[u8; 64]> {
        self.signatures
            .iter()
            .find(|(key, _)| key == signer)
            .map(|(_, sig)| sig)
    }

    /// ミントアカウントと手数料支払者（兼 verified クリエイター）
    pub fn required_signers(&self) -> Vec<Pubkey> {
        let mut keys = vec![self.instruction.mint, self.instruction.fee_payer];
        for creator in &self.instruction.creators {
            if creator.verified && !keys.contains(&creator.address) {
                keys.push(creator.address);
            }
        }
        keys
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("missing signature for {0}")]
    MissingSignature(Pubkey),
    #[error("invalid signature for {0}")]
    InvalidSignature(Pubkey),
    #[error("insufficient funds: need {required} lamports, have {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("mint account {0} already exists")]
    MintExists(Pubkey),
    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),
    #[error("transaction was not confirmed in time")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// 署名済みトランザクションを送信し、確定した署名を返す
    async fn send_and_confirm(&self, tx: &Transaction) -> Result<String, LedgerError>;
}

/// 確定済みのミント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRecord {
    pub instruction: MintInstruction,
    pub signature: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Pubkey, u64>,
    mints: HashMap<Pubkey, MintRecord>,
}

#[derive(Debug)]
pub struct LocalLedger {
    mint_cost_lamports: u64,
    state: Mutex<LedgerState>,
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new(DEFAULT_MINT_COST_LAMPORTS)
    }
}

impl LocalLedger {
    pub fn new(mint_cost_lamports: u64) -> Self {
        Self {
            mint_cost_lamports,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn mint_cost(&self) -> u64 {
        self.mint_cost_lamports
    }

    pub fn airdrop(&self, to: Pubkey, lamports: u64) {
        if let Ok(mut state) = self.state.lock() {
            let balance = state.balances.entry(to).or_insert(0);
            *balance = balance.saturating_add(lamports);
            info!(account = %to, lamports, balance = *balance, "airdrop");
        }
    }

    pub fn balance(&self, of: &Pubkey) -> u64 {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.balances.get(of).copied())
            .unwrap_or(0)
    }

    pub fn mint_record(&self, mint: &Pubkey) -> Option<MintRecord> {
        self.state.lock().ok()?.mints.get(mint).cloned()
    }

    pub fn mint_count(&self) -> usize {
        self.state.lock().map(|s| s.mints.len()).unwrap_or(0)
    }

    fn verify_signatures(tx: &Transaction) -> Result<[u8; 64], LedgerError> {
        let message = tx
            .message_bytes()
            .map_err(|e| LedgerError::InvalidInstruction(e.to_string()))?;
        for key in tx.required_signers() {
            let sig = tx
                .signature_for(&key)
                .ok_or(LedgerError::MissingSignature(key))?;
            if !key.verify(&message, sig) {
                return Err(LedgerError::InvalidSignature(key));
            }
        }
        let payer = tx.instruction().fee_payer;
        tx.signature_for(&payer)
            .copied()
            .ok_or(LedgerError::MissingSignature(payer))
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    async fn send_and_confirm(&self, tx: &Transaction) -> Result<String, LedgerError> {
        let ix = tx.instruction();
        ix.validate()?;
        let payer_sig = Self::verify_signatures(tx)?;

        let mut state = self
            .state
            .lock()
            .map_err(|_| LedgerError::Network("ledger state lock poisoned".into()))?;

        if state.mints.contains_key(&ix.mint) {
            return Err(LedgerError::MintExists(ix.mint));
        }
        let available = state.balances.get(&ix.fee_payer).copied().unwrap_or(0);
        if available < self.mint_cost_lamports {
            return Err(LedgerError::InsufficientFunds {
                required: self.mint_cost_lamports,
                available,
            });
        }
        state
            .balances
            .insert(ix.fee_payer, available - self.mint_cost_lamports);

        let signature = bs58::encode(payer_sig).into_string();
        state.mints.insert(
            ix.mint,
            MintRecord {
                instruction: ix.clone(),
                signature: signature.clone(),
            },
        );
        debug!(mint = %ix.mint, %signature, "mint confirmed");
        Ok(signature)
    }
}
