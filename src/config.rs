use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::ledger::DEFAULT_MINT_COST_LAMPORTS;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct WalletConfig {
    /// 64 バイトの JSON 配列形式のキーペアファイル
    pub keypair_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_airdrop")]
    pub airdrop_lamports: u64,
    #[serde(default = "default_mint_cost")]
    pub mint_cost_lamports: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            airdrop_lamports: default_airdrop(),
            mint_cost_lamports: default_mint_cost(),
        }
    }
}

fn default_airdrop() -> u64 {
    1_000_000_000
}

fn default_mint_cost() -> u64 {
    DEFAULT_MINT_COST_LAMPORTS
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    #[default]
    Mock,
    Directory { directory: PathBuf },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_base: String,
    pub model: String,
    pub size: String,
    pub quality: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadConfig {
    pub png_compression: Option<PngCompressionConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PngCompressionConfig {
    pub enabled: bool,
    pub level: u8,
}

impl UploadConfig {
    /// 有効な場合だけ圧縮レベルを返す
    pub fn png_level(&self) -> Option<u8> {
        self.png_compression
            .filter(|c| c.enabled)
            .map(|c| c.level.min(6))
    }
}
