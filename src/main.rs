use nft_minter::asset::Asset;
use nft_minter::config::{Config, StorageConfig};
use nft_minter::error::ErrorKind;
use nft_minter::form::MetadataForm;
use nft_minter::generation::{HttpFetcher, OpenAiImageGenerator};
use nft_minter::ledger::LocalLedger;
use nft_minter::pipeline::{Pipeline, PublishOptions};
use nft_minter::resolver::{ImageResolver, SelectedImage};
use nft_minter::session::{SessionController, SessionStage, SessionState};
use nft_minter::storage::{DirStorage, MockStorage, Storage};
use nft_minter::wallet::{Keypair, WalletSession};

use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    run().await
}

async fn run() -> Result<()> {
    let cfg = Config::load("config.yaml")
        .context("config.yaml の読み込みに失敗しました")?;

    let ledger = Arc::new(LocalLedger::new(cfg.ledger.mint_cost_lamports));
    let wallet = connect_wallet(&cfg, &ledger)?;

    let storage: Arc<dyn Storage> = match &cfg.storage {
        StorageConfig::Mock => Arc::new(MockStorage::new()),
        StorageConfig::Directory { directory } => Arc::new(
            DirStorage::open(directory)
                .await
                .with_context(|| format!("ストレージディレクトリの作成に失敗しました: {:?}", directory))?,
        ),
    };

    let pipeline = Pipeline::new(storage, ledger.clone()).with_options(PublishOptions {
        png_level: cfg.upload.png_level(),
    });
    let controller = SessionController::new(pipeline);

    println!("==============================");
    println!(" NFT Minter");
    match wallet.public_key() {
        Some(key) => println!(" Wallet: {} ({} lamports)", key, ledger.balance(&key)),
        None => println!(" Wallet: not connected"),
    }
    println!("==============================\n");

    if let Err(e) = wallet.require_signer() {
        eprintln!("❌ {}", e);
        std::process::exit(2);
    }

    let mut form = MetadataForm::new();
    fill_form(&mut form, &cfg).await?;

    let progress = tokio::spawn(show_progress(controller.subscribe()));
    let result = controller.publish(&form, &wallet).await;
    // 最終状態は watch に残っているので表示タスクは必ず終わる
    drop(controller);
    progress.await.context("進捗表示タスクが異常終了しました")?;

    match result {
        Ok(minted) => {
            println!("   image:    {}", minted.image_uri);
            println!("   metadata: {}", minted.metadata_uri);
            println!("   tx:       {}", minted.signature);
            if let Some(key) = wallet.public_key() {
                println!("   balance:  {} lamports", ledger.balance(&key));
            }
            Ok(())
        }
        Err(err) => {
            std::process::exit(match err.kind() {
                ErrorKind::Precondition => 2,
                _ => 1,
            });
        }
    }
}

/// 設定のキーペアでウォレットを接続する。
/// パス未設定なら一時キーペア、ファイルが無ければ作成、読めなければ未接続のまま
fn connect_wallet(cfg: &Config, ledger: &LocalLedger) -> Result<WalletSession> {
    if !confirm("Connect wallet?")? {
        warn!("wallet not connected");
        return Ok(WalletSession::disconnected());
    }

    let keypair = match &cfg.wallet.keypair_path {
        Some(path) => match Keypair::load_or_create(path) {
            Ok((keypair, created)) => {
                if created {
                    info!(path = %path.display(), "created new wallet keypair");
                }
                keypair
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "wallet keypair unreadable, staying disconnected");
                return Ok(WalletSession::disconnected());
            }
        },
        None => Keypair::generate(),
    };

    ledger.airdrop(keypair.pubkey(), cfg.ledger.airdrop_lamports);
    Ok(WalletSession::connected(Arc::new(keypair)))
}

async fn fill_form(form: &mut MetadataForm, cfg: &Config) -> Result<()> {
    let image = choose_image(cfg).await?;
    match image.asset.dimensions() {
        Ok((w, h)) => println!("🖼  {} ({}x{}, {})", image.asset.filename(), w, h, image.asset.mime()),
        Err(e) => warn!(error = %e, "could not read image dimensions"),
    }
    form.set_image(image);

    form.set_name(ask("Name")?);
    form.set_symbol(ask("Symbol")?);
    form.set_description(ask("Description")?);

    loop {
        let text = ask("Royalties (%) - Max 100%")?;
        match text.trim().parse::<f64>() {
            Ok(v) => {
                let kept = form.set_royalty_percent(v);
                if kept != v {
                    println!("   royalties clamped to {}%", kept);
                }
                break;
            }
            Err(_) => eprintln!("⚠ 数値を入力してください"),
        }
    }

    println!("Attributes (blank trait type to finish)");
    loop {
        let trait_type = ask("  Trait Type")?;
        if trait_type.is_empty() {
            break;
        }
        let value = ask("  Value")?;
        if !form.add_attribute(&trait_type, &value) {
            eprintln!("⚠ trait type と value の両方が必要です");
        }
    }

    if let Err(e) = form.snapshot() {
        bail!("フォームが未完成です: {}", e);
    }
    Ok(())
}

/// ローカルファイルか AI 生成のどちらかで画像を決める
async fn choose_image(cfg: &Config) -> Result<SelectedImage> {
    let mut resolver: Option<ImageResolver> = None;

    loop {
        let path = ask("Image file (leave blank to generate one)")?;
        if !path.is_empty() {
            let path = Path::new(&path);
            match Asset::from_path(path) {
                Ok(asset) => return Ok(ImageResolver::from_local_file(asset)),
                Err(e) => {
                    eprintln!("❌ 画像の読み込みに失敗しました: {:?}: {}", path, e);
                    continue;
                }
            }
        }

        if resolver.is_none() {
            match OpenAiImageGenerator::from_env(cfg.generation.clone()) {
                Ok(generator) => {
                    resolver = Some(ImageResolver::new(
                        Arc::new(generator),
                        Arc::new(HttpFetcher::new()),
                    ));
                }
                Err(e) => {
                    eprintln!("❌ {}", e);
                    continue;
                }
            }
        }
        let Some(resolver) = resolver.as_ref() else {
            continue;
        };

        let prompt = ask("Describe your NFT image")?;
        println!("Generating...");
        match resolver.from_generation(&prompt).await {
            Ok(image) => return Ok(image),
            Err(e) => eprintln!("❌ {}", e),
        }
    }
}

async fn show_progress(mut rx: watch::Receiver<SessionState>) {
    let mut last: Option<SessionState> = None;
    loop {
        let state = rx.borrow_and_update().clone();
        if last.as_ref() != Some(&state) {
            render(&state);
        }
        if state.stage.is_terminal() {
            break;
        }
        last = Some(state);
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn render(state: &SessionState) {
    match &state.stage {
        SessionStage::Idle => {}
        SessionStage::Success { .. } => {
            println!("✅ {}", state.status.as_deref().unwrap_or("Success!"));
        }
        SessionStage::Failed(failure) => {
            eprintln!("❌ [{}] {}", failure.kind, failure.message);
            if let Some(uri) = &failure.image_uri {
                eprintln!("   image already uploaded: {}", uri);
            }
            if let Some(uri) = &failure.metadata_uri {
                eprintln!("   metadata already uploaded: {}", uri);
            }
        }
        _ => {
            if let Some(status) = &state.status {
                println!("⏳ {}", status);
            }
        }
    }
}

fn ask(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("標準入力の読み込みに失敗しました")?;
    if read == 0 {
        bail!("入力が終了しました");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm(label: &str) -> Result<bool> {
    let answer = ask(&format!("{} [Y/n]", label))?;
    Ok(!matches!(answer.trim().to_ascii_lowercase().as_str(), "n" | "no"))
}
