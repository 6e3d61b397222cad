use anyhow::{Context, Result};
use nft_minter::config::{Config, StorageConfig};
use nft_minter::metadata::MetadataDocument;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// 1ファイル分の検査結果
struct Checked {
    file: String,
    document: Option<MetadataDocument>,
    problems: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let storage_dir = storage_dir()?;

    let files: Vec<PathBuf> = WalkDir::new(&storage_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();

    if files.is_empty() {
        println!("(メタデータが見つかりませんでした: {:?})", storage_dir);
        return Ok(());
    }

    let results: Vec<Checked> = files.par_iter().map(|path| check_one(path)).collect();

    let mut stats: HashMap<String, HashMap<String, usize>> = HashMap::new();
    let mut total = 0usize;
    let mut violations: Vec<(String, String)> = Vec::new();

    for checked in &results {
        if let Some(doc) = &checked.document {
            total += 1;
            for attr in &doc.attributes {
                *stats
                    .entry(attr.trait_type.clone())
                    .or_default()
                    .entry(attr.value.clone())
                    .or_insert(0) += 1;
            }
        }
        for problem in &checked.problems {
            violations.push((checked.file.clone(), problem.clone()));
        }
    }

    println!("==============================");
    println!(" Metadata Check");
    println!(" Storage: {}", storage_dir.display());
    println!(" Documents: {}", total);
    println!("==============================\n");

    let mut trait_types: Vec<_> = stats.into_iter().collect();
    trait_types.sort_by(|a, b| a.0.cmp(&b.0));

    for (trait_type, values) in trait_types {
        println!("▶ Trait: {}", trait_type);

        let mut sorted: Vec<_> = values.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        for (value, count) in sorted {
            let ratio = count as f64 / total as f64 * 100.0;
            println!("  {:30} {:5} ({:.2}%)", value, count, ratio);
        }
        println!();
    }

    if violations.is_empty() {
        println!("✅ すべてのメタデータが標準形式に沿っています");
        return Ok(());
    }

    println!("❌ 問題が見つかりました ({} 件):", violations.len());
    for (file, msg) in &violations {
        println!("  - {} : {}", file, msg);
    }
    std::process::exit(1);
}

/// 引数 > config.yaml のディレクトリストレージ > 既定値 の順で決める
fn storage_dir() -> Result<PathBuf> {
    if let Some(arg) = std::env::args().nth(1) {
        return Ok(PathBuf::from(arg));
    }
    let from_config = Config::load("config.yaml").ok().and_then(|c| match c.storage {
        StorageConfig::Directory { directory } => Some(directory),
        StorageConfig::Mock => None,
    });
    let dir = from_config.unwrap_or_else(|| PathBuf::from("output/storage"));
    if !dir.is_dir() {
        anyhow::bail!("ストレージディレクトリが読めません: {:?}", dir);
    }
    Ok(dir)
}

fn check_one(path: &Path) -> Checked {
    let file = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("<unknown>")
        .to_string();

    let parsed = fs::read_to_string(path)
        .with_context(|| format!("JSON 読み込み失敗: {:?}", path))
        .and_then(|text| {
            serde_json::from_str::<MetadataDocument>(&text)
                .with_context(|| format!("JSON パース失敗: {:?}", path))
        });

    match parsed {
        Ok(document) => {
            debug!(file = %path.display(), name = %document.name, "metadata parsed");
            let mut problems = document.shape_violations();
            if let Some(local) = document.image.strip_prefix("file://") {
                if !Path::new(local).is_file() {
                    problems.push(format!("image file is missing: {}", local));
                }
            }
            Checked {
                file,
                document: Some(document),
                problems,
            }
        }
        Err(e) => {
            let message = format!("{:#}", e);
            warn!(file = %path.display(), error = %message, "metadata unreadable");
            Checked {
                file,
                document: None,
                problems: vec![message],
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_metadata_is_reported_as_problem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let checked = check_one(&path);
        assert_eq!(checked.file, "broken.json");
        assert!(checked.document.is_none());
        assert_eq!(checked.problems.len(), 1);
        assert!(checked.problems[0].contains("JSON パース失敗"));
    }

    #[test]
    fn missing_local_image_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        let image = format!("file://{}", dir.path().join("gone.png").display());
        let doc = MetadataDocument::build("A", "B", "c", &[], "image/png", &image);
        fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let checked = check_one(&path);
        assert!(checked.document.is_some());
        assert_eq!(checked.problems.len(), 1);
        assert!(checked.problems[0].starts_with("image file is missing"));
    }
}
