use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use stow_blob::{BlobStore, ContentAddressableStore, FileBlobStore};
use tokio::io::AsyncWriteExt;

use crate::cli::*;
use crate::config::StowConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = StowConfig::load(cli.config.as_deref())?.with_root(cli.root);
    let format = cli.format;
    match cli.command {
        Command::Blob(args) => cmd_blob(args.action, &config, format).await,
        Command::Digest(args) => cmd_digest(args, &config, format).await,
        Command::Config => cmd_config(&config, format),
    }
}

async fn cmd_blob(action: BlobAction, config: &StowConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = FileBlobStore::from_config(&config.blob);
    match action {
        BlobAction::Put { file, key } => {
            let mut input = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let key = match key {
                Some(key) => store.put(&key, &mut input).await?,
                None => {
                    let cas = ContentAddressableStore::with_algorithm(store, config.blob.digest);
                    cas.put(&mut input).await?
                }
            };
            match format {
                OutputFormat::Text => println!("{} stored {}", "✓".green().bold(), key.yellow()),
                OutputFormat::Json => println!("{}", serde_json::json!({ "key": key })),
            }
        }
        BlobAction::Get { key, out } => {
            let Some(mut reader) = store.get(&key).await? else {
                bail!("blob {key} not found");
            };
            match out {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("creating {}", path.display()))?;
                    let bytes = tokio::io::copy(&mut reader, &mut file).await?;
                    file.flush().await?;
                    match format {
                        OutputFormat::Text => println!(
                            "{} wrote {} bytes to {}",
                            "✓".green().bold(),
                            bytes,
                            path.display()
                        ),
                        OutputFormat::Json => println!(
                            "{}",
                            serde_json::json!({ "key": key, "bytes": bytes, "out": path })
                        ),
                    }
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy(&mut reader, &mut stdout).await?;
                    stdout.flush().await?;
                }
            }
        }
        BlobAction::Exists { key } => {
            let exists = store.exists(&key).await?;
            match format {
                OutputFormat::Text if exists => println!("{} {}", key.yellow(), "exists".green()),
                OutputFormat::Text => println!("{} {}", key.yellow(), "not found".red()),
                OutputFormat::Json => println!("{}", serde_json::json!({ "key": key, "exists": exists })),
            }
        }
        BlobAction::Delete { key } => {
            store.delete(&key).await?;
            match format {
                OutputFormat::Text => println!("Deleted {}", key.yellow()),
                OutputFormat::Json => println!("{}", serde_json::json!({ "key": key, "deleted": true })),
            }
        }
        BlobAction::Path { key } => {
            let Some(path) = store.path_for(&key) else {
                bail!("{key:?} is not an addressable blob key");
            };
            match format {
                OutputFormat::Text => println!("{}", path.display()),
                OutputFormat::Json => println!("{}", serde_json::json!({ "key": key, "path": path })),
            }
        }
        BlobAction::Verify { key } => {
            let cas = ContentAddressableStore::with_algorithm(store, config.blob.digest);
            let valid = cas.verify(&key).await?;
            match format {
                OutputFormat::Text if valid => println!("{} {} matches its content", "✓".green().bold(), key.yellow()),
                OutputFormat::Text => println!("{} {} does not match its content", "✗".red().bold(), key.yellow()),
                OutputFormat::Json => println!("{}", serde_json::json!({ "key": key, "valid": valid })),
            }
            if !valid {
                bail!("verification failed for {key}");
            }
        }
        BlobAction::Scavenge { older_than_secs } => {
            let older_than = older_than_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.blob.stale_temp_after());
            let removed = store.scavenge(older_than).await?;
            match format {
                OutputFormat::Text => println!("{} Scavenge: {} temp files removed.", "✓".green(), removed),
                OutputFormat::Json => println!("{}", serde_json::json!({ "removed": removed })),
            }
        }
        BlobAction::Clear { yes } => {
            if !yes {
                bail!("refusing to delete every blob under {} without --yes", store.root().display());
            }
            store.delete_all().await?;
            match format {
                OutputFormat::Text => println!("Cleared {}", store.root().display()),
                OutputFormat::Json => println!("{}", serde_json::json!({ "cleared": store.root() })),
            }
        }
    }
    Ok(())
}

async fn cmd_digest(args: DigestArgs, config: &StowConfig, format: OutputFormat) -> anyhow::Result<()> {
    let algorithm = args.algorithm.unwrap_or(config.blob.digest);
    let mut file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("opening {}", args.file.display()))?;
    let (digest, bytes) = algorithm.digest_reader(&mut file).await?;
    match format {
        OutputFormat::Text => println!("{}  {}", digest, args.file.display()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "algorithm": algorithm.to_string(),
                "digest": digest,
                "bytes": bytes,
                "file": args.file,
            })
        ),
    }
    Ok(())
}

fn cmd_config(config: &StowConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}
