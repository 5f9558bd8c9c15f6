use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;

use feedgit_crypto::git_hash;
use feedgit_log::JsonlLog;
use feedgit_refs::RefOp;
use feedgit_store::FsBlobStore;
use feedgit_sync::{create_repo, open_repo, ObjectSource, Repository, SyncConfig};
use feedgit_types::{FeedId, GitHash, ObjectKind};

use crate::cli::*;
use crate::config::{config_path, CliConfig};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::resolve(&cli)?;
    match &cli.command {
        Command::Init => cmd_init(&cli, config).await,
        Command::Config => cmd_config(&config),
        Command::Refs => cmd_refs(&open(&cli, &config).await?).await,
        Command::Head => cmd_head(&open(&cli, &config).await?).await,
        Command::Packs => cmd_packs(&open(&cli, &config).await?).await,
        Command::CatFile(args) => cmd_cat_file(&open(&cli, &config).await?, args).await,
        Command::Has(args) => cmd_has(&open(&cli, &config).await?, args).await,
        Command::HashObject(args) => cmd_hash_object(&open(&cli, &config).await?, args).await,
        Command::UpdateRef(args) => cmd_update_ref(&open(&cli, &config).await?, args).await,
        Command::SetHead(args) => cmd_set_head(&open(&cli, &config).await?, args).await,
    }
}

async fn backends(config: &CliConfig, feed: FeedId) -> anyhow::Result<(Arc<JsonlLog>, Arc<FsBlobStore>)> {
    let log = JsonlLog::open(config.log_path(), feed, config.sync.max_entry_size)
        .await
        .with_context(|| format!("opening log {}", config.log_path().display()))?;
    let store = FsBlobStore::open(config.blob_dir())
        .await
        .with_context(|| format!("opening blob store {}", config.blob_dir().display()))?;
    Ok((Arc::new(log), Arc::new(store)))
}

/// Open the repository named by `--repo`.
///
/// Without a configured feed the handle is read-only: it publishes as a
/// throwaway feed that owns nothing.
async fn open(cli: &Cli, config: &CliConfig) -> anyhow::Result<Repository> {
    let id = cli
        .repo
        .context("no repository given; pass --repo <id> (printed by `feedgit init`)")?;
    let feed = config.feed.unwrap_or_else(FeedId::ephemeral);
    let (log, store) = backends(config, feed).await?;
    // One-shot commands never need the live tail.
    let sync = SyncConfig {
        live: false,
        ..config.sync.clone()
    };
    Ok(open_repo(log, store, id, sync).await?)
}

async fn cmd_init(cli: &Cli, mut config: CliConfig) -> anyhow::Result<()> {
    let feed = match config.feed {
        Some(feed) => feed,
        None => {
            let feed = FeedId::ephemeral();
            config.feed = Some(feed);
            let path = config_path(cli);
            config.save(&path)?;
            println!("{} Generated feed {}, saved to {}", "✓".green(), feed.to_string().cyan(), path.display());
            feed
        }
    };
    let (log, store) = backends(&config, feed).await?;
    let repo = create_repo(log, store, config.sync.clone()).await?;
    repo.close();

    println!("{} Created repository in {}", "✓".green().bold(), config.data_dir.display());
    println!("  Repo:  {}", repo.id().to_string().yellow());
    println!("  Owner: {}", repo.owner().to_string().cyan());
    Ok(())
}

fn cmd_config(config: &CliConfig) -> anyhow::Result<()> {
    print!("{}", toml::to_string(config)?);
    Ok(())
}

async fn cmd_refs(repo: &Repository) -> anyhow::Result<()> {
    let refs = repo.refs().await?;
    if refs.is_empty() {
        println!("No refs.");
    }
    for (name, hash) in refs {
        println!("{} {}", hash.to_string().yellow(), name);
    }
    Ok(())
}

async fn cmd_head(repo: &Repository) -> anyhow::Result<()> {
    match repo.head().await? {
        Some(target) => println!("ref: {}", target.green()),
        None => println!("HEAD is unset."),
    }
    Ok(())
}

async fn cmd_packs(repo: &Repository) -> anyhow::Result<()> {
    let packs = repo.packs().await?;
    if packs.is_empty() {
        println!("No packs.");
    }
    for pack in packs {
        match pack.index {
            Some(index) => println!("{}  idx {}", pack.pack.to_string().yellow(), index),
            None => println!("{}  {}", pack.pack.to_string().yellow(), "(no index)".dimmed()),
        }
    }
    Ok(())
}

async fn cmd_cat_file(repo: &Repository, args: &CatFileArgs) -> anyhow::Result<()> {
    if args.kind || args.size {
        let desc = repo
            .object_descriptor(&args.object)
            .await?
            .with_context(|| format!("object {} not found", args.object))?;
        if args.kind {
            println!("{}", desc.kind);
        } else {
            println!("{}", desc.length);
        }
        return Ok(());
    }

    let content = repo.read_object(&args.object).await?;
    let mut out = std::io::stdout().lock();
    out.write_all(&content)?;
    out.flush()?;
    Ok(())
}

async fn cmd_has(repo: &Repository, args: &HasArgs) -> anyhow::Result<()> {
    if repo.has_object(&args.object).await? {
        println!("{} {}", args.object.to_string().yellow(), "present".green());
    } else {
        println!("{} {}", args.object.to_string().yellow(), "absent".red());
    }
    Ok(())
}

async fn cmd_hash_object(repo: &Repository, args: &HashObjectArgs) -> anyhow::Result<()> {
    let kind = ObjectKind::from(args.kind);
    let content = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let hash = git_hash(kind, &content);
    repo.transaction()
        .add_object(ObjectSource::from_bytes(kind, content))
        .commit()
        .await?;
    println!("{hash}");
    Ok(())
}

async fn cmd_update_ref(repo: &Repository, args: &UpdateRefArgs) -> anyhow::Result<()> {
    let new = parse_target(&args.new)?;
    let old = match &args.old {
        Some(old) => parse_target(old)?,
        None => repo
            .refs()
            .await?
            .into_iter()
            .find_map(|(name, hash)| (name == args.name).then_some(hash)),
    };
    repo.transaction()
        .update_ref(RefOp::new(args.name.clone(), old, new))
        .commit()
        .await?;

    match new {
        Some(hash) => println!("{} {} -> {}", "✓".green(), args.name.bold(), hash.to_string().yellow()),
        None => println!("{} Deleted {}", "✓".green(), args.name.bold()),
    }
    Ok(())
}

async fn cmd_set_head(repo: &Repository, args: &SetHeadArgs) -> anyhow::Result<()> {
    repo.transaction().set_head(args.name.clone()).commit().await?;
    println!("{} HEAD -> {}", "✓".green(), args.name.green());
    Ok(())
}

/// A hash, or `-` for "no ref".
fn parse_target(s: &str) -> anyhow::Result<Option<GitHash>> {
    if s == "-" {
        return Ok(None);
    }
    let hash = s
        .parse::<GitHash>()
        .with_context(|| format!("{s:?} is not a 40-character object id"))?;
    Ok(Some(hash))
}
