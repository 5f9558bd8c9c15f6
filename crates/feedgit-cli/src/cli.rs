use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use feedgit_types::{FeedId, GitHash, ObjectKind, RepoId};

#[derive(Parser)]
#[command(
    name = "feedgit",
    about = "Git repositories stored on an append-only feed",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: ./feedgit.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the log and blob store
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Feed to publish as
    #[arg(long, global = true, value_parser = FeedId::from_hex)]
    pub feed: Option<FeedId>,

    /// Repository to operate on
    #[arg(long, global = true, value_parser = RepoId::from_hex)]
    pub repo: Option<RepoId>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a repository owned by the local feed
    Init,
    /// List refs
    Refs,
    /// Show the ref HEAD points at
    Head,
    /// List packs, newest first
    Packs,
    /// Print an object's content
    CatFile(CatFileArgs),
    /// Check whether an object exists
    Has(HasArgs),
    /// Add a file as an object and publish it
    HashObject(HashObjectArgs),
    /// Create, move, or delete a ref
    UpdateRef(UpdateRefArgs),
    /// Point HEAD at a ref
    SetHead(SetHeadArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct CatFileArgs {
    pub object: GitHash,
    /// Print the object type instead of its content
    #[arg(short = 't', conflicts_with = "size")]
    pub kind: bool,
    /// Print the object size instead of its content
    #[arg(short = 's')]
    pub size: bool,
}

#[derive(Args)]
pub struct HasArgs {
    pub object: GitHash,
}

#[derive(Args)]
pub struct HashObjectArgs {
    pub file: PathBuf,
    #[arg(short = 't', long = "type", value_enum, default_value = "blob")]
    pub kind: KindArg,
}

#[derive(Args)]
pub struct UpdateRefArgs {
    pub name: String,
    /// New value, or `-` to delete the ref
    pub new: String,
    /// Expected current value; defaults to whatever the ref holds now
    #[arg(long)]
    pub old: Option<String>,
}

#[derive(Args)]
pub struct SetHeadArgs {
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl From<KindArg> for ObjectKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Commit => Self::Commit,
            KindArg::Tree => Self::Tree,
            KindArg::Blob => Self::Blob,
            KindArg::Tag => Self::Tag,
        }
    }
}
