use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "depot",
    about = "depot: a networked blob store over a framed binary protocol",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the depot server
    Serve(ServeArgs),
    /// Store a local file on a server
    Put(PutArgs),
    /// Fetch a stored file
    Get(GetArgs),
    /// Delete a stored file
    Delete(DeleteArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Path to a TOML config file; defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct PutArgs {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5995")]
    pub server: SocketAddr,

    /// Local file to upload
    pub file: PathBuf,

    /// Name to store under; defaults to the local file name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5995")]
    pub server: SocketAddr,

    #[command(flatten)]
    pub selector: SelectorArgs,

    /// Write the content here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:5995")]
    pub server: SocketAddr,

    #[command(flatten)]
    pub selector: SelectorArgs,
}

/// Addresses a stored file by name or by index id.
#[derive(Args)]
pub struct SelectorArgs {
    /// Stored file name
    #[arg(long, conflicts_with = "id")]
    pub name: Option<String>,

    /// Index id
    #[arg(long)]
    pub id: Option<u64>,
}
