use anyhow::{bail, Context};
use tokio::io::AsyncWriteExt;

use depot_protocol::{header, Message, ResultCode};
use depot_server::{FileServer, ServerConfig};

use crate::cli::{Cli, Command, DeleteArgs, GetArgs, PutArgs, SelectorArgs, ServeArgs};
use crate::client::DepotClient;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Put(args) => put(args).await,
        Command::Get(args) => get(args).await,
        Command::Delete(args) => delete(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = match args.config {
        Some(path) => ServerConfig::from_toml_file(path)?,
        None => ServerConfig::default(),
    };
    let mut server = FileServer::new(config).await?;
    server.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;
    tracing::info!("interrupt received");
    server.stop().await?;
    Ok(())
}

async fn put(args: PutArgs) -> anyhow::Result<()> {
    let name = match args.name {
        Some(name) => name,
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("cannot derive a storage name from the path; pass --name")?,
    };
    let body = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("cannot read {}", args.file.display()))?;

    let mut client = DepotClient::connect(args.server).await?;
    let response = client.send(&Message::put_request(name, body)).await?;
    expect_success(&response)?;
    println!(
        "stored {} (id {})",
        response.file_name().unwrap_or("?"),
        response.id_header().unwrap_or("?"),
    );
    Ok(())
}

async fn get(args: GetArgs) -> anyhow::Result<()> {
    let request = match selector(&args.selector)? {
        Selector::Name(name) => Message::get_request(name),
        Selector::Id(id) => Message::get_request_by_id(id),
    };
    let mut client = DepotClient::connect(args.server).await?;
    let response = client.send(&request).await?;
    expect_success(&response)?;

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, &response.body)
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            println!(
                "fetched {} ({} bytes) to {}",
                response.file_name().unwrap_or("?"),
                response.body.len(),
                path.display(),
            );
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&response.body).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn delete(args: DeleteArgs) -> anyhow::Result<()> {
    let request = match selector(&args.selector)? {
        Selector::Name(name) => Message::delete_request(name),
        Selector::Id(id) => Message::delete_request_by_id(id),
    };
    let mut client = DepotClient::connect(args.server).await?;
    let response = client.send(&request).await?;
    expect_success(&response)?;
    println!(
        "deleted {} (id {})",
        response.file_name().unwrap_or("?"),
        response.id_header().unwrap_or("?"),
    );
    Ok(())
}

enum Selector {
    Name(String),
    Id(u64),
}

fn selector(args: &SelectorArgs) -> anyhow::Result<Selector> {
    match (&args.name, args.id) {
        (Some(name), _) => Ok(Selector::Name(name.clone())),
        (None, Some(id)) => Ok(Selector::Id(id)),
        (None, None) => bail!("either --name or --id is required"),
    }
}

fn expect_success(response: &Message) -> anyhow::Result<()> {
    match response.result_code() {
        Some(ResultCode::Success) => Ok(()),
        code => {
            let reason = response
                .header(header::MESSAGE)
                .unwrap_or("no reason given");
            bail!(
                "server returned {}: {reason}",
                code.map(|c| c.code()).unwrap_or(response.code)
            )
        }
    }
}
