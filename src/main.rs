// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

mod controller;
mod database;
mod server;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

const POOL_SIZE: u32 = 10;

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
    /// Database file to use instead of the one in the user data directory.
    #[arg(long)]
    database: Option<PathBuf>,
}

/// This is where the database lives on-disk. On Linux it should be like:
/// `~/.local/share/recipe_server/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().expect("failed to get user home directory");
    let path = dirs.data_dir().join("recipe_server");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;

    let args = Args::parse();
    let database_path = match args.database {
        Some(path) => path,
        None => data_path()?.join("data.sqlite"),
    };
    let database_url = database_path
        .to_str()
        .ok_or("database path must be valid UTF-8")?;
    let pool = database::establish_pool(database_url, POOL_SIZE)?;

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    log::info!("listening on {}", args.bind);
    axum::serve(listener, server::create_router(pool)).await?;
    Ok(())
}
