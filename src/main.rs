use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tabguard_cli::cli::app::run().await
}
