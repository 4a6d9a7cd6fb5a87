use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    srouter::cli::run().await
}
