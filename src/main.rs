use browseragent_cli::cli::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await.map_err(anyhow::Error::from)
}
