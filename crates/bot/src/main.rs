#[tokio::main]
async fn main() -> anyhow::Result<()> {
    syndicate_observability::init();

    syndicate_bot::run(syndicate_bot::BotConfig::from_env()).await
}
