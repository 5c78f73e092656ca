//! Lists the generation models available to the configured API key.
//!
//! Usage: `GEMINI_API_KEY=... cargo run --bin check_models`

use tycoon::config::Config;
use tycoon::services::GeminiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    let client = GeminiClient::new(&config.generation);
    if !client.has_credentials() {
        anyhow::bail!("GEMINI_API_KEY is not set");
    }

    let models = client.list_models().await?;
    println!("{} models available:", models.len());
    for model in &models {
        let marker = if model.short_name() == config.generation.model {
            "*"
        } else {
            " "
        };
        println!(
            "{} {} [{}]",
            marker,
            model.short_name(),
            model.supported_generation_methods.join(", ")
        );
    }

    Ok(())
}
