use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "host-cli")]
#[command(about = "Management CLI for the identity host", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:7070")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check host status and schema version
    Health,
    /// List applied and pending migrations (development hosts only)
    Migrations,
    /// Apply pending migrations (development hosts only)
    ApplyMigrations,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)).send().await?,
        Commands::Migrations => client.get(format!("{}/_migrations", base)).send().await?,
        Commands::ApplyMigrations => client.post(format!("{}/_migrations", base)).send().await?,
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        eprintln!("Error: endpoint not found (is the host running in development?)");
        return Ok(());
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        eprintln!("Error: host returned status {}", status);
    }
    Ok(())
}
