use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use uuid::Uuid;

use payment_gateway::processor::{HttpProcessorClient, ProcessorClient};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the payment gateway and its processors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the gateway itself
    Gateway {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,

        /// Admin API key
        #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
        key: String,

        #[command(subcommand)]
        command: GatewayCommand,
    },
    /// Talk to a payment processor's admin surface
    Processor {
        #[arg(short, long, default_value = "http://localhost:8001")]
        url: String,

        /// Processor admin token
        #[arg(short, long, default_value = "123")]
        token: String,

        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        #[command(subcommand)]
        command: ProcessorCommand,
    },
}

#[derive(Subcommand)]
enum GatewayCommand {
    /// Per-processor totals
    Summary {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Clear the gateway ledger
    Purge,
    /// Gateway status
    Status,
    /// Last health observation per processor
    Processors,
    /// Payments given up on
    DeadLetters,
}

#[derive(Subcommand)]
enum ProcessorCommand {
    /// Service health as reported by the processor
    Health,
    /// Admin payments summary
    Summary {
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
    /// Look up one payment
    Payment { correlation_id: Uuid },
    /// Change the processor admin token
    SetToken { new_token: String },
    /// Set artificial processing delay
    SetDelay { delay_ms: u64 },
    /// Toggle failure mode
    SetFailure {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Delete every payment on the processor
    Purge,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Gateway { url, key, command } => run_gateway(&url, &key, command).await,
        Commands::Processor {
            url,
            token,
            timeout_ms,
            command,
        } => {
            let client = HttpProcessorClient::new(&url, Duration::from_millis(timeout_ms));
            client.use_token(&token);
            run_processor(&client, command).await
        }
    }
}

async fn run_gateway(
    url: &str,
    key: &str,
    command: GatewayCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);

    let request = match command {
        GatewayCommand::Summary { from, to } => {
            let mut query = Vec::new();
            if let Some(from) = from {
                query.push(("from", from));
            }
            if let Some(to) = to {
                query.push(("to", to));
            }
            client.get(format!("{}/payments-summary", url)).query(&query)
        }
        GatewayCommand::Purge => client.post(format!("{}/purge-payments", url)),
        GatewayCommand::Status => client.get(format!("{}/admin/status", url)).headers(headers),
        GatewayCommand::Processors => client.get(format!("{}/admin/processors", url)).headers(headers),
        GatewayCommand::DeadLetters => {
            client.get(format!("{}/admin/dead-letters", url)).headers(headers)
        }
    };

    print_response(request.send().await?).await
}

async fn run_processor(
    client: &HttpProcessorClient,
    command: ProcessorCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        ProcessorCommand::Health => print_json(&client.health().await?)?,
        ProcessorCommand::Summary { from, to } => print_json(&client.admin_summary(from, to).await?)?,
        ProcessorCommand::Payment { correlation_id } => {
            print_json(&client.get_payment(correlation_id).await?)?
        }
        ProcessorCommand::SetToken { new_token } => {
            client.set_admin_token(&new_token).await?;
            println!("Token updated");
        }
        ProcessorCommand::SetDelay { delay_ms } => {
            client.set_admin_delay(delay_ms).await?;
            println!("Delay set to {}ms", delay_ms);
        }
        ProcessorCommand::SetFailure { state } => {
            let failure = matches!(state, Toggle::On);
            client.set_admin_failure(failure).await?;
            println!("Failure mode {}", if failure { "on" } else { "off" });
        }
        ProcessorCommand::Purge => {
            client.purge_payments().await?;
            println!("Processor payments purged");
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
