use anyhow::Result;
use clap::{Parser, Subcommand};
use ezinstall::config::{Cli as ServerCli, Config};
use ezinstall::region::{self, classify, RegionResolver};
use ezinstall::storage;

#[derive(Parser)]
#[command(name = "ezinstall-admin")]
#[command(about = "ezinstall operator CLI", long_about = None)]
struct Cli {
    #[command(flatten)]
    server: ServerCli,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve IPs against the configured region database
    Lookup {
        /// IPs or comma-separated forwarding chains
        #[arg(required = true)]
        ips: Vec<String>,
    },
    /// Show the most recent open event for an app and IP
    Latest {
        /// Application name
        app_name: String,
        /// Client IP as stored
        ip: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load(cli.server)?;

    match cli.command {
        Commands::Lookup { ips } => {
            let resolver = RegionResolver::new(region::open_index(&config.region)?);
            println!(
                "{:<32} {:<8} {:<8} {}",
                "IP", "China", "Inland", "Region"
            );
            println!("{}", "-".repeat(80));
            for ip in ips {
                let region = resolver.resolve(&ip);
                let classification = classify(&region);
                let rendered = if region.is_empty() {
                    "(unresolved)".to_string()
                } else {
                    format!(
                        "{}|{}|{}|{}|{}",
                        region.country, region.district, region.province, region.city, region.isp
                    )
                };
                println!(
                    "{:<32} {:<8} {:<8} {}",
                    ip, classification.is_country_china, classification.is_china_inland, rendered
                );
            }
        }
        Commands::Latest { app_name, ip } => {
            let storage = storage::connect(&config.store).await?;
            match storage.latest(&app_name, &ip).await? {
                Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
                None => println!("No open event found for app '{}' and ip '{}'", app_name, ip),
            }
        }
    }

    Ok(())
}
