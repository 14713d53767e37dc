use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde_json::Value;

use cluster_gateway::cluster::ClusterRequestBody;

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Management CLI for the cluster gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_URL", default_value = "http://localhost:4466")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configured clusters
    Config,
    /// Add or replace a single cluster
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        server: String,
        /// Skip TLS verification of the cluster's server
        #[arg(long)]
        insecure: bool,
        /// PEM file with the cluster's certificate authority
        #[arg(long)]
        ca_file: Option<PathBuf>,
        #[arg(long, env = "GATEWAY_CLUSTER_TOKEN")]
        token: Option<String>,
    },
    /// Add every context of a kubeconfig file
    Import { kubeconfig: PathBuf },
    /// Remove a dynamically-added cluster
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Config => client.get(format!("{}/config", base)).send().await?,
        Commands::Add {
            name,
            server,
            insecure,
            ca_file,
            token,
        } => {
            let certificate_authority_data = match ca_file {
                Some(path) => Some(STANDARD.encode(std::fs::read(path)?)),
                None => None,
            };
            let body = ClusterRequestBody {
                name: Some(name),
                server: Some(server),
                certificate_authority_data,
                insecure_skip_tls_verify: insecure,
                token,
                ..Default::default()
            };
            client.post(format!("{}/cluster", base)).json(&body).send().await?
        }
        Commands::Import { kubeconfig } => {
            let body = ClusterRequestBody {
                encoded_config: Some(STANDARD.encode(std::fs::read(kubeconfig)?)),
                ..Default::default()
            };
            client.post(format!("{}/cluster", base)).json(&body).send().await?
        }
        Commands::Remove { name } => {
            let mut url = reqwest::Url::parse(base)?;
            url.path_segments_mut()
                .map_err(|_| "gateway URL cannot carry a path")?
                .pop_if_empty()
                .extend(["cluster", name.as_str()]);
            client.delete(url).send().await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or(text);

    if status.is_success() {
        println!("{}", pretty);
        Ok(())
    } else {
        eprintln!("Error: gateway returned status {}", status);
        eprintln!("{}", pretty);
        Err(format!("request failed with {}", status).into())
    }
}
