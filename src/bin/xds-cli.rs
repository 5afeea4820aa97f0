use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use xds_control_plane::config::loader::load_snapshot_document;
use xds_control_plane::discovery::{ClientMessage, DiscoveryRequest, ServerMessage};

#[derive(Debug, Parser)]
#[command(name = "xds-cli")]
#[command(about = "Management CLI for the xDS control plane", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://localhost:18001")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check control plane status
    Status,
    /// List node groups and their current versions
    Snapshots,
    /// Show the current snapshot of a node group
    Snapshot { node_group: String },
    /// Publish a TOML or JSON snapshot document
    Publish {
        file: PathBuf,
        /// Overrides the node group named in the document.
        #[arg(short, long)]
        node_group: Option<String>,
    },
    /// Remove the snapshot of a node group
    Clear { node_group: String },
    /// List connected proxies and their subscriptions
    Connections,
    /// Subscribe like a proxy and print every response, ACKing each one
    Watch {
        node_group: String,
        resource_type: String,
        /// Discovery endpoint.
        #[arg(long, default_value = "ws://localhost:18000/v3/discovery")]
        endpoint: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Snapshots => {
            let res = client.get(format!("{}/admin/snapshots", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Snapshot { node_group } => {
            let res = client.get(format!("{}/admin/snapshots/{}", cli.url, node_group))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Publish { file, node_group } => {
            let mut document = load_snapshot_document(&file)?;
            let node_group = node_group
                .or_else(|| document.node_group.clone())
                .unwrap_or_else(|| "default".to_string());
            document.node_group = Some(node_group.clone());
            let res = client.put(format!("{}/admin/snapshots/{}", cli.url, node_group))
                .headers(headers)
                .json(&document)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Clear { node_group } => {
            let res = client.delete(format!("{}/admin/snapshots/{}", cli.url, node_group))
                .headers(headers)
                .send()
                .await?;
            if res.status().is_success() {
                println!("Cleared {}", node_group);
            } else {
                print_response(res).await?;
            }
        }
        Commands::Connections => {
            let res = client.get(format!("{}/admin/connections", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Watch { node_group, resource_type, endpoint } => {
            watch(&endpoint, node_group, resource_type).await?;
        }
    }

    Ok(())
}

async fn watch(endpoint: &str, node_group: String, type_url: String) -> Result<(), Box<dyn std::error::Error>> {
    let (socket, _) = tokio_tungstenite::connect_async(endpoint).await?;
    let (mut sink, mut source) = socket.split();

    let mut request = DiscoveryRequest {
        node_group,
        type_url,
        ..DiscoveryRequest::default()
    };
    let frame = serde_json::to_string(&ClientMessage::Discovery(request.clone()))?;
    sink.send(Message::text(frame)).await?;

    while let Some(frame) = source.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ServerMessage>(text.as_str())? {
            ServerMessage::Discovery(response) => {
                println!("{}", serde_json::to_string_pretty(&response)?);
                request.version_info = response.version_info;
                request.response_nonce = response.nonce;
                let ack = serde_json::to_string(&ClientMessage::Discovery(request.clone()))?;
                sink.send(Message::text(ack)).await?;
            }
            ServerMessage::Delta(response) => {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
            ServerMessage::Rejected(rejection) => {
                eprintln!("Error: stream rejected: {}", rejection.reason);
                break;
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_admin_api() {
        let cli = Cli::try_parse_from(["xds-cli", "status"]).unwrap();
        assert_eq!(cli.url, "http://localhost:18001");
        assert_eq!(cli.key, "CHANGE_ME_IN_PRODUCTION");
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn publish_takes_file_and_optional_group() {
        let cli = Cli::try_parse_from([
            "xds-cli", "--url", "http://cp:9000", "-k", "secret", "publish", "snap.toml", "-n", "edge",
        ])
        .unwrap();
        assert_eq!(cli.url, "http://cp:9000");
        assert_eq!(cli.key, "secret");
        match cli.command {
            Commands::Publish { file, node_group } => {
                assert_eq!(file, PathBuf::from("snap.toml"));
                assert_eq!(node_group.as_deref(), Some("edge"));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["xds-cli", "publish", "snap.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Publish { node_group: None, .. }));
    }

    #[test]
    fn group_commands_require_a_group() {
        for command in ["snapshot", "clear"] {
            assert!(Cli::try_parse_from(["xds-cli", command]).is_err());
            assert!(Cli::try_parse_from(["xds-cli", command, "edge"]).is_ok());
        }
        assert!(matches!(
            Cli::try_parse_from(["xds-cli", "snapshots"]).unwrap().command,
            Commands::Snapshots
        ));
        assert!(matches!(
            Cli::try_parse_from(["xds-cli", "connections"]).unwrap().command,
            Commands::Connections
        ));
        assert!(Cli::try_parse_from(["xds-cli", "frobnicate"]).is_err());
    }

    #[test]
    fn watch_defaults_to_local_discovery_endpoint() {
        let cli = Cli::try_parse_from(["xds-cli", "watch", "edge", "listener"]).unwrap();
        match cli.command {
            Commands::Watch { node_group, resource_type, endpoint } => {
                assert_eq!(node_group, "edge");
                assert_eq!(resource_type, "listener");
                assert_eq!(endpoint, "ws://localhost:18000/v3/discovery");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
