//! asg-ingress-sync: sync a security group's inbound rules with the public
//! IPs of an autoscaling group
//!
//! Reads one trigger event (lifecycle hook notification or scheduled
//! payload) from a file or stdin, runs one reconciliation pass, and prints
//! the added/removed rule entries as JSON.

use anyhow::{Context, Result};
use asg_ingress_sync::aws::AwsContext;
use asg_ingress_sync::config::ReconcilerConfig;
use asg_ingress_sync::event::TriggerEvent;
use asg_ingress_sync::provider::AwsProvider;
use asg_ingress_sync::reconcile;
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "asg-ingress-sync")]
#[command(about = "Sync a security group's inbound rules with autoscaling group instance IPs")]
#[command(version)]
struct Args {
    /// Security group whose inbound rules are managed
    #[arg(long, env = "securityGroupID")]
    security_group_id: String,

    /// Autoscaling group to read when the event names none (scheduled mode)
    #[arg(long, env = "asgName")]
    asg_name: Option<String>,

    /// AWS region (falls back to the event's region, then the SDK chain)
    #[arg(long, env = "region")]
    region: Option<String>,

    /// Trigger event JSON file; reads stdin when omitted
    #[arg(long)]
    event: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    // Print main error message
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    // Print error chain (causes)
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let event = load_event(args.event.as_deref())?;

    let mut config = ReconcilerConfig::new(args.security_group_id);
    if let Some(asg_name) = args.asg_name {
        config = config.with_asg_name(asg_name);
    }
    if let Some(region) = args.region {
        config = config.with_region(region);
    }

    let region = config.region.as_deref().or_else(|| event.region());
    let aws = AwsContext::new(region).await;
    info!(region = ?aws.region(), sg_id = %config.security_group_id, "Loaded AWS configuration");
    let provider = AwsProvider::from_context(&aws);

    let response = reconcile::reconcile(&provider, &config, &event).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialize response")?
    );

    Ok(())
}

/// Load the trigger event from the given file, or stdin when none is given.
fn load_event(path: Option<&Path>) -> Result<TriggerEvent> {
    let payload = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read event from stdin")?;
            buffer
        }
    };

    TriggerEvent::from_json(&payload).context("Failed to parse trigger event")
}
