//! TKR resolver - admission webhook resolving TKRs and OSImages for clusters

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};

use tkr_resolver::catalog::Catalog;
use tkr_resolver::crd::{OSImage, TanzuKubernetesRelease};
use tkr_resolver::recorder::Recorder;
use tkr_resolver::sync::spawn_catalog_sync;
use tkr_resolver::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use tkr_resolver::version::ChannelPolicy;
use tkr_resolver::webhook::{serve, ServerConfig, TlsFiles, WebhookState};
use tkr_resolver::DEFAULT_WEBHOOK_ADDR;

/// TKR resolver - picks a TanzuKubernetesRelease and OSImages for CAPI clusters
#[derive(Parser, Debug)]
#[command(name = "tkr-resolver", version, about, long_about = None)]
struct Cli {
    /// Print the TanzuKubernetesRelease and OSImage CRDs and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the mutating admission webhook
    ///
    /// Watches TKRs and OSImages into an in-memory catalog and resolves
    /// every Cluster admitted through `/mutate/clusters`.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address
    #[arg(long, env = "TKR_RESOLVER_LISTEN", default_value = DEFAULT_WEBHOOK_ADDR)]
    listen: SocketAddr,

    /// PEM serving certificate (plain HTTP when unset)
    #[arg(long, env = "TKR_RESOLVER_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key for the serving certificate
    #[arg(long, env = "TKR_RESOLVER_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Override a channel rank, e.g. `rc=20` (repeatable)
    #[arg(long = "channel-rank", value_parser = parse_channel_rank)]
    channel_ranks: Vec<(String, u32)>,

    /// Treat a channel as stable for implicit picks (repeatable)
    #[arg(long = "stable-channel")]
    stable_channels: Vec<String>,

    /// Install or update the TKR and OSImage CRDs before serving
    #[arg(long)]
    install_crds: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn parse_channel_rank(s: &str) -> Result<(String, u32), String> {
    let (name, rank) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=RANK, got '{s}'"))?;
    let rank = rank
        .trim()
        .parse()
        .map_err(|e| format!("invalid rank in '{s}': {e}"))?;
    Ok((name.trim().to_string(), rank))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let tkr = serde_yaml::to_string(&TanzuKubernetesRelease::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        let osimage = serde_yaml::to_string(&OSImage::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{tkr}---\n{osimage}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Serve(args)) => run_webhook(args).await,
        None => {
            anyhow::bail!("no command given, run with --help for usage");
        }
    }
}

/// Install the TKR and OSImage CRDs using server-side apply
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("tkr-resolver").force();

    for crd in [TanzuKubernetesRelease::crd(), OSImage::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }
    Ok(())
}

async fn run_webhook(args: ServeArgs) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig {
        format: args.log_format,
        filter: None,
    })?;

    let mut policy = ChannelPolicy::default();
    for (name, rank) in args.channel_ranks {
        policy = policy.with_rank(name, rank);
    }
    for name in args.stable_channels {
        policy = policy.with_stable(name);
    }
    tracing::info!(policy = ?policy, "Channel policy configured");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.install_crds {
        ensure_crds_installed(&client).await?;
    }

    let catalog = Arc::new(Catalog::new());
    let mut watchers = spawn_catalog_sync(client.clone(), Arc::clone(&catalog));
    tracing::info!("Waiting for the initial TKR and OSImage lists");
    if let Err(kind) = watchers.wait_listed().await {
        anyhow::bail!("{} watcher stopped before its initial list completed", kind);
    }
    tracing::info!(
        tkrs = catalog.tkr_count(),
        os_images = catalog.os_image_count(),
        "Catalog populated"
    );

    let recorder = Arc::new(Recorder::new(catalog, policy));
    let state = Arc::new(WebhookState::new(client, recorder));

    let tls = match (args.tls_cert, args.tls_key) {
        (Some(cert), Some(key)) => Some(TlsFiles { cert, key }),
        _ => None,
    };
    let config = ServerConfig {
        addr: args.listen,
        tls,
    };

    tokio::select! {
        result = serve(config, state) => result?,
        kind = watchers.wait_stopped() => {
            anyhow::bail!("{} watcher stopped, the catalog would go stale", kind);
        }
    }
    Ok(())
}
