// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use pvc_transfer::constants::DEFAULT_SENTINEL_DEADLINE_SECS;
use pvc_transfer::context::ReconcileContext;
use pvc_transfer::endpoint::{Endpoint, ServiceEndpoint, ServiceEndpointOptions, ServiceType};
use pvc_transfer::labels::{COMPONENT_RSYNC_SERVER, K8S_COMPONENT, K8S_INSTANCE};
use pvc_transfer::store::{KubeStore, MemoryStore, ObjectStore};
use pvc_transfer::transfer::rsync::options::{
    Applier, BandwidthLimit, CommandOptions, DeleteDestination, ExtraOptions,
};
use pvc_transfer::transfer::{
    PodOptions, RsyncClient, RsyncClientOptions, RsyncServer, RsyncServerOptions, Transfer,
};
use pvc_transfer::transport::{
    Credentials, CredentialsType, NullTransport, ProxyOptions, SecretRef, StunnelClient,
    StunnelServer, Transport, TransportOptions, TransportType,
};
use pvc_transfer::volumes::VolumeSet;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// pvc-transfer - copy persistent volume claims between clusters over rsync and stunnel
#[derive(Parser, Debug)]
#[command(name = "pvc-transfer", version, about, long_about = None)]
struct Cli {
    /// Reconcile against an in-memory store and print the resulting objects as YAML
    #[arg(long, global = true)]
    dry_run: bool,

    /// Write the dry-run YAML to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the receiving side: service, server tunnel and rsync daemon
    Server(ServerArgs),

    /// Reconcile the sending side: client tunnel and one rsync client pod per claim
    Client(ClientArgs),
}

#[derive(Args, Debug)]
struct VolumeArgs {
    /// Namespace of the claims
    #[arg(short, long)]
    namespace: String,

    /// Claim to transfer; repeat for several claims
    #[arg(long = "pvc", required = true)]
    pvcs: Vec<String>,

    /// Extra label `key=value` for every owned object; repeatable
    #[arg(long = "label", value_parser = parse_key_value)]
    labels: Vec<(String, String)>,

    /// Mark every owned object with `key=value` after reconciling
    #[arg(long, value_parser = parse_key_value)]
    mark_for_cleanup: Option<(String, String)>,
}

#[derive(Args, Debug)]
struct TransportArgs {
    /// Tunnel type: stunnel or null
    #[arg(long, default_value = "stunnel")]
    transport: String,

    /// Tunnel credentials type: tls or psk
    #[arg(long, default_value = "tls")]
    credentials_type: String,

    /// Existing secret holding the tunnel credentials; generated when absent
    #[arg(long)]
    credentials_secret: Option<String>,

    /// Image carrying stunnel and rsync
    #[arg(long, env = "PVC_TRANSFER_IMAGE")]
    image: Option<String>,

    /// Password for rsync daemon authentication
    #[arg(long, env = "PVC_TRANSFER_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ServerArgs {
    #[command(flatten)]
    volumes: VolumeArgs,

    #[command(flatten)]
    transport: TransportArgs,

    /// Service type: ClusterIP, NodePort or LoadBalancer
    #[arg(long, default_value = "ClusterIP")]
    service_type: String,

    /// Port the server tunnel listens on inside the pod
    #[arg(long, default_value_t = 6443)]
    backend_port: i32,

    /// Port the service exposes
    #[arg(long, default_value_t = 443)]
    ingress_port: i32,

    /// Seconds the daemon waits for every client to report before exiting with a failure
    #[arg(long, default_value_t = DEFAULT_SENTINEL_DEADLINE_SECS)]
    sentinel_deadline_secs: u32,
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[command(flatten)]
    volumes: VolumeArgs,

    #[command(flatten)]
    transport: TransportArgs,

    /// Hostname of the server side
    #[arg(long)]
    hostname: String,

    /// Port of the server side
    #[arg(long, default_value_t = 443)]
    port: i32,

    /// HTTP CONNECT proxy, `host:port` or URL
    #[arg(long)]
    proxy_url: Option<String>,

    #[arg(long)]
    proxy_username: Option<String>,

    #[arg(long, env = "PVC_TRANSFER_PROXY_PASSWORD", hide_env_values = true)]
    proxy_password: Option<String>,

    /// Delete files on the destination that do not exist on the source
    #[arg(long)]
    delete: bool,

    /// Bandwidth limit in KiB/s
    #[arg(long)]
    bwlimit: Option<i64>,

    /// Additional rsync flag such as `--checksum`; repeatable
    #[arg(long = "rsync-opt", allow_hyphen_values = true)]
    rsync_opts: Vec<String>,

    /// Seconds the client tunnel waits for rsync before exiting anyway
    #[arg(long, default_value_t = DEFAULT_SENTINEL_DEADLINE_SECS)]
    sentinel_deadline_secs: u32,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("pvc-transfer")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Respects RUST_LOG (default info) and RUST_LOG_FORMAT=json|text
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    let cli = Cli::parse();
    debug!(dry_run = cli.dry_run, "Parsed command line");

    tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, objects written so far are left in place");
            Ok(())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.dry_run {
        let store = MemoryStore::new();
        execute(&store, &cli.command).await?;
        let manifests = render_manifests(&store)?;
        match &cli.output {
            Some(path) => {
                std::fs::write(path, manifests)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!("Wrote {} objects to {}", store.len(), path.display());
            }
            None => print!("{manifests}"),
        }
        return Ok(());
    }

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    execute(&KubeStore::new(client), &cli.command).await
}

/// Every stored object as a multi-document YAML stream.
fn render_manifests(store: &MemoryStore) -> Result<String> {
    let mut out = String::new();
    for object in store.objects() {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&object)?);
    }
    Ok(out)
}

fn claims(args: &VolumeArgs) -> Vec<PersistentVolumeClaim> {
    args.pvcs
        .iter()
        .map(|name| PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(args.namespace.clone()),
                ..Default::default()
            },
            ..Default::default()
        })
        .collect()
}

fn reconcile_context(args: &VolumeArgs, volumes: &VolumeSet) -> ReconcileContext {
    let mut labels: BTreeMap<String, String> = args.labels.iter().cloned().collect();
    labels.insert(
        K8S_INSTANCE.to_string(),
        volumes.identity().suffix().to_string(),
    );
    ReconcileContext::new(labels, Vec::new())
}

fn transport_options(args: &TransportArgs, namespace: &str) -> Result<TransportOptions> {
    let credentials_type: CredentialsType = args.credentials_type.parse()?;
    let mut options = TransportOptions {
        credentials: Credentials {
            credentials_type,
            secret_ref: args.credentials_secret.as_ref().map(|name| SecretRef {
                namespace: namespace.to_string(),
                name: name.clone(),
            }),
        },
        ..Default::default()
    };
    if let Some(image) = &args.image {
        options.image.clone_from(image);
    }
    Ok(options)
}

fn pod_options(args: &TransportArgs) -> PodOptions {
    PodOptions {
        image: args.image.clone(),
        ..Default::default()
    }
}

async fn execute<S: ObjectStore>(store: &S, command: &Commands) -> Result<()> {
    match command {
        Commands::Server(args) => execute_server(store, args).await,
        Commands::Client(args) => execute_client(store, args).await,
    }
}

async fn execute_server<S: ObjectStore>(store: &S, args: &ServerArgs) -> Result<()> {
    let volumes = VolumeSet::new(claims(&args.volumes))?;
    let identity = volumes.identity();
    let context = reconcile_context(&args.volumes, &volumes);
    let transport_type: TransportType = args.transport.transport.parse()?;

    let endpoint = ServiceEndpoint::reconcile(
        store,
        identity.namespace(),
        &context,
        ServiceEndpointOptions {
            name: identity.resource_name("server", "rsync-service"),
            service_type: args.service_type.parse::<ServiceType>()?,
            backend_port: args.backend_port,
            ingress_port: args.ingress_port,
            selector: context.labels_with(&[(K8S_COMPONENT, COMPONENT_RSYNC_SERVER)]),
        },
    )
    .await?;

    let options = RsyncServerOptions {
        password: args.transport.password.clone(),
        pod: pod_options(&args.transport),
        sentinel_deadline_secs: args.sentinel_deadline_secs,
        ..Default::default()
    };

    match transport_type {
        TransportType::Stunnel => {
            let transport = StunnelServer::reconcile(
                store,
                identity.clone(),
                &endpoint,
                &context,
                transport_options(&args.transport, identity.namespace())?,
            )
            .await?;
            let server =
                RsyncServer::reconcile(store, volumes, endpoint, transport, &context, options)
                    .await?;
            report_server(store, &server, args.volumes.mark_for_cleanup.as_ref()).await
        }
        TransportType::Null => {
            let transport = NullTransport::server(identity, &endpoint);
            let server =
                RsyncServer::reconcile(store, volumes, endpoint, transport, &context, options)
                    .await?;
            report_server(store, &server, args.volumes.mark_for_cleanup.as_ref()).await
        }
    }
}

async fn report_server<S, T, E>(
    store: &S,
    server: &RsyncServer<T, E>,
    mark: Option<&(String, String)>,
) -> Result<()>
where
    S: ObjectStore,
    T: Transport,
    E: Endpoint,
{
    let healthy = server.is_healthy(store).await?;
    let status = server.status(store).await?;
    info!(
        identity = %server.identity(),
        hostname = %server.endpoint().hostname(),
        port = server.endpoint().ingress_port(),
        healthy = healthy,
        status = ?status,
        "Rsync server reconciled"
    );

    if let Some((key, value)) = mark {
        server.mark_for_cleanup(store, key, value).await?;
        info!("Marked server objects for cleanup with {key}={value}");
    }
    Ok(())
}

fn command_options(args: &ClientArgs) -> CommandOptions {
    let delete = DeleteDestination(args.delete);
    let extras = ExtraOptions(args.rsync_opts.clone());
    let bwlimit = args.bwlimit.map(BandwidthLimit);

    let mut appliers: Vec<&dyn Applier> = vec![&delete, &extras];
    if let Some(limit) = &bwlimit {
        appliers.push(limit);
    }
    CommandOptions::with_defaults(&appliers)
}

async fn execute_client<S: ObjectStore>(store: &S, args: &ClientArgs) -> Result<()> {
    let volumes = VolumeSet::new(claims(&args.volumes))?;
    let identity = volumes.identity();
    let context = reconcile_context(&args.volumes, &volumes);
    let transport_type: TransportType = args.transport.transport.parse()?;

    let options = RsyncClientOptions {
        password: args.transport.password.clone(),
        command_options: command_options(args),
        pod: pod_options(&args.transport),
        sentinel_deadline_secs: args.sentinel_deadline_secs,
        ..Default::default()
    };

    match transport_type {
        TransportType::Stunnel => {
            let mut tunnel = transport_options(&args.transport, identity.namespace())?;
            tunnel.proxy = args.proxy_url.as_ref().map(|url| ProxyOptions {
                url: url.clone(),
                username: args.proxy_username.clone(),
                password: args.proxy_password.clone(),
            });
            let transport = StunnelClient::reconcile(
                store,
                identity,
                &args.hostname,
                args.port,
                &context,
                tunnel,
            )
            .await?;
            let client = RsyncClient::reconcile(store, volumes, transport, &context, options).await?;
            report_client(store, &client, args.volumes.mark_for_cleanup.as_ref()).await
        }
        TransportType::Null => {
            let transport = NullTransport::client(identity, &args.hostname, args.port);
            let client = RsyncClient::reconcile(store, volumes, transport, &context, options).await?;
            report_client(store, &client, args.volumes.mark_for_cleanup.as_ref()).await
        }
    }
}

async fn report_client<S, T>(
    store: &S,
    client: &RsyncClient<T>,
    mark: Option<&(String, String)>,
) -> Result<()>
where
    S: ObjectStore,
    T: Transport,
{
    for (claim, status) in client.status(store).await? {
        info!(claim = %claim, status = ?status, "Rsync client status");
    }
    let completed = client.is_completed(store).await?;
    info!(
        identity = %client.identity(),
        completed = completed,
        "Rsync client reconciled"
    );

    if let Some((key, value)) = mark {
        client.mark_for_cleanup(store, key, value).await?;
        info!("Marked client objects for cleanup with {key}={value}");
    }
    Ok(())
}
