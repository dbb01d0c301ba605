use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wforce_domain::config::{Config, ConfigSeverity};
use wforce_gateway::cli::{Cli, Command, ConfigCommand};
use wforce_gateway::control;
use wforce_gateway::metrics::Metrics;
use wforce_gateway::state::{AppState, Readiness, ServerCounters};
use wforce_gateway::worker::WorkerPool;
use wforce_lists::{HttpKvPersist, ListsRegistry};
use wforce_policy::PolicyDispatcher;
use wforce_replication::ReplicationTransport;
use wforce_stats::StatsRegistry;
use wforce_webhooks::WebhookRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _path) = wforce_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, path) = wforce_gateway::cli::load_config()?;
            let passed = wforce_gateway::cli::doctor::run(&config, &path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, path) = wforce_gateway::cli::load_config()?;
            if !wforce_gateway::cli::config::validate(&config, &path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = wforce_gateway::cli::load_config()?;
            wforce_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("wforced {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wforce_gateway=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("wforced starting");

    // ── Config validation ──────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Sliding-window stats engine (C1) ────────────────────────────
    let stats = Arc::new(StatsRegistry::new(&config.stats));
    stats.spawn_expire_loops();
    tracing::info!(dbs = stats.names().len(), "stats registry ready");

    // ── Deny/allow list store (C2) ──────────────────────────────────
    let lists = Arc::new(ListsRegistry::new(&config.lists));
    lists.spawn_expire_loops();

    for (store, cfg) in [
        (&lists.denylist, &config.lists.denylist),
        (&lists.allowlist, &config.lists.allowlist),
    ] {
        if let Some(p) = &cfg.persist {
            let backend = Arc::new(HttpKvPersist::new(&p.host, p.port));
            store.make_persistent(backend, p.persist_replicated);
            // Persistent store unavailable at startup is fatal
            //: a fresh instance with no state is unsafe
            // to serve traffic from.
            let loaded = store
                .load_persist_entries()
                .await
                .context("loading persisted list entries")?;
            tracing::info!(loaded, host = %p.host, port = p.port, "list store warmed from persistence");
        }
    }
    tracing::info!("list stores ready");

    // ── Webhook runner (C5) ──────────────────────────────────────────
    let webhooks = WebhookRunner::new(&config.webhooks);
    lists.denylist.set_event_sink(webhooks.clone());
    lists.allowlist.set_event_sink(webhooks.clone());
    tracing::info!(hooks = config.webhooks.hooks.len(), "webhook runner ready");

    // ── Policy dispatch (C4). The policy language itself is an
    // external collaborator; absent a script
    // path the pool runs the allow-everything NullPolicy. ───────────
    if config.policy.script_path.is_some() {
        tracing::warn!(
            "policy.script_path is set but embedding an external policy \
             language is out of scope here; serving NullPolicy instead"
        );
    }
    let policy = Arc::new(PolicyDispatcher::null(config.policy.num_instances));
    tracing::info!(instances = policy.len(), "policy dispatch pool ready");

    // ── Replication transport (C3) ──────────────────────────────────
    let replication = if config.replication.enabled {
        let mut local_addrs = Vec::new();
        for addr in [&config.replication.listen_datagram, &config.replication.listen_stream]
            .into_iter()
            .flatten()
        {
            if let Ok(a) = addr.parse::<SocketAddr>() {
                local_addrs.push(a);
            }
        }

        let transport = ReplicationTransport::new(&config.replication, stats.clone(), lists.clone(), &local_addrs);
        stats.enable_replication_all(fan_out_channel(transport.clone()));
        lists.denylist.enable_replication(fan_out_channel(transport.clone()));
        lists.allowlist.enable_replication(fan_out_channel(transport.clone()));

        let (recv_tx, recv_rx) = tokio::sync::mpsc::channel(config.replication.recv_queue_size);
        if let Some(addr) = &config.replication.listen_datagram {
            let addr: SocketAddr = addr.parse().context("invalid replication.listen_datagram")?;
            let t = transport.clone();
            let tx = recv_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = t.run_datagram_listener(addr, tx).await {
                    tracing::error!(error = %e, "replication datagram listener exited");
                }
            });
        }
        if let Some(addr) = &config.replication.listen_stream {
            let addr: SocketAddr = addr.parse().context("invalid replication.listen_stream")?;
            let t = transport.clone();
            let tx = recv_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = t.run_stream_listener(addr, tx).await {
                    tracing::error!(error = %e, "replication stream listener exited");
                }
            });
        }
        transport
            .clone()
            .spawn_receive_workers(recv_rx, config.replication.num_sibling_threads);

        tracing::info!(siblings = transport.siblings.len(), "replication transport ready");
        Some(transport)
    } else {
        tracing::info!("replication disabled");
        None
    };

    // ── Worker pool + metrics (C6/C7) ────────────────────────────────
    let workers = WorkerPool::new(config.server.num_workers, config.server.worker_queue_size);
    let metrics = Arc::new(Metrics::new());

    let state = AppState {
        config: config.clone(),
        stats,
        lists,
        policy: policy.clone(),
        webhooks,
        replication: replication.clone(),
        workers,
        metrics,
        counters: Arc::new(ServerCounters::default()),
        readiness: Arc::new(Readiness::default()),
        started_at: Instant::now(),
    };
    // No startup sync-host configured in this deployment's config
    // surface, so the instance is ready immediately; see
    // DESIGN.md for this Open Question's resolution.
    state.readiness.mark_ready();

    // ── Control channel (C7) ─────────────────────────────────────────
    if config.admin.enabled {
        let admin_cfg = config.admin.clone();
        let policy = policy.clone();
        tokio::spawn(async move {
            if let Err(e) = control::run(admin_cfg, policy).await {
                tracing::error!(error = %e, "control channel exited");
            }
        });
    }

    // ── HTTP listener ─────────────────────────────────────────────────
    let app = wforce_gateway::api::router(state.clone()).with_state(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(%addr, "wforced listening");
    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Adapts [`ReplicationTransport::fan_out`] to the `UnboundedSender`
/// shape that `StatsRegistry`/`ListStore` expect for their replication
/// hooks: a lightweight relay task bridges the channel so each
/// subsystem stays decoupled from the transport's own API.
fn fan_out_channel(
    transport: Arc<ReplicationTransport>,
) -> tokio::sync::mpsc::UnboundedSender<wforce_domain::ReplicationMessage> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            transport.fan_out(&msg);
        }
    });
    tx
}
