//! usb-node-labeller - keeps a node's USB labels in sync with its host

mod cli;

use anyhow::{Context, Result};
use cli::{Mode, Options};
use labeller_core::identity::NODE_NAME_ENV;
use labeller_core::prelude::*;
use labeller_core::{resolve_identity, SysfsUsbProvider};
use labeller_kube::{node_notifications, verify_node_watch, KubeNodeStore};
use std::io::Write;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli::build().get_matches();
    let options = Options::from_matches(&matches);
    init_tracing(options.log_json);

    let result = match options.mode {
        Mode::DryRun { json } => dry_run(&options, json, &mut std::io::stdout().lock()),
        Mode::Service => serve(&options).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "labeller failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout belongs to dry-run output
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Write the labels this host would carry, touching nothing
fn dry_run(options: &Options, json: bool, out: &mut impl Write) -> Result<()> {
    let provider = SysfsUsbProvider::new(&options.sysfs_root);
    let snapshot = provider
        .discover()
        .with_context(|| format!("cannot enumerate {}", options.sysfs_root.display()))?;
    let labels = LabelCodec::new(options.prefix.clone()).encode_labels(&snapshot);

    if json {
        serde_json::to_writer_pretty(&mut *out, &labels)?;
        writeln!(out)?;
    } else {
        for (key, value) in &labels {
            writeln!(out, "{key} = {value}")?;
        }
    }
    Ok(())
}

/// Run the reconciliation service until SIGINT or SIGTERM
async fn serve(options: &Options) -> Result<()> {
    let node_name = std::env::var(NODE_NAME_ENV).ok();
    let identity = resolve_identity(node_name.as_deref(), &options.hostname_file)
        .context("cannot determine node name")?;
    let config = options.labeller_config(identity);
    config.validate().context("invalid configuration")?;

    let client = kube::Client::try_default()
        .await
        .context("cannot build cluster client")?;
    let server = client
        .apiserver_version()
        .await
        .context("cannot reach cluster API")?;

    let provider = Arc::new(SysfsUsbProvider::new(&options.sysfs_root));
    let store = Arc::new(KubeNodeStore::new(client.clone()));
    let reconciler = Reconciler::new(&config, store, provider)
        .context("initial capability discovery failed")?;

    info!(
        node = %config.identity,
        prefix = %config.prefix,
        api_server = %server.git_version,
        poll_interval_secs = config.poll_interval.as_secs(),
        tick_mode = ?config.tick_mode,
        snapshot_policy = ?config.snapshot_policy,
        version = labeller_core::VERSION,
        "starting labeller"
    );

    verify_node_watch(client.clone(), &config.identity)
        .await
        .context("cannot watch node")?;
    let notifications = node_notifications(client, &config.identity);
    let scheduler = TriggerScheduler::new(&config, Arc::new(reconciler));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let stats = scheduler.run(notifications, shutdown_rx).await;
    info!(
        cycles = stats.cycles,
        applied = stats.applied,
        unchanged = stats.unchanged,
        skipped = stats.skipped,
        failed = stats.failed,
        "labeller stopped"
    );
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                () = ctrl_c() => {},
                _ = term.recv() => {},
            }
        }
        Err(e) => {
            error!(error = %e, "cannot install SIGTERM handler");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;

    fn usb_tree(devices: &[(&str, &str, &str)]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for (name, vendor, product) in devices {
            let dir = root.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("idVendor"), format!("{vendor}\n")).unwrap();
            fs::write(dir.join("idProduct"), format!("{product}\n")).unwrap();
        }
        // interface entry without ids
        fs::create_dir_all(root.path().join("1-1:1.0")).unwrap();
        root
    }

    fn options(sysfs_root: &Path, json: bool) -> Options {
        let root = sysfs_root.to_string_lossy().into_owned();
        let mut argv = vec!["usb-node-labeller", "--dry-run", "--sysfs-root", root.as_str()];
        if json {
            argv.push("--json");
        }
        Options::from_matches(&cli::build().try_get_matches_from(argv).unwrap())
    }

    fn render(options: &Options, json: bool) -> String {
        let mut out = Vec::new();
        dry_run(options, json, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn dry_run_prints_sorted_lines() {
        let root = usb_tree(&[("2-1", "1D6B", "0003"), ("1-1", "046d", "082d")]);

        assert_eq!(
            render(&options(root.path(), false), false),
            "g4v.dev/usb.0003.1d6b = true\ng4v.dev/usb.082d.046d = true\n"
        );
    }

    #[test]
    fn dry_run_prints_json_object() {
        let root = usb_tree(&[("1-1", "046d", "082d")]);

        let rendered = render(&options(root.path(), true), true);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, serde_json::json!({ "g4v.dev/usb.082d.046d": "true" }));
    }

    #[test]
    fn dry_run_of_empty_host_prints_nothing() {
        let root = usb_tree(&[]);
        assert_eq!(render(&options(root.path(), false), false), "");
    }

    #[test]
    fn dry_run_fails_on_missing_root() {
        let root = usb_tree(&[]);
        let missing = root.path().join("absent");

        let mut out = Vec::new();
        assert!(dry_run(&options(&missing, false), false, &mut out).is_err());
        assert!(out.is_empty());
    }
}
