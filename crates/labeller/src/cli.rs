//! Command line surface

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use labeller_core::config::DEFAULT_POLL_INTERVAL;
use labeller_core::discovery::DEFAULT_SYSFS_ROOT;
use labeller_core::identity::DEFAULT_HOSTNAME_FILE;
use labeller_core::{
    AdmittedKinds, LabelPrefix, LabellerConfig, NodeIdentity, SnapshotPolicy, TickMode,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What the process does after parsing its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Print the labels this host would get and exit
    DryRun { json: bool },
    /// Keep the node's labels converged until shut down
    Service,
}

/// Parsed command line
#[derive(Debug, Clone)]
pub(crate) struct Options {
    pub(crate) mode: Mode,
    pub(crate) prefix: LabelPrefix,
    pub(crate) poll_interval: Duration,
    pub(crate) tick_mode: TickMode,
    pub(crate) snapshot_policy: SnapshotPolicy,
    pub(crate) watch_updates: bool,
    pub(crate) hostname_file: PathBuf,
    pub(crate) sysfs_root: PathBuf,
    pub(crate) log_json: bool,
}

pub(crate) fn build() -> Command {
    Command::new("usb-node-labeller")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Labels this cluster node with the USB devices attached to its host")
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Print the labels this host would get and exit"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .requires("dry-run")
                .help("Print dry-run labels as a JSON object"),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .default_value(labeller_core::codec::DEFAULT_PREFIX)
                .value_parser(LabelPrefix::from_str)
                .help("Reserved label namespace, e.g. g4v.dev/"),
        )
        .arg(
            Arg::new("poll-interval")
                .long("poll-interval")
                .default_value("60")
                .value_parser(value_parser!(u64).range(1..))
                .help("Seconds between timer-triggered cycles"),
        )
        .arg(
            Arg::new("tick-mode")
                .long("tick-mode")
                .default_value("blocking")
                .value_parser(TickMode::from_str)
                .help("blocking: wait for each timer cycle; detached: enqueue and keep ticking"),
        )
        .arg(
            Arg::new("snapshot-policy")
                .long("snapshot-policy")
                .default_value("startup")
                .value_parser(SnapshotPolicy::from_str)
                .help("startup: discover devices once; per-cycle: rediscover every cycle"),
        )
        .arg(
            Arg::new("watch-updates")
                .long("watch-updates")
                .action(ArgAction::SetTrue)
                .help("Also reconcile when the node object is updated"),
        )
        .arg(
            Arg::new("hostname-file")
                .long("hostname-file")
                .default_value(DEFAULT_HOSTNAME_FILE)
                .value_parser(value_parser!(PathBuf))
                .help("Host name file read when NODE_NAME is unset"),
        )
        .arg(
            Arg::new("sysfs-root")
                .long("sysfs-root")
                .default_value(DEFAULT_SYSFS_ROOT)
                .value_parser(value_parser!(PathBuf))
                .help("USB device directory to scan"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
}

impl Options {
    pub(crate) fn from_matches(matches: &ArgMatches) -> Self {
        let mode = if matches.get_flag("dry-run") {
            Mode::DryRun {
                json: matches.get_flag("json"),
            }
        } else {
            Mode::Service
        };

        Self {
            mode,
            prefix: matches.get_one::<LabelPrefix>("prefix").cloned().unwrap_or_default(),
            poll_interval: matches
                .get_one::<u64>("poll-interval")
                .map_or(DEFAULT_POLL_INTERVAL, |secs| Duration::from_secs(*secs)),
            tick_mode: matches.get_one::<TickMode>("tick-mode").copied().unwrap_or_default(),
            snapshot_policy: matches
                .get_one::<SnapshotPolicy>("snapshot-policy")
                .copied()
                .unwrap_or_default(),
            watch_updates: matches.get_flag("watch-updates"),
            hostname_file: matches
                .get_one::<PathBuf>("hostname-file")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HOSTNAME_FILE)),
            sysfs_root: matches
                .get_one::<PathBuf>("sysfs-root")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSFS_ROOT)),
            log_json: matches.get_flag("log-json"),
        }
    }

    /// Engine configuration for a resolved node
    pub(crate) fn labeller_config(&self, identity: NodeIdentity) -> LabellerConfig {
        let kinds = if self.watch_updates {
            AdmittedKinds::CREATE_AND_UPDATE
        } else {
            AdmittedKinds::CREATE_ONLY
        };

        LabellerConfig::new(identity)
            .with_prefix(self.prefix.clone())
            .with_poll_interval(self.poll_interval)
            .with_tick_mode(self.tick_mode)
            .with_snapshot_policy(self.snapshot_policy)
            .with_admitted_kinds(kinds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Result<Options, clap::Error> {
        let argv = std::iter::once("usb-node-labeller").chain(args.iter().copied());
        build().try_get_matches_from(argv).map(|m| Options::from_matches(&m))
    }

    #[test]
    fn defaults() {
        let options = parse(&[]).unwrap();

        assert_eq!(options.mode, Mode::Service);
        assert_eq!(options.prefix.as_str(), "g4v.dev/");
        assert_eq!(options.poll_interval, Duration::from_secs(60));
        assert_eq!(options.tick_mode, TickMode::Blocking);
        assert_eq!(options.snapshot_policy, SnapshotPolicy::Startup);
        assert_eq!(options.hostname_file, PathBuf::from("/labeller/hostname"));
        assert_eq!(options.sysfs_root, PathBuf::from("/sys/bus/usb/devices"));
        assert!(!options.log_json);
    }

    #[test]
    fn dry_run_with_json() {
        let options = parse(&["--dry-run", "--json", "--sysfs-root", "/tmp/usb"]).unwrap();

        assert_eq!(options.mode, Mode::DryRun { json: true });
        assert_eq!(options.sysfs_root, PathBuf::from("/tmp/usb"));
    }

    #[test]
    fn json_requires_dry_run() {
        assert!(parse(&["--json"]).is_err());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--prefix", "no-slash"]).is_err());
        assert!(parse(&["--poll-interval", "0"]).is_err());
        assert!(parse(&["--tick-mode", "sometimes"]).is_err());
        assert!(parse(&["--snapshot-policy", "never"]).is_err());
    }

    #[test]
    fn config_carries_options() {
        let options = parse(&[
            "--prefix",
            "usb.example.io/",
            "--poll-interval",
            "15",
            "--tick-mode",
            "detached",
            "--snapshot-policy",
            "per-cycle",
            "--watch-updates",
        ])
        .unwrap();
        let config = options.labeller_config(NodeIdentity::new("worker-1").unwrap());

        assert_eq!(config.identity.as_str(), "worker-1");
        assert_eq!(config.prefix.as_str(), "usb.example.io/");
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.tick_mode, TickMode::Detached);
        assert_eq!(config.snapshot_policy, SnapshotPolicy::PerCycle);
        assert_eq!(config.admitted_kinds, AdmittedKinds::CREATE_AND_UPDATE);
        assert!(config.validate().is_ok());
    }
}
