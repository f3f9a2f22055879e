use clap::Parser;

use skytrack_core::Config;

/// Scheduled aircraft state-vector ingestion.
///
/// Fetches a snapshot from the upstream API, stores it as Parquet, and
/// records every attempt in the run ledger. Settings come from the
/// environment (and `.env`); flags override them.
#[derive(Parser, Debug)]
#[command(name = "skytrack", version, about = "Scheduled aircraft state-vector ingestion")]
pub struct CliArgs {
    /// Execute a single ingestion attempt and exit
    #[arg(long)]
    pub run_once: bool,

    /// Seconds between scheduled attempts (overrides SCHEDULER_INTERVAL_SECONDS)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Log filter, e.g. "debug" or "info,skytrack_ingest=trace" (overrides RUST_LOG)
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Wait one full interval before the first scheduled attempt
    #[arg(long)]
    pub no_run_on_start: bool,

    /// Configuration profile (overrides SKYTRACK_PROFILE)
    #[arg(long)]
    pub profile: Option<String>,

    /// Print the redacted configuration and exit
    #[arg(long)]
    pub show_config: bool,
}

impl CliArgs {
    pub fn load_config(&self) -> Config {
        let mut config = match &self.profile {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        };
        self.apply(&mut config);
        config
    }

    /// Fold flag overrides into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(interval) = self.interval {
            config.scheduler.interval_secs = interval;
        }
        if self.no_run_on_start {
            config.scheduler.run_on_start = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = CliArgs::parse_from([
            "skytrack",
            "--run-once",
            "--interval",
            "300",
            "--log-level",
            "debug",
            "--no-run-on-start",
        ]);
        assert!(args.run_once);
        assert_eq!(args.interval, Some(300));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.no_run_on_start);
    }

    #[test]
    fn overrides_apply_to_config() {
        let args = CliArgs::parse_from(["skytrack", "--interval", "15", "--no-run-on-start"]);
        let mut config = Config::for_profile("");
        config.scheduler.run_on_start = true;
        args.apply(&mut config);
        assert_eq!(config.scheduler.interval_secs, 15);
        assert!(!config.scheduler.run_on_start);
    }

    #[test]
    fn no_flags_leave_config_alone() {
        let args = CliArgs::parse_from(["skytrack"]);
        let mut config = Config::for_profile("");
        config.scheduler.interval_secs = 60;
        args.apply(&mut config);
        assert_eq!(config.scheduler.interval_secs, 60);
        assert!(!args.run_once);
    }
}
