//! Configuration for the controller.

use std::time::Duration;

use anyhow::{ensure, Result};
use clap::Parser;

use crate::dispatcher::{DispatcherConfig, DEFAULT_LANES, DEFAULT_QUEUE_CAPACITY};
use crate::imds::DEFAULT_IMDS_URL;
use crate::lane::CommitPolicy;

/// Pod elastic IP controller.
///
/// Reads pod lifecycle notifications as JSON lines on stdin and converges
/// elastic IP association and shield protection for opted-in pods.
#[derive(Debug, Clone, Parser)]
#[command(name = "pod-eip-controller")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Number of dispatch lanes (one worker each).
    #[arg(long, env = "PODEIP_LANES", default_value_t = DEFAULT_LANES)]
    pub lanes: usize,

    /// Bounded queue capacity per lane.
    #[arg(long, env = "PODEIP_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// VPC ID; discovered from instance metadata when omitted.
    #[arg(long, env = "PODEIP_VPC_ID")]
    pub vpc_id: Option<String>,

    /// Region; discovered from instance metadata when omitted.
    #[arg(long, env = "PODEIP_REGION")]
    pub region: Option<String>,

    /// Instance metadata endpoint.
    #[arg(long, env = "PODEIP_IMDS_URL", default_value = DEFAULT_IMDS_URL)]
    pub imds_url: String,

    /// Upper bound for a single reconcile call, in seconds.
    #[arg(long, env = "PODEIP_RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,

    /// When a failed transition is recorded in lane state.
    #[arg(long, env = "PODEIP_COMMIT_POLICY", value_enum, default_value_t = CommitPolicy::OnSuccess)]
    pub commit_policy: CommitPolicy,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence.
    #[arg(long, env = "PODEIP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Reject values the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.lanes > 0, "lanes must be positive");
        ensure!(self.queue_capacity > 0, "queue capacity must be positive");
        ensure!(
            self.reconcile_timeout_secs > 0,
            "reconcile timeout must be positive"
        );
        Ok(())
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            lanes: self.lanes,
            queue_capacity: self.queue_capacity,
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            commit_policy: self.commit_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_arguments() {
        let config = Config::try_parse_from([
            "pod-eip-controller",
            "--lanes",
            "4",
            "--queue-capacity",
            "8",
            "--vpc-id",
            "vpc-1",
            "--region",
            "us-east-1",
            "--reconcile-timeout-secs",
            "5",
            "--commit-policy",
            "always",
        ])
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.vpc_id.as_deref(), Some("vpc-1"));

        let dispatcher = config.dispatcher();
        assert_eq!(dispatcher.lanes, 4);
        assert_eq!(dispatcher.queue_capacity, 8);
        assert_eq!(dispatcher.reconcile_timeout, Duration::from_secs(5));
        assert_eq!(dispatcher.commit_policy, CommitPolicy::Always);
    }

    #[test]
    fn test_zero_lanes_rejected() {
        let config =
            Config::try_parse_from(["pod-eip-controller", "--lanes", "0"]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_commit_policy_rejected() {
        let result =
            Config::try_parse_from(["pod-eip-controller", "--commit-policy", "sometimes"]);
        assert!(result.is_err());
    }
}
