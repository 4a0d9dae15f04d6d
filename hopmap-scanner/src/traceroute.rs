use crate::error::{Result, ScanError};
use crate::hops::parse_hops;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_PROGRAM: &str = "traceroute";
pub const DEFAULT_MAX_HOPS: u8 = 38;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Runs the external hop-discovery utility against a single target.
#[derive(Debug, Clone)]
pub struct Traceroute {
    program: String,
    max_hops: u8,
    timeout_secs: u64,
}

impl Traceroute {
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            max_hops: DEFAULT_MAX_HOPS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_max_hops(mut self, max_hops: u8) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn command_args(&self, target: Ipv4Addr) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.max_hops.to_string(),
            target.to_string(),
        ]
    }

    /// Run the utility and return its raw stdout.
    ///
    /// A non-zero exit status is logged but the partial output is still
    /// returned. Exceeding the hard timeout kills the child process.
    pub async fn run(&self, target: Ipv4Addr) -> Result<String> {
        let args = self.command_args(target);
        debug!("Running {} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            command.output(),
        )
        .await
        .map_err(|_| ScanError::Timeout(self.timeout_secs))??;

        if !output.status.success() {
            warn!(
                "Traceroute to {} exited with {}: {}",
                target,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run the utility and parse its output into the ordered hop list.
    pub async fn discover(&self, target: Ipv4Addr) -> Result<Vec<Ipv4Addr>> {
        let raw = self.run(target).await?;
        let hops = parse_hops(&raw);
        info!("Traceroute to {} found {} hops", target, hops.len());
        Ok(hops)
    }
}

impl Default for Traceroute {
    fn default() -> Self {
        Self::new()
    }
}
