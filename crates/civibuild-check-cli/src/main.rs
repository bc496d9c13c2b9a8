//! civibuild-check - acceptance check for `civibuild create`
//!
//! ## Commands
//!
//! - `run`: provision the test instance, assert exit status 0, destroy it
//! - `show-command`: print the `create` invocation without running it
//! - `exists`: report whether an instance is present in the build root
//! - `destroy`: destroy an instance left behind by an earlier run

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use civibuild_check::{
    BuildDirRegistry, CheckConfig, CheckError, CheckReport, InstanceLease, InstanceRegistry,
    ProcessInvoker, ProvisioningCheck, TeardownOutcome,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "civibuild-check")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Acceptance check for `civibuild create`", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file (defaults, then this file, then environment, then flags)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the test instance and assert that the tool exits 0
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Print the full run report as JSON on stdout
        #[arg(long)]
        report_json: bool,
    },

    /// Print the `create` invocation
    ShowCommand {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Check whether an instance already exists in the build root
    Exists {
        /// Instance name (default: configured instance)
        name: Option<String>,

        /// Build root to inspect
        #[arg(long)]
        build_root: Option<PathBuf>,
    },

    /// Destroy an instance
    Destroy {
        /// Instance name (default: configured instance)
        name: Option<String>,

        /// Provisioning tool binary
        #[arg(long)]
        tool: Option<String>,
    },
}

/// Flags that override the layered configuration.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Provisioning tool binary
    #[arg(long)]
    tool: Option<String>,

    /// Instance name
    #[arg(long)]
    name: Option<String>,

    /// Provisioning type
    #[arg(long = "type")]
    build_type: Option<String>,

    /// CiviCRM version
    #[arg(long)]
    civi_ver: Option<String>,

    /// Site URL
    #[arg(long)]
    url: Option<String>,

    /// Build root used to detect a pre-existing instance
    #[arg(long)]
    build_root: Option<PathBuf>,

    /// Timeout for `create` in seconds (0 waits forever)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Keep the instance after the run
    #[arg(long)]
    keep: bool,

    /// Do not pass --force to the tool
    #[arg(long)]
    no_force: bool,
}

impl Overrides {
    fn apply(self, mut config: CheckConfig) -> CheckConfig {
        if let Some(tool) = self.tool {
            config.tool = tool;
        }
        if let Some(name) = self.name {
            config.create.instance_name = name;
        }
        if let Some(build_type) = self.build_type {
            config.create.build_type = build_type;
        }
        if let Some(civi_ver) = self.civi_ver {
            config.create.civi_version = civi_ver;
        }
        if let Some(url) = self.url {
            config.create.url = url;
        }
        if let Some(root) = self.build_root {
            config.build_root = Some(root);
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if self.keep {
            config.keep_instance = true;
        }
        if self.no_force {
            config.create.force = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    civibuild_check::init_tracing(cli.json, level);

    let base = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            overrides,
            report_json,
        } => cmd_run(overrides.apply(base), report_json).await,
        Commands::ShowCommand { overrides } => cmd_show_command(overrides.apply(base)),
        Commands::Exists { name, build_root } => {
            let overrides = Overrides {
                name,
                build_root,
                ..Overrides::default()
            };
            cmd_exists(overrides.apply(base)).await
        }
        Commands::Destroy { name, tool } => {
            let overrides = Overrides {
                name,
                tool,
                ..Overrides::default()
            };
            cmd_destroy(overrides.apply(base)).await
        }
    }
}

/// Defaults, then the optional file, then the environment.
fn load_config(path: Option<&Path>) -> Result<CheckConfig> {
    let config = match path {
        Some(path) => CheckConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CheckConfig::default(),
    };
    config
        .with_env_from(|key| std::env::var(key).ok())
        .context("Invalid environment configuration")
}

/// Process exit code for a failed check.
fn exit_code_for(err: &CheckError) -> u8 {
    match err {
        CheckError::InstanceExists { .. } => 2,
        CheckError::Timeout { .. } => 3,
        _ => 1,
    }
}

async fn cmd_run(config: CheckConfig, report_json: bool) -> Result<ExitCode> {
    let check = ProvisioningCheck::from_config(config).context("Invalid check configuration")?;
    info!(command = %check.invocation(), "running provisioning check");

    let outcome = check
        .run_and_report(|report| {
            if report_json {
                print_report(report);
            }
        })
        .await;

    match outcome {
        Ok(report) => {
            if !report_json {
                println!("PASS {} (run {})", check.invocation(), report.run_id);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("FAIL {}: {}", check.invocation(), e);
            if let CheckError::ToolFailed { stderr, .. } = &e {
                if !stderr.trim().is_empty() {
                    eprintln!("--- tool stderr ---\n{}", stderr.trim_end());
                }
            }
            Ok(ExitCode::from(exit_code_for(&e)))
        }
    }
}

fn print_report(report: &CheckReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize run report: {}", e),
    }
}

fn cmd_show_command(config: CheckConfig) -> Result<ExitCode> {
    let check = ProvisioningCheck::from_config(config).context("Invalid check configuration")?;
    println!("{}", check.invocation());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_exists(config: CheckConfig) -> Result<ExitCode> {
    let exists = instance_exists(&config).await?;
    println!(
        "{}: {}",
        config.create.instance_name,
        if exists { "exists" } else { "absent" }
    );
    Ok(if exists {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn instance_exists(config: &CheckConfig) -> Result<bool> {
    let root = config
        .build_root
        .as_deref()
        .context("No build root configured; pass --build-root or set CIVIBUILD_BUILD_ROOT")?;

    BuildDirRegistry::new(root)
        .exists(&config.create.instance_name)
        .await
        .with_context(|| format!("Failed to inspect {}", root.display()))
}

async fn cmd_destroy(config: CheckConfig) -> Result<ExitCode> {
    config.validate().context("Invalid check configuration")?;
    let name = &config.create.instance_name;

    let invoker = ProcessInvoker::from_config(&config);
    let lease = InstanceLease::acquire(&config.tool, name, false);
    match lease.release(&invoker, config.teardown_timeout()).await {
        TeardownOutcome::Failed { reason } => {
            eprintln!("Failed to destroy {}: {}", name, reason);
            Ok(ExitCode::from(1))
        }
        _ => {
            println!("Destroyed {}", name);
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_overrides_apply_on_top_of_config() {
        let cli = Cli::try_parse_from([
            "civibuild-check",
            "run",
            "--name",
            "dmaster",
            "--type",
            "drupal-demo",
            "--civi-ver",
            "5.70",
            "--timeout-secs",
            "0",
            "--keep",
            "--no-force",
        ])
        .unwrap();

        let Commands::Run { overrides, report_json } = cli.command else {
            panic!("expected run");
        };
        assert!(!report_json);

        let config = overrides.apply(CheckConfig::default());
        assert_eq!(config.create.instance_name, "dmaster");
        assert_eq!(config.create.build_type, "drupal-demo");
        assert_eq!(config.create.civi_version, "5.70");
        assert_eq!(config.create.url, "http://civibuild-test.localhost");
        assert_eq!(config.timeout(), None);
        assert!(config.keep_instance);
        assert!(!config.create.force);
    }

    #[test]
    fn test_no_overrides_keep_defaults() {
        let config = Overrides::default().apply(CheckConfig::default());
        assert_eq!(config, CheckConfig::default());
    }

    #[test]
    fn test_exit_codes_distinguish_failure_kinds() {
        assert_eq!(
            exit_code_for(&CheckError::ToolFailed {
                status: 255,
                stderr: String::new()
            }),
            1
        );
        assert_eq!(
            exit_code_for(&CheckError::InstanceExists {
                name: "civibuild-test".to_string()
            }),
            2
        );
        assert_eq!(exit_code_for(&CheckError::Timeout { limit_ms: 10 }), 3);
    }

    #[tokio::test]
    async fn test_exists_without_build_root_errors() {
        assert!(instance_exists(&CheckConfig::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_exists_checks_build_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckConfig {
            build_root: Some(dir.path().to_path_buf()),
            ..CheckConfig::default()
        };
        assert!(!instance_exists(&config).await.unwrap());

        std::fs::create_dir(dir.path().join("civibuild-test")).unwrap();
        assert!(instance_exists(&config).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_destroy_passes_configured_env_to_tool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("civibuild");
        let seen = dir.path().join("seen");
        std::fs::write(
            &tool,
            format!(
                "#!/bin/sh\nprintf '%s %s' \"$1\" \"$CIVIBUILD_HOME\" > '{}'\n",
                seen.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = CheckConfig {
            tool: tool.display().to_string(),
            ..CheckConfig::default()
        };
        config
            .env
            .insert("CIVIBUILD_HOME".to_string(), "/srv/buildkit".to_string());

        cmd_destroy(config).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&seen).unwrap(),
            "destroy /srv/buildkit"
        );
    }
}
