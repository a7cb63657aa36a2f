use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vcollector_discovery::{discover, DiscoveryOptions};
use vcollector_engine::{BatchOrchestrator, FileHistoryStore, InMemoryInventory, JobRunner};
use vcollector_model::{Device, JobDefinition};
use vcollector_templates::InMemoryTemplateStore;
use vcollector_vault::Vault;

#[derive(Parser)]
#[command(name = "vcollector", about = "Network device SSH collection engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job definition against a device inventory snapshot.
    Job {
        #[command(subcommand)]
        action: JobCommands,
    },
    /// Probe devices with candidate credentials to learn which one works.
    Discover {
        /// JSON file containing an array of `Device` records.
        #[arg(long)]
        devices: PathBuf,
        /// Path to the vault file.
        #[arg(long)]
        vault: PathBuf,
        /// Comma-separated candidate credential names, tried in order.
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
        #[arg(long, default_value_t = false)]
        skip_configured: bool,
        #[arg(long, default_value_t = false)]
        skip_recently_tested: bool,
        #[arg(long, default_value_t = 24)]
        recent_hours: i64,
        #[arg(long, default_value_t = 12)]
        max_workers: usize,
        /// Offer legacy KEX/cipher/host-key algorithms first (older gear).
        #[arg(long, default_value_t = false)]
        legacy_mode: bool,
        /// Write the updated device set (with discovered credentials) here.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Manage the at-rest credential vault.
    Vault {
        #[command(subcommand)]
        action: VaultCommands,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Run a job definition file against a device inventory snapshot.
    Run {
        /// JSON file containing a `JobDefinition`.
        #[arg(long)]
        job: PathBuf,
        /// JSON file containing an array of `Device` records.
        #[arg(long)]
        devices: PathBuf,
        /// Path to the vault file (unlocked interactively if present).
        #[arg(long)]
        vault: Option<PathBuf>,
        /// Append-only JSONL history log; defaults to `<base_path>/history.jsonl`.
        #[arg(long)]
        history_log: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run several job definitions in parallel and report an aggregate summary.
    RunBatch {
        /// JSON files, each containing one `JobDefinition`.
        #[arg(long, required = true)]
        jobs: Vec<PathBuf>,
        /// JSON file containing an array of `Device` records.
        #[arg(long)]
        devices: PathBuf,
        #[arg(long)]
        vault: Option<PathBuf>,
        #[arg(long)]
        history_log: Option<PathBuf>,
        #[arg(long, default_value_t = 4)]
        max_concurrent_jobs: usize,
    },
}

#[derive(Subcommand)]
enum VaultCommands {
    /// Create a new vault file and set its unlock password.
    Init { path: PathBuf },
    /// Add or replace a credential record.
    Add {
        path: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        private_key_file: Option<PathBuf>,
        #[arg(long)]
        key_passphrase: Option<String>,
        #[arg(long, default_value_t = false)]
        default: bool,
    },
    /// List stored credentials (names and presence flags only).
    List { path: PathBuf },
    /// Remove a credential record.
    Remove {
        path: PathBuf,
        #[arg(long)]
        name: String,
    },
    /// Change which credential is used when a job has no explicit override.
    SetDefault {
        path: PathBuf,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Job { action } => match action {
            JobCommands::Run {
                job,
                devices,
                vault,
                history_log,
                limit,
            } => run_job(job, devices, vault, history_log, limit).await?,
            JobCommands::RunBatch {
                jobs,
                devices,
                vault,
                history_log,
                max_concurrent_jobs,
            } => run_batch(jobs, devices, vault, history_log, max_concurrent_jobs).await?,
        },
        Commands::Discover {
            devices,
            vault,
            candidates,
            skip_configured,
            skip_recently_tested,
            recent_hours,
            max_workers,
            legacy_mode,
            out,
        } => {
            run_discover(
                devices,
                vault,
                candidates,
                skip_configured,
                skip_recently_tested,
                recent_hours,
                max_workers,
                legacy_mode,
                out,
            )
            .await?
        }
        Commands::Vault { action } => run_vault(action).await?,
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();
}

async fn open_vault(path: &PathBuf) -> Result<Vault> {
    let vault = Vault::new(path.clone());
    if !vault.exists().await {
        bail!("vault not found at {}", path.display());
    }
    let password = rpassword::prompt_password("vault password: ").context("reading vault password")?;
    if !vault.unlock(&password).await? {
        bail!("incorrect vault password");
    }
    Ok(vault)
}

fn load_devices(path: &PathBuf) -> Result<Vec<Device>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing devices from {}", path.display()))
}

fn save_devices(path: &PathBuf, devices: &[Device]) -> Result<()> {
    let raw = serde_json::to_string_pretty(devices)?;
    std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))
}

async fn run_job(
    job_path: PathBuf,
    devices_path: PathBuf,
    vault_path: Option<PathBuf>,
    history_log: Option<PathBuf>,
    limit: Option<usize>,
) -> Result<()> {
    let raw = std::fs::read_to_string(&job_path).with_context(|| format!("reading {}", job_path.display()))?;
    let mut job: JobDefinition =
        serde_json::from_str(&raw).with_context(|| format!("parsing job definition from {}", job_path.display()))?;
    if let Some(limit) = limit {
        job.limit = Some(limit);
    }

    let devices = load_devices(&devices_path)?;
    let inventory = Arc::new(InMemoryInventory::new(devices));

    let vault = match vault_path {
        Some(path) => open_vault(&path).await?,
        None => Vault::with_default_path(),
    };

    let history_path = history_log.unwrap_or_else(|| job.storage.base_path.join("history.jsonl"));
    let history = Arc::new(FileHistoryStore::new(history_path));
    let templates: Arc<dyn vcollector_templates::TemplateStore> = Arc::new(InMemoryTemplateStore::new());

    let runner = JobRunner::new(inventory, history, vault, templates);
    info!(job_id = %job.job_id, "starting job run");
    let result = runner.run(&job, None).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.failed_count > 0 || result.job_error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_batch(
    job_paths: Vec<PathBuf>,
    devices_path: PathBuf,
    vault_path: Option<PathBuf>,
    history_log: Option<PathBuf>,
    max_concurrent_jobs: usize,
) -> Result<()> {
    let mut jobs = Vec::with_capacity(job_paths.len());
    for job_path in &job_paths {
        let raw = std::fs::read_to_string(job_path).with_context(|| format!("reading {}", job_path.display()))?;
        let job: JobDefinition = serde_json::from_str(&raw)
            .with_context(|| format!("parsing job definition from {}", job_path.display()))?;
        jobs.push(job);
    }

    let devices = load_devices(&devices_path)?;
    let inventory = Arc::new(InMemoryInventory::new(devices));

    let vault = match vault_path {
        Some(path) => open_vault(&path).await?,
        None => Vault::with_default_path(),
    };

    let history_path = history_log.unwrap_or_else(|| PathBuf::from("history.jsonl"));
    let history = Arc::new(FileHistoryStore::new(history_path));
    let templates: Arc<dyn vcollector_templates::TemplateStore> = Arc::new(InMemoryTemplateStore::new());

    let runner = Arc::new(JobRunner::new(inventory, history, vault, templates));
    let orchestrator = BatchOrchestrator::new(runner, max_concurrent_jobs);

    info!(job_count = jobs.len(), "starting batch run");
    let (results, summary) = orchestrator.run(jobs, None, None).await;

    println!("{}", serde_json::to_string_pretty(&results)?);
    println!(
        "batch summary: {} / {} jobs succeeded, {} devices succeeded, {} failed, {} skipped, {} captures written in {:.1}s",
        summary.jobs_succeeded,
        summary.jobs_total,
        summary.devices_success,
        summary.devices_failed,
        summary.devices_skipped,
        summary.captures_written,
        summary.elapsed.as_secs_f64()
    );

    if summary.jobs_failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_discover(
    devices_path: PathBuf,
    vault_path: PathBuf,
    candidates: Vec<String>,
    skip_configured: bool,
    skip_recently_tested: bool,
    recent_hours: i64,
    max_workers: usize,
    legacy_mode: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    if candidates.is_empty() {
        bail!("at least one --candidates credential name is required");
    }

    let devices = load_devices(&devices_path)?;
    let vault = open_vault(&vault_path).await?;
    let inventory = Arc::new(InMemoryInventory::new(devices.clone()));

    let options = DiscoveryOptions {
        skip_configured,
        skip_recently_tested,
        recent_hours,
        update_devices: true,
        max_workers,
        legacy_mode,
    };

    let results = discover(devices, candidates, vault, Some(inventory.clone()), options, None).await;
    println!("{}", serde_json::to_string_pretty(&results)?);

    if let Some(out_path) = out {
        let mut updated = Vec::with_capacity(results.len());
        for result in &results {
            if let Some(device) = inventory.get(&result.device).await {
                updated.push(device);
            }
        }
        save_devices(&out_path, &updated)?;
    }

    Ok(())
}

async fn run_vault(action: VaultCommands) -> Result<()> {
    match action {
        VaultCommands::Init { path } => {
            let vault = Vault::new(path.clone());
            let password = rpassword::prompt_password("new vault password: ")?;
            let confirm = rpassword::prompt_password("confirm password: ")?;
            if password != confirm {
                bail!("passwords did not match");
            }
            vault.initialize(&password).await?;
            println!("vault initialized at {}", path.display());
        }
        VaultCommands::Add {
            path,
            name,
            username,
            password,
            private_key_file,
            key_passphrase,
            default,
        } => {
            let vault = open_vault(&path).await?;
            let private_key = private_key_file
                .map(|p| std::fs::read_to_string(&p).with_context(|| format!("reading {}", p.display())))
                .transpose()?;
            let password = match password {
                Some(p) => Some(p),
                None if private_key.is_none() => {
                    Some(rpassword::prompt_password(format!("password for '{name}': "))?)
                }
                None => None,
            };
            vault
                .add(
                    &name,
                    &username,
                    password.as_deref(),
                    private_key.as_deref(),
                    key_passphrase.as_deref(),
                    default,
                )
                .await?;
            println!("credential '{name}' saved");
        }
        VaultCommands::List { path } => {
            let vault = open_vault(&path).await?;
            let summaries = vault.list().await?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        VaultCommands::Remove { path, name } => {
            let vault = open_vault(&path).await?;
            if vault.remove(&name).await? {
                println!("credential '{name}' removed");
            } else {
                bail!("no credential named '{name}'");
            }
        }
        VaultCommands::SetDefault { path, name } => {
            let vault = open_vault(&path).await?;
            if vault.set_default(&name).await? {
                println!("'{name}' is now the default credential");
            } else {
                bail!("no credential named '{name}'");
            }
        }
    }
    Ok(())
}
