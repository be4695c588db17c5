use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use headless_host::config::{Config, HostConfig};
use headless_host::coordination::{AsyncGate, MainContext, SerialDispatcher};
use headless_host::domain::{ExperienceId, Manifest, SdkVersion};
use headless_host::fetch::{AppFetcher, HttpAppFetcher, ManualFetcher};
use headless_host::loader::{HeadlessAppLoader, HostEnvironment, LoadOptions, linking_uri};
use headless_host::runtime::{BuilderRegistry, DryRunRuntimeFactory, HttpPackagerStatus, RuntimeEvent};
use headless_host::storage::{JsonlStorage, MetadataStore, StorageMetadataStore, StorageRecoveryStore};
use headless_host::tasks::{TaskConsumer, TaskExecutor, TaskRegistry, TaskService};

mod cli;

use cli::Cli;
use cli::commands::{Commands, MetadataCommands, TaskCommands};

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("headless-host")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("headless-host.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        if let Some(level) = level {
            builder.parse_filters(level);
        }
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Everything a command needs to talk to the host
struct Host {
    env: Arc<HostEnvironment>,
    fetcher: Arc<dyn AppFetcher>,
    main: Arc<dyn MainContext>,
    storage: Arc<JsonlStorage>,
    factories: Vec<Arc<DryRunRuntimeFactory>>,
    manual: Option<Arc<ManualFetcher>>,
}

impl Host {
    /// Loaders share the process-wide gate and run async work on this runtime
    fn loader_factory(&self) -> impl Fn() -> HeadlessAppLoader + Send + Sync + 'static {
        let env = self.env.clone();
        let fetcher = self.fetcher.clone();
        let main = self.main.clone();
        let handle = tokio::runtime::Handle::current();
        move || {
            HeadlessAppLoader::new(env.clone(), fetcher.clone(), main.clone())
                .with_runtime_handle(handle.clone())
                .with_gate(AsyncGate::process_wide())
        }
    }

    /// A fresh loader; each loaded app needs its own
    fn loader(&self) -> HeadlessAppLoader {
        self.loader_factory()()
    }
}

fn open_storage(config: &Config) -> Result<Arc<JsonlStorage>> {
    let storage = JsonlStorage::new(&config.storage.data_dir)
        .context(format!("Failed to open storage at {}", config.storage.data_dir.display()))?;
    Ok(Arc::new(storage))
}

fn build_host(config: &Config, offline: bool) -> Result<Host> {
    let host_config: HostConfig = config.host_config()?;
    let storage = open_storage(config)?;

    let mut registry = BuilderRegistry::new();
    let mut factories = Vec::new();
    let versions = host_config
        .supported_versions
        .iter()
        .cloned()
        .chain(std::iter::once(SdkVersion::Unversioned));
    for version in versions {
        let factory = Arc::new(DryRunRuntimeFactory::new(version));
        registry.register(factory.clone());
        factories.push(factory);
    }

    let packager = HttpPackagerStatus::new(host_config.packager_timeout)?;
    let env = HostEnvironment::new(host_config, registry)
        .with_metadata_store(Arc::new(StorageMetadataStore::new(storage.clone())))
        .with_recovery_store(Arc::new(StorageRecoveryStore::new(storage.clone())))
        .with_packager(Arc::new(packager));

    let (manual, fetcher): (Option<Arc<ManualFetcher>>, Arc<dyn AppFetcher>) = if offline {
        let manual = Arc::new(ManualFetcher::new());
        let fetcher: Arc<dyn AppFetcher> = manual.clone();
        (Some(manual), fetcher)
    } else {
        let fetcher = HttpAppFetcher::new(
            Duration::from_millis(config.fetch.timeout_ms),
            config.storage.bundle_cache_dir.clone(),
            tokio::runtime::Handle::current(),
        )?;
        let fetcher: Arc<dyn AppFetcher> = Arc::new(fetcher);
        (None, fetcher)
    };

    let (dispatcher, _dispatcher_task) = SerialDispatcher::spawn();

    Ok(Host {
        env: Arc::new(env),
        fetcher,
        main: Arc::new(dispatcher),
        storage,
        factories,
        manual,
    })
}

async fn handle_load_command(
    url: &str,
    intent_uri: Option<String>,
    files: Option<(&Path, &Path)>,
    background: bool,
    config: &Config,
) -> Result<()> {
    info!("Loading {} (offline: {})", url, files.is_some());
    let host = build_host(config, files.is_some())?;

    let mut options = LoadOptions::default();
    if let Some(uri) = intent_uri {
        options = options.with_intent_uri(uri);
    }
    if background {
        options = options.background();
    }

    let loader = host.loader();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let record = loader.load_app(url, options, move |result| {
        let _ = tx.send(result);
    });

    if let (Some(manual), Some((manifest_file, bundle_file))) = (&host.manual, files) {
        let text = fs::read_to_string(manifest_file)
            .context(format!("Failed to read manifest {}", manifest_file.display()))?;
        let manifest = Manifest::parse(&text)?;
        let listener = manual
            .last_listener()
            .ok_or_else(|| eyre!("Load did not start a fetch"))?;
        listener.on_manifest_ready(manifest);
        listener.on_bundle_ready(bundle_file.to_string_lossy().into_owned());
    }

    let outcome = rx.await.context("Load was dropped before completing")?;
    if let Err(e) = outcome {
        println!("{} {}", "Load failed:".red(), e);
        return Err(e.into());
    }

    println!("{} {}", "Loaded:".green(), record.id());
    if let Some(state) = loader.state_snapshot() {
        println!("  SDK version:  {}", state.sdk_version.map(|v| v.to_string()).unwrap_or_default());
        println!(
            "  Runtime:      {}",
            state.detach_sdk_version.map(|v| v.to_string()).unwrap_or_default()
        );
        println!("  Debug mode:   {}", state.debug_mode);
        println!("  Shell app:    {}", state.is_shell_app);
    }

    let built = host.factories.iter().flat_map(|f| f.events()).find_map(|event| match event {
        RuntimeEvent::Built {
            bundle_path,
            experience_properties,
            packages,
            props,
            ..
        } => Some((bundle_path, experience_properties, packages, props)),
        _ => None,
    });

    match built {
        Some((bundle_path, experience_properties, packages, props)) => {
            println!("  Bundle path:  {}", bundle_path);
            println!("  Packages:     {}", packages.join(", "));
            println!("{}", "Experience properties:".cyan());
            println!("{}", serde_json::to_string_pretty(&experience_properties)?);
            println!("{}", "Launch props:".cyan());
            println!("{}", serde_json::to_string_pretty(&props)?);
        }
        None => println!("{}", "No runtime was built (no foreground surface)".yellow()),
    }
    Ok(())
}

fn handle_linking_uri_command(url: &str, sdk: &str, config: &Config) -> Result<()> {
    let host_config = config.host_config()?;
    let version = SdkVersion::parse(sdk).context(format!("Invalid SDK version '{}'", sdk))?;
    println!("{}", linking_uri(&host_config, url, &version));
    Ok(())
}

fn handle_metadata_command(command: &MetadataCommands, config: &Config) -> Result<()> {
    let store = StorageMetadataStore::new(open_storage(config)?);
    match command {
        MetadataCommands::Show { experience_id } => {
            let id = ExperienceId::new(experience_id.as_str())?;
            match store.get_metadata(&id)? {
                Some(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
                None => println!("{} {}", "No metadata for".yellow(), id),
            }
        }
        MetadataCommands::Set { experience_id, json } => {
            let id = ExperienceId::new(experience_id.as_str())?;
            let value: serde_json::Value = serde_json::from_str(json).context("Metadata is not valid JSON")?;
            let serde_json::Value::Object(metadata) = value else {
                return Err(eyre!("Metadata must be a JSON object"));
            };
            store.update_metadata(&id, metadata)?;
            println!("{} {}", "Updated metadata for".green(), id);
        }
    }
    Ok(())
}

fn handle_tasks_command(command: &TaskCommands, config: &Config) -> Result<()> {
    let host = build_host(config, true)?;
    let service: Arc<dyn TaskService> = Arc::new(TaskExecutor::new(host.loader_factory()));
    let registry = TaskRegistry::new(host.storage.clone(), service);

    match command {
        TaskCommands::List { app } => {
            let descriptors = registry.descriptors(app.as_deref())?;
            if descriptors.is_empty() {
                println!("{}", "No tasks registered".yellow());
            }
            for d in descriptors {
                println!(
                    "{} {} {} ({}, registered {})",
                    d.app_id.cyan(),
                    d.name.green(),
                    d.app_url,
                    d.consumer_kind,
                    d.registered_at.format("%Y-%m-%d %H:%M:%S")
                );
                if !d.options.is_empty() {
                    println!("    options: {}", serde_json::to_string(&d.options)?);
                }
            }
        }
        TaskCommands::Unregister { app, name } => {
            let no_consumers = |_: &str| -> Option<Arc<dyn TaskConsumer>> { None };
            registry.restore(&no_consumers)?;
            match name {
                Some(name) => {
                    registry.unregister_task(app, name)?;
                    println!("{} {}/{}", "Unregistered".green(), app, name);
                }
                None => {
                    let count = registry.unregister_all_for_app(app)?;
                    println!("{} {} task(s) of {}", "Unregistered".green(), count, app);
                }
            }
        }
    }
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Load {
            url,
            intent_uri,
            manifest_file,
            bundle_file,
            background,
        } => {
            let files = manifest_file.as_deref().zip(bundle_file.as_deref());
            handle_load_command(url, intent_uri.clone(), files, *background, config).await
        }
        Commands::LinkingUri { url, sdk } => handle_linking_uri_command(url, sdk, config),
        Commands::Metadata { command } => handle_metadata_command(command, config),
        Commands::Tasks { command } => handle_tasks_command(command, config),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
