use std::{process, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vola::{
    application::{
        error::AppError,
        events::EventBus,
        permissions::{Actor, RowPermissionAuthority},
        preview::PreviewService,
        repos::ContentRepo,
        resolver::PluginResolver,
    },
    cache::{CacheConfig, DependencyRegistry, FragmentCache, InvalidationTrigger, MemoryStore},
    config::{self, ActorArgs, Command, LoadError, PreviewCommand},
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
    plugins,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("database url is not configured; set `database.url` or pass --database-url")]
    MissingDatabaseUrl,
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_error(&error);
        process::exit(1);
    }
}

fn report_error(error: &CliError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "command failed");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "command failed");
    });
}

async fn run() -> Result<(), CliError> {
    let (cli, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let url = settings
        .database
        .url
        .as_deref()
        .ok_or(CliError::MissingDatabaseUrl)?;
    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    match cli.command {
        Command::Migrate => {
            PostgresRepositories::run_migrations(&pool)
                .await
                .map_err(InfraError::from)?;
            info!("Migrations applied");
            Ok(())
        }
        Command::Preview(command) => {
            let repo: Arc<dyn ContentRepo> = Arc::new(PostgresRepositories::new(pool));
            let service = preview_service(repo, &settings);
            let container = match command {
                PreviewCommand::Create(args) => {
                    service
                        .create_preview(&actor(&args.actor), args.container_id)
                        .await?
                }
                PreviewCommand::Transfer(args) => {
                    service
                        .transfer_preview(&actor(&args.actor), args.preview_id)
                        .await?
                }
            };
            print_json(&container)
        }
        Command::Plugins(args) => {
            let repo: Arc<dyn ContentRepo> = Arc::new(PostgresRepositories::new(pool));
            let registry = plugins::builtin()
                .build()
                .install_global()
                .map_err(InfraError::from)?;
            let group = repo
                .find_group(args.group_id)
                .await
                .map_err(AppError::from)?
                .ok_or_else(|| AppError::not_found("group", args.group_id))?;
            let resolver = PluginResolver::new(repo, registry);
            print_json(&resolver.available_plugin_types(&group))
        }
    }
}

fn preview_service(repo: Arc<dyn ContentRepo>, settings: &config::Settings) -> PreviewService {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(MemoryStore::from_config(&cache_config));
    let cache = Arc::new(FragmentCache::new(store, cache_config));
    if !cache.is_shared() {
        warn!(
            "No shared cache store is configured; generation bumps from this command stay in this \
             process and readers serve cached fragments until they expire"
        );
    }
    let trigger = Arc::new(InvalidationTrigger::new(
        cache,
        Arc::new(DependencyRegistry::new()),
    ));
    let authority = Arc::new(RowPermissionAuthority::new(Arc::clone(&repo)));
    PreviewService::new(repo, authority, Arc::new(EventBus::with_tracing()), trigger)
}

fn actor(args: &ActorArgs) -> Actor {
    if args.superuser {
        Actor {
            user_groups: args.user_groups.clone(),
            ..Actor::superuser(args.user_id)
        }
    } else {
        Actor::editor(args.user_id, args.user_groups.clone())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
