//! NeuroDetect - brain MRI classification backend.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neurodetect::{
    account::{AccountService, PasswordHasher},
    assets::{create_s3_client, AssetStore, S3AssetStore, DEFAULT_S3_TIMEOUT},
    config::{CheckConfig, Cli, Command, ServeConfig},
    inference::{Classifier, PredictionService, TfServingClassifier},
    notify::{
        HttpMailer, LogMailer, Mailer, NotificationQueue, RetryPolicy, DEFAULT_MAIL_TIMEOUT,
        DEFAULT_QUEUE_CAPACITY,
    },
    server::{create_router, AppState, RouterConfig, SessionSigner},
    store::{MemoryStore, PgStore, PredictionStore, UserStore},
};

/// How long to wait for queued emails after the server stops.
const EMAIL_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    // validate() has already checked these parse
    let (frontend_url, model_endpoint, mail_endpoint) = match (
        config.frontend_url(),
        config.model_endpoint(),
        config.mail_endpoint(),
    ) {
        (Ok(frontend), Ok(model), Ok(mail)) => (frontend, model, mail),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_banner();

    info!("Configuration:");
    info!("  Model: {} at {}", config.model_name, model_endpoint);
    info!(
        "  Confidence threshold: {:.2}",
        config.confidence_threshold
    );
    info!("  S3 bucket: {}", config.s3_bucket);
    if let Some(ref endpoint) = config.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.s3_region);
    info!("  Frontend: {}", frontend_url);

    // Stores
    let (users, predictions, pg_store): (
        Arc<dyn UserStore>,
        Arc<dyn PredictionStore>,
        Option<Arc<PgStore>>,
    ) = match config.database_url {
        Some(ref url) => {
            info!("  Database: postgres (pool size {})", config.db_max_connections);
            match PgStore::connect(url, config.db_max_connections).await {
                Ok(store) => {
                    let store = Arc::new(store);
                    (store.clone(), store.clone(), Some(store))
                }
                Err(e) => {
                    error!("Failed to connect to database: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        None => {
            warn!("  Database: IN-MEMORY - accounts and predictions are lost on restart");
            warn!("            Set --database-url or NEURO_DATABASE_URL for persistence");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store, None)
        }
    };

    // Mail
    let mailer: Arc<dyn Mailer> = match mail_endpoint {
        Some(endpoint) => {
            info!("  Mail: {}", endpoint);
            match HttpMailer::new(
                endpoint,
                config.mail_api_key.clone(),
                config.mail_from.clone(),
                DEFAULT_MAIL_TIMEOUT,
            ) {
                Ok(mailer) => Arc::new(mailer),
                Err(e) => {
                    error!("Failed to create mail client: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        None => {
            warn!("  Mail: LOG ONLY - verification emails are not delivered");
            warn!("        Set --mail-endpoint or NEURO_MAIL_ENDPOINT to send email");
            Arc::new(LogMailer)
        }
    };

    let retry = RetryPolicy::new(config.mail_attempts, RetryPolicy::default().initial_backoff);
    let (notifier, email_worker) = NotificationQueue::start(mailer, DEFAULT_QUEUE_CAPACITY, retry);

    // Asset store
    let s3_client = create_s3_client(
        config.s3_endpoint.as_deref(),
        &config.s3_region,
        DEFAULT_S3_TIMEOUT,
    )
    .await;
    let mut assets = S3AssetStore::new(s3_client, &config.s3_bucket, &config.s3_region)
        .with_prefix(&config.s3_prefix);
    if let Some(ref endpoint) = config.s3_endpoint {
        assets = assets.with_endpoint(endpoint);
    }
    if let Some(ref base_url) = config.asset_base_url {
        assets = assets.with_public_base_url(base_url);
    }

    info!("");
    info!("Connecting to S3...");
    if let Err(e) = assets.ready().await {
        error!("  Failed to reach bucket '{}': {}", config.s3_bucket, e);
        error!("");
        error!("  Please check:");
        error!("    - Your AWS credentials are configured correctly");
        error!("    - The bucket exists and is writable");
        error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
        return ExitCode::FAILURE;
    }
    info!("  Connected successfully");

    // Model runtime
    let classifier =
        match TfServingClassifier::new(&model_endpoint, &config.model_name, config.model_timeout())
        {
            Ok(classifier) => classifier,
            Err(e) => {
                error!("Failed to create model client: {}", e);
                return ExitCode::FAILURE;
            }
        };
    if let Err(e) = classifier.ready().await {
        warn!("Model runtime is not ready yet: {}", e);
        warn!("Predictions will fail until {} serves '{}'", model_endpoint, config.model_name);
    }

    // Services
    let accounts = AccountService::new(users.clone(), notifier, frontend_url)
        .with_hasher(PasswordHasher::new(config.bcrypt_cost));
    let prediction_service =
        PredictionService::new(users, predictions, Arc::new(classifier), Arc::new(assets))
            .with_threshold(config.confidence_threshold)
            .with_display_offset_minutes(config.display_offset_minutes);
    let sessions = SessionSigner::new(config.session_secret_or_empty(), config.session_ttl());

    let state = AppState::new(accounts, prediction_service, sessions)
        .with_secure_cookies(config.secure_cookies);
    let router = create_router(state, build_router_config(&config));

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl -X POST http://{}/guest-predict -F file=@scan.jpg",
        addr
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // The router (and every queue sender inside it) is gone; let the worker drain
    info!("Delivering queued emails...");
    if tokio::time::timeout(EMAIL_DRAIN_TIMEOUT, email_worker.join())
        .await
        .is_err()
    {
        warn!("Timed out waiting for queued emails");
    }

    if let Some(store) = pg_store {
        store.close().await;
    }

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Resolve when the process receives Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("███╗   ██╗███████╗██╗   ██╗██████╗  ██████╗ ");
    info!("████╗  ██║██╔════╝██║   ██║██╔══██╗██╔═══██╗");
    info!("██╔██╗ ██║█████╗  ██║   ██║██████╔╝██║   ██║");
    info!("██║╚██╗██║██╔══╝  ██║   ██║██╔══██╗██║   ██║");
    info!("██║ ╚████║███████╗╚██████╔╝██║  ██║╚██████╔╝");
    info!("╚═╝  ╚═══╝╚══════╝ ╚═════╝ ╚═╝  ╚═╝ ╚═════╝ ");
    info!("                         DETECT  v{}", version);
    info!("");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "neurodetect=debug,tower_http=debug"
    } else {
        "neurodetect=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    RouterConfig::new()
        .with_cors_origins(config.effective_cors_origins())
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_tracing(!config.no_tracing)
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("NeuroDetect Configuration Check");
    println!("═══════════════════════════════");
    println!();

    let mut failed = false;

    // Database
    match config.database_url {
        Some(ref url) => {
            print!("Testing database connection... ");
            match PgStore::connect(url, 1).await {
                Ok(store) => {
                    match store.ping().await {
                        Ok(()) => println!("✓ success (migrations applied)"),
                        Err(e) => {
                            println!("✗ failed");
                            println!("  Error: {}", e);
                            failed = true;
                        }
                    }
                    store.close().await;
                }
                Err(e) => {
                    println!("✗ failed");
                    println!("  Error: {}", e);
                    failed = true;
                }
            }
        }
        None => println!("- Database: not configured (in-memory store)"),
    }

    // S3
    match config.s3_bucket {
        Some(ref bucket) => {
            println!("✓ Bucket: {}", bucket);
            if let Some(ref endpoint) = config.s3_endpoint {
                println!("✓ Endpoint: {}", endpoint);
            }
            println!("✓ Region: {}", config.s3_region);
            print!("Testing S3 connection... ");

            let client = create_s3_client(
                config.s3_endpoint.as_deref(),
                &config.s3_region,
                DEFAULT_S3_TIMEOUT,
            )
            .await;
            let assets = S3AssetStore::new(client, bucket, &config.s3_region);

            match assets.ready().await {
                Ok(()) => println!("✓ success"),
                Err(e) => {
                    println!("✗ failed");
                    println!();
                    println!("Error: {}", e);
                    println!();
                    println!("Please check:");
                    println!("  - Your AWS credentials are configured correctly");
                    println!("  - The bucket '{}' exists and is accessible", bucket);
                    if config.s3_endpoint.is_some() {
                        println!("  - The S3 endpoint is correct and reachable");
                    }
                    failed = true;
                }
            }
        }
        None => {
            println!("✗ Bucket: not configured (set --s3-bucket or NEURO_S3_BUCKET)");
            failed = true;
        }
    }

    // Model runtime
    print!(
        "Testing model '{}' at {}... ",
        config.model_name, config.model_endpoint
    );
    let classifier = config.model_endpoint().and_then(|endpoint| {
        TfServingClassifier::new(
            &endpoint,
            &config.model_name,
            Duration::from_secs(config.model_timeout),
        )
        .map_err(|e| e.to_string())
    });
    match classifier {
        Ok(classifier) => match classifier.ready().await {
            Ok(()) => println!("✓ ready"),
            Err(e) => {
                println!("✗ not ready");
                println!("  Error: {}", e);
                failed = true;
            }
        },
        Err(e) => {
            println!("✗ invalid");
            println!("  Error: {}", e);
            failed = true;
        }
    }

    println!();
    println!("═══════════════════════════════");
    if failed {
        println!("✗ Some checks failed");
        ExitCode::FAILURE
    } else {
        println!("✓ All checks passed!");
        ExitCode::SUCCESS
    }
}
