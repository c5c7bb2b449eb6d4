//! clinicsync - operator console for the clinic data-access layer.
//!
//! Signs in, warms the shared cache, and prints collections and report
//! slices from the command line. Everything goes through the same
//! credential store, dispatcher, cache and query loader the console uses.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clinicsync_core::api::client::log_rejection;
use clinicsync_core::auth::Keychain;
use clinicsync_core::query::SliceSource;
use clinicsync_core::{
    CacheCoordinator, ClinicApi, Collection, Config, Credential, CredentialStore, Dispatcher,
    HttpTransport, Mirror, QueryLoader, RangeKey, Record, ResourceCache, Scheme, SignalBus,
};

/// Datasets a report view shows side by side; loading one warms the others.
const REPORT_DATASETS: [Collection; 3] = [Collection::Sales, Collection::Consignments, Collection::Visits];

const USAGE: &str = "\
Usage: clinicsync <command> [options]

Commands:
  sign-in [--token <t>] [--scheme bearer|token] [--account <name>] [--remember]
  sign-out [--account <name>]
  preload
  refresh
  show <collection>
  report <dataset> [--from YYYY-MM-DD] [--to YYYY-MM-DD]

Collections: patients, visits, pharmacy-items, sales, consignments, quick-visits
Set CLINIC_API_ORIGIN to point at another backend.";

/// Initialize the tracing subscriber for logging
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.log_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "clinicsync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Everything a command needs, wired the way the console wires it.
struct Session {
    config: Config,
    credentials: CredentialStore,
    mirror: Mirror,
    cache: Arc<ResourceCache>,
    coordinator: CacheCoordinator,
}

impl Session {
    fn open(config: Config) -> Result<Self> {
        let origin = config.resolve_origin();
        let mirror = Mirror::for_origin(&config.mirror_dir()?, &origin)?;

        let bus = SignalBus::new();
        let credentials = CredentialStore::with_mirror(bus.clone(), mirror.clone());
        let transport = Arc::new(HttpTransport::new().context("Failed to build HTTP client")?);
        let api = ClinicApi::new(Dispatcher::new(transport, &origin), credentials.clone());

        let cache = Arc::new(ResourceCache::new(api, Some(mirror.clone())));
        cache.hydrate();
        let coordinator = CacheCoordinator::new(Arc::clone(&cache), &bus);

        info!(origin = %origin, signed_in = credentials.is_present(), "Session opened");
        Ok(Self {
            config,
            credentials,
            mirror,
            cache,
            coordinator,
        })
    }

    fn require_credential(&self) -> Result<()> {
        if !self.credentials.is_present() {
            bail!("Not signed in. Run `clinicsync sign-in --token <token>` first.");
        }
        Ok(())
    }

    fn print_counts(&self) {
        for collection in Collection::ALL {
            let marker = if self.cache.is_settled(collection) { "" } else { " (stale)" };
            println!(
                "  {:<16} {:>6}{}",
                collection.display_name(),
                self.cache.get(collection).len(),
                marker
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: ignoring unreadable config: {}", e);
        Config::default()
    });
    let _guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "--help" || command == "-h" || command == "help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut session = Session::open(config)?;
    match command.as_str() {
        "sign-in" => sign_in(&mut session, rest).await,
        "sign-out" => sign_out(&mut session, rest).await,
        "preload" => preload(&mut session).await,
        "refresh" => refresh(&mut session).await,
        "show" => show(&session, rest),
        "report" => report(&mut session, rest).await,
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

async fn sign_in(session: &mut Session, args: &[String]) -> Result<()> {
    let token = flag_value(args, "--token")?;
    let account = flag_value(args, "--account")?
        .or_else(|| session.config.last_username.clone())
        .unwrap_or_else(|| "default".to_string());

    let credential = match token {
        Some(token) => {
            let schemes = match flag_value(args, "--scheme")? {
                Some(s) => {
                    let primary: Scheme = s.parse()?;
                    let mut order = vec![primary];
                    order.extend([Scheme::Bearer, Scheme::Token].into_iter().filter(|&scheme| scheme != primary));
                    order
                }
                None => Vec::new(),
            };
            Credential::with_schemes(token, schemes)
        }
        None => Keychain::recall(&account)
            .with_context(|| format!("No --token given and nothing remembered for '{}'", account))?,
    };

    if has_flag(args, "--remember") {
        Keychain::remember(&account, &credential)?;
        session.config.last_username = Some(account.clone());
        if let Err(e) = session.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    session.credentials.set(credential);
    session.coordinator.drain().await;

    if !session.credentials.is_present() {
        bail!("The backend rejected the credential");
    }
    println!("Signed in as {}.", account);
    session.print_counts();
    Ok(())
}

async fn sign_out(session: &mut Session, args: &[String]) -> Result<()> {
    session.credentials.clear();
    session.coordinator.drain().await;

    if let Some(account) = flag_value(args, "--account")? {
        if Keychain::has_credential(&account) {
            Keychain::forget(&account)?;
        } else {
            println!("Nothing remembered for '{}'.", account);
        }
        if session.config.last_username.as_deref() == Some(account.as_str()) {
            session.config.last_username = None;
            if let Err(e) = session.config.save() {
                warn!(error = %e, "Failed to save config");
            }
        }
    }
    println!("Signed out; local cache cleared.");
    Ok(())
}

async fn preload(session: &mut Session) -> Result<()> {
    session.require_credential()?;
    session.credentials.announce();
    session.coordinator.drain().await;

    if !session.credentials.is_present() {
        bail!("The backend rejected the credential; sign in again");
    }
    session.print_counts();
    Ok(())
}

async fn refresh(session: &mut Session) -> Result<()> {
    session.require_credential()?;
    let report = session.cache.refresh_all().await;
    session.coordinator.drain().await;

    for (collection, error) in &report.failed {
        log_rejection(collection.mirror_key(), error);
        eprintln!("  {} failed: {}", collection.display_name(), error);
    }
    if report.authorization_failed {
        bail!("The backend rejected the credential; sign in again");
    }
    session.print_counts();
    Ok(())
}

fn show(session: &Session, args: &[String]) -> Result<()> {
    let name = args.first().context("show needs a collection name")?;
    let collection: Collection = name.parse()?;

    let records = session.cache.get(collection);
    if !session.cache.is_settled(collection) {
        match session.mirror.load::<Vec<Record>>(collection.mirror_key()) {
            Ok(Some(mirrored)) => eprintln!(
                "(from local mirror, saved {} min ago; run `clinicsync refresh` for current data)",
                mirrored.age_minutes()
            ),
            _ => eprintln!("(nothing mirrored yet; run `clinicsync refresh`)"),
        }
    }
    println!("{}", serde_json::to_string_pretty(records.as_ref())?);
    Ok(())
}

async fn report(session: &mut Session, args: &[String]) -> Result<()> {
    session.require_credential()?;
    let name = args.first().context("report needs a dataset name")?;
    let dataset: Collection = name.parse()?;
    let range = RangeKey::from_bounds(
        flag_value(args, "--from")?.map(|d| parse_date(&d)).transpose()?,
        flag_value(args, "--to")?.map(|d| parse_date(&d)).transpose()?,
    );

    let loader = QueryLoader::new(Arc::clone(&session.cache));
    let result = loader.load(dataset, range, &REPORT_DATASETS).await;
    loader.settle_prefetch().await;
    session.coordinator.drain().await;

    let slice = match result {
        Ok(slice) => slice,
        Err(e) => {
            log_rejection("report", &e);
            return Err(e.into());
        }
    };

    let source = match slice.source {
        SliceSource::Memo => "memo",
        SliceSource::SharedCache => "shared cache",
        SliceSource::Network => "network",
        SliceSource::Superseded => "network (superseded)",
    };
    println!(
        "{} for {}: {} records ({})",
        dataset.display_name(),
        range,
        slice.records.len(),
        source
    );
    for sibling in REPORT_DATASETS.into_iter().filter(|&d| d != dataset) {
        let state = if loader.is_satisfied(sibling, &range) { "ready" } else { "not loaded" };
        println!("  {}: {}", sibling.display_name(), state);
    }
    println!("{}", serde_json::to_string_pretty(slice.records.as_ref())?);
    Ok(())
}

// ============================================================================
// Argument helpers
// ============================================================================

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn flag_value(args: &[String], flag: &str) -> Result<Option<String>> {
    match args.iter().position(|a| a == flag) {
        Some(i) => match args.get(i + 1) {
            Some(value) if !value.starts_with("--") => Ok(Some(value.clone())),
            _ => bail!("{} needs a value", flag),
        },
        None => Ok(None),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}
