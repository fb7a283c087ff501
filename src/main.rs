use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use clinic_site::availability::{AvailabilityRegistry, BookableService, YearMonth, ZohoClient};
use clinic_site::booking::BookingService;
use clinic_site::config::{self, Secret, Secrets, SiteConfig};
use clinic_site::grid::{self, GridOptions};
use clinic_site::kv::{ConsentState, FileStore, KeyValueStore, MemoryStore, Preferences};
use clinic_site::output;
use clinic_site::payment::StripeClient;
use clinic_site::reconcile::derive_candidates;
use clinic_site::scan::{self, RouteManifest};
use clinic_site::server::{self, AppState};
use clinic_site::store::{ReviewStore, SupabaseClient};
use clinic_site::sync::{self, SyncOptions};
use clinic_site::types::{Review, ServiceKey};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinic-site")]
#[command(about = "Back-office tools for the clinic website")]
#[command(long_about = "\
Back-office tools for the clinic website

Keeps the pages table in step with the route tree, lays out the daily review
grid, loads appointment availability and serves the booking endpoints.

Project structure:

  project/
  ├── site.toml                    # Config (optional; see gen-config)
  ├── .env                         # Credentials (SUPABASE_URL, ZOHO_ACCESS_TOKEN, ...)
  └── app/                         # Route tree
      ├── [lang]/                  # Replaced by each language code
      │   ├── page.tsx             # → nl, en
      │   ├── (marketing)/         # Group: not part of the slug
      │   │   └── over-ons/page.tsx  # → nl/over-ons, en/over-ons
      │   └── blog/[slug]/page.tsx # Dynamic: skipped
      └── admin/page.tsx           # Excluded by pages.excluded

Run 'clinic-site gen-config' to generate a documented site.toml.")]
#[command(version)]
struct Cli {
    /// Project directory holding site.toml and the route tree
    #[arg(long, default_value = ".", global = true)]
    project: PathBuf,

    /// Log debug output
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Log errors only
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List routes and the page slugs they produce
    Scan {
        /// Write the route manifest as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Create and adopt page rows for every route
    SyncPages {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lay out the review grid for a day
    Grid {
        /// Day to lay out (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Read reviews from a JSON file instead of the database
        #[arg(long)]
        input: Option<PathBuf>,
        /// Print the grid as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load appointment availability for a month
    Availability {
        /// Service key, e.g. consult:amsterdam
        #[arg(long)]
        service: ServiceKey,
        /// Month (YYYY-MM); defaults to the current month
        #[arg(long)]
        month: Option<YearMonth>,
        /// Store the fetched days in the availability table
        #[arg(long)]
        persist: bool,
    },
    /// Serve the admin and booking HTTP endpoints
    Serve,
    /// Show or change the local visitor preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsAction>,
    },
    /// Print a stock site.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Print every stored preference
    Show,
    /// Record the cookie banner answer
    Consent { answer: ConsentArg },
    /// Turn staff mode on or off
    StaffMode {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Mark the visitor as returning
    Visited,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConsentArg {
    Accept,
    Reject,
}

impl From<ConsentArg> for ConsentState {
    fn from(arg: ConsentArg) -> Self {
        match arg {
            ConsentArg::Accept => ConsentState::Accepted,
            ConsentArg::Reject => ConsentState::Rejected,
        }
    }
}

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let site_config = config::load_config(&cli.project)?;
    let secrets = Secrets::from_env();

    match cli.command {
        Command::Scan { output: manifest_path } => {
            let manifest = scan_routes(&cli.project, &site_config)?;
            if let Some(path) = manifest_path {
                manifest.save(&path)?;
            }
            let candidates =
                derive_candidates(&manifest, &site_config.site.languages, &site_config.pages);
            output::print_scan_output(
                &manifest,
                &candidates,
                &site_config.pages.language_placeholder,
            );
        }
        Command::SyncPages { dry_run, json } => {
            let manifest = scan_routes(&cli.project, &site_config)?;
            let db = database(&site_config, &secrets)?;
            let options = SyncOptions {
                dry_run,
                error_log: Some(cli.project.join(&site_config.pages.error_log)),
            };
            let report = sync::sync_pages(&manifest, &site_config, &db, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                output::print_sync_report(&report);
            }
        }
        Command::Grid { date, input, json } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let reviews: Vec<Review> = match input {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => database(&site_config, &secrets)?.fetch_reviews().await?,
            };
            let cells = grid::generate_grid(&reviews, date, GridOptions::from(&site_config.grid));
            if json {
                println!("{}", serde_json::to_string_pretty(&cells)?);
            } else {
                output::print_grid(&cells, date);
            }
        }
        Command::Availability {
            service,
            month,
            persist,
        } => {
            let today = chrono::Local::now().date_naive();
            let month = month.unwrap_or_else(|| YearMonth::of(today));
            let bookable = BookableService::from_config(&site_config, &service)?;
            let zoho = ZohoClient::new(
                &site_config.booking,
                secrets.require(Secret::ZohoAccessToken)?,
            )?;
            let registry = AvailabilityRegistry::new(
                Arc::new(zoho),
                Arc::new(MemoryStore::new()),
                site_config.booking.chunk_days,
            );
            let cache = registry.cache(&bookable);
            cache.load_month(month, today).await?.finish().await;

            if persist {
                let db = database(&site_config, &secrets)?;
                let rows = cache.persist(&db).await?;
                tracing::info!(rows, "stored availability");
            }
            let days = cache.month_summary(month).await;
            output::print_availability(&service, &month.to_string(), &days);
        }
        Command::Serve => {
            let state = app_state(&cli.project, site_config, &secrets)?;
            server::run(state).await?;
        }
        Command::Prefs { action } => {
            let prefs = Preferences::new(FileStore::new(
                cli.project.join(&site_config.site.preferences_file),
            ));
            match action.unwrap_or(PrefsAction::Show) {
                PrefsAction::Show => {}
                PrefsAction::Consent { answer } => prefs.set_consent(answer.into())?,
                PrefsAction::StaffMode { enabled } => prefs.set_staff_mode(enabled)?,
                PrefsAction::Visited => prefs.mark_visited()?,
            }
            let store = prefs.store();
            let mut entries = Vec::new();
            for key in store.keys()? {
                if let Some(value) = store.get(&key)? {
                    entries.push((key, value));
                }
            }
            output::print_preferences(&entries);
        }
        Command::GenConfig => {}
    }

    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("CLINIC_SITE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("failed to initialize tracing subscriber: {e}"))?;
    Ok(())
}

fn scan_routes(project: &Path, config: &SiteConfig) -> Result<RouteManifest, scan::ScanError> {
    scan::scan(&project.join(&config.pages.root), &config.pages.marker_file)
}

fn database(config: &SiteConfig, secrets: &Secrets) -> Result<SupabaseClient, Box<dyn std::error::Error>> {
    Ok(SupabaseClient::new(
        secrets.supabase_url(&config.supabase)?,
        secrets.require(Secret::SupabaseServiceKey)?,
        config.supabase.clone(),
    )?)
}

/// Wire the real clients into the server state.
fn app_state(
    project: &Path,
    config: SiteConfig,
    secrets: &Secrets,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let db = Arc::new(database(&config, secrets)?);
    let zoho = Arc::new(ZohoClient::new(
        &config.booking,
        secrets.require(Secret::ZohoAccessToken)?,
    )?);
    let stripe = Arc::new(StripeClient::new(
        config.payment.clone(),
        secrets.require(Secret::StripeSecretKey)?,
    )?);
    let admin_secret = secrets
        .require(Secret::AdminApiSecret)
        .ok()
        .map(str::to_string);
    if admin_secret.is_none() {
        tracing::warn!("ADMIN_API_SECRET is not set; page sync endpoint is disabled");
    }

    let registry = Arc::new(AvailabilityRegistry::new(
        zoho.clone(),
        Arc::new(MemoryStore::new()),
        config.booking.chunk_days,
    ));
    let config = Arc::new(config);
    let booking = Arc::new(BookingService::new(
        Arc::clone(&config),
        stripe,
        zoho,
        db.clone(),
        db.clone(),
        Arc::clone(&registry),
    ));

    Ok(AppState {
        config,
        root: project.to_path_buf(),
        admin_secret,
        pages: db,
        availability: registry,
        booking,
    })
}
