//! Site configuration module.
//!
//! Handles loading, validating, and merging `site.toml`. Stock defaults are
//! serialized to a TOML table and the user file is merged on top of it, so a
//! project file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! languages = ["nl", "en"]
//! default_language = "nl"
//! preferences_file = ".clinic-site/preferences.json"
//!
//! [pages]
//! root = "app"
//! marker_file = "page.tsx"
//! language_placeholder = "[lang]"
//! excluded = ["/admin", "/api/"]
//! default_status = "draft"
//! adopt_unprefixed_slugs = true
//! error_log = "page-sync-error.log"
//!
//! [supabase]
//! url = ""                  # or SUPABASE_URL
//! pages_table = "pages"
//! reviews_table = "reviews"
//! availability_table = "availability_slots"
//! booking_intents_table = "booking_intents"
//!
//! [grid]
//! featured_slots = 6
//! big_interval = 3
//!
//! [booking]
//! api_base = "https://www.zohoapis.eu/bookings/v1/json"
//! timezone = "Europe/Amsterdam"
//! chunk_days = 5
//!
//! [booking.services."consult:amsterdam"]
//! service_id = "4500000000001"
//! staff_id = "4500000000002"
//!
//! [payment]
//! api_base = "https://api.stripe.com/v1"
//! currency = "eur"
//! deposit_cents = 5000
//! product_name = "Consultation deposit"
//! success_url = "https://example.com/{lang}/booking/success?session_id={CHECKOUT_SESSION_ID}"
//! cancel_url = "https://example.com/{lang}/booking"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! ```
//!
//! ## Secrets
//!
//! Credentials are never read from `site.toml`. They come from the process
//! environment, optionally seeded from a `.env` file; see [`Secrets`].
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the project config file.
pub const CONFIG_FILENAME: &str = "site.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Missing secret: set {0} in the environment or .env")]
    MissingSecret(&'static str),
    #[error("Unknown service '{0}': add it under [booking.services]")]
    UnknownService(String),
}

/// Site configuration loaded from `site.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Languages and local state.
    pub site: SiteSection,
    /// Route scanning and slug reconciliation.
    pub pages: PagesConfig,
    /// Hosted database endpoint and table names.
    pub supabase: SupabaseConfig,
    /// Review mosaic layout.
    pub grid: GridConfig,
    /// Scheduling API and bookable services.
    pub booking: BookingConfig,
    /// Checkout settings.
    pub payment: PaymentConfig,
    /// Admin HTTP server.
    pub server: ServerConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.languages.is_empty() {
            return Err(ConfigError::Validation(
                "site.languages must not be empty".into(),
            ));
        }
        if !self.site.languages.contains(&self.site.default_language) {
            return Err(ConfigError::Validation(format!(
                "site.default_language '{}' is not one of site.languages",
                self.site.default_language
            )));
        }
        if self.pages.marker_file.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pages.marker_file must not be empty".into(),
            ));
        }
        if self.pages.language_placeholder.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pages.language_placeholder must not be empty".into(),
            ));
        }
        if self.grid.big_interval == 0 {
            return Err(ConfigError::Validation(
                "grid.big_interval must be at least 1".into(),
            ));
        }
        if self.booking.chunk_days == 0 {
            return Err(ConfigError::Validation(
                "booking.chunk_days must be at least 1".into(),
            ));
        }
        for key in self.booking.services.keys() {
            if key.parse::<crate::types::ServiceKey>().is_err() {
                return Err(ConfigError::Validation(format!(
                    "booking.services key '{key}' must look like type:location"
                )));
            }
        }
        if self.payment.deposit_cents == 0 {
            return Err(ConfigError::Validation(
                "payment.deposit_cents must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Look up the scheduling ids configured for a service key.
    pub fn service(&self, key: &str) -> Result<&ServiceConfig, ConfigError> {
        self.booking
            .services
            .get(key)
            .ok_or_else(|| ConfigError::UnknownService(key.to_string()))
    }
}

/// Languages and local state files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSection {
    /// Language codes every route is published in.
    pub languages: Vec<String>,
    /// Language used when a request does not name one.
    pub default_language: String,
    /// JSON file backing the persistent preference store.
    pub preferences_file: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            languages: vec!["nl".to_string(), "en".to_string()],
            default_language: "nl".to_string(),
            preferences_file: ".clinic-site/preferences.json".to_string(),
        }
    }
}

/// Route scanning and slug reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagesConfig {
    /// Directory holding the route tree, relative to the project root.
    pub root: String,
    /// Filename marking a directory as a routable page.
    pub marker_file: String,
    /// Directory name replaced by each language code.
    pub language_placeholder: String,
    /// Substrings of `/{slug}/` that exclude a page from the table.
    pub excluded: Vec<String>,
    /// `status` given to newly inserted rows.
    pub default_status: String,
    /// Retry slug matches with the `{language}/` prefix stripped, to adopt
    /// rows seeded without language prefixes.
    pub adopt_unprefixed_slugs: bool,
    /// File that receives error chains when a sync run aborts.
    pub error_log: String,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            root: "app".to_string(),
            marker_file: "page.tsx".to_string(),
            language_placeholder: "[lang]".to_string(),
            excluded: vec!["/admin".to_string(), "/api/".to_string()],
            default_status: "draft".to_string(),
            adopt_unprefixed_slugs: true,
            error_log: "page-sync-error.log".to_string(),
        }
    }
}

/// Hosted database settings. The service key comes from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`. `SUPABASE_URL` wins.
    pub url: String,
    pub pages_table: String,
    pub reviews_table: String,
    pub availability_table: String,
    pub booking_intents_table: String,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pages_table: "pages".to_string(),
            reviews_table: "reviews".to_string(),
            availability_table: "availability_slots".to_string(),
            booking_intents_table: "booking_intents".to_string(),
        }
    }
}

/// Review mosaic settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Number of leading cells where featured items take priority.
    pub featured_slots: usize,
    /// Every n-th cell is a big one.
    pub big_interval: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            featured_slots: 6,
            big_interval: 3,
        }
    }
}

/// Scheduling API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookingConfig {
    /// Base URL of the scheduling JSON API.
    pub api_base: String,
    /// Timezone sent with availability and appointment requests.
    pub timezone: String,
    /// Days fetched per availability chunk.
    pub chunk_days: usize,
    /// Upstream ids per `type:location` service key.
    pub services: BTreeMap<String, ServiceConfig>,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.zohoapis.eu/bookings/v1/json".to_string(),
            timezone: "Europe/Amsterdam".to_string(),
            chunk_days: 5,
            services: BTreeMap::new(),
        }
    }
}

/// Upstream identifiers for one bookable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub service_id: String,
    pub staff_id: String,
}

/// Checkout settings. The secret key comes from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaymentConfig {
    pub api_base: String,
    pub currency: String,
    /// Fixed deposit charged at checkout, in the currency's minor unit.
    pub deposit_cents: u64,
    pub product_name: String,
    /// `{lang}` is substituted; `{CHECKOUT_SESSION_ID}` is left for the
    /// payment provider.
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com/v1".to_string(),
            currency: "eur".to_string(),
            deposit_cents: 5000,
            product_name: "Consultation deposit".to_string(),
            success_url:
                "https://example.com/{lang}/booking/success?session_id={CHECKOUT_SESSION_ID}"
                    .to_string(),
            cancel_url: "https://example.com/{lang}/booking".to_string(),
        }
    }
}

/// Admin HTTP server bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Secrets
// =============================================================================

/// A credential read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Secret {
    SupabaseServiceKey,
    ZohoAccessToken,
    StripeSecretKey,
    AdminApiSecret,
}

impl Secret {
    pub fn env_var(self) -> &'static str {
        match self {
            Secret::SupabaseServiceKey => "SUPABASE_SERVICE_ROLE_KEY",
            Secret::ZohoAccessToken => "ZOHO_ACCESS_TOKEN",
            Secret::StripeSecretKey => "STRIPE_SECRET_KEY",
            Secret::AdminApiSecret => "ADMIN_API_SECRET",
        }
    }
}

/// Credentials and endpoint overrides taken from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub supabase_url: Option<String>,
    values: BTreeMap<&'static str, String>,
}

impl Secrets {
    /// Read secrets from the process environment after loading `.env` if one
    /// exists. Empty values count as unset.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "ignoring unreadable .env file");
        }
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut values = BTreeMap::new();
        for secret in [
            Secret::SupabaseServiceKey,
            Secret::ZohoAccessToken,
            Secret::StripeSecretKey,
            Secret::AdminApiSecret,
        ] {
            if let Some(value) = read(secret.env_var()) {
                values.insert(secret.env_var(), value);
            }
        }
        Self {
            supabase_url: read("SUPABASE_URL"),
            values,
        }
    }

    /// Build a set of secrets directly, for tests and embedding.
    pub fn with(mut self, secret: Secret, value: impl Into<String>) -> Self {
        self.values.insert(secret.env_var(), value.into());
        self
    }

    /// Fetch a required secret.
    pub fn require(&self, secret: Secret) -> Result<&str, ConfigError> {
        self.values
            .get(secret.env_var())
            .map(String::as_str)
            .ok_or(ConfigError::MissingSecret(secret.env_var()))
    }

    /// The database URL: environment override first, then `supabase.url`.
    pub fn supabase_url<'a>(&'a self, config: &'a SupabaseConfig) -> Result<&'a str, ConfigError> {
        match self.supabase_url.as_deref() {
            Some(url) => Ok(url),
            None if !config.url.trim().is_empty() => Ok(config.url.as_str()),
            None => Err(ConfigError::MissingSecret("SUPABASE_URL")),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `site.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `site.toml` in the given directory, falling back to the
/// stock defaults when the file is absent.
pub fn load_config(dir: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `site.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# clinic-site configuration
# =========================
# All settings are optional. Values shown below are the defaults.
# Credentials are NOT configured here; set them in the environment or .env:
#   SUPABASE_URL, SUPABASE_SERVICE_ROLE_KEY, ZOHO_ACCESS_TOKEN,
#   STRIPE_SECRET_KEY, ADMIN_API_SECRET
# Unknown keys will cause an error.

[site]
# Language codes every route is published in.
languages = ["nl", "en"]
default_language = "nl"
# Persistent preference store (consent, staff mode, visited flag).
preferences_file = ".clinic-site/preferences.json"

# ---------------------------------------------------------------------------
# Page sync
# ---------------------------------------------------------------------------
[pages]
# Route tree, one marker file per page directory.
root = "app"
marker_file = "page.tsx"
# Directory name replaced by the language code. (group) directories are
# dropped from URLs; [param] directories cannot be enumerated and are skipped.
language_placeholder = "[lang]"
# A page is skipped when "/<slug>/" contains any of these.
excluded = ["/admin", "/api/"]
# Status of newly inserted rows.
default_status = "draft"
# Adopt legacy rows whose slug lacks the "<lang>/" prefix. This is a
# heuristic: two unrelated pages can collide once the prefix is stripped.
adopt_unprefixed_slugs = true
# Error chains of aborted sync runs are appended here.
error_log = "page-sync-error.log"

# ---------------------------------------------------------------------------
# Database
# ---------------------------------------------------------------------------
[supabase]
# Project URL; SUPABASE_URL overrides it.
url = ""
pages_table = "pages"
reviews_table = "reviews"
availability_table = "availability_slots"
booking_intents_table = "booking_intents"

# ---------------------------------------------------------------------------
# Review mosaic
# ---------------------------------------------------------------------------
[grid]
# Leading cells where featured reviews take priority.
featured_slots = 6
# Every n-th cell is big (2x2 or 1x2).
big_interval = 3

# ---------------------------------------------------------------------------
# Scheduling
# ---------------------------------------------------------------------------
[booking]
api_base = "https://www.zohoapis.eu/bookings/v1/json"
timezone = "Europe/Amsterdam"
# Days per availability request batch.
chunk_days = 5

# One table per bookable service, keyed "type:location":
# [booking.services."consult:amsterdam"]
# service_id = "4500000000001"
# staff_id = "4500000000002"

# ---------------------------------------------------------------------------
# Checkout
# ---------------------------------------------------------------------------
[payment]
api_base = "https://api.stripe.com/v1"
currency = "eur"
# Fixed deposit in cents.
deposit_cents = 5000
product_name = "Consultation deposit"
# {lang} is replaced; {CHECKOUT_SESSION_ID} is filled in by the provider.
success_url = "https://example.com/{lang}/booking/success?session_id={CHECKOUT_SESSION_ID}"
cancel_url = "https://example.com/{lang}/booking"

# ---------------------------------------------------------------------------
# Admin server
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"
port = 8080
"##
}
