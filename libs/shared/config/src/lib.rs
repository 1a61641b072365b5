use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which document store backs the scheduling cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Supabase,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" => Ok(StoreBackend::Supabase),
            "memory" | "in-memory" | "in_memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub store_backend: StoreBackend,
    pub too_soon_minutes: i64,
    pub default_consultation_minutes: i64,
    pub count_no_show: bool,
    /// Raw JSON array of professionals loaded into the in-memory store.
    pub seed_professionals: Option<String>,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            });

        let store_backend = match env::var("SCHEDULING_STORE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                warn!("{}, falling back to in-memory store", e);
                StoreBackend::Memory
            }),
            Err(_) if !supabase_url.is_empty() && !supabase_anon_key.is_empty() => StoreBackend::Supabase,
            Err(_) => {
                warn!("SCHEDULING_STORE not set and Supabase not configured, using in-memory store");
                StoreBackend::Memory
            }
        };

        let config = Self {
            supabase_url,
            supabase_anon_key,
            store_backend,
            too_soon_minutes: parse_var("SCHEDULING_TOO_SOON_MINUTES", 30),
            default_consultation_minutes: parse_var("SCHEDULING_DEFAULT_CONSULTATION_MINUTES", 60),
            count_no_show: parse_var("SCHEDULING_COUNT_NO_SHOW", true),
            seed_professionals: env::var("SCHEDULING_SEED_PROFESSIONALS")
                .ok()
                .filter(|raw| !raw.trim().is_empty()),
            port: parse_var("PORT", 3000),
        };

        if config.store_backend == StoreBackend::Supabase && !config.is_configured() {
            warn!("Supabase store selected but not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            store_backend: StoreBackend::Memory,
            too_soon_minutes: 30,
            default_consultation_minutes: 60,
            count_no_show: true,
            seed_professionals: None,
            port: 3000,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_or(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("{} has invalid value '{}', using default {}", name, raw, default);
        default
    })
}
