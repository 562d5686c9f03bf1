use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieSameSite {
    Lax,
    Strict,
    None,
}

impl CookieSameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CookieSameSite::Lax => "Lax",
            CookieSameSite::Strict => "Strict",
            CookieSameSite::None => "None",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub pool_max: u32,
    pub idle_timeout: Duration,
    pub connection_timeout: Duration,
}

#[derive(Clone)]
pub struct JwtSettings {
    pub secret: Vec<u8>,
    pub expiration_seconds: i64,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("expiration_seconds", &self.expiration_seconds)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub domain: Option<String>,
    pub same_site: CookieSameSite,
    pub secure: bool,
}

#[derive(Debug, Clone)]
pub struct SuperAdminSeed {
    pub username: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbConfig,
    pub jwt: JwtSettings,
    pub refresh_token_expiration_days: i64,
    pub cookies: CookieSettings,
    pub vroom_url: Option<String>,
    pub osrm_url: Option<String>,
    pub seed_super_admin: Option<SuperAdminSeed>,
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

pub fn load_app_config() -> Result<AppConfig> {
    let db = load_db_config()?;

    let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
    let expiration_seconds = env::var("JWT_EXPIRATION")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(900);

    let refresh_token_expiration_days = env::var("REFRESH_TOKEN_EXPIRATION_DAYS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(30);

    let cookie_domain = env::var("COOKIE_DOMAIN").ok().and_then(normalize_optional);
    let cookie_same_site = env::var("COOKIE_SAME_SITE")
        .ok()
        .map(|value| parse_same_site(&value))
        .transpose()
        .context("Failed to parse COOKIE_SAME_SITE")?
        .unwrap_or(CookieSameSite::Lax);
    // Secure by default; only a deliberate opt-out (local HTTP development)
    // turns it off.
    let cookie_secure = bool_from_env("COOKIE_SECURE").unwrap_or(true);

    let vroom_url = env::var("VROOM_URL").ok().and_then(normalize_optional);
    let osrm_url = env::var("OSRM_URL").ok().and_then(normalize_optional);

    let seed_super_admin = if bool_from_env("SEED_SUPER_ADMIN").unwrap_or(false) {
        Some(SuperAdminSeed {
            username: env::var("SUPER_ADMIN_USERNAME")
                .context("SUPER_ADMIN_USERNAME must be set when SEED_SUPER_ADMIN is true")?,
            password: env::var("SUPER_ADMIN_PASSWORD")
                .context("SUPER_ADMIN_PASSWORD must be set when SEED_SUPER_ADMIN is true")?,
            email: env::var("SUPER_ADMIN_EMAIL")
                .context("SUPER_ADMIN_EMAIL must be set when SEED_SUPER_ADMIN is true")?,
        })
    } else {
        None
    };

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(|| {
            vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ]
        });

    Ok(AppConfig {
        db,
        jwt: JwtSettings {
            secret: jwt_secret.into_bytes(),
            expiration_seconds,
        },
        refresh_token_expiration_days,
        cookies: CookieSettings {
            domain: cookie_domain,
            same_site: cookie_same_site,
            secure: cookie_secure,
        },
        vroom_url,
        osrm_url,
        seed_super_admin,
        host,
        port,
        cors_allowed_origins,
    })
}

fn load_db_config() -> Result<DbConfig> {
    let url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => compose_database_url()?,
    };

    let pool_max = env::var("DB_POOL_MAX")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(10);
    let idle_timeout_ms = env::var("DB_POOL_IDLE_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30_000);
    let connection_timeout_ms = env::var("DB_POOL_CONNECTION_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(2_000);

    Ok(DbConfig {
        url,
        pool_max,
        idle_timeout: Duration::from_millis(idle_timeout_ms),
        connection_timeout: Duration::from_millis(connection_timeout_ms),
    })
}

fn compose_database_url() -> Result<String> {
    let host = env::var("DB_HOST").context("DATABASE_URL or DB_HOST must be set")?;
    let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let username = env::var("DB_USERNAME").context("DB_USERNAME must be set")?;
    let password = env::var("DB_PASSWORD").context("DB_PASSWORD must be set")?;
    let database = env::var("DB_DATABASE").context("DB_DATABASE must be set")?;
    Ok(format!(
        "postgres://{username}:{password}@{host}:{port}/{database}"
    ))
}

fn bool_from_env(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn normalize_optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_same_site(value: &str) -> Result<CookieSameSite> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(CookieSameSite::Lax),
        "strict" => Ok(CookieSameSite::Strict),
        "none" => Ok(CookieSameSite::None),
        other => Err(anyhow!(
            "Unsupported cookie same-site policy '{other}'. Use Lax, Strict, or None."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn bool_from_env_parses_common_truthy_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("TEST_SEED_TRUE", "true");
        env::set_var("TEST_SEED_ONE", "1");
        env::set_var("TEST_SEED_FALSE", "no");
        assert_eq!(bool_from_env("TEST_SEED_TRUE"), Some(true));
        assert_eq!(bool_from_env("TEST_SEED_ONE"), Some(true));
        assert_eq!(bool_from_env("TEST_SEED_FALSE"), Some(false));
        env::remove_var("TEST_SEED_TRUE");
        env::remove_var("TEST_SEED_ONE");
        env::remove_var("TEST_SEED_FALSE");
    }

    #[test]
    fn composes_database_url_from_parts_when_database_url_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("DATABASE_URL");
        env::set_var("DB_HOST", "localhost");
        env::set_var("DB_PORT", "5433");
        env::set_var("DB_USERNAME", "svc");
        env::set_var("DB_PASSWORD", "pw");
        env::set_var("DB_DATABASE", "routing");
        let db = load_db_config().expect("composed url");
        assert_eq!(db.url, "postgres://svc:pw@localhost:5433/routing");
        env::remove_var("DB_HOST");
        env::remove_var("DB_PORT");
        env::remove_var("DB_USERNAME");
        env::remove_var("DB_PASSWORD");
        env::remove_var("DB_DATABASE");
    }

    #[test]
    fn rejects_unsupported_same_site_policy() {
        assert!(parse_same_site("banana").is_err());
    }
}
