use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub confirm_ttl_hours: i64,
    pub reset_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub url: Option<String>,
    pub user_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL embedded into confirmation and reset links.
    pub base_url: String,
    /// Reject login for users that have not confirmed their email.
    pub require_confirmed_login: bool,
    pub jwt: JwtConfig,
    pub s3: S3Config,
    pub cache: CacheConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        let require_confirmed_login = std::env::var("REQUIRE_CONFIRMED_LOGIN")
            .map(|v| v != "false")
            .unwrap_or(true);

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "contacthub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "contacthub-users".into()),
            access_ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            confirm_ttl_hours: std::env::var("CONFIRM_TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(24 * 7),
            reset_ttl_hours: std::env::var("RESET_TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(1),
        };

        let s3 = S3Config {
            endpoint: std::env::var("S3_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "contacthub".into()),
            access_key: std::env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "minioadmin".into()),
            secret_key: std::env::var("S3_SECRET_KEY").unwrap_or_else(|_| "minioadmin".into()),
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };

        let cache = CacheConfig {
            url: std::env::var("REDIS_URL").ok(),
            user_ttl_seconds: std::env::var("REDIS_USER_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(900),
        };

        Ok(Self {
            database_url,
            base_url,
            require_confirmed_login,
            jwt,
            s3,
            cache,
        })
    }
}
