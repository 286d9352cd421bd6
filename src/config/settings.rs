//! Process settings from environment variables.

use std::path::PathBuf;

pub const DEFAULT_LIMIT_PARAM: &str = "_limit";
pub const DEFAULT_OFFSET_PARAM: &str = "_offset";

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub resources_dir: PathBuf,
    pub bind_addr: String,
    pub max_connections: u32,
    /// `postgres`, `mysql` or `oracle`. Only `postgres` has a connection provider; the
    /// MySQL and Oracle dialects build statements for callers that bring their own.
    pub dialect: String,
    pub limit_param: String,
    pub offset_param: String,
    pub privileges_file: Option<PathBuf>,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/sakila".into(),
            resources_dir: PathBuf::from("resources"),
            bind_addr: "0.0.0.0:3000".into(),
            max_connections: 5,
            dialect: "postgres".into(),
            limit_param: DEFAULT_LIMIT_PARAM.into(),
            offset_param: DEFAULT_OFFSET_PARAM.into(),
            privileges_file: None,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl Settings {
    /// Read settings from the environment, loading `.env` first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Settings::default();
        Settings {
            database_url: lookup("DATABASE_URL").unwrap_or(d.database_url),
            resources_dir: lookup("RESOURCES_DIR").map(PathBuf::from).unwrap_or(d.resources_dir),
            bind_addr: lookup("BIND_ADDR").unwrap_or(d.bind_addr),
            max_connections: lookup("MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.max_connections),
            dialect: lookup("SQL_DIALECT").unwrap_or(d.dialect),
            limit_param: lookup("LIMIT_PARAM").unwrap_or(d.limit_param),
            offset_param: lookup("OFFSET_PARAM").unwrap_or(d.offset_param),
            privileges_file: lookup("PRIVILEGES_FILE").filter(|s| !s.is_empty()).map(PathBuf::from),
            body_limit_bytes: lookup("BODY_LIMIT_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(d.body_limit_bytes),
        }
    }
}
