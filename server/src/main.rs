//! Serves the resource definitions in `RESOURCES_DIR` over HTTP.
//!
//! Run from repo root: `cargo run -p resource-sql-server`

use resource_sql::service::RoleAuthorizer;
use resource_sql::{
    app, dialect_for, load_definitions, load_privileges, AppState, MetaDataRegistry,
    PgPoolProvider, ResourceService, Settings,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_sql=info")),
        )
        .init();

    let settings = Settings::from_env();
    let dialect = dialect_for(&settings.dialect)
        .ok_or_else(|| format!("unsupported SQL_DIALECT {}", settings.dialect))?;
    if !PgPoolProvider::supports(dialect.as_ref()) {
        return Err(format!(
            "SQL_DIALECT {} has no connection provider; this server connects to postgres only",
            settings.dialect
        )
        .into());
    }
    let definitions = load_definitions(&settings.resources_dir).await?;
    tracing::info!(
        count = definitions.len(),
        dir = %settings.resources_dir.display(),
        "loaded resource definitions"
    );
    let registry = MetaDataRegistry::new(definitions, dialect)?;
    let provider = PgPoolProvider::connect(&settings.database_url, settings.max_connections).await?;

    let mut service = ResourceService::new(Arc::new(registry), Arc::new(provider));
    if let Some(path) = &settings.privileges_file {
        let privileges = load_privileges(path).await?;
        tracing::info!(count = privileges.len(), "role authorization enabled");
        service = service.with_authorizer(Arc::new(RoleAuthorizer::new(privileges)));
    }

    let bind_addr = settings.bind_addr.clone();
    let router = app(AppState::new(service, settings));
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
