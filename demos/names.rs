//! Wait for Postgres, then store and list a few names.
//!
//! Connection settings come from the environment (`DATABASE_URL` or
//! `PGHOST`/`PGUSER`/`PGPASSWORD`/`PGDATABASE`), the retry budget from
//! `BOOTSTRAP_MAX_ATTEMPTS` and `BOOTSTRAP_BACKOFF_MS`.
//!
//! ```text
//! PGHOST=db PGUSER=root PGPASSWORD=rootroot PGDATABASE=userinfo \
//!     RUST_LOG=pg_bootstrap=debug cargo run --example names
//! ```

use pg_bootstrap::connection::quote_literal;
use pg_bootstrap::{with_connection, BootstrapSettings, SimpleQueryMessage};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const NEW_NAMES: [&str; 2] = ["Khushi", "Alice"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "names=info,pg_bootstrap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = BootstrapSettings::from_env()?;
    let (config, policy) = settings.into_parts()?;

    let names = with_connection(&config, &policy, |conn| {
        Box::pin(async move {
            conn.simple_query(
                "CREATE TABLE IF NOT EXISTS names (id SERIAL PRIMARY KEY, name VARCHAR(255))",
            )
            .await?;

            for name in NEW_NAMES {
                let sql = format!("INSERT INTO names (name) VALUES ({})", quote_literal(name));
                conn.simple_query(&sql).await?;
            }

            let names = conn
                .simple_query("SELECT name FROM names ORDER BY id")
                .await?
                .into_iter()
                .filter_map(|msg| match msg {
                    SimpleQueryMessage::Row(row) => row.get(0).map(str::to_owned),
                    SimpleQueryMessage::CommandComplete(_) => None,
                })
                .collect::<Vec<_>>();
            Ok(names)
        })
    })
    .await?;

    println!("Names in database: {:?}", names);
    Ok(())
}
