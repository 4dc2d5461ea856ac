//! MongoDB connection handling.

use std::time::Duration;

use anyhow::Result;
use mongodb::{bson::doc, options::ClientOptions, Client, Database};

/// Connect and verify the server is reachable before handing the database out.
pub async fn connect(url: &str, database_name: &str, timeout: Duration) -> Result<Database> {
    let mut options = ClientOptions::parse(url).await?;
    options.server_selection_timeout = Some(timeout);

    let client = Client::with_options(options)?;
    let database = client.database(database_name);
    database.run_command(doc! {"ping": 1}, None).await?;

    tracing::info!("Connected to MongoDB database '{}'", database_name);
    Ok(database)
}

pub async fn health_check(database: &Database) -> Result<()> {
    database.run_command(doc! {"ping": 1}, None).await?;
    Ok(())
}
