// Ent Database demo - builds the design tool entities and runs one scenario

use ent_database::{
    config::{init_tracing, Config},
    domains::{
        self,
        design_tool::{system_element, NewSystemElement, SystemElementType, SystemElementUpdate},
    },
    ent_framework::Update,
    infrastructure::{InstrumentedDatabase, SqliteDatabase},
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    init_tracing(&config.logging);

    // Connect and bootstrap tables
    let sqlite = SqliteDatabase::connect(&config.database).await?;
    sqlite.health_check().await?;
    let (db, stats) = InstrumentedDatabase::wrap(sqlite.into_database());
    domains::ensure_all_tables(&db).await?;

    let elements = system_element()?;

    let created = elements
        .actions
        .create
        .call(&db, NewSystemElement::new("Checkout", SystemElementType::System))
        .await?;
    info!(id = %created.id, "Created element");

    let mut change = SystemElementUpdate::from(&created);
    change.technologies = vec!["Postgres".to_string(), "Redis".to_string()];
    elements
        .actions
        .update
        .call(&db, Update::new(created.id.clone(), change))
        .await?;

    for element in elements.queries.query_all.call(&db, ()).await? {
        let technologies: Vec<&str> = element.technologies.iter().map(|t| t.name.as_str()).collect();
        println!("{} ({:?}): {}", element.name, element.element_type, technologies.join(", "));
    }

    info!(
        statements = stats.total(),
        relation_joins = stats.count("relation_join"),
        "Scenario finished"
    );
    Ok(())
}
