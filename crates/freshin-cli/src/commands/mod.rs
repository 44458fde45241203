//! CLI command implementations.

pub mod ledger;
pub mod route;

use anyhow::Result;
use freshin_core::routing::RoutingTables;
use freshin_core::Config;

/// Check that the configuration and its routing tables load.
pub fn validate(config: &Config) -> Result<()> {
    config.validate()?;
    let tables = RoutingTables::load(config.routing.tables_path.as_deref())?;
    println!(
        "Routing tables: {} sources, precedence {}",
        tables.source_names().count(),
        tables
            .precedence()
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    );
    Ok(())
}
