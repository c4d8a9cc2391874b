use anyhow::Result;
use kest_migrate::{CreatedMigration, CreatorOptions, MigrationCreator};

use super::output;
use crate::config::CliConfig;

pub fn migration(
    config: &CliConfig,
    name: &str,
    create: Option<String>,
    table: Option<String>,
) -> Result<()> {
    let creator = MigrationCreator::from_config(&config.migration_config());
    let created = creator.create(name, &CreatorOptions { create, table })?;

    output::success(format!("Created migration: {}", created.path.display()));
    println!("{}", registration_hint(&created));
    Ok(())
}

/// Lines to paste into `migrations/mod.rs`
fn registration_hint(created: &CreatedMigration) -> String {
    let module = created.filename.trim_end_matches(".rs");
    format!(
        "Register it in migrations/mod.rs:\n    mod {module};\n    unit({module}::NAME, {module}::{}),",
        created.struct_name
    )
}
