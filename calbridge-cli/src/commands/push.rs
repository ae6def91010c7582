use std::path::Path;

use anyhow::{Context, Result};
use calbridge_core::ics::{generate_ics, parse_events};
use calbridge_core::{CollectingLogger, HostCalendarItem};

use crate::commands::{read_file, write_output};
use crate::render::Render;
use crate::settings::Settings;

pub async fn run(
    settings: &Settings,
    item_path: &Path,
    existing: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let item: HostCalendarItem = serde_json::from_str(&read_file(item_path)?)
        .with_context(|| format!("{} is not a host item", item_path.display()))?;

    let logger = CollectingLogger::new();
    let existing = match existing {
        Some(path) => Some(parse_events(&read_file(path)?, &logger)?),
        None => None,
    };

    let mapper = settings.mapper(&logger).await;
    let group = mapper
        .map_outbound(&item, existing.as_deref(), &logger)
        .await?;
    let ics = generate_ics(&group)?;

    write_output(output, &ics)?;
    eprintln!("{}", group.render());
    if !logger.is_empty() {
        eprintln!("{}", logger.render());
    }

    Ok(())
}
