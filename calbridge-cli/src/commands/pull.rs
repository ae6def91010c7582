use std::path::Path;

use anyhow::{Context, Result};
use calbridge_core::ics::parse_events;
use calbridge_core::{CollectingLogger, HostCalendarItem, LocalItemHandle};
use chrono::Utc;

use crate::commands::{read_file, write_output};
use crate::render::Render;
use crate::settings::Settings;

pub async fn run(
    settings: &Settings,
    ics_path: &Path,
    item_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let logger = CollectingLogger::new();
    let events = parse_events(&read_file(ics_path)?, &logger)?;
    if events.is_empty() {
        anyhow::bail!("{} contains no events", ics_path.display());
    }

    let mapper = settings.mapper(&logger).await;

    let item = match item_path {
        Some(path) => serde_json::from_str(&read_file(path)?)
            .with_context(|| format!("{} is not a host item", path.display()))?,
        None => {
            let now = Utc::now().naive_utc();
            HostCalendarItem::new(events[0].uid.clone(), now, now, "UTC")
        }
    };

    let mut handle = LocalItemHandle::new(item);
    mapper.map_inbound(&events, &mut handle, &logger).await?;
    let item = handle.into_inner();

    let json = serde_json::to_string_pretty(&item)?;
    write_output(output, &format!("{json}\n"))?;
    eprintln!("{}", item.render());
    if !logger.is_empty() {
        eprintln!("{}", logger.render());
    }

    Ok(())
}
