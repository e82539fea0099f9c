//! `tripload plan`: show what a run would transfer, without transferring.

use anyhow::Result;
use std::path::Path;
use tripload_core::config::TriploadConfig;
use tripload_core::dataset::WorkItem;
use tripload_core::locator::Locator;
use tripload_core::store;

use super::apply_dataset_overrides;
use crate::cli::DatasetArgs;

pub fn run_plan(cfg: &TriploadConfig, args: &DatasetArgs) -> Result<()> {
    let mut cfg = cfg.clone();
    apply_dataset_overrides(&mut cfg, args);
    let locator = cfg.locator()?;
    let items = WorkItem::expand(args.kind, args.year, &args.months)?;

    for line in plan_lines(&locator, &cfg.download_dir(), &cfg.destination.prefix, &items) {
        println!("{line}");
    }
    Ok(())
}

/// One `url -> local path -> object key` line per item.
pub(crate) fn plan_lines(locator: &Locator, download_dir: &Path, prefix: &str, items: &[WorkItem]) -> Vec<String> {
    let format = locator.format();
    items
        .iter()
        .map(|item| {
            format!(
                "{} -> {} -> {}",
                locator.url_for(item),
                download_dir.join(item.file_name(format)).display(),
                store::object_key(prefix, item, format)
            )
        })
        .collect()
}
