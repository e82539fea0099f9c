//! CLI command handlers, one file per subcommand.

mod plan;
mod run;

pub use plan::run_plan;
pub use run::run_pipeline;

#[cfg(test)]
pub(crate) use plan::plan_lines;
#[cfg(test)]
pub(crate) use run::{apply_overrides, build_pipeline};

use tripload_core::config::TriploadConfig;

use super::DatasetArgs;

/// Flags shared by every subcommand override the config file.
pub(crate) fn apply_dataset_overrides(cfg: &mut TriploadConfig, args: &DatasetArgs) {
    if let Some(origin) = args.origin {
        cfg.origin = origin;
    }
    if let Some(prefix) = &args.prefix {
        cfg.destination.prefix = prefix.clone();
    }
}
