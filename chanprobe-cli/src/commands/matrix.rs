//! `chanprobe matrix` command handler

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use chanprobe_core::config::ChanprobeConfig;
use chanprobe_harness::{PlanEntry, plan_matrix};

use crate::cli::MatrixArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `matrix` command.
///
/// Lists every cell of the selected matrix in execution order together with
/// the resource names it would create. Nothing is provisioned.
pub async fn execute(
    args: MatrixArgs,
    config: &ChanprobeConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let selection = super::select(config, &args.selection)?;
    let plan = plan_matrix(&selection.channels, &selection.versions, &selection.options);

    let listing = MatrixListing {
        test_name: selection.options.test_name.clone(),
        encoding: selection.options.encoding.to_string(),
        api_version: selection.options.api_version.to_string(),
        runnable: plan.iter().filter(|e| e.skip.is_none()).count(),
        cells: plan,
    };
    writer.render(&listing)?;
    Ok(())
}

/// Planned matrix listing.
#[derive(Serialize)]
pub struct MatrixListing {
    /// Resource name prefix
    pub test_name: String,
    /// Event encoding
    pub encoding: String,
    /// Subscription target policy
    pub api_version: String,
    /// Cells that would run
    pub runnable: usize,
    /// All cells in execution order
    pub cells: Vec<PlanEntry>,
}

impl Render for MatrixListing {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            w,
            "Matrix: {} ({} encoding, target {})",
            self.test_name.bold(),
            self.encoding,
            self.api_version
        )?;
        writeln!(
            w,
            "  {} cells, {} runnable",
            self.cells.len(),
            self.runnable
        )?;
        writeln!(w)?;

        for entry in &self.cells {
            let scenario = &entry.scenario;
            match &entry.skip {
                None => writeln!(w, "  #{:<3} {}", scenario.index, scenario.cell)?,
                Some(reason) => writeln!(
                    w,
                    "  #{:<3} {} {}",
                    scenario.index,
                    scenario.cell,
                    format!("(skip: {reason})").yellow()
                )?,
            }
            writeln!(w, "        channel:      {}", scenario.names.channel)?;
            writeln!(w, "        subscriber:   {}", scenario.names.subscriber)?;
            writeln!(w, "        subscription: {}", scenario.names.subscription)?;
        }
        Ok(())
    }
}
