//! Session subcommands: status, start, stop, reset, flag.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use anyhow::bail;

use htbpanel_core::models::MachineAction;
use htbpanel_core::{HtbClient, SessionReconciler};

use crate::context::Context;
use crate::fmt::{write_flag_outcome, write_session};

/// Session subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum MachineCommand {
    /// Show the running machine and VPN assignment.
    Status,
    /// Spawn a machine (name or id).
    Start { machine: String },
    /// Stop the running machine.
    Stop,
    /// Reset a machine; defaults to the running one.
    Reset { machine: Option<String> },
    /// Submit a flag; defaults to the running machine.
    Flag {
        token: String,
        #[arg(short, long)]
        machine: Option<String>,
    },
}

/// Execute a session subcommand.
pub async fn run(ctx: &Context, command: MachineCommand) -> anyhow::Result<()> {
    let mut out = io::stdout();
    let reconciler = ctx.reconciler()?;

    match command {
        MachineCommand::Status => {
            let state = reconciler.reload().await?;
            write_session(&mut out, &state)?;
        }
        MachineCommand::Start { machine } => {
            let id = resolve(ctx, &machine).await?;
            let state = reconciler.machine_action(MachineAction::Start, id).await?;
            write_session(&mut out, &state)?;
        }
        MachineCommand::Stop => {
            let id = running_id(&reconciler).await?;
            let state = reconciler.machine_action(MachineAction::Stop, id).await?;
            write_session(&mut out, &state)?;
        }
        MachineCommand::Reset { machine } => {
            let id = match machine {
                Some(m) => resolve(ctx, &m).await?,
                None => running_id(&reconciler).await?,
            };
            let state = reconciler.machine_action(MachineAction::Reset, id).await?;
            write_session(&mut out, &state)?;
        }
        MachineCommand::Flag { token, machine } => {
            let id = match machine {
                Some(m) => resolve(ctx, &m).await?,
                None => running_id(&reconciler).await?,
            };
            let outcome = reconciler.submit_flag(id, &token).await?;
            write_flag_outcome(&mut out, &outcome)?;
        }
    }
    Ok(())
}

async fn resolve(ctx: &Context, reference: &str) -> anyhow::Result<i64> {
    Ok(ctx.db.find_machine(reference).await?.id)
}

/// Id of the running machine, from a fresh reload.
async fn running_id(reconciler: &SessionReconciler<HtbClient>) -> anyhow::Result<i64> {
    match reconciler.reload().await?.active_box {
        Some(active) => Ok(active.id),
        None => bail!("No machine is running. Pass one explicitly or run: htbpanel start <machine>"),
    }
}
