//! Catalog subcommands: sync, list, vpns, machines, tags, os.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use htbpanel_core::models::{Difficulty, TagCategory};
use htbpanel_core::storage::{Availability, CompletionStatus, MachineFilters};
use htbpanel_core::{LabApi, sync};

use crate::context::Context;
use crate::fmt::{write_machine_table, write_named_ids, write_refresh};

/// Catalog subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum CatalogCommand {
    /// Populate the local catalog; flags force individual steps.
    Sync {
        /// Re-fetch the VPN server list.
        #[arg(long)]
        vpns: bool,
        /// Pick up machines newly added to the playable rotation.
        #[arg(long)]
        machines: bool,
        /// Re-fetch every playable and retired machine.
        #[arg(long)]
        retired: bool,
        /// Fetch tags for retired machines that have none.
        #[arg(long)]
        tags: bool,
    },
    /// List cached machines, optionally searched or filtered.
    List(ListArgs),
    /// List cached VPN servers.
    Vpns,
    /// List machines this account can spawn.
    Machines,
    /// List tags of one category: category, area, vulnerability.
    Tags { category: TagCategory },
    /// List known operating systems.
    Os,
}

#[derive(clap::Args, Debug, Default)]
pub struct ListArgs {
    /// Case-insensitive name substring.
    #[arg(
        short,
        long,
        conflicts_with_all = ["status", "free", "active", "difficulty", "os", "category", "area", "vulnerability"]
    )]
    pub search: Option<String>,
    /// Ownership: complete, incomplete, both.
    #[arg(long)]
    pub status: Option<CompletionStatus>,
    /// Only free machines.
    #[arg(long)]
    pub free: bool,
    /// Only machines in the playable rotation.
    #[arg(long)]
    pub active: bool,
    #[arg(short, long)]
    pub difficulty: Vec<Difficulty>,
    #[arg(long)]
    pub os: Vec<String>,
    /// Tag names from the "Category" group.
    #[arg(long)]
    pub category: Vec<String>,
    /// Tag names from the "Area of Interest" group.
    #[arg(long)]
    pub area: Vec<String>,
    /// Tag names from the "Vulnerabilities" group.
    #[arg(long)]
    pub vulnerability: Vec<String>,
}

impl ListArgs {
    pub fn filters(&self) -> MachineFilters {
        let mut availability = std::collections::BTreeSet::new();
        if self.free {
            availability.insert(Availability::Free);
        }
        if self.active {
            availability.insert(Availability::Active);
        }
        MachineFilters {
            status: self.status.unwrap_or_default(),
            availability,
            difficulty: self.difficulty.iter().copied().collect(),
            os: self.os.iter().cloned().collect(),
            category: self.category.iter().cloned().collect(),
            area: self.area.iter().cloned().collect(),
            vulnerability: self.vulnerability.iter().cloned().collect(),
        }
    }
}

/// Execute a catalog subcommand.
pub async fn run(ctx: &Context, command: CatalogCommand) -> anyhow::Result<()> {
    let mut out = io::stdout();
    match command {
        CatalogCommand::Sync {
            vpns,
            machines,
            retired,
            tags,
        } => run_sync(ctx, vpns, machines, retired, tags).await?,
        CatalogCommand::List(args) => {
            let rows = match &args.search {
                Some(needle) => ctx.db.search_by_name(needle).await?,
                None => ctx.db.query_by_filters(&args.filters()).await?,
            };
            write_machine_table(&mut out, &rows)?;
        }
        CatalogCommand::Vpns => {
            write_named_ids(&mut out, "VPN servers", &ctx.db.list_vpns().await?)?;
        }
        CatalogCommand::Machines => {
            let user = ctx.client()?.fetch_user_info().await?;
            let machines = ctx.db.machines_for_account(user.can_access_vip).await?;
            write_named_ids(&mut out, "machines", &machines)?;
        }
        CatalogCommand::Tags { category } => {
            let tags = ctx.db.tags_by_category(category).await?;
            write_named_ids(&mut out, &format!("{category} tags"), &tags)?;
        }
        CatalogCommand::Os => {
            for os in ctx.db.os_list().await? {
                writeln!(out, "{os}")?;
            }
        }
    }
    Ok(())
}

async fn run_sync(
    ctx: &Context,
    vpns: bool,
    machines: bool,
    retired: bool,
    tags: bool,
) -> anyhow::Result<()> {
    let mut out = io::stdout();
    let reconciler = ctx.reconciler()?;
    let api = reconciler.api();

    let fetched = sync::ensure_vpns(&ctx.db, api, vpns).await?;
    if fetched > 0 {
        writeln!(out, "Cached {fetched} VPN server(s).")?;
    }

    let fetched = sync::ensure_machines(&ctx.db, api, retired).await?;
    if fetched > 0 {
        writeln!(out, "Cached {fetched} machine(s).")?;
    }

    if machines {
        write_refresh(&mut out, &reconciler.refresh_catalog().await?)?;
    }

    if tags {
        let linked = sync::backfill_tags(&ctx.db, api).await?;
        writeln!(out, "Stored {linked} machine tag link(s).")?;
    }
    Ok(())
}
