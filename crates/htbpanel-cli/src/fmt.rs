//! Output formatting helpers.

use std::io::{self, Write};

use htbpanel_core::models::{ActiveBox, ActiveVpn};
use htbpanel_core::storage::models::glyph;
use htbpanel_core::storage::{MachineListing, NamedId};
use htbpanel_core::{CatalogRefresh, FlagOutcome, SessionState};

/// Shorten `s` to at most `max` characters, marking the cut with `…`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn write_machine_table(w: &mut impl Write, rows: &[MachineListing]) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(w, "No machines found.");
    }
    writeln!(
        w,
        "{:<20} {:<10} {:<10} {:<5} {:<6} {}",
        "NAME", "DIFFICULTY", "OS", "FREE", "OWNED", "TAGS"
    )?;
    for row in rows {
        let (name, difficulty, os, free, owned, tags) = row.as_tuple();
        writeln!(
            w,
            "{:<20} {:<10} {:<10} {:<5} {:<6} {}",
            truncate(name, 20),
            difficulty,
            truncate(os, 10),
            free,
            owned,
            tags,
        )?;
    }
    writeln!(w, "\n{} machine(s)", rows.len())
}

/// Two-column `NAME  ID` listing.
pub fn write_named_ids(w: &mut impl Write, what: &str, items: &[NamedId]) -> io::Result<()> {
    if items.is_empty() {
        return writeln!(w, "No {what} found.");
    }
    writeln!(w, "{:<32} {}", "NAME", "ID")?;
    for item in items {
        writeln!(w, "{:<32} {}", truncate(&item.name, 32), item.id)?;
    }
    Ok(())
}

fn write_box(w: &mut impl Write, b: &ActiveBox) -> io::Result<()> {
    writeln!(w, "  Machine:    {} ({})", b.name, b.id)?;
    writeln!(w, "  Difficulty: {}", b.difficulty)?;
    writeln!(w, "  OS:         {}", b.os)?;
    writeln!(w, "  IP:         {}", b.ip.as_deref().unwrap_or("?"))?;
    writeln!(w, "  User flag:  {}", glyph(b.user_owned))?;
    writeln!(w, "  Root flag:  {}", glyph(b.root_owned))?;
    Ok(())
}

fn write_vpn(w: &mut impl Write, v: &ActiveVpn) -> io::Result<()> {
    writeln!(w, "  VPN:        {} ({})", v.name, v.id)?;
    if let Some(address) = &v.address {
        writeln!(w, "  Endpoint:   {address}")?;
    }
    writeln!(w, "  Tunnel IP:  {}", v.ip.as_deref().unwrap_or("not connected"))?;
    Ok(())
}

pub fn write_session(w: &mut impl Write, state: &SessionState) -> io::Result<()> {
    writeln!(w, "  Status:     {}", state.activity())?;
    if let Some(b) = &state.active_box {
        write_box(w, b)?;
    }
    if let Some(v) = &state.active_vpn {
        write_vpn(w, v)?;
    }
    Ok(())
}

pub fn write_refresh(w: &mut impl Write, refresh: &CatalogRefresh) -> io::Result<()> {
    match refresh {
        CatalogRefresh::Unchanged => writeln!(w, "Playable machines unchanged."),
        CatalogRefresh::Updated { new_ids } => {
            let ids: Vec<String> = new_ids.iter().map(ToString::to_string).collect();
            writeln!(w, "{} new machine(s): {}", new_ids.len(), ids.join(", "))
        }
    }
}

pub fn write_flag_outcome(w: &mut impl Write, outcome: &FlagOutcome) -> io::Result<()> {
    match outcome {
        FlagOutcome::Rejected { message } => writeln!(w, "Rejected: {message}"),
        FlagOutcome::Accepted { own_type, message } => {
            writeln!(w, "Accepted ({own_type}): {message}")
        }
    }
}
