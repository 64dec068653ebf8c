//! Lab API v4 payloads and the catalog records built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{ActiveBox, ActiveVpn, Difficulty, TagCategory, UserInfo};

/// Port used when the connection status omits one.
pub const DEFAULT_VPN_PORT: u16 = 1337;

fn null_as_false<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(false))
}

/// `{"info": ...}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Info<T> {
    pub info: T,
}

/// `{"data": [...], "meta": {...}}` envelope of paginated listings.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    pub last_page: u32,
}

/// Catalog entry as listed by the machine endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRecord {
    pub id: i64,
    pub name: String,
    #[serde(rename = "difficultyText")]
    pub difficulty: Difficulty,
    pub os: String,
    pub free: bool,
    #[serde(rename = "authUserInUserOwns", default, deserialize_with = "null_as_false")]
    pub user_owned: bool,
    #[serde(rename = "authUserInRootOwns", default, deserialize_with = "null_as_false")]
    pub root_owned: bool,
}

/// Machines partitioned by source listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineBatch {
    /// Currently playable rotation.
    pub active: Vec<MachineRecord>,
    pub retired: Vec<MachineRecord>,
}

impl MachineBatch {
    pub fn len(&self) -> usize {
        self.active.len() + self.retired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.retired.is_empty()
    }

    pub fn active_ids(&self) -> Vec<i64> {
        self.active.iter().map(|m| m.id).collect()
    }

    /// Every machine flagged free in either listing.
    pub fn free_ids(&self) -> Vec<i64> {
        self.active
            .iter()
            .chain(&self.retired)
            .filter(|m| m.free)
            .map(|m| m.id)
            .collect()
    }

    /// Keep only the retired machines that are free to play.
    #[must_use]
    pub fn with_free_retired(mut self) -> Self {
        self.retired.retain(|m| m.free);
        self
    }
}

/// `/machine/active` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveMachine {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
}

/// `/machine/profile/{name}` payload (subset of fields).
#[derive(Debug, Clone, Deserialize)]
pub struct MachineProfile {
    pub id: i64,
    pub name: String,
    #[serde(rename = "difficultyText")]
    pub difficulty: Difficulty,
    pub os: String,
    #[serde(rename = "authUserInUserOwns", default, deserialize_with = "null_as_false")]
    pub user_owned: bool,
    #[serde(rename = "authUserInRootOwns", default, deserialize_with = "null_as_false")]
    pub root_owned: bool,
    #[serde(default)]
    pub ip: Option<String>,
}

impl MachineProfile {
    /// Build the session snapshot, preferring the address from `/machine/active`.
    pub fn into_active_box(self, active_ip: Option<String>) -> ActiveBox {
        ActiveBox {
            id: self.id,
            name: self.name,
            difficulty: self.difficulty,
            os: self.os,
            user_owned: self.user_owned,
            root_owned: self.root_owned,
            ip: active_ip.or(self.ip),
        }
    }
}

/// `/user/info` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoPayload {
    pub id: i64,
    pub name: String,
    #[serde(rename = "canAccessVIP", default)]
    pub can_access_vip: bool,
}

impl From<UserInfoPayload> for UserInfo {
    fn from(p: UserInfoPayload) -> Self {
        Self {
            id: p.id,
            name: p.name,
            can_access_vip: p.can_access_vip,
        }
    }
}

/// VPN server reference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerRef {
    pub id: i64,
    pub friendly_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerGroup {
    #[serde(default)]
    pub servers: BTreeMap<String, ServerRef>,
}

/// `/connections/servers` payload: `options.<region>.<group>.servers.<id>`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServersData {
    pub assigned: ServerRef,
    #[serde(default)]
    pub options: BTreeMap<String, BTreeMap<String, ServerGroup>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServersResponse {
    pub data: ServersData,
}

impl ServersData {
    /// Every server in every region, ordered by id.
    pub fn servers(&self) -> Vec<VpnRecord> {
        let mut by_id = BTreeMap::new();
        for server in self
            .options
            .values()
            .flat_map(BTreeMap::values)
            .flat_map(|group| group.servers.values())
        {
            by_id
                .entry(server.id)
                .or_insert_with(|| server.friendly_name.clone());
        }
        by_id
            .into_iter()
            .map(|(id, name)| VpnRecord { id, name })
            .collect()
    }

    /// The live connection when there is one, else the account's assignment.
    pub fn active_vpn(&self, status: &[ConnectionStatus]) -> ActiveVpn {
        match status.first() {
            Some(conn) => ActiveVpn {
                id: conn.server.id,
                name: conn.server.friendly_name.clone(),
                ip: conn.connection.ip4.clone(),
                address: Some(format!(
                    "{}:{}",
                    conn.server.hostname,
                    conn.server.port.unwrap_or(DEFAULT_VPN_PORT)
                )),
            },
            None => ActiveVpn {
                id: self.assigned.id,
                name: self.assigned.friendly_name.clone(),
                ip: None,
                address: None,
            },
        }
    }
}

/// One entry of `/connection/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionStatus {
    pub server: ConnectedServer,
    pub connection: ConnectionInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedServer {
    pub id: i64,
    pub friendly_name: String,
    pub hostname: String,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub ip4: Option<String>,
}

/// VPN server as cached locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnRecord {
    pub id: i64,
    pub name: String,
}

/// Tag as returned by `/machine/tags/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub id: i64,
    pub category: TagCategory,
    pub name: String,
}

/// Tags plus their `(machine_id, tag_id)` links, persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagBatch {
    pub tags: Vec<TagRecord>,
    pub links: Vec<(i64, i64)>,
}

impl TagBatch {
    /// Record the tags of one machine, deduplicating tags shared across machines.
    pub fn push_machine(&mut self, machine_id: i64, tags: Vec<TagRecord>) {
        for tag in tags {
            self.links.push((machine_id, tag.id));
            if !self.tags.iter().any(|t| t.id == tag.id) {
                self.tags.push(tag);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.links.is_empty()
    }
}

/// `/machine/own` reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlagResponse {
    pub message: String,
    #[serde(default)]
    pub own_type: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
}

impl FlagResponse {
    /// The platform signals a wrong flag only through the message text.
    pub fn is_incorrect(&self) -> bool {
        self.message.contains("Incorrect")
    }
}
