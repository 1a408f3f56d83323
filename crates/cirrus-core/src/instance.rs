// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance entity, its states and validation rules.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::disk::ParseStateError;
use crate::error::{ControlError, Result};
use crate::field_set::entity_fields;
use crate::naming::filter_name;
use crate::serde_ext;

/// Smallest instance memory in MiB.
pub const MIN_MEMORY: i32 = 256;

/// Smallest non-zero initial disk size in GiB.
pub const MIN_INIT_DISK_SIZE: i32 = 10;

/// Largest number of instances a single create may produce.
pub const MAX_INSTANCE_COUNT: u32 = 256;

/// Name given to instances created without one.
pub const DEFAULT_INSTANCE_NAME: &str = "New Instance";

const VNC_PASSWORD_LEN: usize = 16;
const VNC_DISPLAY_RANGE: std::ops::RangeInclusive<i32> = 1..=9999;

/// Instance lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Being provisioned by the agent.
    Provision,
    /// Should be running.
    #[default]
    Start,
    /// Should be stopped.
    Stop,
    /// Resources being released.
    Cleanup,
    /// Should be restarted.
    Restart,
    /// Should be destroyed.
    Destroy,
}

impl InstanceState {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Provision => "provision",
            InstanceState::Start => "start",
            InstanceState::Stop => "stop",
            InstanceState::Cleanup => "cleanup",
            InstanceState::Restart => "restart",
            InstanceState::Destroy => "destroy",
        }
    }

    /// Whether the state may be requested through a bulk update.
    pub fn is_bulk_allowed(&self) -> bool {
        matches!(
            self,
            InstanceState::Start | InstanceState::Stop | InstanceState::Restart
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "provision" => Ok(InstanceState::Provision),
            "start" => Ok(InstanceState::Start),
            "stop" => Ok(InstanceState::Stop),
            "cleanup" => Ok(InstanceState::Cleanup),
            "restart" => Ok(InstanceState::Restart),
            "destroy" => Ok(InstanceState::Destroy),
            _ => Err(ParseStateError {
                kind: "instance",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for InstanceState {
    type Error = ParseStateError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

entity_fields! {
    /// Persisted instance attributes.
    pub enum InstanceField {
        /// Owning organization.
        Organization => "organization",
        /// Availability zone.
        Zone => "zone",
        /// Hypervisor node.
        Node => "node",
        /// Virtual private cloud.
        Vpc => "vpc",
        /// DNS domain.
        Domain => "domain",
        /// Display name.
        Name => "name",
        /// Lifecycle state.
        State => "state",
        /// Memory in MiB.
        Memory => "memory",
        /// Virtual processors.
        Processors => "processors",
        /// Network roles.
        NetworkRoles => "network_roles",
        /// VNC console flag.
        Vnc => "vnc",
        /// VNC password.
        VncPassword => "vnc_password",
        /// VNC display number.
        VncDisplay => "vnc_display",
        /// Delete protection flag.
        DeleteProtection => "delete_protection",
        /// Skip public address allocation.
        NoPublicAddress => "no_public_address",
        /// Skip host address allocation.
        NoHostAddress => "no_host_address",
        /// Boot image.
        Image => "image",
        /// Use the boot image as a backing file.
        ImageBacking => "image_backing",
        /// Initial disk size in GiB.
        InitDiskSize => "init_disk_size",
        /// Restart requested.
        Restart => "restart",
        /// Keep addresses across the restart.
        RestartBlockIp => "restart_block_ip",
        /// Hypervisor-reported state.
        VmState => "vm_state",
        /// Public IPv4 addresses.
        PublicIps => "public_ips",
        /// Public IPv6 addresses.
        PublicIps6 => "public_ips6",
        /// Private IPv4 addresses.
        PrivateIps => "private_ips",
        /// Private IPv6 addresses.
        PrivateIps6 => "private_ips6",
    }
}

/// Fields an ordinary update may write. `state` is added when supplied.
pub const INSTANCE_UPDATE_FIELDS: &[InstanceField] = &[
    InstanceField::Vpc,
    InstanceField::Domain,
    InstanceField::Name,
    InstanceField::Memory,
    InstanceField::Processors,
    InstanceField::NetworkRoles,
    InstanceField::Vnc,
    InstanceField::VncPassword,
    InstanceField::VncDisplay,
    InstanceField::DeleteProtection,
    InstanceField::NoPublicAddress,
    InstanceField::NoHostAddress,
];

/// Attributes written by the hypervisor agent, never by the controller.
pub const AGENT_FIELDS: &[InstanceField] = &[
    InstanceField::VmState,
    InstanceField::PublicIps,
    InstanceField::PublicIps6,
    InstanceField::PrivateIps,
    InstanceField::PrivateIps6,
];

/// A virtual compute resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Instance {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization: Uuid,
    /// Availability zone.
    pub zone: Uuid,
    /// Hypervisor node.
    pub node: Uuid,
    /// Virtual private cloud.
    pub vpc: Uuid,
    /// DNS domain.
    pub domain: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    #[sqlx(try_from = "String")]
    pub state: InstanceState,
    /// Memory in MiB.
    pub memory: i32,
    /// Virtual processors.
    pub processors: i32,
    /// Network roles, sorted and unique.
    #[sqlx(json)]
    pub network_roles: Vec<String>,
    /// VNC console enabled.
    pub vnc: bool,
    /// VNC password, empty when disabled.
    pub vnc_password: String,
    /// VNC display, zero when disabled.
    pub vnc_display: i32,
    /// Prevents deletion while set.
    pub delete_protection: bool,
    /// Skip public address allocation.
    pub no_public_address: bool,
    /// Skip host address allocation.
    pub no_host_address: bool,
    /// Boot image.
    pub image: Option<Uuid>,
    /// Use the boot image as a backing file.
    pub image_backing: bool,
    /// Initial disk size in GiB, zero for the image default.
    pub init_disk_size: i32,
    /// Restart requested.
    pub restart: bool,
    /// Keep addresses across the restart.
    pub restart_block_ip: bool,
    /// Hypervisor-reported state.
    pub vm_state: String,
    /// Public IPv4 addresses.
    #[sqlx(json)]
    pub public_ips: Vec<String>,
    /// Public IPv6 addresses.
    #[sqlx(json)]
    pub public_ips6: Vec<String>,
    /// Private IPv4 addresses.
    #[sqlx(json)]
    pub private_ips: Vec<String>,
    /// Private IPv6 addresses.
    #[sqlx(json)]
    pub private_ips6: Vec<String>,
}

impl Instance {
    /// Normalize and check the instance before it is persisted.
    pub fn validate(&mut self) -> Result<()> {
        self.name = filter_name(&self.name);
        if self.name.is_empty() {
            self.name = DEFAULT_INSTANCE_NAME.to_string();
        }

        if self.state != InstanceState::Start {
            self.restart = false;
            self.restart_block_ip = false;
        }

        if self.memory < MIN_MEMORY {
            return Err(ControlError::validation(
                "memory_size_invalid",
                format!("Memory must be at least {} MiB", MIN_MEMORY),
            ));
        }

        if self.processors < 1 {
            return Err(ControlError::validation(
                "processors_invalid",
                "Instance needs at least one processor",
            ));
        }

        if self.init_disk_size != 0 && self.init_disk_size < MIN_INIT_DISK_SIZE {
            return Err(ControlError::validation(
                "init_disk_size_invalid",
                format!("Initial disk size must be at least {} GiB", MIN_INIT_DISK_SIZE),
            ));
        }

        self.network_roles = normalize_roles(&self.network_roles);

        if self.vnc {
            if self.vnc_password.is_empty() || self.vnc_display == 0 {
                let mut rng = rand::rng();
                self.vnc_password = (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(VNC_PASSWORD_LEN)
                    .map(char::from)
                    .collect();
                self.vnc_display = rng.random_range(VNC_DISPLAY_RANGE);
            }
        } else {
            self.vnc_password.clear();
            self.vnc_display = 0;
        }

        Ok(())
    }
}

fn normalize_roles(roles: &[String]) -> Vec<String> {
    let mut roles: Vec<String> = roles
        .iter()
        .map(|role| role.trim())
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect();
    roles.sort();
    roles.dedup();
    roles
}

/// Instance payload accepted by create and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceRequest {
    /// Display name; may contain a `%d` counter on create.
    pub name: String,
    /// Requested state; absent or empty leaves the state alone.
    #[serde(deserialize_with = "serde_ext::optional_enum")]
    pub state: Option<InstanceState>,
    /// Availability zone (create only).
    #[serde(deserialize_with = "serde_ext::reference")]
    pub zone: Option<Uuid>,
    /// Hypervisor node (create only).
    #[serde(deserialize_with = "serde_ext::reference")]
    pub node: Option<Uuid>,
    /// Virtual private cloud.
    #[serde(deserialize_with = "serde_ext::reference")]
    pub vpc: Option<Uuid>,
    /// DNS domain.
    #[serde(deserialize_with = "serde_ext::reference")]
    pub domain: Option<Uuid>,
    /// Memory in MiB.
    pub memory: i32,
    /// Virtual processors.
    pub processors: i32,
    /// Network roles.
    pub network_roles: Vec<String>,
    /// VNC console flag.
    pub vnc: bool,
    /// Delete protection flag.
    pub delete_protection: bool,
    /// Skip public address allocation.
    pub no_public_address: bool,
    /// Skip host address allocation.
    pub no_host_address: bool,
    /// Boot image (create only).
    #[serde(deserialize_with = "serde_ext::reference")]
    pub image: Option<Uuid>,
    /// Use the boot image as a backing file (create only).
    pub image_backing: bool,
    /// Initial disk size in GiB (create only).
    pub init_disk_size: i32,
    /// Number of instances to create; zero means one.
    pub count: u32,
}

/// Filters for listing instances.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    /// Exact id.
    pub id: Option<Uuid>,
    /// Case-insensitive name substring.
    pub name: Option<String>,
    /// Hypervisor node.
    pub node: Option<Uuid>,
    /// Availability zone.
    pub zone: Option<Uuid>,
    /// Virtual private cloud.
    pub vpc: Option<Uuid>,
    /// Instances carrying this network role.
    pub network_role: Option<String>,
}

/// Id and name of an instance, for node pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct InstanceName {
    /// Instance id.
    pub id: Uuid,
    /// Instance name.
    pub name: String,
}
