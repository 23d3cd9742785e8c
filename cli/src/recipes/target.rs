//! Resolved recipe targets

use std::net::Ipv6Addr;

use platform_api::{App, Machine, MachineConfig};

use crate::errors::CliError;

/// Port the on-machine API listens on
pub const MACHINE_API_PORT: u16 = 4280;

/// One machine a recipe can act on
///
/// Resolved fresh from the control plane for every recipe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub machine_id: String,
    pub addr: String,
    pub region: String,
    pub config: MachineConfig,
    pub app_name: String,
    pub org_slug: String,
}

impl Target {
    /// Resolve a target from a machine of `app`
    pub fn from_machine(app: &App, machine: &Machine) -> Result<Self, CliError> {
        let addr = machine.private_ip().ok_or_else(|| {
            CliError::RecipeError(format!("machine {} has no private address", machine.id))
        })?;

        Ok(Self {
            machine_id: machine.id.clone(),
            addr: addr.to_string(),
            region: machine.region.clone(),
            config: machine.config.clone(),
            app_name: app.name.clone(),
            org_slug: app.organization.slug.clone(),
        })
    }

    /// Address of the machine API for this target
    ///
    /// Keeps the first six bytes of the private address (the network prefix)
    /// and sets the last byte to 3.
    pub fn machine_api_addr(&self) -> Result<String, CliError> {
        let peer: Ipv6Addr = self.addr.parse().map_err(|_| {
            CliError::RecipeError(format!(
                "machine {} address {} is not IPv6",
                self.machine_id, self.addr
            ))
        })?;

        let mut octets = [0u8; 16];
        octets[..6].copy_from_slice(&peer.octets()[..6]);
        octets[15] = 3;
        Ok(Ipv6Addr::from(octets).to_string())
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.machine_id, self.addr)
    }
}
