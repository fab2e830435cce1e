//! Capabilities a link needs before it may touch the radio

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One platform permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Scan,
    Connect,
    /// Coarse location, required by some platforms as a proxy for scanning
    Location,
}

impl Permission {
    pub const ALL: [Permission; 3] = [Permission::Scan, Permission::Connect, Permission::Location];
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Scan => write!(f, "scan"),
            Permission::Connect => write!(f, "connect"),
            Permission::Location => write!(f, "location"),
        }
    }
}

/// Snapshot of which permissions are granted
///
/// Snapshots are never cached across a grant round-trip; callers take a new
/// one whenever they need to decide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionState {
    pub scan: bool,
    pub connect: bool,
    pub location: bool,
}

impl PermissionState {
    /// State with every permission granted
    pub fn all_granted() -> Self {
        Self {
            scan: true,
            connect: true,
            location: true,
        }
    }

    /// Build a state from the permissions listed as granted
    pub fn from_granted(granted: &[Permission]) -> Self {
        let mut state = Self::default();
        for permission in granted {
            state.set(*permission, true);
        }
        state
    }

    pub fn grants(&self, permission: Permission) -> bool {
        match permission {
            Permission::Scan => self.scan,
            Permission::Connect => self.connect,
            Permission::Location => self.location,
        }
    }

    pub fn set(&mut self, permission: Permission, granted: bool) {
        match permission {
            Permission::Scan => self.scan = granted,
            Permission::Connect => self.connect = granted,
            Permission::Location => self.location = granted,
        }
    }

    /// Conjunction over `required`
    pub fn grants_all(&self, required: &[Permission]) -> bool {
        required.iter().all(|p| self.grants(*p))
    }

    /// Required permissions this state lacks, in request order
    pub fn missing(&self, required: &[Permission]) -> SmallVec<[Permission; 3]> {
        required.iter().copied().filter(|p| !self.grants(*p)).collect()
    }
}
