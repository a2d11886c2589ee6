use crate::CoreError;
use std::fmt;

/// Where one provisioning run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Uninitialized,
    Resolved,
    CacheHit,
    CacheMiss,
    Provisioned,
    Failed,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Resolved => "resolved",
            Self::CacheHit => "cache-hit",
            Self::CacheMiss => "cache-miss",
            Self::Provisioned => "provisioned",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: ProvisionState, to: ProvisionState) -> Result<(), CoreError> {
    use ProvisionState::{CacheHit, CacheMiss, Failed, Provisioned, Resolved, Uninitialized};

    let valid = matches!(
        (from, to),
        (_, Failed)
            | (Uninitialized, Resolved)
            | (Resolved, CacheHit | CacheMiss)
            | (CacheHit | CacheMiss, Provisioned)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
