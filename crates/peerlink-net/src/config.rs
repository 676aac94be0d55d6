//! Startup configuration
//!
//! One immutable structure supplied at construction time. Table
//! capacities are fixed for the lifetime of the manager; there is no
//! runtime resizing.

use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};
use crate::ident;

const KIB: usize = 1024;

/// Connection-identity core configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetConfig {
    /// Maximum concurrent secure connections (at most 256: the slot
    /// index must fit the identifier's reserved high byte)
    pub max_connections: usize,

    /// Maximum registered key pairs
    pub max_key_pairs: usize,

    /// Socket receive buffer size in KiB
    pub recv_buffer_kib: usize,

    /// Socket send buffer size in KiB
    pub send_buffer_kib: usize,

    /// QoS probe data limit, stored divided by four as the platform did
    pub qos_data_limit_div4: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            max_connections: 32,
            max_key_pairs: 8,
            recv_buffer_kib: 16,
            send_buffer_kib: 16,
            qos_data_limit_div4: 64,
        }
    }
}

impl NetConfig {
    /// Socket receive buffer size in bytes
    pub fn recv_buffer_bytes(&self) -> usize {
        self.recv_buffer_kib * KIB
    }

    /// Socket send buffer size in bytes
    pub fn send_buffer_bytes(&self) -> usize {
        self.send_buffer_kib * KIB
    }

    /// QoS probe data limit in bytes
    pub fn qos_data_limit_bytes(&self) -> usize {
        self.qos_data_limit_div4 * 4
    }

    /// Validate configuration
    pub fn validate(&self) -> NetResult<()> {
        if self.max_connections == 0 {
            return Err(NetError::InvalidConfig(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.max_connections > ident::MAX_SLOTS {
            return Err(NetError::InvalidConfig(format!(
                "max_connections {} exceeds addressable slots {}",
                self.max_connections,
                ident::MAX_SLOTS
            )));
        }
        if self.max_key_pairs == 0 {
            return Err(NetError::InvalidConfig(
                "max_key_pairs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = NetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recv_buffer_bytes(), 16 * 1024);
        assert_eq!(config.qos_data_limit_bytes(), 256);
    }

    #[test]
    fn test_zero_connections_rejected() {
        let config = NetConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_table_rejected() {
        let config = NetConfig {
            max_connections: 257,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
