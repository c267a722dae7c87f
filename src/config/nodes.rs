use crate::core::{JoinError, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

/// Static address map of the cluster, indexed by 0-based node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    addresses: Vec<SocketAddr>,
}

impl NodeConfig {
    pub fn new(addresses: Vec<SocketAddr>) -> Result<Self> {
        if addresses.is_empty() {
            return Err(JoinError::Config(
                "node config must list at least one node".to_string(),
            ));
        }
        Ok(Self { addresses })
    }

    /// `node_count` nodes on the loopback interface, ports `base_port + id`.
    pub fn localhost(node_count: usize, base_port: u16) -> Result<Self> {
        let addresses = (0..node_count)
            .map(|id| {
                let port = u16::try_from(id)
                    .ok()
                    .and_then(|id| base_port.checked_add(id))
                    .ok_or_else(|| {
                        JoinError::Config(format!(
                            "port for node {} overflows from base {}",
                            id, base_port
                        ))
                    })?;
                Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(addresses)
    }

    /// Parse `<ip> <port>` lines. Blank lines and `#` comments are skipped.
    pub fn parse(source: &str) -> Result<Self> {
        let mut addresses = Vec::new();
        for (line_no, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(ip), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(JoinError::Config(format!(
                    "line {}: expected '<ip> <port>', got '{}'",
                    line_no + 1,
                    line
                )));
            };
            let ip: IpAddr = ip.parse().map_err(|_| {
                JoinError::Config(format!("line {}: invalid ip '{}'", line_no + 1, ip))
            })?;
            let port: u16 = port.parse().map_err(|_| {
                JoinError::Config(format!("line {}: invalid port '{}'", line_no + 1, port))
            })?;
            addresses.push(SocketAddr::new(ip, port));
        }
        Self::new(addresses)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&raw)
    }

    pub fn node_count(&self) -> usize {
        self.addresses.len()
    }

    pub fn address(&self, node_id: NodeId) -> Result<SocketAddr> {
        self.addresses.get(node_id).copied().ok_or_else(|| {
            JoinError::Config(format!(
                "node {} is not in the node config ({} nodes)",
                node_id,
                self.addresses.len()
            ))
        })
    }

    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_config_lines() {
        let config = NodeConfig::parse("127.0.0.1 5550\n\n# spare\n10.0.0.2 5551\n").unwrap();
        assert_eq!(config.node_count(), 2);
        assert_eq!(config.address(1).unwrap(), "10.0.0.2:5551".parse().unwrap());
        assert!(config.address(2).is_err());
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(NodeConfig::parse("127.0.0.1").is_err());
        assert!(NodeConfig::parse("127.0.0.1 notaport").is_err());
        assert!(NodeConfig::parse("").is_err());
    }

    #[test]
    fn localhost_assigns_consecutive_ports() {
        let config = NodeConfig::localhost(3, 5550).unwrap();
        assert_eq!(config.address(2).unwrap().port(), 5552);
    }
}
