// SPDX-License-Identifier: MIT
//! Network domain type (§3). Built-ins (`bridge`, `isolated`, `none`)
//! always exist; user-defined CIDR networks are added through the
//! network registry service.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkKind {
    Bridge,
    Isolated,
    None,
    /// User-defined CIDR, e.g. `"10.10.0.0/24"`.
    Cidr(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub kind: NetworkKind,
}

impl Network {
    pub fn builtins() -> Vec<Network> {
        vec![
            Network {
                name: "bridge".to_string(),
                kind: NetworkKind::Bridge,
            },
            Network {
                name: "isolated".to_string(),
                kind: NetworkKind::Isolated,
            },
            Network {
                name: "none".to_string(),
                kind: NetworkKind::None,
            },
        ]
    }

    pub fn is_builtin(name: &str) -> bool {
        matches!(name, "bridge" | "isolated" | "none")
    }
}
