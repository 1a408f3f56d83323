// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Demo mode.
//!
//! Demo deployments have no hypervisor agent. Instance responses are dressed up
//! to look like running machines, and every mutating request is refused before
//! it reaches a handler.

use axum::extract::Request;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use cirrus_core::instance::{Instance, InstanceState};

use crate::error::ApiError;

/// Rewrites instances into their demo presentation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoPresenter;

impl DemoPresenter {
    /// Present one instance as running, with stable fake addresses.
    pub fn present(&self, mut instance: Instance) -> Instance {
        let addresses = FakeAddresses::for_instance(instance.id);

        instance.state = InstanceState::Start;
        instance.vm_state = "running".to_string();
        instance.public_ips = if instance.no_public_address {
            Vec::new()
        } else {
            vec![addresses.public]
        };
        instance.public_ips6 = vec![addresses.public6];
        instance.private_ips = vec![addresses.private];
        instance.private_ips6 = Vec::new();
        instance
    }

    /// Present a list of instances.
    pub fn present_all(&self, instances: Vec<Instance>) -> Vec<Instance> {
        instances.into_iter().map(|i| self.present(i)).collect()
    }
}

/// Addresses derived from a SHA-256 of the instance id.
struct FakeAddresses {
    public: String,
    public6: String,
    private: String,
}

impl FakeAddresses {
    fn for_instance(id: Uuid) -> Self {
        let digest = Sha256::digest(id.as_bytes());

        Self {
            // TEST-NET-3 and the IPv6 documentation prefix
            public: format!("203.0.113.{}", digest[0].max(1)),
            public6: format!(
                "2001:db8::{:02x}{:02x}:{:02x}{:02x}",
                digest[1], digest[2], digest[3], digest[4]
            ),
            private: format!("10.{}.{}.{}", digest[5], digest[6], digest[7].max(1)),
        }
    }
}

/// Refuse anything but reads.
pub async fn reject_mutations(req: Request, next: Next) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(req).await;
    }

    ApiError::DemoUnavailable.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        Instance {
            id: Uuid::new_v4(),
            organization: Uuid::new_v4(),
            zone: Uuid::new_v4(),
            node: Uuid::new_v4(),
            vpc: Uuid::new_v4(),
            domain: None,
            name: "demo".to_string(),
            state: InstanceState::Stop,
            memory: 512,
            processors: 1,
            network_roles: Vec::new(),
            vnc: false,
            vnc_password: String::new(),
            vnc_display: 0,
            delete_protection: false,
            no_public_address: false,
            no_host_address: false,
            image: None,
            image_backing: false,
            init_disk_size: 0,
            restart: false,
            restart_block_ip: false,
            vm_state: String::new(),
            public_ips: Vec::new(),
            public_ips6: Vec::new(),
            private_ips: Vec::new(),
            private_ips6: Vec::new(),
        }
    }

    #[test]
    fn test_present_is_deterministic() {
        let original = instance();
        let first = DemoPresenter.present(original.clone());
        let second = DemoPresenter.present(original);

        assert_eq!(first.state, InstanceState::Start);
        assert_eq!(first.vm_state, "running");
        assert_eq!(first.public_ips, second.public_ips);
        assert_eq!(first.private_ips, second.private_ips);
        assert!(first.public_ips[0].starts_with("203.0.113."));
        assert!(first.private_ips[0].starts_with("10."));
        assert!(first.public_ips6[0].starts_with("2001:db8::"));
    }

    #[test]
    fn test_present_respects_no_public_address() {
        let mut original = instance();
        original.no_public_address = true;

        let presented = DemoPresenter.present(original);
        assert!(presented.public_ips.is_empty());
        assert_eq!(presented.private_ips.len(), 1);
    }
}
