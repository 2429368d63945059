//! RPC service descriptors.
//!
//! Engines hand these to the RPC layer untouched. The core never calls
//! into them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ember_core::config::AuthorityParams;
use ember_core::types::Address;

use crate::sealer::Sealer;

/// One RPC namespace offered by an engine.
#[derive(Clone)]
pub struct RpcApi {
    pub namespace: &'static str,
    pub version: &'static str,
    /// Whether the namespace is safe to expose to untrusted callers.
    pub public: bool,
    pub service: Arc<dyn Any + Send + Sync>,
}

impl RpcApi {
    pub fn new<T: Any + Send + Sync>(namespace: &'static str, version: &'static str, public: bool, service: T) -> Self {
        Self { namespace, version, public, service: Arc::new(service) }
    }

    /// The service as its concrete type, if it is a `T`.
    pub fn service<T: Any>(&self) -> Option<&T> {
        self.service.downcast_ref::<T>()
    }
}

impl fmt::Debug for RpcApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcApi")
            .field("namespace", &self.namespace)
            .field("version", &self.version)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// `pow` namespace.
pub struct PowApi {
    sealer: Sealer,
    target_interval: u64,
}

impl PowApi {
    pub(crate) fn new(sealer: Sealer, target_interval: u64) -> Self {
        Self { sealer, target_interval }
    }

    /// Local seal attempts per second.
    pub fn hashrate(&self) -> f64 {
        self.sealer.hashrate()
    }

    /// Target seconds between blocks.
    pub fn target_interval(&self) -> u64 {
        self.target_interval
    }
}

/// `authority` namespace.
pub struct AuthorityApi {
    params: AuthorityParams,
}

impl AuthorityApi {
    pub(crate) fn new(params: AuthorityParams) -> Self {
        Self { params }
    }

    /// Authorized signers in rotation order.
    pub fn signers(&self) -> &[Address] {
        &self.params.signers
    }

    /// Signer in turn for block `number`.
    pub fn in_turn(&self, number: u64) -> Option<Address> {
        let len = self.params.signers.len() as u64;
        if len == 0 {
            return None;
        }
        self.params.signers.get((number % len) as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_to_concrete_service() {
        let params = AuthorityParams { period_secs: 1, signers: vec![Address([1; 20]), Address([2; 20])] };
        let api = RpcApi::new("authority", "1.0", true, AuthorityApi::new(params));
        assert!(api.service::<PowApi>().is_none());
        let svc = api.service::<AuthorityApi>().unwrap();
        assert_eq!(svc.in_turn(3), Some(Address([2; 20])));
        assert_eq!(svc.signers().len(), 2);
        assert!(format!("{api:?}").contains("authority"));
    }
}
