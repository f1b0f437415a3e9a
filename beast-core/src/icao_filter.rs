//! Recently-seen ICAO addresses.
//!
//! Addresses are registered when they arrive in the clear in a CRC-clean
//! DF11/17/18. For DF0/4/5/16/20/21 the address is only recoverable from the
//! CRC residual, and noise produces plausible-looking ones, so those are only
//! accepted if the address was seen recently.

use std::collections::HashMap;

use crate::types::Addr;

/// Default time an address stays valid after its last sighting, in seconds.
pub const ICAO_FILTER_TTL: f64 = 60.0;

/// Membership test used by the decoder to validate residual addresses.
pub trait AddressFilter {
    /// True if `addr` was registered within the TTL ending at `now`.
    fn test(&mut self, addr: Addr, now: f64) -> bool;
    /// Register or refresh `addr`.
    fn insert(&mut self, addr: Addr, now: f64);
    /// Drop entries older than the TTL.
    fn expire(&mut self, now: f64);
}

/// Hash-backed filter with a fixed TTL.
#[derive(Debug)]
pub struct IcaoFilter {
    ttl: f64,
    seen: HashMap<Addr, f64>,
}

impl IcaoFilter {
    pub fn new(ttl: f64) -> Self {
        IcaoFilter {
            ttl,
            seen: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for IcaoFilter {
    fn default() -> Self {
        IcaoFilter::new(ICAO_FILTER_TTL)
    }
}

impl AddressFilter for IcaoFilter {
    fn test(&mut self, addr: Addr, now: f64) -> bool {
        match self.seen.get(&addr) {
            Some(&last) if now - last <= self.ttl => true,
            Some(_) => {
                self.seen.remove(&addr);
                false
            }
            None => false,
        }
    }

    fn insert(&mut self, addr: Addr, now: f64) {
        self.seen.insert(addr, now);
    }

    fn expire(&mut self, now: f64) {
        let ttl = self.ttl;
        self.seen.retain(|_, &mut last| now - last <= ttl);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
