//! # Target Load Balancer
//!
//! Spreads writes over the configured target instances by picking one
//! uniformly at random per call. The random source is seedable so tests are
//! deterministic.
//!
//! The balancer also owns session upkeep:
//!
//! - a shared write counter; whenever a [`LoadBalancer::tick`] crosses a
//!   multiple of `reauth_every`, every instance logs out and back in;
//! - a bounded retry on [`TargetError::Unauthorized`]: the instance logs in
//!   again and the call is retried, at most [`AUTH_ATTEMPTS`] calls in total.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::target::{TargetDirectory, TargetError, TargetResult};

/// Calls made on an unauthorized session before giving up.
pub const AUTH_ATTEMPTS: u32 = 2;

pub struct LoadBalancer {
    instances: Vec<Box<dyn TargetDirectory>>,
    rng: StdRng,
    reauth_every: usize,
    counter: usize,
}

impl LoadBalancer {
    pub fn new(instances: Vec<Box<dyn TargetDirectory>>, reauth_every: usize) -> Result<Self> {
        Self::with_rng(instances, reauth_every, StdRng::from_entropy())
    }

    /// A balancer whose instance picks are reproducible.
    pub fn with_seed(
        instances: Vec<Box<dyn TargetDirectory>>,
        reauth_every: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(instances, reauth_every, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        instances: Vec<Box<dyn TargetDirectory>>,
        reauth_every: usize,
        rng: StdRng,
    ) -> Result<Self> {
        if instances.is_empty() {
            return Err(Error::config_with_hint(
                "No target instances configured",
                "Set ipa.instances in the configuration",
            ));
        }
        Ok(Self {
            instances,
            rng,
            reauth_every: reauth_every.max(1),
            counter: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Writes counted so far.
    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Log every instance in.
    pub fn login_all(&self) -> TargetResult<()> {
        for instance in &self.instances {
            instance.login()?;
            info!("Logged into {}", instance.name());
        }
        Ok(())
    }

    /// Renew the session of every instance.
    pub fn reauth_all(&self) {
        info!("Re-authenticating");
        for instance in &self.instances {
            if let Err(e) = instance.logout() {
                warn!("{}: logout failed: {}", instance.name(), e);
            }
            if let Err(e) = instance.login() {
                warn!("{}: login failed: {}", instance.name(), e);
            }
        }
    }

    /// Count `n` writes, re-authenticating when a multiple of
    /// `reauth_every` is reached.
    pub fn tick(&mut self, n: usize) {
        let before = self.counter / self.reauth_every;
        self.counter += n;
        if self.counter / self.reauth_every > before {
            self.reauth_all();
        }
    }

    /// Run `op` on a randomly picked instance.
    pub fn call<T, F>(&mut self, op: F) -> TargetResult<T>
    where
        F: Fn(&dyn TargetDirectory) -> TargetResult<T>,
    {
        let index = self.rng.gen_range(0..self.instances.len());
        let instance = self.instances[index].as_ref();

        for attempt in 1..=AUTH_ATTEMPTS {
            match op(instance) {
                Err(TargetError::Unauthorized) => {
                    if attempt == AUTH_ATTEMPTS {
                        break;
                    }
                    info!("{}: session expired, logging in again", instance.name());
                    if let Err(e) = instance.login() {
                        warn!("{}: login failed: {}", instance.name(), e);
                    }
                }
                other => return other,
            }
        }
        Err(TargetError::AuthRetryExhausted {
            attempts: AUTH_ATTEMPTS,
        })
    }
}
