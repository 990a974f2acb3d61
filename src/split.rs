//! Seeded train/test split stratified by district.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FeatureError, FeatureResult};
use crate::types::RawListing;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of each district routed to the test split
    pub test_size: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
        }
    }
}

/// Training and test halves of a listing set.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub train: Vec<RawListing>,
    pub test: Vec<RawListing>,
}

/// Split `listings` so each district is represented in proportion.
///
/// Listings without a district form their own stratum. A district with at
/// least two listings always contributes to both halves. Each half keeps
/// input order, and the same seed always yields the same split.
pub fn stratified_split(listings: &[RawListing], config: SplitConfig) -> FeatureResult<Split> {
    if !(config.test_size > 0.0 && config.test_size < 1.0) {
        return Err(FeatureError::validation(format!(
            "test_size must be in (0, 1), got {}",
            config.test_size
        )));
    }

    let mut strata: BTreeMap<Option<&str>, Vec<usize>> = BTreeMap::new();
    for (i, listing) in listings.iter().enumerate() {
        strata.entry(listing.district.as_deref()).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut in_test = vec![false; listings.len()];

    for (district, mut members) in strata {
        let n = members.len();
        let mut n_test = (n as f64 * config.test_size).round() as usize;
        if n >= 2 {
            n_test = n_test.clamp(1, n - 1);
        }
        members.shuffle(&mut rng);
        for &i in members.iter().take(n_test) {
            in_test[i] = true;
        }
        debug!(district = district.unwrap_or("-"), size = n, test = n_test, "stratum split");
    }

    let mut split = Split::default();
    for (listing, test) in listings.iter().zip(in_test) {
        if test {
            split.test.push(listing.clone());
        } else {
            split.train.push(listing.clone());
        }
    }
    Ok(split)
}
