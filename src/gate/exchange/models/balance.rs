//! Account balance types.
//!
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Funds held in one asset, split by availability.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetFunds {
    /// Funds free for new orders.
    pub free: f64,
    /// Funds locked by open orders.
    pub used: f64,
    /// `free + used`.
    pub total: f64,
}

/// Represents a partial account balance, restricted to the assets the
/// gateway was asked about.
///
/// Assets the exchange did not report default to zeroed [`AssetFunds`], so
/// the core always receives an entry per requested asset.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub assets: HashMap<String, AssetFunds>,

    /// Exchange timestamp of the balance in microseconds, if reported.
    pub timestamp_us: Option<i64>,
}
