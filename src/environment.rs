//! Environmental management
//!
//! Selects how the large-count collectives are realized. The build-time default comes from the
//! cargo feature `p2p`. At run time the process environment may override it:
//!
//! - `BIGMPI_VCOLLS`: `neighbor` or `p2p`
//! - `BIGMPI_SHARE_TYPES`: `1` (default) or `0`, reuse the synthetic types of the send side on
//!   the receive side of an all-to-all when both sides describe the same blocks
//!
//! The environment is read once, on first use, and the resulting `Config` is shared by all
//! translators that are not given an explicit one.

use std::env;
use std::fmt;

use once_cell::sync::Lazy;

/// Name of the variable selecting the realization
pub const STRATEGY_VARIABLE: &str = "BIGMPI_VCOLLS";
/// Name of the variable controlling synthetic type sharing
pub const SHARE_TYPES_VARIABLE: &str = "BIGMPI_SHARE_TYPES";

static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

/// The process-wide configuration, resolved from the environment on first use.
pub fn config() -> Config {
    *CONFIG
}

/// How a large-count collective is decomposed into native operations
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// One generalized neighbor all-to-all over a complete graph communicator
    NeighborExchange,
    /// Non-blocking sends and receives to and from every peer, joined by one wait-all
    PointToPoint,
}

impl Default for Strategy {
    fn default() -> Self {
        if cfg!(feature = "p2p") {
            Strategy::PointToPoint
        } else {
            Strategy::NeighborExchange
        }
    }
}

impl Strategy {
    /// Parses the value of `BIGMPI_VCOLLS`, `None` if it names no strategy.
    pub fn parse(value: &str) -> Option<Strategy> {
        match value.trim().to_ascii_lowercase().as_str() {
            "neighbor" | "neighbour" | "nbr" => Some(Strategy::NeighborExchange),
            "p2p" | "point-to-point" => Some(Strategy::PointToPoint),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::NeighborExchange => f.write_str("neighbor"),
            Strategy::PointToPoint => f.write_str("p2p"),
        }
    }
}

/// Run-time options of the translator
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The realization used for every operation
    pub strategy: Strategy,
    /// Whether an all-to-all may describe both directions with one set of synthetic types
    pub share_identical_types: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            strategy: Strategy::default(),
            share_identical_types: true,
        }
    }
}

impl Config {
    /// Reads `BIGMPI_VCOLLS` and `BIGMPI_SHARE_TYPES` from the process environment.
    pub fn from_env() -> Config {
        let strategy = env::var(STRATEGY_VARIABLE).ok();
        let share = env::var(SHARE_TYPES_VARIABLE).ok();
        Config::from_vars(strategy.as_deref(), share.as_deref())
    }

    /// Builds a configuration from the raw values of the two variables.
    ///
    /// Unset or unrecognized values keep the defaults.
    pub fn from_vars(strategy: Option<&str>, share_types: Option<&str>) -> Config {
        let mut config = Config::default();
        if let Some(value) = strategy {
            match Strategy::parse(value) {
                Some(strategy) => config.strategy = strategy,
                None => tracing::warn!(
                    variable = STRATEGY_VARIABLE,
                    value,
                    "unrecognized realization, using {}",
                    config.strategy
                ),
            }
        }
        if let Some(value) = share_types {
            match value.trim() {
                "0" | "false" | "no" | "off" => config.share_identical_types = false,
                "1" | "true" | "yes" | "on" => config.share_identical_types = true,
                _ => tracing::warn!(
                    variable = SHARE_TYPES_VARIABLE,
                    value,
                    "unrecognized flag, ignoring"
                ),
            }
        }
        config
    }

    /// The same configuration with a different realization
    pub fn with_strategy(self, strategy: Strategy) -> Config {
        Config { strategy, ..self }
    }

    /// The same configuration with type sharing switched on or off
    pub fn with_shared_types(self, share_identical_types: bool) -> Config {
        Config {
            share_identical_types,
            ..self
        }
    }
}
