//! Metric names for the chain manager.

/// Gauge: height of the current peak.
#[cfg(feature = "metrics")]
pub(crate) const CHAIN_PEAK_HEIGHT: &str = "chain_peak_height";

/// Counter: reorganizations performed since startup.
#[cfg(feature = "metrics")]
pub(crate) const CHAIN_REORG_COUNT: &str = "chain_reorg_count";

/// Counter: blocks installed through the importer.
#[cfg(feature = "metrics")]
pub(crate) const CHAIN_IMPORTED_BLOCKS: &str = "chain_imported_blocks";

/// Describes all metrics the chain manager may produce.
///
/// Call once during application startup if metric descriptions are desired
/// for observers like Prometheus. Guarded by the "metrics" feature flag.
pub fn describe_chain_metrics() {
    #[cfg(feature = "metrics")]
    {
        metrics::describe_gauge!(
            CHAIN_PEAK_HEIGHT,
            metrics::Unit::Count,
            "The block number of the current canonical peak."
        );
        metrics::describe_counter!(
            CHAIN_REORG_COUNT,
            metrics::Unit::Count,
            "Main-chain reorganizations performed since startup."
        );
        metrics::describe_counter!(
            CHAIN_IMPORTED_BLOCKS,
            metrics::Unit::Count,
            "Blocks installed through the importer."
        );
    }
}
