pub mod anomaly;
pub mod daily;

pub use anomaly::compute_anomalies;
pub use daily::aggregate_daily;
