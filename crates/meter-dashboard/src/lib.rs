//! meter-dashboard — server-rendered listing of every stored metric.
//!
//! Served at `/` by `meter-api`. One page, no client-side script.

pub mod pages;
pub mod views;

pub use pages::metrics_page;
pub use views::{MetricRow, MetricsView};
