pub mod benchmark;
pub mod error;
pub mod indicators;
pub mod ledger;
pub mod providers;
pub mod simulator;
pub mod tools;

pub mod test_support;

pub use benchmark::{benchmark_curve, build_report, curve_stats};
pub use error::{DataError, SimulationError};
pub use ledger::{Fill, Ledger};
pub use providers::{FillConfirmation, NewsProvider, PriceHistoryProvider, TradeExecutor};
pub use simulator::{
    BacktestRun, DayAdvice, NoopObserver, ProgressObserver, RunRequest, Simulator, SingleDay,
};
pub use tools::{IndicatorTool, PriceHistoryTool};
