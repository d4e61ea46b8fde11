//! Fixed-point simulation of an AMM-backed lending pool: EMA price
//! smoothing, curve-aware collateral factors and partial liquidation,
//! replayed tick by tick to measure bad debt under crisis price paths.

pub mod collateral;
pub mod config;
pub mod ema;
pub mod error;
pub mod events;
pub mod fixed_point;
pub mod liquidation;
pub mod logging;
pub mod pool;
pub mod run;
pub mod verify;

pub use config::ProtocolConfig;
pub use error::{SimError, SimResult};
pub use events::{Event, EventKind, Snapshot, Tick};
pub use pool::{BorrowerPosition, Pool, PoolReserves, PositionStatus};
pub use run::{compare, run, BorrowerSpec, RunOutput, RunReport, RunSetup};
