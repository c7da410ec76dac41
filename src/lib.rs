//! Runtime profiling and statistics for a cryptocurrency full node.
//!
//! A low-overhead, thread-safe, nested call-path instrumentation engine:
//! callers wrap code regions in scoped [`FunctionProfile`] tokens, the registry
//! aggregates wall-clock measurements per dynamic call path into online
//! statistics with adaptive histograms, and the whole state is periodically
//! persisted so long-run numbers survive node restarts. An auxiliary bounded
//! map timestamps externally observed events (transaction arrivals) outside
//! the call-stack machinery.
//!
//! Typical wiring at node startup:
//!
//! ```no_run
//! use chain_profiler::{init_profiler, ProfilerConfig};
//!
//! let profiler = init_profiler(ProfilerConfig::default());
//! {
//!     let _scope = profiler.scope("connect_block");
//!     // ... work being measured ...
//! }
//! profiler.flush().expect("final profiler flush");
//! ```

pub mod config;
pub mod error;
pub mod function_stats;
pub mod guard;
pub mod logging;
pub mod persistence;
pub mod registry;
pub mod stats;

pub use config::ProfilerConfig;
pub use error::{ProfilingError, ProfilingResult};
pub use function_stats::FunctionStats;
pub use guard::FunctionProfile;
pub use registry::{get_profiler, init_profiler, Profiler};
pub use stats::Statistic;
