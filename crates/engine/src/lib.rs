pub mod alpaca;
pub mod buffer;
pub mod forwarder;
pub mod signal_loop;
pub mod store;

pub use alpaca::{AlpacaHistory, AlpacaStream};
pub use buffer::{BufferState, RollingBuffer};
pub use forwarder::{spawn_live_ingest, BarForwarder};
pub use signal_loop::{LoopConfig, SignalLoop, SymbolTask, TickOutcome};
pub use store::{MemoryBarStore, SqliteBarStore};
