//! Keeping stored blocks and headers current: validation window, backfill
//! sweeps and the loop that drives both.

mod backfill;
mod error;
mod sync;
mod validator;
mod window;

pub use sync::{run_sync, BlockPipeline, HeaderPipeline, SyncPipeline};
