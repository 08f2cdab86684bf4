//! Live statistics for long-running CLI tools.
//!
//! Register counters, static values and computed values on a
//! [`Statistics`] registry, then [`Statistics::start`] a refresh loop that
//! calls your render callback on every tick and every input event.
//!
//! Modules:
//! - `registry`: field registry and its read-only view
//! - `fields`, `value`: field kinds and typed values
//! - `lifecycle`: start/stop state machine
//! - `event_loop`, `tick`, `input`: the refresh loop and what drives it
//! - `callbacks`: ready-made dynamic fields (rate, elapsed time)
//! - `snapshot`: serializable copy of every field
//! - `config`: TOML configuration
//! - `interrupt`: self-interrupt helper

pub mod callbacks;
pub mod config;
pub mod error;
mod event_loop;
pub mod fields;
pub mod input;
pub mod interrupt;
pub mod lifecycle;
pub mod registry;
pub mod snapshot;
pub mod tick;
pub mod value;

pub use config::{InputMode, StatsConfig};
pub use error::{StatsError, StatsResult};
pub use fields::DynamicCallback;
pub use input::{
    ChannelInput, InputEvent, InputSource, InputStream, KeyboardInput, NoInput, RefreshTrigger,
};
pub use lifecycle::LifecycleState;
pub use registry::{Statistics, StatsView};
pub use snapshot::StatsSnapshot;
pub use tick::TickSource;
pub use value::FieldValue;
