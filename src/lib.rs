#[macro_use]
extern crate tracing;

mod app;
pub mod cycle;
mod logging;
pub mod scheduler;

pub use app::App;
pub use cycle::{
    CycleReport,
    SamplingCycle,
};
pub use guild_pulse_config::Args;
pub use logging::init_logging;
pub use scheduler::{
    Scheduler,
    SchedulerState,
};

pub fn init_errors() -> color_eyre::Result<()> {
    color_eyre::install()
}
