//! Utility methods for building and running models from the command line or tests.
//!
//! ## Example:
//!
//! ```rust,ignore
//! fn main() -> anyhow::Result<()> {
//!     let mut builder = ModelBuilder::new();
//!     // ... add actors and connections
//!     let stats = ptolemy_util::runner::run_model_with_args(builder)?;
//!     println!("{stats:?}");
//!     Ok(())
//! }
//! ```

use anyhow::Context;
use clap::Parser;
use ptolemy_builder::ModelBuilder;
use ptolemy_runtime::{Config, Director, Duration, RunStats, Timestamp};

#[derive(clap::Parser, Debug, Clone, Default)]
pub struct RunArgs {
    /// Model time at which to stop, in seconds
    #[arg(long)]
    pub stop_time: Option<f64>,

    /// Maximum number of firing iterations
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Synchronize model time to the wall clock instead of fast-forwarding
    #[arg(long, short)]
    pub realtime: bool,

    /// Keep waiting for asynchronous events once the event queue is empty
    #[arg(long)]
    pub keep_alive: bool,
}

impl RunArgs {
    /// The director configuration described by these arguments.
    pub fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::default()
            .with_fast_forward(!self.realtime)
            .with_stop_when_queue_is_empty(!self.keep_alive);

        if let Some(stop_time) = self.stop_time {
            let stop_time = Duration::try_from_secs_f64(stop_time)
                .with_context(|| format!("Invalid stop time {stop_time}"))?;
            config = config.with_stop_time(Timestamp::from(stop_time));
        }
        if let Some(iterations) = self.iterations {
            config = config.with_iterations(iterations);
        }
        Ok(config)
    }
}

/// Build a model and run it to completion with the discrete-event director.
pub fn run_model(builder: ModelBuilder, config: Config) -> anyhow::Result<RunStats> {
    let parts = builder.build().context("Error building model!")?;
    tracing::info!(?config, "Running model");
    let mut director = Director::new(parts.model, config);
    director.run().context("Error running model!")
}

/// Build and run a model, with the [`Config`] parsed from the command line.
///
/// This method is intended to be used from the `main` function of a binary.
///
/// Common arguments:
/// * `--stop-time`: Model time at which to stop, in seconds
/// * `--iterations`: Maximum number of firing iterations
/// * `--realtime`: Synchronize model time to the wall clock
/// * `--keep-alive`: Keep waiting for asynchronous events once the event queue is empty
pub fn run_model_with_args(builder: ModelBuilder) -> anyhow::Result<RunStats> {
    let args = RunArgs::parse();
    let config = args.config()?;
    run_model(builder, config)
}
