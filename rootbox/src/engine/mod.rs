//! Execution driver and the container runtime boundary it wraps.

pub mod container;
pub mod driver;
pub mod local;
pub mod runner;

pub use container::{ContainerRuntime, DisabledRuntime, DockerCli};
pub use driver::{BuildOutcome, ExecutionDriver, ExecutionMode, StartOutcome};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
