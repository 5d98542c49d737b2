//! Host capabilities
//!
//! Everything that touches the live host outside of plain file I/O goes
//! through this module: external commands, the container runtime, object
//! storage, operator prompts and the run lock.

pub mod command;
pub mod lock;
pub mod prompt;
pub mod remote;
pub mod runtime;

pub use command::{Cmd, CommandResult};
pub use lock::RunLock;
pub use prompt::{NonInteractive, Prompter, TerminalPrompter};
pub use remote::{remote_from_spec, RemoteStore};
pub use runtime::{ContainerRuntime, DockerCli};
