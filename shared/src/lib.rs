pub mod ipc;

pub use ipc::{Command, IpcError, Response, StatusInfo};
