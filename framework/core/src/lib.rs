mod failed;
mod shutdown;

pub mod prelude {
    pub use crate::failed::WorkerFailedError;
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
