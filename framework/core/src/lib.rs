mod bail;
mod shutdown;

pub mod prelude {
    pub use crate::bail::VuBailError;
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
