//! Uplink to the time-series database.
pub mod protocol;
pub mod session;
pub mod transport;
pub mod uploader;

pub use session::{SessionHandle, SessionState};
pub use transport::{HttpTransport, MockTransport, SendStatus, Transport};
pub use uploader::{RetryPolicy, UploadOutcome, Uploader, UploaderState};
