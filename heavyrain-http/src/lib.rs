#![forbid(unsafe_code)]

mod client;
mod error;
mod tls;
mod transport;
mod types;
mod util;

pub use client::{ClientOptions, HttpClient};
pub use error::{Error, HttpTransportErrorKind, Result};
pub use transport::Transport;
pub use types::{HttpRequest, HttpResponse, Timing};
pub use util::version_label;
