// buildmart-api: Async request gateway for the Buildmart marketplace API.
//
// Every call resolves to an `Envelope`; file-bearing payloads are switched
// to multipart automatically and concurrent identical GETs share one
// transport call.

pub mod encoder;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod inflight;
pub mod payload;
pub mod transport;

pub use encoder::{
    EncoderConfig, FileRule, FileRules, FileValidationError, FormEntry, MultipartPayload,
    Violation, decode, encode,
};
pub use envelope::{Envelope, PageMeta};
pub use error::Error;
pub use gateway::{Gateway, GatewayConfig, RequestOptions};
pub use inflight::InFlight;
pub use payload::{FileHandle, Payload, Value};
pub use reqwest::Method;
pub use transport::{TlsMode, TransportConfig};
