//! Streaming client for the KMS question-answering service.
//! Decodes the `data: ` event stream (JSON or Python dict literals) and folds
//! it into an answer text plus an evidence list, one snapshot per record.

pub mod accumulator;
pub mod client;
pub mod config;
pub mod decoder;
pub mod framer;
pub mod messages;
pub mod transport;

pub use accumulator::{fold, Accumulator, Snapshot};
pub use client::{Client, ClientError, StreamEvent, StreamSession};
pub use config::{default_config_path, ApiSection, Config, ConfigError, StreamSection};
pub use decoder::{DecodeError, DecodeStrategy, PayloadDecoder};
pub use framer::{Frame, LineFramer};
pub use messages::{QueryRequest, QueryResponse, Record};
pub use transport::{HttpTransport, Transport, TransportError};
