//! Local Dynamic Map for ETSI ITS-G5 Cooperative Awareness Messages.
//!
//! This library provides functionality to:
//! - Encode and decode CAMs in the fixed-size simple message set layout
//! - Recover absolute ITS timestamps from Generation Delta Time
//! - Keep the latest CAM of every station and query it by age and distance
//! - Receive CAMs over UDP and report the map periodically
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │  Transport  │───▶│  Protocol   │───▶│     LDM     │
//! │    (UDP)    │    │   (Codec)   │    │  (Indexed)  │
//! └─────────────┘    └─────────────┘    └─────────────┘
//!        │                                     │
//!        └─────────────┬───────────────────────┘
//!                      ▼
//!              ┌──────────────┐
//!              │  Collector   │
//!              │(ingest/report)│
//!              └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use camldm::{CamFilter, CollectorBuilder};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collector = CollectorBuilder::new()
//!         .report_interval(Duration::from_secs(2))
//!         .report_filter(CamFilter::new().max_age(10_000))
//!         .build()?;
//!
//!     collector.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod ldm;
pub mod protocol;
pub mod time;
pub mod transport;
pub mod types;

pub use collector::{Collector, CollectorBuilder, CollectorConfig, CollectorStats};
pub use ldm::{CamFilter, Ldm, LdmError};
pub use protocol::{decode, encode, ParseError, WIRE_SIZE};
pub use transport::{CamReceiver, CamSender, TransportConfig, TransportError};
pub use types::{Cam, CamBuilder, CamError, CamField, StationId};
