//! Exotel telephony integration
//!
//! [`protocol`] models the bidirectional media stream the provider opens to
//! this gateway; [`outbound`] drives the provider's REST API to place calls
//! that land on a pre-built voice app.

pub mod outbound;
pub mod protocol;

pub use outbound::ExotelClient;
pub use protocol::{OutboundFrame, StreamEvent};
