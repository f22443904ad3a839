//! The relay between the radio and the model.
//!
//! Every inbound packet goes through the same single path:
//!
//! 1. **Decode** the envelope into a text message
//! 2. **Filter** on the configured channel
//! 3. **Record** the text as a user turn in the sender's bounded session
//! 4. **Build** the request (system prompt + session) and call the model
//! 5. **Record** the reply as an assistant turn
//! 6. **Segment** the reply into radio-sized frames and send them in order
//!
//! Packets are handled one at a time; a slow model delays everyone.

pub mod dispatch;
pub mod request;
pub mod segment;
pub mod session;
pub mod window;

pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher, DispatcherConfig};
pub use request::build_request;
pub use segment::{Frame, segment};
pub use session::SessionStore;
pub use window::bound_history;
