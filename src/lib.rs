// Prompt Relay - Main Library
//
// A stateless HTTP relay that lets browser clients call the Anthropic Messages
// API without holding the API key. Each POST is validated, normalized into a
// messages request, sent upstream once, and answered with CORS headers.

pub mod backends;
pub mod config;
pub mod error;
pub mod logging;
pub mod prompt;
pub mod proxy;
pub mod requestresponsemetadata;
pub mod upstream;

pub use config::{AcceptedInput, RelayConfig, ResponseEnvelope, ServerArgs};
pub use error::{ProxyError, ProxyResult};
pub use proxy::{create_router, start_proxy_server, ProxyState};
