pub mod settings;

pub use settings::{EnhancementConfig, RelayConfig, ServerConfig, Settings, UpstreamConfig};
