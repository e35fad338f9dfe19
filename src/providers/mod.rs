pub mod openai;
pub mod streaming;
pub mod upstream;

pub use openai::OpenAIProvider;
pub use upstream::UpstreamClient;
