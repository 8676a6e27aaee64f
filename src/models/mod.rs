pub mod http;

use crate::error::ChatError;

/// One prompt in, one completion out. Implementations make a single attempt; retrying is
/// the caller's business.
pub trait ChatModel {
    fn name(&self) -> &str;
    fn chat(&self, prompt: &str) -> Result<String, ChatError>;
}
