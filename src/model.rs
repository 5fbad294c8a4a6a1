use async_trait::async_trait;

use crate::Result;
use crate::types::{GenerateRequest, GenerateResponse};

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn provider(&self) -> &str;
    fn model_id(&self) -> &str;

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;
}
