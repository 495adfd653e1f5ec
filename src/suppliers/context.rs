//! Upstream context profiling
//!
//! Produces the product and customer profile blobs consumed by question
//! and review generation. The two halves are independent, so they are
//! fetched concurrently. The engine treats both as opaque JSON.

use super::openai::OpenAiSupplier;
use super::{ContextProvider, SupplierError};
use crate::survey::UpstreamContext;
use async_trait::async_trait;
use serde_json::Value;

const PRODUCT_SYSTEM_PROMPT: &str = "You profile products ahead of a review survey. \
From the submitted form data, derive the product's likely major concerns, key features, \
pros, cons and common use cases. \
Respond with a JSON object: {\"major_concerns\": [str], \"key_features\": [str], \
\"pros\": [str], \"cons\": [str], \"common_use_cases\": [str], \"confidence_score\": 0-1}";

const CUSTOMER_SYSTEM_PROMPT: &str = "You profile customers ahead of a review survey. \
From the submitted form data, derive the customer's likely concerns, expectations, \
purchase motivations, pain points and segment. \
Respond with a JSON object: {\"major_concerns\": [str], \"expectations\": [str], \
\"purchase_motivations\": [str], \"pain_points\": [str], \"user_segment\": str, \
\"confidence_score\": 0-1}";

#[async_trait]
impl ContextProvider for OpenAiSupplier {
    async fn fetch_context(
        &self,
        item_id: &str,
        user_id: &str,
        form_inputs: &Value,
    ) -> Result<UpstreamContext, SupplierError> {
        let form = serde_json::to_string_pretty(form_inputs).unwrap_or_else(|_| "{}".to_string());
        let product_prompt =
            format!("Product ID: {item_id}\n\nForm data:\n{form}\n\nProfile this product.");
        let customer_prompt = format!(
            "User ID: {user_id}\nProduct ID: {item_id}\n\nForm data:\n{form}\n\nProfile this customer."
        );

        let (product, customer) = tokio::try_join!(
            self.complete_json(PRODUCT_SYSTEM_PROMPT, &product_prompt),
            self.complete_json(CUSTOMER_SYSTEM_PROMPT, &customer_prompt),
        )?;

        Ok(UpstreamContext { product, customer })
    }
}
