//! The subset of the payment processor the repair tasks rely on.

pub mod error;
pub mod memory;
pub mod stripe;

pub use error::{ApiError, ApiResult};

use crate::model::{Customer, PaymentSource};

/// Source object type listed when looking for duplicate card sources.
pub const SOURCE_TYPE: &str = "source";

/// Most sources returned by one list call.
pub const MAX_SOURCES_PER_CUSTOMER: u32 = 100;

pub trait PaymentApi {
    fn list_sources(
        &self,
        customer_id: &str,
        limit: u32,
        source_type: &str,
    ) -> ApiResult<Vec<PaymentSource>>;

    fn retrieve_source(&self, customer_id: &str, source_id: &str) -> ApiResult<PaymentSource>;

    fn detach_source(&self, customer_id: &str, source_id: &str) -> ApiResult<()>;

    fn set_default_source(&self, customer_id: &str, source_id: &str) -> ApiResult<()>;

    fn get_customer(&self, customer_id: &str) -> ApiResult<Customer>;
}
