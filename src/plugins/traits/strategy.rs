use async_trait::async_trait;

use crate::scraper::PageDriver;
use crate::utils::error::Result;

/// One way of pulling a price out of a loaded product page.
///
/// `Ok(None)` means the strategy found nothing and the next one should run;
/// `Err` is logged by the caller and treated the same way.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Raw candidate price text; the caller validates it.
    async fn attempt(&self, page: &dyn PageDriver) -> Result<Option<String>>;
}
