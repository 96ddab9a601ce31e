use std::sync::Arc;

use crate::{
    pipeline::{PipelineError, Sink},
    snapshot::{Snapshot, WorkingSet},
};

#[async_trait::async_trait]
impl Sink<Arc<Snapshot>> for WorkingSet {
    async fn publish(&self, item: Arc<Snapshot>) -> Result<(), PipelineError> {
        let readings = item.len();
        let unchanged = !item.digest().is_empty() && self.current().digest() == item.digest();
        self.replace(item);
        tracing::debug!(readings, unchanged, "working set replaced");
        Ok(())
    }

    async fn report_failure(&self, error: &PipelineError) {
        self.record_failure(error);
    }
}
