//! Response types for search cluster operations.

/// Per-item bulk error class signaling backpressure from the cluster.
pub const REJECTED_EXECUTION_TYPE: &str = "es_rejected_execution_exception";

/// Per-item bulk error class signaling the target index has been closed.
pub const INDEX_CLOSED_TYPE: &str = "index_closed_exception";

/// HTTP status the cluster returns for rejected bulk items.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// A non-retryable per-item bulk failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemError {
    /// Document id the failed action targeted.
    pub id: String,
    /// HTTP status of the item.
    pub status: u16,
    /// Error `type` string from the response item.
    pub error_type: String,
    /// Human-readable reason, as reported by the cluster.
    pub reason: String,
}

/// Classified outcome of one bulk request.
///
/// The dispatcher branches on this: any rejected item requeues the whole
/// chunk, an index-closed item abandons the run, and remaining item errors
/// are surfaced to the log without blocking progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    /// Items that completed successfully.
    pub succeeded: usize,
    /// Items rejected with 429 or a rejected-execution error type.
    pub rejected: usize,
    /// Whether any item failed because the index is closed.
    pub index_closed: bool,
    /// Non-retryable item failures other than index-closed.
    pub item_errors: Vec<BulkItemError>,
}

impl BulkOutcome {
    /// Whether the chunk must be requeued on the retry channel.
    pub fn needs_retry(&self) -> bool {
        self.rejected > 0
    }

    /// Classify one response item into this outcome.
    pub fn record_item(&mut self, id: &str, status: u16, error_type: Option<&str>, reason: Option<&str>) {
        let rejected = status == STATUS_TOO_MANY_REQUESTS
            || error_type == Some(REJECTED_EXECUTION_TYPE);
        if rejected {
            self.rejected += 1;
            return;
        }
        if error_type == Some(INDEX_CLOSED_TYPE) {
            self.index_closed = true;
            return;
        }
        match error_type {
            Some(error_type) => self.item_errors.push(BulkItemError {
                id: id.to_string(),
                status,
                error_type: error_type.to_string(),
                reason: reason.unwrap_or_default().to_string(),
            }),
            None => self.succeeded += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rejections_by_status_and_type() {
        let mut outcome = BulkOutcome::default();
        outcome.record_item("1", 429, None, None);
        outcome.record_item("2", 500, Some(REJECTED_EXECUTION_TYPE), Some("queue full"));
        outcome.record_item("3", 200, None, None);
        assert_eq!(outcome.rejected, 2);
        assert_eq!(outcome.succeeded, 1);
        assert!(outcome.needs_retry());
        assert!(!outcome.index_closed);
    }

    #[test]
    fn classifies_index_closed() {
        let mut outcome = BulkOutcome::default();
        outcome.record_item("1", 400, Some(INDEX_CLOSED_TYPE), Some("closed"));
        assert!(outcome.index_closed);
        assert!(!outcome.needs_retry());
        assert!(outcome.item_errors.is_empty());
    }

    #[test]
    fn other_errors_are_collected() {
        let mut outcome = BulkOutcome::default();
        outcome.record_item("9", 400, Some("mapper_parsing_exception"), Some("bad field"));
        assert_eq!(outcome.item_errors.len(), 1);
        assert_eq!(outcome.item_errors[0].id, "9");
        assert_eq!(outcome.item_errors[0].status, 400);
        assert!(!outcome.needs_retry());
    }
}
