use alloy::sol_types::SolEvent;

use crate::Receipt;

/// Extension trait for asserting an event gets emitted.
pub trait EventExt<E> {
    /// Checks that the transaction emitted the `expected` event.
    fn emits(&self, expected: E) -> bool;
}

impl<E> EventExt<E> for Receipt
where
    E: SolEvent,
    E: PartialEq,
{
    fn emits(&self, expected: E) -> bool {
        // Extract all events that are the expected type.
        self.logs
            .iter()
            .filter_map(|log| E::decode_log_data(&log.data, true).ok())
            .any(|event| expected == event)
    }
}
