//! Form persistence: one header, then its records, on a fresh session.

use crate::cancel::CancellationToken;
use crate::error::{IngestError, Result};
use crate::retry::{retry, RetryPolicy};
use scoutwatch_db::{StoreConnector, StoreSession};
use scoutwatch_protocol::Form;
use tracing::{debug, warn};

/// Drives the header-then-records protocol against a store.
///
/// Every form gets its own session, opened under the connect retry policy
/// and closed on every exit path. A header that fails to insert means no
/// record is attempted. A record that keeps failing after `record_retries`
/// extra attempts ends the form as [`IngestError::PartiallyPersisted`].
#[derive(Debug)]
pub struct PersistenceOrchestrator<C> {
    connector: C,
    connect_retry: RetryPolicy,
    record_retries: u32,
}

impl<C: StoreConnector> PersistenceOrchestrator<C> {
    pub fn new(connector: C, connect_retry: RetryPolicy, record_retries: u32) -> Self {
        Self {
            connector,
            connect_retry,
            record_retries,
        }
    }

    /// Persist one form and assign its store-generated id.
    pub async fn store(&self, form: &mut Form, cancel: &CancellationToken) -> Result<i64> {
        if let Some(existing) = form.form_id() {
            return Err(IngestError::InvalidState(format!(
                "form already persisted as {}",
                existing
            )));
        }

        let mut session = self.connect(cancel).await?;
        let result = self.store_in_session(&mut session, form).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close store session");
        }
        result
    }

    /// Persist forms in order. Stops after the first fatal error, which is
    /// the last entry of the returned list.
    pub async fn store_all(
        &self,
        forms: &mut [Form],
        cancel: &CancellationToken,
    ) -> Vec<Result<i64>> {
        let mut results = Vec::with_capacity(forms.len());
        for form in forms.iter_mut() {
            let result = self.store(form, cancel).await;
            let fatal = matches!(&result, Err(e) if e.is_fatal());
            results.push(result);
            if fatal {
                break;
            }
        }
        results
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<C::Session> {
        let connector = &self.connector;
        retry(&self.connect_retry, cancel, |attempt| async move {
            let session = connector.connect().await;
            if let Err(e) = &session {
                warn!(attempt, error = %e, "Store connection failed");
            }
            session
        })
        .await
        .map_err(|exhausted| IngestError::StoreUnavailable {
            attempts: exhausted.attempts,
            message: match exhausted.last_error {
                Some(e) => e.to_string(),
                None => "cancelled before connecting".to_string(),
            },
        })
    }

    async fn store_in_session(&self, session: &mut C::Session, form: &mut Form) -> Result<i64> {
        let form_id = session.insert_report(form).await?;
        form.assign_id(form_id);

        let total = form.records.len();
        for (stored, record) in form.records.iter().enumerate() {
            let mut retries = 0;
            loop {
                match session
                    .insert_record(&record.value, form_id, record.item_id)
                    .await
                {
                    Ok(()) => break,
                    Err(e) if retries < self.record_retries => {
                        retries += 1;
                        warn!(form_id, item_id = record.item_id, retries, error = %e, "Retrying record insert");
                    }
                    Err(e) => {
                        return Err(IngestError::PartiallyPersisted {
                            form_id,
                            stored,
                            total,
                            item_id: record.item_id,
                            source: e,
                        })
                    }
                }
            }
        }

        debug!(form_id, records = total, "Form persisted");
        Ok(form_id)
    }
}
