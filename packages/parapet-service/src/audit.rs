use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::error;

use parapet_domain::audit::AuditRecord;

use crate::BoxFuture;

/// Destination for finalized audit records. The service never awaits the
/// sink on the response path; records travel through the buffered writer.
pub trait AuditSink
where
	Self: Send + Sync,
{
	fn emit<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, color_eyre::Result<()>>;
}

/// Default sink: one structured event per record.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
	fn emit<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			tracing::info!(
				target: "parapet::audit",
				request_id = %record.request_id,
				caller_id_hash = record.caller_id_hash.as_str(),
				stages = ?record.stage_labels(),
				tokens_used = record.tokens_used,
				outcome = record.outcome.as_str(),
				"Audit record finalized."
			);

			Ok(())
		})
	}
}

/// Durable sink for operators: append-only `audit_records` table.
pub struct PgAuditSink {
	pub pool: sqlx::PgPool,
}

impl AuditSink for PgAuditSink {
	fn emit<'a>(&'a self, record: &'a AuditRecord) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			parapet_storage::audit::insert_record(
				&self.pool,
				record.request_id,
				record.timestamp,
				&record.caller_id_hash,
				serde_json::json!(record.stage_labels()),
				record.tokens_used as i32,
				record.outcome.as_str(),
			)
			.await?;

			Ok(())
		})
	}
}

enum AuditMessage {
	Record(AuditRecord),
	Flush(oneshot::Sender<()>),
}

/// Buffered writer between the pipeline and the sink. `record` never blocks
/// the response path; `flush` resolves only after every record queued before
/// it has reached the sink, which is what the shutdown path relies on.
pub struct AuditWriter {
	tx: mpsc::Sender<AuditMessage>,
}

impl AuditWriter {
	pub fn spawn(sink: Arc<dyn AuditSink>, buffer_capacity: usize) -> Self {
		let (tx, mut rx) = mpsc::channel(buffer_capacity.max(1));

		tokio::spawn(async move {
			while let Some(message) = rx.recv().await {
				match message {
					AuditMessage::Record(record) => {
						if let Err(err) = sink.emit(&record).await {
							error!(
								error = %err,
								request_id = %record.request_id,
								"Audit sink write failed."
							);
						}
					},
					AuditMessage::Flush(ack) => {
						let _ = ack.send(());
					},
				}
			}
		});

		Self { tx }
	}

	pub fn record(&self, record: AuditRecord) {
		if self.tx.try_send(AuditMessage::Record(record)).is_err() {
			error!("Audit buffer is full; dropping a record.");
		}
	}

	pub async fn flush(&self) {
		let (ack, done) = oneshot::channel();

		if self.tx.send(AuditMessage::Flush(ack)).await.is_ok() {
			let _ = done.await;
		}
	}
}
