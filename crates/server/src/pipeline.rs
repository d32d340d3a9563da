use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local};
use quotedesk_core::domain::quote::{format_amount, QuoteRequest, QuoteSubmission};
use quotedesk_core::errors::ApplicationError;
use quotedesk_core::flows::{SubmissionEvent, SubmissionTrail};
use quotedesk_core::recipients::RecipientPlan;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::archive::{ArchivePath, ArchiveSink};
use crate::email::{
    Delivery, DeliveryFailure, DeliveryReceipt, NotificationDispatcher, NotifyError, QuoteNotice,
};
use crate::pdf::{self, LogoImage, LogoSource, RenderOptions, RenderedQuote};

/// How a successfully handled submission should be answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Delivered { receipt: DeliveryReceipt, recipients: RecipientPlan },
    Download { filename: String, pdf: RenderedQuote },
}

pub struct SubmissionReport {
    pub result: Result<SubmissionOutcome, ApplicationError>,
    pub trail: SubmissionTrail,
}

struct ArchiveSettings {
    sink: Arc<dyn ArchiveSink>,
    folder: String,
    timeout: Duration,
}

struct DeliverySettings {
    dispatcher: NotificationDispatcher,
    timeout: Duration,
}

enum NotifyStep {
    Skipped,
    Sent(Delivery),
    Failed(DeliveryFailure),
}

/// Render, then archive and notify side by side. Archive failures are logged and absorbed;
/// a configured notification that fails fails the whole submission.
pub struct QuotePipeline {
    logo: LogoSource,
    company_name: String,
    archive: Option<ArchiveSettings>,
    delivery: Option<DeliverySettings>,
}

impl QuotePipeline {
    pub fn new(logo: LogoSource, company_name: impl Into<String>) -> Self {
        Self { logo, company_name: company_name.into(), archive: None, delivery: None }
    }

    pub fn with_archive(
        mut self,
        sink: Arc<dyn ArchiveSink>,
        folder: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        self.archive = Some(ArchiveSettings { sink, folder: folder.into(), timeout });
        self
    }

    pub fn with_delivery(mut self, dispatcher: NotificationDispatcher, timeout: Duration) -> Self {
        self.delivery = Some(DeliverySettings { dispatcher, timeout });
        self
    }

    pub fn logo(&self) -> &LogoSource {
        &self.logo
    }

    pub fn archive_enabled(&self) -> bool {
        self.archive.is_some()
    }

    pub fn delivery_provider(&self) -> Option<&'static str> {
        self.delivery.as_ref().map(|delivery| delivery.dispatcher.provider())
    }

    pub async fn process(&self, request: QuoteRequest, correlation_id: &str) -> SubmissionReport {
        let quote_id = match request.quote.number.trim() {
            "" => "unknown".to_string(),
            number => number.to_string(),
        };

        let mut trail = SubmissionTrail::default();
        let result = self.run(request, correlation_id, &quote_id, &mut trail).await;
        if let Err(error) = trail.record(SubmissionEvent::ResponseSent) {
            warn!(
                event_name = "quote.flow.invalid_transition",
                correlation_id,
                quote_id = %quote_id,
                error = %error,
                "submission trail could not record the response"
            );
        }

        SubmissionReport { result, trail }
    }

    async fn run(
        &self,
        request: QuoteRequest,
        correlation_id: &str,
        quote_id: &str,
        trail: &mut SubmissionTrail,
    ) -> Result<SubmissionOutcome, ApplicationError> {
        info!(event_name = "quote.submission.received", correlation_id, quote_id, "quote submission received");

        let submission = match QuoteSubmission::try_from(request) {
            Ok(submission) => {
                trail.record(SubmissionEvent::PayloadAccepted)?;
                submission
            }
            Err(validation) => {
                trail.record(SubmissionEvent::PayloadRejected)?;
                warn!(
                    event_name = "quote.validation.rejected",
                    correlation_id,
                    quote_id,
                    field = validation.field(),
                    error = %validation,
                    "quote submission rejected"
                );
                return Err(validation.into());
            }
        };

        if let Some(line_item_sum) = submission.request().total_mismatch() {
            warn!(
                event_name = "quote.total.mismatch",
                correlation_id,
                quote_id,
                declared_total = %format_amount(submission.request().total),
                line_item_sum = %format_amount(line_item_sum),
                "declared total differs from line items; rendering the declared total"
            );
        }

        let year = Local::now().year();
        let (pdf, logo) = match self.render(&submission, year).await {
            Ok(rendered) => {
                trail.record(SubmissionEvent::RenderSucceeded)?;
                rendered
            }
            Err(render_error) => {
                trail.record(SubmissionEvent::RenderFailed)?;
                error!(
                    event_name = "quote.render.failed",
                    correlation_id,
                    quote_id,
                    error = %render_error,
                    "quote render failed"
                );
                return Err(ApplicationError::Render(render_error.to_string()));
            }
        };
        info!(
            event_name = "quote.render.completed",
            correlation_id,
            quote_id,
            bytes = pdf.as_bytes().len(),
            pages = pdf.page_count(),
            "quote rendered"
        );

        let notice = QuoteNotice { submission: &submission, pdf: &pdf, logo: &logo, year };
        let (archive_event, notify_step) = tokio::join!(
            self.archive_step(&pdf, submission.reference(), correlation_id),
            self.notify_step(&notice, correlation_id),
        );
        trail.record(archive_event)?;

        match notify_step {
            NotifyStep::Sent(Delivery { receipt, recipients }) => {
                trail.record(SubmissionEvent::NotificationSent)?;
                Ok(SubmissionOutcome::Delivered { receipt, recipients })
            }
            NotifyStep::Failed(failure) => {
                trail.record(SubmissionEvent::NotificationFailed)?;
                match failure.source.provider() {
                    Some(provider) => Err(ApplicationError::Delivery {
                        provider: provider.to_string(),
                        message: failure.source.to_string(),
                        recipients: failure.recipients,
                    }),
                    None => Err(ApplicationError::Configuration(failure.source.to_string())),
                }
            }
            NotifyStep::Skipped => {
                trail.record(SubmissionEvent::NotificationSkipped)?;
                let filename = submission.attachment_filename();
                trail.record(SubmissionEvent::DownloadPrepared)?;
                Ok(SubmissionOutcome::Download { filename, pdf })
            }
        }
    }

    async fn render(
        &self,
        submission: &QuoteSubmission,
        year: i32,
    ) -> Result<(RenderedQuote, LogoImage), pdf::RenderError> {
        let logo = self.logo.load().await?;
        let options = RenderOptions { year, company_name: self.company_name.clone() };
        let submission = submission.clone();
        tokio::task::spawn_blocking(move || {
            let rendered = pdf::render(&submission, &logo, &options)?;
            Ok((rendered, logo))
        })
        .await
        .map_err(|join_error| pdf::RenderError::Interrupted(join_error.to_string()))?
    }

    async fn archive_step(
        &self,
        pdf: &RenderedQuote,
        reference: &str,
        correlation_id: &str,
    ) -> SubmissionEvent {
        let Some(archive) = &self.archive else {
            info!(
                event_name = "quote.archive.skipped",
                correlation_id,
                quote_id = reference,
                "archive credential absent; skipping upload"
            );
            return SubmissionEvent::ArchiveSkipped;
        };

        let path = ArchivePath::for_quote(&archive.folder, reference);
        match timeout(archive.timeout, archive.sink.archive(pdf.as_bytes(), &path)).await {
            Ok(Ok(receipt)) => {
                info!(
                    event_name = "quote.archive.stored",
                    correlation_id,
                    quote_id = reference,
                    path = %receipt.stored_path,
                    "quote archived"
                );
                SubmissionEvent::ArchiveStored
            }
            Ok(Err(archive_error)) => {
                warn!(
                    event_name = "quote.archive.failed",
                    correlation_id,
                    quote_id = reference,
                    path = %path,
                    error = %archive_error,
                    "quote archive failed; continuing"
                );
                SubmissionEvent::ArchiveFailed
            }
            Err(_) => {
                warn!(
                    event_name = "quote.archive.failed",
                    correlation_id,
                    quote_id = reference,
                    path = %path,
                    timeout_secs = archive.timeout.as_secs(),
                    "quote archive timed out; continuing"
                );
                SubmissionEvent::ArchiveFailed
            }
        }
    }

    async fn notify_step(&self, notice: &QuoteNotice<'_>, correlation_id: &str) -> NotifyStep {
        let quote_id = notice.submission.reference();
        let Some(delivery) = &self.delivery else {
            info!(
                event_name = "quote.notify.skipped",
                correlation_id,
                quote_id,
                "delivery credential absent; returning pdf download"
            );
            return NotifyStep::Skipped;
        };

        let dispatcher = &delivery.dispatcher;
        let outcome = match timeout(delivery.timeout, dispatcher.notify(notice)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DeliveryFailure {
                source: NotifyError::Timeout {
                    provider: dispatcher.provider(),
                    seconds: delivery.timeout.as_secs(),
                },
                recipients: dispatcher.recipients(notice.submission),
            }),
        };

        match outcome {
            Ok(delivery) => {
                info!(
                    event_name = "quote.notify.sent",
                    correlation_id,
                    quote_id,
                    provider = dispatcher.provider(),
                    to = delivery.recipients.to.len(),
                    cc = delivery.recipients.cc.len(),
                    "quote email sent"
                );
                NotifyStep::Sent(delivery)
            }
            Err(failure) => {
                error!(
                    event_name = "quote.notify.failed",
                    correlation_id,
                    quote_id,
                    provider = dispatcher.provider(),
                    error = %failure.source,
                    "quote email failed"
                );
                NotifyStep::Failed(failure)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use quotedesk_core::errors::ApplicationError;
    use quotedesk_core::flows::SubmissionState;

    use super::{QuotePipeline, SubmissionOutcome};
    use crate::archive::tests::MemoryArchive;
    use crate::archive::{ArchiveError, ArchivePath, ArchiveReceipt, ArchiveSink};
    use crate::email::tests::{policy, ScriptedTransport};
    use crate::email::{
        DeliveryReceipt, MailTransport, NotificationDispatcher, NotifyError, OutgoingEmail,
    };
    use crate::pdf::tests::quote_request;
    use crate::pdf::LogoSource;

    pub(crate) const LOGO_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../assets/logo.png");

    struct StalledArchive;

    #[async_trait]
    impl ArchiveSink for StalledArchive {
        async fn archive(&self, _pdf: &[u8], path: &ArchivePath) -> Result<ArchiveReceipt, ArchiveError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ArchiveReceipt { stored_path: path.to_string() })
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl MailTransport for StalledTransport {
        fn provider(&self) -> &'static str {
            "sendgrid"
        }

        async fn send(&self, _email: &OutgoingEmail) -> Result<DeliveryReceipt, NotifyError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(DeliveryReceipt::StatusCode(202))
        }
    }

    pub(crate) fn pipeline(
        logo_path: &str,
        archive: Option<Arc<dyn ArchiveSink>>,
        transport: Option<Arc<dyn MailTransport>>,
    ) -> QuotePipeline {
        let mut pipeline = QuotePipeline::new(LogoSource::new(logo_path), "Split Road Media");
        if let Some(sink) = archive {
            pipeline = pipeline.with_archive(sink, "/Quotes", Duration::from_secs(5));
        }
        if let Some(transport) = transport {
            let dispatcher = NotificationDispatcher::new(
                transport,
                policy(),
                "hello@splitroadmedia.com",
                "Split Road Media",
            )
            .expect("template loads");
            pipeline = pipeline.with_delivery(dispatcher, Duration::from_secs(5));
        }
        pipeline
    }

    #[tokio::test]
    async fn delivered_submission_archives_and_emails_the_same_pdf() {
        let archive = Arc::new(MemoryArchive::default());
        let transport = Arc::new(ScriptedTransport::accepting());
        let pipeline = pipeline(LOGO_PATH, Some(archive.clone()), Some(transport.clone()));

        let report = pipeline.process(quote_request(), "corr-1").await;

        match report.result.expect("delivered") {
            SubmissionOutcome::Delivered { receipt, recipients } => {
                assert_eq!(receipt, DeliveryReceipt::StatusCode(202));
                assert_eq!(recipients.to[0], "buyer@acme.test");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let files = archive.files().await;
        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(files.get("/Quotes/quote-ACM46312.pdf"), Some(&sent[0].attachment.bytes));
        assert_eq!(
            report.trail.path(),
            vec![
                SubmissionState::Received,
                SubmissionState::Validated,
                SubmissionState::Rendered,
                SubmissionState::Archived,
                SubmissionState::Notified,
                SubmissionState::Responded,
            ]
        );
    }

    #[tokio::test]
    async fn unconfigured_delivery_returns_download() {
        let pipeline = pipeline(LOGO_PATH, None, None);

        let report = pipeline.process(quote_request(), "corr-2").await;

        match report.result.expect("download") {
            SubmissionOutcome::Download { filename, pdf } => {
                assert_eq!(filename, "quote-ACM46312.pdf");
                assert!(pdf.as_bytes().starts_with(b"%PDF"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(report.trail.path().contains(&SubmissionState::ArchiveSkipped));
        assert!(report.trail.path().contains(&SubmissionState::DownloadReturned));
    }

    #[tokio::test]
    async fn configured_delivery_failure_is_fatal_and_names_recipients() {
        let archive = Arc::new(MemoryArchive::default());
        let transport = Arc::new(ScriptedTransport::with_script(vec![Err(NotifyError::Rejected {
            provider: "sendgrid",
            status: 403,
            message: "The from address does not match a verified Sender Identity".to_string(),
        })]));
        let pipeline = pipeline(LOGO_PATH, Some(archive.clone()), Some(transport));

        let report = pipeline.process(quote_request(), "corr-3").await;

        match report.result.expect_err("delivery failure") {
            ApplicationError::Delivery { provider, message, recipients } => {
                assert_eq!(provider, "sendgrid");
                assert!(message.contains("verified Sender Identity"));
                assert_eq!(recipients.to, vec!["buyer@acme.test", "accounting@splitroadmedia.com"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(archive.files().await.len(), 1);
        assert!(report.trail.path().contains(&SubmissionState::NotifyFailed));
    }

    #[tokio::test]
    async fn missing_logo_stops_before_archive_and_notification() {
        let archive = Arc::new(MemoryArchive::default());
        let transport = Arc::new(ScriptedTransport::accepting());
        let pipeline = pipeline(
            "/nonexistent/quotedesk/logo.png",
            Some(archive.clone()),
            Some(transport.clone()),
        );

        let report = pipeline.process(quote_request(), "corr-4").await;

        assert!(matches!(report.result, Err(ApplicationError::Render(_))));
        assert_eq!(archive.uploads().await, 0);
        assert!(transport.sent().await.is_empty());
        assert_eq!(
            report.trail.path(),
            vec![
                SubmissionState::Received,
                SubmissionState::Validated,
                SubmissionState::RenderFailed,
                SubmissionState::Responded,
            ]
        );
    }

    #[tokio::test]
    async fn archive_failure_does_not_affect_delivery() {
        let archive = Arc::new(MemoryArchive::failing(ArchiveError::Rejected {
            status: 401,
            message: "invalid_access_token/".to_string(),
        }));
        let transport = Arc::new(ScriptedTransport::accepting());
        let pipeline = pipeline(LOGO_PATH, Some(archive.clone()), Some(transport.clone()));

        let report = pipeline.process(quote_request(), "corr-5").await;

        assert!(matches!(report.result, Ok(SubmissionOutcome::Delivered { .. })));
        assert_eq!(archive.uploads().await, 1);
        assert_eq!(transport.sent().await.len(), 1);
        assert!(report.trail.path().contains(&SubmissionState::ArchiveFailed));
    }

    #[tokio::test]
    async fn archive_timeout_counts_as_archive_failure() {
        let transport = Arc::new(ScriptedTransport::accepting());
        let pipeline = QuotePipeline::new(LogoSource::new(LOGO_PATH), "Split Road Media")
            .with_archive(Arc::new(StalledArchive), "/Quotes", Duration::from_millis(50))
            .with_delivery(
                NotificationDispatcher::new(
                    transport,
                    policy(),
                    "hello@splitroadmedia.com",
                    "Split Road Media",
                )
                .expect("template loads"),
                Duration::from_secs(5),
            );

        let report = pipeline.process(quote_request(), "corr-6").await;

        assert!(report.result.is_ok());
        assert!(report.trail.path().contains(&SubmissionState::ArchiveFailed));
    }

    #[tokio::test]
    async fn notification_timeout_fails_the_submission_and_names_recipients() {
        let archive = Arc::new(MemoryArchive::default());
        let pipeline = QuotePipeline::new(LogoSource::new(LOGO_PATH), "Split Road Media")
            .with_archive(archive.clone(), "/Quotes", Duration::from_secs(5))
            .with_delivery(
                NotificationDispatcher::new(
                    Arc::new(StalledTransport),
                    policy(),
                    "hello@splitroadmedia.com",
                    "Split Road Media",
                )
                .expect("template loads"),
                Duration::from_millis(50),
            );

        let report = pipeline.process(quote_request(), "corr-10").await;

        match report.result.expect_err("timeout") {
            ApplicationError::Delivery { provider, message, recipients } => {
                assert_eq!(provider, "sendgrid");
                assert!(message.contains("did not answer"));
                assert_eq!(recipients.to[0], "buyer@acme.test");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(archive.files().await.len(), 1);
        assert!(report.trail.path().contains(&SubmissionState::NotifyFailed));
    }

    #[tokio::test]
    async fn template_failure_is_reported_as_configuration_error() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Err(NotifyError::Template(
            "Variable `quote.number` not found".to_string(),
        ))]));
        let pipeline = pipeline(LOGO_PATH, None, Some(transport));

        let report = pipeline.process(quote_request(), "corr-11").await;

        let error = report.result.expect_err("template failure");
        assert!(matches!(&error, ApplicationError::Configuration(message) if message.contains("quote.number")));
        assert_eq!(error.user_message(), "An unexpected internal error occurred");
        assert!(report.trail.path().contains(&SubmissionState::NotifyFailed));
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_rendering() {
        let transport = Arc::new(ScriptedTransport::accepting());
        let pipeline = pipeline(LOGO_PATH, None, Some(transport.clone()));
        let mut request = quote_request();
        request.client.email = "not-an-address".to_string();

        let report = pipeline.process(request, "corr-7").await;

        let error = report.result.expect_err("validation");
        assert!(error.is_client_error());
        assert!(transport.sent().await.is_empty());
        assert_eq!(
            report.trail.path(),
            vec![SubmissionState::Received, SubmissionState::Rejected, SubmissionState::Responded]
        );
    }

    #[tokio::test]
    async fn resubmitting_a_reference_keeps_one_archived_file() {
        let archive = Arc::new(MemoryArchive::default());
        let pipeline = pipeline(LOGO_PATH, Some(archive.clone()), None);

        pipeline.process(quote_request(), "corr-8").await.result.expect("first");
        pipeline.process(quote_request(), "corr-9").await.result.expect("second");

        assert_eq!(archive.uploads().await, 2);
        assert_eq!(archive.files().await.len(), 1);
    }
}
