use std::sync::Arc;
use std::time::Duration;

use quotedesk_core::config::{AppConfig, ConfigError, DeliveryConfig, DeliveryProvider, LoadOptions};
use quotedesk_core::recipients::RecipientPolicy;
use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{ArchiveError, ArchiveSink, DropboxArchive};
use crate::email::{
    MailTransport, NotificationDispatcher, NotifyError, ResendTransport, SendGridTransport,
};
use crate::pdf::LogoSource;
use crate::pipeline::QuotePipeline;

pub struct Application {
    pub config: AppConfig,
    pub pipeline: Arc<QuotePipeline>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("notification transport setup failed: {0}")]
    Notify(#[from] NotifyError),
    #[error("archive client setup failed: {0}")]
    Archive(#[from] ArchiveError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Builds provider clients once from configuration. Missing credentials disable the matching
/// step; they are never an error here.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        quote_id = "unknown",
        "starting application bootstrap"
    );

    let logo = LogoSource::new(config.assets.logo_path.clone());
    if !logo.is_readable().await {
        warn!(
            event_name = "system.bootstrap.logo_unreadable",
            correlation_id = "bootstrap",
            quote_id = "unknown",
            path = %config.assets.logo_path.display(),
            "logo asset is not readable; submissions will fail until it is restored"
        );
    }

    let mut pipeline = QuotePipeline::new(logo, config.branding.company_name.clone());

    match DropboxArchive::from_config(&config.archive)? {
        Some(archive) => {
            let sink: Arc<dyn ArchiveSink> = Arc::new(archive);
            pipeline = pipeline.with_archive(
                sink,
                config.archive.folder.clone(),
                Duration::from_secs(config.archive.timeout_secs),
            );
            info!(
                event_name = "system.bootstrap.archive_enabled",
                correlation_id = "bootstrap",
                quote_id = "unknown",
                folder = %config.archive.folder,
                "quote archival enabled"
            );
        }
        None => info!(
            event_name = "system.bootstrap.archive_disabled",
            correlation_id = "bootstrap",
            quote_id = "unknown",
            "no archive credential; quote archival disabled"
        ),
    }

    match mail_transport(&config.delivery)? {
        Some(transport) => {
            let policy = RecipientPolicy::new(
                config.delivery.to_addresses.clone(),
                config.delivery.cc_addresses.clone(),
            );
            let dispatcher = NotificationDispatcher::new(
                transport,
                policy,
                config.delivery.from_address.clone(),
                config.branding.company_name.clone(),
            )?;
            pipeline = pipeline
                .with_delivery(dispatcher, Duration::from_secs(config.delivery.timeout_secs));
            info!(
                event_name = "system.bootstrap.delivery_enabled",
                correlation_id = "bootstrap",
                quote_id = "unknown",
                provider = config.delivery.provider.as_str(),
                "quote email delivery enabled"
            );
        }
        None => info!(
            event_name = "system.bootstrap.delivery_disabled",
            correlation_id = "bootstrap",
            quote_id = "unknown",
            "no delivery credential; quotes will be returned as downloads"
        ),
    }

    Ok(Application { config, pipeline: Arc::new(pipeline) })
}

fn mail_transport(config: &DeliveryConfig) -> Result<Option<Arc<dyn MailTransport>>, NotifyError> {
    if !config.is_configured() {
        return Ok(None);
    }
    let Some(api_key) = config.api_key.clone() else {
        return Ok(None);
    };

    let timeout = Duration::from_secs(config.timeout_secs);
    let transport: Arc<dyn MailTransport> = match config.provider {
        DeliveryProvider::SendGrid => {
            Arc::new(SendGridTransport::new(api_key, config.base_url.clone(), timeout)?)
        }
        DeliveryProvider::Resend => {
            Arc::new(ResendTransport::new(api_key, config.base_url.clone(), timeout)?)
        }
    };
    Ok(Some(transport))
}
