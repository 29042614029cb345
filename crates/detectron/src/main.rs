use common::setup_logging;
use detectron::{DetectronProcessor, ImageDescriptor, ProcessorConfig};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let config = ProcessorConfig::from_env()?;

    setup_logging(config.environment);

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    let images: Vec<ImageDescriptor> = std::env::args_os()
        .skip(1)
        .map(|arg| PathBuf::from(arg).into())
        .collect();
    if images.is_empty() {
        anyhow::bail!("usage: detectron-fields <image> [<image> ...]");
    }

    tracing::info!("Loading detection model");
    let mut processor = DetectronProcessor::from_config(&config)?;
    tracing::info!("Model loaded successfully");

    let records = processor.process_batch(images)?;

    for (index, record) in records.iter().enumerate() {
        tracing::info!(image = index, fields = record.len(), "Processed image");
        for (name, field) in record {
            tracing::info!(image = index, field = %name, "{}", field);
        }
    }

    Ok(())
}
