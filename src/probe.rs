//! The one-shot probe: collect, extract, write
use std::path::{Path, PathBuf};

use log::info;

use crate::collector::MetricsCollector;
use crate::config::Settings;
use crate::error::Result;
use crate::extract::{extract, Extraction};
use crate::output;

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Number of records the collector returned
    pub records: usize,
    /// How the target metric was resolved
    pub extraction: Extraction,
    /// File the value was written to
    pub path: PathBuf,
}

impl ProbeReport {
    /// The value that was written
    pub fn value(&self) -> f64 {
        self.extraction.value()
    }
}

/// Run one collection pass and persist the target metric
///
/// `output_dir` defaults to the current working directory. Any error is
/// returned before the output file is touched.
pub async fn run<C>(collector: &C, settings: &Settings, output_dir: Option<&Path>) -> Result<ProbeReport>
where
    C: MetricsCollector + ?Sized,
{
    let config = settings.collection_config();
    info!("Starting collection with {}", collector.name());
    let records = collector.gather(&config).await?;

    for record in &records {
        info!("Metric: {}", record);
    }

    let extraction = extract(
        &records,
        &settings.options.target_metric,
        &settings.options.value_field,
    );

    let path = output::resolve_path(output_dir, &settings.options.output_file)?;
    output::write_value(&path, extraction.value())?;

    info!(
        "Metric value written to file: {}",
        output::format_value(extraction.value())
    );

    Ok(ProbeReport {
        records: records.len(),
        extraction,
        path,
    })
}
