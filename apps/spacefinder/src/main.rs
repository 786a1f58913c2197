use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use spacefinder::breakpoint::Breakpoint;
use spacefinder::config::CliConfig;
use spacefinder::dom::{Document, Page, PageFixture};
use spacefinder::filler::{SpaceFiller, TracingReporter};
use spacefinder::passes::{load_passes, PassReport, RunSummary};
use spacefinder::search::{Spacefinder, TracingVisualizer};
use spacefinder::slot::SlotWriter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = CliConfig::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.spacefinder.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Spacefinder v{}", env!("CARGO_PKG_VERSION"));

    // Load the laid-out page and the passes to run against it
    let page = Arc::new(Page::new(Document::from_fixture(PageFixture::load(&config.page_fixture)?)));
    let (url, breakpoint) = page
        .measure(|doc| (doc.url().to_string(), Breakpoint::detect(doc.viewport_width())))
        .await;
    let passes = load_passes(&config.passes_file)?;
    info!("Loaded {} placement passes at breakpoint {:?}", passes.len(), breakpoint);

    let finder = Arc::new(
        Spacefinder::new(Arc::clone(&page), &config.spacefinder)
            .with_visualizer(Arc::new(TracingVisualizer)),
    );
    info!("Proximity policy: {}", finder.policy_name());

    let filler = SpaceFiller::new(Arc::clone(&finder), Arc::new(TracingReporter));

    // Submit every pass up front; the queue runs them one at a time in order
    let mut submitted = Vec::with_capacity(passes.len());
    for pass in &passes {
        let Some(rules) = pass.rules_for(breakpoint) else {
            warn!(pass = %pass.name, ?breakpoint, "No rule variant for breakpoint; skipping pass");
            submitted.push((pass.name.clone(), None));
            continue;
        };

        let mut writer = SlotWriter::new(Arc::clone(&page), &pass.slot_prefix, pass.slot_height)
            .with_classes(pass.slot_classes.clone());
        if let Some(max_slots) = pass.max_slots {
            writer = writer.with_max_slots(max_slots);
        }
        let outcome = filler.fill_space(rules.clone(), writer.clone(), pass.find_options());
        submitted.push((pass.name.clone(), Some((outcome, writer))));
    }

    let mut reports = Vec::with_capacity(submitted.len());
    for (name, entry) in submitted {
        let report = match entry {
            None => PassReport {
                pass: name,
                filled: false,
                skipped: true,
                slots: Vec::new(),
            },
            Some((outcome, writer)) => {
                let filled = outcome.await;
                PassReport {
                    pass: name,
                    filled,
                    skipped: false,
                    slots: writer.inserted().await,
                }
            }
        };
        info!("Pass '{}' filled={} slots={:?}", report.pass, report.filled, report.slots);
        reports.push(report);
    }

    let summary = RunSummary {
        generated_at: Utc::now(),
        url,
        breakpoint,
        policy: finder.policy_name().to_string(),
        passes: reports,
        document_height: page.measure(|doc| doc.document_height()).await,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
