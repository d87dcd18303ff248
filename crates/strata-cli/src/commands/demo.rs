use std::path::Path;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use strata::MemoryManager;
use strata::config::Config;
use strata::memory::{Classification, RecordKind, RetrievedRecord, TierStats};
use strata::storage::{CompressionPass, CompressionReport};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, truncate_string};

/// Seed facts and their factuality
const FACTS: [(&str, f32); 8] = [
    ("The sky is blue.", 0.9),
    ("Cats can fly.", 0.1),
    ("The Earth revolves around the Sun.", 1.0),
    ("The capital of France is Paris", 0.95),
    ("Dogs are a domesticated descendant of wolves.", 0.8),
    ("Water is essential for life.", 0.9),
    ("The Eiffel Tower is in Rome", 0.1),
    ("Humans are mammals.", 0.9),
];

/// Near-duplicate of the first fact, folded away by the compression pass
const NEAR_DUPLICATE: &str = "The sky is blue today.";

#[derive(Parser)]
pub struct DemoCommand {
    #[clap(long, short = 'k', default_value = "3", help = "Results per query")]
    pub top_k: usize,

    #[clap(
        long,
        short,
        default_value = "3",
        help = "How many times the first query is repeated before promotion"
    )]
    pub rounds: u32,

    #[clap(long, short, help = "Extra queries to run after the seed queries")]
    pub query: Vec<String>,
}

struct QueryRun {
    query: String,
    results: Vec<RetrievedRecord>,
}

impl DemoCommand {
    pub async fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let config = Config::load(config_path)?;
        let manager = MemoryManager::from_config(config)?;

        let mut ids = Vec::with_capacity(FACTS.len());
        for (content, factuality) in FACTS {
            let record = manager
                .insert(content, Classification::new(RecordKind::Text).with_factuality(factuality))
                .await?;
            ids.push(record.id);
        }
        // sky <-> earth
        manager.relate(&ids[0], &ids[2], 1.0).await?;
        tracing::info!("Seeded {} records", ids.len());

        let mut runs = Vec::new();
        for _ in 0..self.rounds.max(1) {
            runs.push(self.run_query(&manager, "sky").await?);
        }
        runs.push(self.run_query(&manager, "Paris").await?);

        let promotion = manager.promote().await?;
        runs.push(self.run_query(&manager, "sky").await?);

        manager
            .insert(NEAR_DUPLICATE, Classification::new(RecordKind::Text).with_factuality(0.9))
            .await?;
        let pass = manager.compress().await?;

        for query in &self.query {
            runs.push(self.run_query(&manager, query).await?);
        }

        manager.verify_consistency().await?;
        let report = manager.get_compression_report().await;
        let tiers = manager.tier_stats().await;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "queries": runs.iter().map(|run| {
                        serde_json::json!({
                            "query": run.query,
                            "results": run.results,
                        })
                    }).collect::<Vec<_>>(),
                    "promotion": promotion,
                    "compression": pass,
                    "report": report,
                    "tiers": tiers,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                for run in &runs {
                    print_query(run);
                }

                println!(
                    "Promotion: {} boosted, {} new placements\n",
                    promotion.boosted.len(),
                    promotion.placements.len()
                );

                print_compression(&pass, &report);
                print_tiers(&tiers);
            }
        }

        Ok(())
    }

    async fn run_query(&self, manager: &MemoryManager, query: &str) -> CliResult<QueryRun> {
        let results = manager.retrieve(query, self.top_k).await?;
        Ok(QueryRun {
            query: query.to_string(),
            results,
        })
    }
}

fn print_query(run: &QueryRun) {
    println!("Query: {:?}", run.query);

    if run.results.is_empty() {
        println!("(no results)\n");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Score", "Content", "Importance", "Accesses", "Tiers"]);

    for hit in &run.results {
        table.add_row([
            format!("{:.3}", hit.score),
            truncate_string(&hit.record.content, 48),
            format!("{:.2}", hit.record.importance),
            hit.record.access_count.to_string(),
            hit.tiers.join(", "),
        ]);
    }

    println!("{table}\n");
}

fn print_compression(pass: &CompressionPass, report: &CompressionReport) {
    println!("Compression");
    println!("===========\n");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Metric", "Value"]);

    table.add_row(["Records before", &pass.records_before.to_string()]);
    table.add_row(["Clusters found", &pass.clusters_found.to_string()]);
    table.add_row(["Clusters merged", &pass.clusters_merged.to_string()]);
    table.add_row(["Records merged away", &pass.records_merged_away.to_string()]);
    table.add_row(["Failed clusters", &report.failed_clusters.to_string()]);
    table.add_row(["Total records", &report.total_records.to_string()]);
    table.add_row(["Redundant records", &report.redundant_records.to_string()]);
    table.add_row(["Compression ratio", &format!("{:.1}%", report.compression_ratio * 100.0)]);
    table.add_row([
        "Last pass",
        &report
            .last_compression_at
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string()),
    ]);

    println!("{table}\n");

    for failure in &pass.failed {
        println!("Cluster {} failed: {}", failure.base, failure.reason);
    }
}

fn print_tiers(tiers: &[TierStats]) {
    println!("Tiers");
    println!("=====\n");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Tier", "Members", "Capacity", "Policy", "Admission"]);

    for tier in tiers {
        table.add_row([
            tier.name.clone(),
            tier.len.to_string(),
            tier.capacity
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unbounded".to_string()),
            tier.policy.to_string(),
            tier.admission.to_string(),
        ]);
    }

    println!("{table}");
}
