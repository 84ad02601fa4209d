//! Terminal output.

use anyhow::Result;
use docrag::{Answer, IndexInfo, IngestReport};

const PREVIEW_CHARS: usize = 80;

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

pub fn index_info(info: &IndexInfo, json: bool) -> Result<()> {
    if json {
        return print_json(info);
    }
    println!(
        "Index '{}' ready: {} dimensions, {} similarity, {} record(s)",
        info.name, info.dimensions, info.metric, info.record_count
    );
    Ok(())
}

pub fn report(report: &IngestReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "{}: {}/{} chunk(s) indexed",
        report.document_id,
        report.succeeded.len(),
        report.total_chunks
    );
    if report.stale_removed > 0 {
        println!("  removed {} chunk(s) left from an earlier version", report.stale_removed);
    }
    for failure in &report.failed {
        println!("  ! chunk {} ({}): {}", failure.index, failure.chunk_id, failure.error);
    }
    Ok(())
}

pub fn answer(answer: &Answer, json: bool) -> Result<()> {
    if json {
        return print_json(answer);
    }
    println!("{}", answer.text.trim());
    if answer.sources.is_empty() {
        return Ok(());
    }
    let cached = if answer.from_cache { " (cached)" } else { "" };
    println!("\nSources{cached}:");
    for (rank, source) in answer.sources.iter().enumerate() {
        let origin = source.record.metadata.get("source").unwrap_or(&source.record.document_id);
        println!(
            "  {}. [{:.3}] {} {}\n     {}",
            rank + 1,
            source.score,
            origin,
            source.record.id,
            preview(&source.record.text)
        );
    }
    Ok(())
}
