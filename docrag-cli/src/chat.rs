//! Interactive question loop.

use anyhow::Result;
use docrag::{RagError, RagPipeline};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;

use crate::display;

const HELP: &str = "Type a question, /stats for cache statistics, /quit to exit.";

pub async fn run(pipeline: &RagPipeline) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("{HELP}");

    loop {
        let line = match editor.readline("\n? ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(question);

        match question {
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/stats" => {
                let stats = pipeline.cache_stats().await;
                println!(
                    "cache: {} hit(s), {} miss(es), {} entr(ies)",
                    stats.hits, stats.misses, stats.entries
                );
            }
            _ => ask(pipeline, question).await?,
        }
    }
    Ok(())
}

async fn ask(pipeline: &RagPipeline, question: &str) -> Result<()> {
    match pipeline.ask(question).await {
        Ok(answer) => display::answer(&answer, false),
        // One immediate retry from the saved prompt before giving up on the question.
        Err(RagError::GenerationError { message, context }) => {
            warn!(error = %message, "generation failed, retrying once");
            match pipeline.retry_generation(*context).await {
                Ok(answer) => display::answer(&answer, false),
                Err(e) => {
                    eprintln!("error: {e}");
                    Ok(())
                }
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(())
        }
    }
}
