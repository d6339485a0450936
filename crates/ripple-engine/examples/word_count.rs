//! Word counting over a stream of lines.
//!
//! Lines arrive as events; `WORDS` keeps a running count per word and
//! `SHOUTED` derives an upper-cased label for every counted word. A callback
//! timer injects a late line to show timers feeding the event phase.
//!
//! Run with:
//!   RUST_LOG=ripple_engine=debug cargo run --example word_count -p ripple-engine

use chrono::{Duration, TimeZone, Utc};
use ripple_engine::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

static LINES: EventChannel<String> = EventChannel::new("LINES");
static WORDS: EntityKey<String, u64> = EntityKey::new("WORDS");
static SHOUTED: EntityKey<String, String> = EntityKey::new("SHOUTED");

struct WordCounter;

struct WordCount {
    word: String,
}

impl ElementManager<String, u64> for WordCounter {
    fn create(
        &self,
        key: &String,
        _ctx: &UpdateContext,
        _toolbox: &mut Toolbox<'_>,
    ) -> Box<dyn ElementUpdater<u64>> {
        Box::new(WordCount { word: key.clone() })
    }

    fn on_event(&self, event: &Event) -> Vec<String> {
        event
            .value(&LINES)
            .map(|line| line.split_whitespace().map(str::to_lowercase).collect())
            .unwrap_or_default()
    }
}

impl ElementUpdater<u64> for WordCount {
    fn update(
        &mut self,
        previous: Option<&u64>,
        _ctx: &UpdateContext,
        toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<u64> {
        let seen = toolbox
            .events_on(&LINES)
            .flat_map(|line| line.split_whitespace())
            .filter(|word| word.to_lowercase() == self.word)
            .count() as u64;
        UpdateResult::maybe(previous, previous.copied().unwrap_or(0) + seen)
    }
}

struct Shout;

impl SimpleElementManager<String, String> for Shout {
    fn update(
        &self,
        key: &String,
        previous: Option<&String>,
        _ctx: &UpdateContext,
        toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<String> {
        match toolbox.state(&WORDS, key) {
            Some(count) => UpdateResult::maybe(previous, format!("{} x{count}", key.to_uppercase())),
            None => UpdateResult::NotReady,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut engine = EngineBuilder::new()
        .channel(&LINES)
        .entity(&WORDS, WordCounter, &[], &[LINES.erased()])
        .simple_entity(&SHOUTED, Shout, &[WORDS.erased()])
        .build()?;

    let start = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
    engine.schedule(start + Duration::seconds(2), |scope| {
        scope.inject(&LINES, "that is the question".to_owned())?;
        Ok(())
    });

    let text = ["To be or not to be", "", "to sleep perchance to dream"];
    let mut seen = engine.latest_context();
    for (second, line) in text.iter().enumerate() {
        if !line.is_empty() {
            engine.inject_event(&LINES, (*line).to_owned())?;
        }
        let ctx = engine.run_once(start + Duration::seconds(second as i64))?;
        let diagnostics = engine.last_diagnostics();

        println!(
            "tick {} @ {}: {} events, {} created, {} updated",
            ctx.update_id(),
            ctx.time(),
            diagnostics.events_dispatched,
            diagnostics.elements_created,
            diagnostics.updates_invoked,
        );
        for unit in engine.updated_since(&SHOUTED, &seen)? {
            if let Some(label) = unit.state() {
                println!("  {label}");
            }
        }
        seen = ctx;
    }

    println!("{} distinct words", engine.element_count("WORDS")?);
    Ok(())
}
