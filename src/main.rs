use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use tour_engine::analytics::TracingSink;
use tour_engine::catalog::{StepAnchor, StepPosition, TourCatalog, TourId};
use tour_engine::clock::SystemClock;
use tour_engine::config::TourConfig;
use tour_engine::error::RenderError;
use tour_engine::locator::ElementProbe;
use tour_engine::navigation::BroadcastNavigation;
use tour_engine::render::{RenderedStep, RenderedTip, TipId, TourRenderer};
use tour_engine::runtime::{TourDeps, TourRuntime};

/// Prints steps and tips to stdout.
struct ConsoleRenderer {
    /// 0 when unknown.
    width: AtomicU32,
}

#[async_trait]
impl TourRenderer for ConsoleRenderer {
    fn viewport_width(&self) -> Option<u32> {
        match self.width.load(Ordering::Relaxed) {
            0 => None,
            width => Some(width),
        }
    }

    async fn show_step(&self, step: RenderedStep) -> Result<(), RenderError> {
        println!(
            "\n[{} {}/{}] {} ({:?}, {})",
            step.tour_id,
            step.index + 1,
            step.total,
            step.title,
            step.presentation,
            step.position
        );
        println!("   {}", step.text);
        match &step.anchor {
            Some(anchor) => println!("   anchored to {anchor}"),
            None => println!("   (anchor missing, shown centered)"),
        }
        let buttons: Vec<String> = step
            .buttons
            .iter()
            .map(|b| format!("[{}]", b.label))
            .collect();
        println!("   {}", buttons.join(" "));
        Ok(())
    }

    async fn hide(&self) -> Result<(), RenderError> {
        println!("\n(tour closed)");
        Ok(())
    }

    async fn show_tip(&self, tip: RenderedTip) -> Result<(), RenderError> {
        println!(
            "\n💡 {} ({} at {}) [{}] id={}",
            tip.message, tip.position, tip.anchor, tip.button_label, tip.id
        );
        Ok(())
    }

    async fn hide_tip(&self, tip_id: TipId) -> Result<(), RenderError> {
        println!("\n(tip {tip_id} hidden)");
        Ok(())
    }
}

/// Anchors the operator has declared present with `show`.
#[derive(Default)]
struct DeclaredElements {
    everything: AtomicBool,
    selectors: Mutex<HashSet<String>>,
}

impl DeclaredElements {
    fn declare(&self, selector: String) {
        if let Ok(mut selectors) = self.selectors.lock() {
            selectors.insert(selector);
        }
    }
}

#[async_trait]
impl ElementProbe for DeclaredElements {
    async fn is_present(&self, selector: &str) -> bool {
        self.everything.load(Ordering::Relaxed)
            || self
                .selectors
                .lock()
                .map(|s| s.contains(selector))
                .unwrap_or(false)
    }
}

/// `#id`, `.class` and `[attr]` are taken as selectors, anything else as a
/// step marker name.
fn parse_anchor(raw: &str) -> StepAnchor {
    if raw.starts_with(['#', '.', '[']) {
        StepAnchor::selector(raw)
    } else {
        StepAnchor::marker(raw)
    }
}

const HELP: &str = "\
commands:
  list | eligible | status
  start <tour> | restart <tour>
  next | back | complete | dismiss | cancel
  nav <url>              publish a completed navigation (may auto-start a tour)
  show <anchor|*>        declare an anchor present
  width <px>             set the viewport width (0 = unknown)
  tip <anchor> <message> show a quick tip
  untip <id>             hide a quick tip
  quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = TourConfig::from_env();
    config.validate()?;

    eprintln!("🧭 Tour engine v{}", env!("CARGO_PKG_VERSION"));

    let store = tour_engine::store::open(&config).await?;

    let navigation = BroadcastNavigation::new();
    let probe = Arc::new(DeclaredElements::default());
    let renderer = Arc::new(ConsoleRenderer {
        width: AtomicU32::new(0),
    });

    let deps = TourDeps {
        catalog: Arc::new(TourCatalog::builtin()),
        store: Some(store),
        probe: probe.clone(),
        renderer: renderer.clone(),
        navigation: Some(navigation.clone()),
        navigator: Some(navigation.clone()),
        analytics: Arc::new(TracingSink),
        clock: Arc::new(SystemClock),
    };
    let runtime = TourRuntime::new(config, deps);
    runtime.watch_navigation().await;

    eprintln!("   Tours: {}", runtime.catalog().len());
    eprintln!("{HELP}\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "list" => {
                for tour in runtime.list_available() {
                    println!("{:<16} {}: {}", tour.id.as_str(), tour.name, tour.description);
                }
            }
            "eligible" => {
                for tour in runtime.eligible_tours().await {
                    println!("{}", tour.id);
                }
            }
            "status" => {
                println!("{}", serde_json::to_string_pretty(&runtime.snapshot().await)?);
            }
            "start" | "restart" => {
                let tour_id = match TourId::from_str(rest) {
                    Ok(id) => id,
                    Err(e) => {
                        eprintln!("{e}");
                        continue;
                    }
                };
                // Playback waits for anchors; keep reading commands meanwhile
                let runtime = Arc::clone(&runtime);
                let restart = command == "restart";
                tokio::spawn(async move {
                    let outcome = if restart {
                        runtime.restart(tour_id).await
                    } else {
                        runtime.start(tour_id).await
                    };
                    match outcome {
                        Ok(outcome) => tracing::info!(tour = %tour_id, ?outcome, "Start requested"),
                        Err(e) => eprintln!("{e}"),
                    }
                });
            }
            "next" | "back" => {
                let runtime = Arc::clone(&runtime);
                let forward = command == "next";
                tokio::spawn(async move {
                    if forward {
                        runtime.next().await;
                    } else {
                        runtime.back().await;
                    }
                });
            }
            "complete" => {
                runtime.complete(false).await;
            }
            "dismiss" => {
                runtime.dismiss().await;
            }
            "cancel" => {
                runtime.cancel_active().await;
            }
            "nav" => {
                navigation.publish(rest);
            }
            "show" if rest == "*" => {
                probe.everything.store(true, Ordering::Relaxed);
            }
            "show" => {
                probe.declare(parse_anchor(rest).resolve());
            }
            "width" => match rest.parse::<u32>() {
                Ok(width) => renderer.width.store(width, Ordering::Relaxed),
                Err(e) => eprintln!("invalid width: {e}"),
            },
            "tip" => {
                let (anchor, message) = rest.split_once(' ').unwrap_or((rest, ""));
                let id = runtime
                    .show_quick_tip(parse_anchor(anchor), message.trim(), StepPosition::Bottom)
                    .await;
                println!("tip {id}");
            }
            "untip" => match rest.parse::<TipId>() {
                Ok(id) => {
                    if !runtime.dismiss_quick_tip(id).await {
                        eprintln!("no such tip");
                    }
                }
                Err(e) => eprintln!("invalid tip id: {e}"),
            },
            "help" => eprintln!("{HELP}"),
            "quit" | "exit" => break,
            other => eprintln!("unknown command: {other}"),
        }
    }

    runtime.cancel_active().await;
    Ok(())
}
