use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Deserialize;
use tack_shared::{ItemRecord, Variant};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, warn};

use crate::board::{Board, BoardEvent, DetailCallback};
use crate::calendar::CalendarMonth;
use crate::cli::Command;
use crate::config::Config;
use crate::drag::{DropTarget, GestureConfig, PointerInput, PointerPos};
use crate::grid::{MonthCursor, parse_timezone, parse_week_start, today_in};
use crate::item::{ContainerId, Item, ItemKey};
use crate::render::Renderer;
use crate::store::{BoardStore, MoveOutcome, MoveRequest};
use crate::sync::{FileSyncAdapter, SyncAdapter, open_adapter};

#[instrument(skip(cfg, renderer, command))]
pub async fn dispatch(
    cfg: &Config,
    data_dir: &Path,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    if let Command::Import { file } = command {
        return cmd_import(data_dir, &file);
    }

    let adapter: Arc<dyn SyncAdapter> = Arc::from(open_adapter(cfg, data_dir)?);
    let store = Arc::new(BoardStore::new());
    let records = adapter
        .fetch_items()
        .await
        .context("failed to load items from the sync backend")?;
    let report = store.load(records);
    if report.rejected > 0 {
        warn!(rejected = report.rejected, "some items could not be loaded");
    }
    debug!(loaded = report.loaded, "board loaded");

    match command {
        Command::Calendar { year, month } => cmd_calendar(cfg, &store, renderer, year, month),
        Command::Board { kind } => {
            let variant = parse_variant(&kind)?;
            renderer.print_board(&store.snapshot(), variant)
        }
        Command::Show { kind, id } => {
            let key = ItemKey::new(parse_variant(&kind)?, id);
            let state = store.snapshot();
            let item = state.item(&key).ok_or_else(|| anyhow!("no such item: {key}"))?;
            renderer.print_item(item)
        }
        Command::Move {
            kind,
            id,
            target,
            index,
        } => cmd_move(&store, adapter.as_ref(), &kind, id, &target, index).await,
        Command::Advance { kind, id } => {
            let key = ItemKey::new(parse_variant(&kind)?, id);
            match store.advance(&key, adapter.as_ref()).await? {
                MoveOutcome::Applied => {
                    let state = store.snapshot();
                    let status = state
                        .item(&key)
                        .map(|item| item.status.label())
                        .unwrap_or("?");
                    println!("Moved {key} to {status}.");
                }
                MoveOutcome::Unchanged => println!("{key} is already there."),
            }
            Ok(())
        }
        Command::Replay { script } => cmd_replay(cfg, store, adapter, renderer, &script).await,
        Command::Import { file } => cmd_import(data_dir, &file),
    }
}

fn parse_variant(raw: &str) -> anyhow::Result<Variant> {
    Variant::from_key(raw)
        .ok_or_else(|| anyhow!("unknown item kind {raw:?}; expected task, campaign or channel"))
}

#[instrument(skip(cfg, store, renderer))]
fn cmd_calendar(
    cfg: &Config,
    store: &BoardStore,
    renderer: &mut Renderer,
    year: Option<i32>,
    month: Option<u32>,
) -> anyhow::Result<()> {
    let timezone = cfg
        .get("calendar.timezone")
        .and_then(|raw| parse_timezone(&raw));
    let week_start = parse_week_start(&cfg.get("calendar.week_start").unwrap_or_default());
    let today = today_in(timezone);

    let mut cursor = MonthCursor::containing(today);
    if let Some(year) = year {
        cursor.year = year;
    }
    if let Some(month) = month {
        cursor.month0 = month.saturating_sub(1);
    }

    let state = store.snapshot();
    let view = CalendarMonth::project(cursor, today, week_start, &state)?;
    renderer.print_calendar(&view, &state)
}

#[instrument(skip(store, adapter))]
async fn cmd_move(
    store: &BoardStore,
    adapter: &dyn SyncAdapter,
    kind: &str,
    id: String,
    target: &str,
    index: Option<usize>,
) -> anyhow::Result<()> {
    let key = ItemKey::new(parse_variant(kind)?, id);
    let to = ContainerId::parse(key.variant, target)
        .ok_or_else(|| anyhow!("{target:?} is neither a {} status nor a date", key.variant))?;

    let state = store.snapshot();
    if state.item(&key).is_none() {
        return Err(anyhow!("no such item: {key}"));
    }
    let (from, _) = state
        .locate(&key, &to)
        .ok_or_else(|| anyhow!("{key} cannot be placed on {to}"))?;
    let to_index = index.unwrap_or_else(|| {
        let len = state.container(&to).len();
        if from == to { len.saturating_sub(1) } else { len }
    });

    let request = MoveRequest {
        item: key.clone(),
        from,
        to,
        to_index,
    };
    match store.commit_move(request, adapter).await? {
        MoveOutcome::Applied => println!("Moved {key} to {to}."),
        MoveOutcome::Unchanged => println!("{key} is already there."),
    }
    Ok(())
}

/// One entry of a replay script: a pointer event `at_ms` after the start.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayStep {
    at_ms: u64,
    #[serde(flatten)]
    action: ReplayAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum ReplayAction {
    Down {
        kind: String,
        id: String,
        /// Press on the item's calendar card rather than its board card.
        #[serde(default)]
        calendar: bool,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
    },
    Move {
        x: f64,
        y: f64,
    },
    DragStart,
    Up {
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        index: Option<usize>,
    },
    Cancel,
}

fn parse_script(path: &Path) -> anyhow::Result<Vec<ReplayStep>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut steps: Vec<ReplayStep> = serde_json::from_str(&text)
        .with_context(|| format!("invalid replay script {}", path.display()))?;
    steps.sort_by_key(|step| step.at_ms);
    Ok(steps)
}

/// Turns a script action into pointer input against the board as it is now.
/// `pressed` tracks the variant of the item under the pointer so drop
/// targets can be parsed.
fn to_input(
    store: &BoardStore,
    action: ReplayAction,
    pressed: &mut Option<Variant>,
) -> anyhow::Result<PointerInput> {
    match action {
        ReplayAction::Down {
            kind,
            id,
            calendar,
            x,
            y,
        } => {
            let key = ItemKey::new(parse_variant(&kind)?, id);
            let state = store.snapshot();
            let item = state.item(&key).ok_or_else(|| anyhow!("no such item: {key}"))?;
            let origin = if calendar {
                item.day()
                    .ok_or_else(|| anyhow!("{key} is not on the calendar"))?
            } else {
                item.column()
            };
            let origin_index = state
                .container(&origin)
                .iter()
                .position(|candidate| candidate == &key)
                .unwrap_or(0);
            *pressed = Some(key.variant);
            Ok(PointerInput::Down {
                item: key,
                origin,
                origin_index,
                pos: PointerPos::new(x, y),
            })
        }
        ReplayAction::Move { x, y } => Ok(PointerInput::Move {
            pos: PointerPos::new(x, y),
        }),
        ReplayAction::DragStart => Ok(PointerInput::DragStart),
        ReplayAction::Up { target, index } => {
            let variant = pressed.take();
            let target = match (target, variant) {
                (Some(raw), Some(variant)) => {
                    let container = ContainerId::parse(variant, &raw)
                        .ok_or_else(|| anyhow!("unknown drop target {raw:?}"))?;
                    let len = store.snapshot().container(&container).len();
                    Some(DropTarget {
                        index: index.unwrap_or(len),
                        container,
                    })
                }
                _ => None,
            };
            Ok(PointerInput::Up { target })
        }
        ReplayAction::Cancel => {
            *pressed = None;
            Ok(PointerInput::Cancel)
        }
    }
}

#[instrument(skip(cfg, store, adapter, renderer))]
async fn cmd_replay(
    cfg: &Config,
    store: Arc<BoardStore>,
    adapter: Arc<dyn SyncAdapter>,
    renderer: &mut Renderer,
    script: &Path,
) -> anyhow::Result<()> {
    let steps = parse_script(script)?;
    info!(steps = steps.len(), "replaying pointer script");

    let detail_renderer = renderer.clone();
    let on_detail: DetailCallback = Arc::new(move |item: &Item| {
        let mut out = detail_renderer.clone();
        if let Err(err) = out.print_item(item) {
            warn!(error = %err, "failed to print item detail");
        }
    });
    let mut board = Board::new(store.clone(), adapter, GestureConfig::from_config(cfg)?)
        .with_detail_callback(on_detail);

    let (tx, rx) = mpsc::channel(16);
    let feeder = tokio::spawn(async move {
        let start = Instant::now();
        let mut pressed = None;
        for step in steps {
            sleep_until(start + Duration::from_millis(step.at_ms)).await;
            let input = to_input(&store, step.action, &mut pressed)?;
            if tx.send(input).await.is_err() {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    });

    let events = board.run(rx).await;
    feeder.await.context("replay feeder panicked")??;

    for event in &events {
        match event {
            BoardEvent::DetailOpened(key) => debug!(item = %key, "detail opened"),
            BoardEvent::DragStarted(key) => println!("drag   {key}"),
            BoardEvent::DragCancelled(key) => println!("cancel {key}"),
            BoardEvent::Moved(key) => println!("moved  {key}"),
            BoardEvent::Unchanged(key) => println!("same   {key}"),
            BoardEvent::Discarded(key) => println!("ignore {key}"),
            BoardEvent::Failed { message, .. } => renderer.print_error(message)?,
        }
    }
    Ok(())
}

#[instrument(skip(data_dir))]
fn cmd_import(data_dir: &Path, file: &Path) -> anyhow::Result<()> {
    info!("command import");
    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let rows = parse_import_items(trimmed)?;
    let mut accepted = Vec::with_capacity(rows.len());
    for row in rows {
        match Item::from_record(row) {
            Ok(item) => accepted.push(item.to_record()),
            Err(err) => warn!(error = %err, "skipping record"),
        }
    }

    let adapter = FileSyncAdapter::open(data_dir)?;
    adapter.save_records(&accepted)?;
    println!("Imported {} item(s).", accepted.len());
    Ok(())
}

fn parse_import_items(input: &str) -> anyhow::Result<Vec<ItemRecord>> {
    if input.starts_with('[') {
        return serde_json::from_str(input).context("import: expected a JSON array of items");
    }

    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("import: invalid JSON on line {}", idx + 1))
        })
        .collect()
}
