use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::Config;
use crate::item::{ContainerId, ItemKey};
use crate::store::MoveRequest;

pub const DEFAULT_LONG_PRESS: Duration = Duration::from_millis(500);
pub const DEFAULT_MOVE_TOLERANCE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPos {
    pub x: f64,
    pub y: f64,
}

impl PointerPos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(self, other: PointerPos) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Where a drag was released. `index` is the position the item should
/// take in `container` once it has been lifted out of its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub container: ContainerId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    Down {
        item: ItemKey,
        origin: ContainerId,
        origin_index: usize,
        pos: PointerPos,
    },
    Move {
        pos: PointerPos,
    },
    /// The pointer library decided on its own that a drag has begun.
    DragStart,
    Up {
        target: Option<DropTarget>,
    },
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Pressing,
    Dragging,
    Settled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    OpenDetail(ItemKey),
    DragStarted(ItemKey),
    Commit(MoveRequest),
    /// A drag ended without producing a move.
    Cancelled(ItemKey),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    pub long_press: Duration,
    pub move_tolerance: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press: DEFAULT_LONG_PRESS,
            move_tolerance: DEFAULT_MOVE_TOLERANCE,
        }
    }
}

impl GestureConfig {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let mut out = Self::default();
        if let Some(ms) = cfg.get_u64("gesture.long_press_ms")? {
            out.long_press = Duration::from_millis(ms);
        }
        if let Some(px) = cfg.get_f64("gesture.move_tolerance_px")? {
            out.move_tolerance = px.max(0.0);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub item: ItemKey,
    pub origin: ContainerId,
    pub origin_index: usize,
    pub start_pos: PointerPos,
    pub current_pos: PointerPos,
    wandered: bool,
}

/// Long-press timer owned by a pressing session. Dropping it disarms it.
#[derive(Debug)]
pub struct PressTimer {
    armed_at: Instant,
    deadline: Instant,
}

impl PressTimer {
    fn arm(now: Instant, duration: Duration) -> Self {
        Self {
            armed_at: now,
            deadline: now + duration,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn has_elapsed(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Pressing {
        session: DragSession,
        timer: PressTimer,
    },
    Dragging {
        session: DragSession,
    },
    Settled,
}

/// Turns raw pointer input into at most one committed move per drag, or a
/// detail-open for a short tap.
#[derive(Debug)]
pub struct DragController {
    config: GestureConfig,
    state: State,
}

impl DragController {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> DragPhase {
        match self.state {
            State::Idle => DragPhase::Idle,
            State::Pressing { .. } => DragPhase::Pressing,
            State::Dragging { .. } => DragPhase::Dragging,
            State::Settled => DragPhase::Settled,
        }
    }

    pub fn session(&self) -> Option<&DragSession> {
        match &self.state {
            State::Pressing { session, .. } | State::Dragging { session } => Some(session),
            State::Idle | State::Settled => None,
        }
    }

    /// When the long-press timer fires, if one is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            State::Pressing { timer, .. } => Some(timer.deadline()),
            _ => None,
        }
    }

    pub fn poll_timer(&mut self, now: Instant) -> Option<Gesture> {
        let elapsed = matches!(&self.state, State::Pressing { timer, .. } if timer.has_elapsed(now));
        if !elapsed {
            return None;
        }
        self.start_drag(now)
    }

    pub fn handle(&mut self, input: PointerInput, now: Instant) -> Vec<Gesture> {
        let mut out = Vec::new();
        if !matches!(input, PointerInput::Down { .. }) {
            out.extend(self.poll_timer(now));
        }

        match input {
            PointerInput::Down {
                item,
                origin,
                origin_index,
                pos,
            } => {
                if matches!(self.state, State::Pressing { .. } | State::Dragging { .. }) {
                    debug!(item = %item, "ignoring second pointer while a session is active");
                    return out;
                }
                trace!(item = %item, origin = %origin, "pressing");
                self.state = State::Pressing {
                    session: DragSession {
                        item,
                        origin,
                        origin_index,
                        start_pos: pos,
                        current_pos: pos,
                        wandered: false,
                    },
                    timer: PressTimer::arm(now, self.config.long_press),
                };
            }
            PointerInput::Move { pos } => {
                let tolerance = self.config.move_tolerance;
                match &mut self.state {
                    State::Pressing { session, .. } => {
                        session.current_pos = pos;
                        if session.start_pos.distance(pos) > tolerance {
                            session.wandered = true;
                        }
                    }
                    State::Dragging { session } => session.current_pos = pos,
                    State::Idle | State::Settled => {}
                }
            }
            PointerInput::DragStart => {
                if matches!(self.state, State::Pressing { .. }) {
                    out.extend(self.start_drag(now));
                }
            }
            PointerInput::Up { target } => match std::mem::replace(&mut self.state, State::Idle) {
                State::Pressing { session, .. } => {
                    if session.wandered {
                        debug!(item = %session.item, "press moved off; not a tap");
                    } else {
                        debug!(item = %session.item, "tap");
                        self.state = State::Settled;
                        out.push(Gesture::OpenDetail(session.item));
                    }
                }
                State::Dragging { session } => out.push(self.drop_on(session, target)),
                other => self.state = other,
            },
            PointerInput::Cancel => match std::mem::replace(&mut self.state, State::Idle) {
                State::Pressing { .. } => {}
                State::Dragging { session } => {
                    debug!(item = %session.item, "drag cancelled");
                    out.push(Gesture::Cancelled(session.item));
                }
                other => self.state = other,
            },
        }
        out
    }

    fn start_drag(&mut self, now: Instant) -> Option<Gesture> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Pressing { session, timer } => {
                debug!(
                    item = %session.item,
                    held_ms = now.saturating_duration_since(timer.armed_at).as_millis() as u64,
                    "drag started"
                );
                let item = session.item.clone();
                self.state = State::Dragging { session };
                Some(Gesture::DragStarted(item))
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    fn drop_on(&mut self, session: DragSession, target: Option<DropTarget>) -> Gesture {
        let Some(target) = target else {
            debug!(item = %session.item, "dropped outside any target");
            return Gesture::Cancelled(session.item);
        };
        if target.container == session.origin && target.index == session.origin_index {
            debug!(item = %session.item, "dropped where it started");
            return Gesture::Cancelled(session.item);
        }

        self.state = State::Settled;
        Gesture::Commit(MoveRequest {
            item: session.item,
            from: session.origin,
            to: target.container,
            to_index: target.index,
        })
    }
}

#[cfg(test)]
mod tests {
    use tack_shared::Variant;

    use super::*;
    use crate::item::{Status, TaskStatus, status_to_column};

    fn todo() -> ContainerId {
        status_to_column(Status::Task(TaskStatus::Todo))
    }

    fn done() -> ContainerId {
        status_to_column(Status::Task(TaskStatus::Done))
    }

    fn down() -> PointerInput {
        PointerInput::Down {
            item: ItemKey::new(Variant::Task, "t1"),
            origin: todo(),
            origin_index: 2,
            pos: PointerPos::new(10.0, 10.0),
        }
    }

    fn up(container: ContainerId, index: usize) -> PointerInput {
        PointerInput::Up {
            target: Some(DropTarget { container, index }),
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn short_still_press_opens_detail() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        assert!(controller.handle(down(), start).is_empty());
        assert_eq!(controller.phase(), DragPhase::Pressing);

        let gestures = controller.handle(up(done(), 0), start + ms(120));
        assert_eq!(
            gestures,
            vec![Gesture::OpenDetail(ItemKey::new(Variant::Task, "t1"))]
        );
        assert_eq!(controller.phase(), DragPhase::Settled);
        assert_eq!(controller.next_deadline(), None);
    }

    #[test]
    fn long_press_then_drop_commits_once() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        controller.handle(down(), start);
        assert_eq!(controller.poll_timer(start + ms(499)), None);
        assert_eq!(
            controller.poll_timer(start + ms(500)),
            Some(Gesture::DragStarted(ItemKey::new(Variant::Task, "t1")))
        );
        assert_eq!(controller.phase(), DragPhase::Dragging);

        controller.handle(
            PointerInput::Move {
                pos: PointerPos::new(300.0, 40.0),
            },
            start + ms(600),
        );
        let gestures = controller.handle(up(done(), 0), start + ms(700));
        assert_eq!(
            gestures,
            vec![Gesture::Commit(MoveRequest {
                item: ItemKey::new(Variant::Task, "t1"),
                from: todo(),
                to: done(),
                to_index: 0,
            })]
        );
        assert_eq!(controller.phase(), DragPhase::Settled);
    }

    #[test]
    fn release_after_unpolled_deadline_is_a_drag() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        controller.handle(down(), start);
        let gestures = controller.handle(up(done(), 1), start + ms(800));
        assert_eq!(gestures.len(), 2);
        assert!(matches!(gestures[0], Gesture::DragStarted(_)));
        assert!(matches!(gestures[1], Gesture::Commit(_)));
    }

    #[test]
    fn library_drag_start_skips_the_timer() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        controller.handle(down(), start);
        let gestures = controller.handle(PointerInput::DragStart, start + ms(30));
        assert!(matches!(gestures.as_slice(), [Gesture::DragStarted(_)]));
        assert_eq!(controller.next_deadline(), None);
    }

    #[test]
    fn drop_on_origin_slot_emits_no_commit() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        controller.handle(down(), start);
        controller.handle(PointerInput::DragStart, start);
        let gestures = controller.handle(up(todo(), 2), start + ms(50));
        assert!(matches!(gestures.as_slice(), [Gesture::Cancelled(_)]));
        assert_eq!(controller.phase(), DragPhase::Idle);
    }

    #[test]
    fn drop_outside_or_cancel_returns_to_idle() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        controller.handle(down(), start);
        controller.handle(PointerInput::DragStart, start);
        let gestures = controller.handle(PointerInput::Up { target: None }, start + ms(10));
        assert!(matches!(gestures.as_slice(), [Gesture::Cancelled(_)]));
        assert_eq!(controller.phase(), DragPhase::Idle);

        controller.handle(down(), start + ms(20));
        controller.handle(PointerInput::DragStart, start + ms(20));
        let gestures = controller.handle(PointerInput::Cancel, start + ms(30));
        assert!(matches!(gestures.as_slice(), [Gesture::Cancelled(_)]));
        assert_eq!(controller.session(), None);
    }

    #[test]
    fn rapid_taps_never_leave_a_timer_armed() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        for round in 0..10 {
            let at = start + ms(round * 40);
            controller.handle(down(), at);
            let gestures = controller.handle(up(done(), 0), at + ms(15));
            assert!(matches!(gestures.as_slice(), [Gesture::OpenDetail(_)]));
            assert_eq!(controller.next_deadline(), None);
        }
        assert_eq!(controller.poll_timer(start + ms(5_000)), None);
        assert_eq!(controller.phase(), DragPhase::Settled);
    }

    #[test]
    fn wandering_press_is_neither_tap_nor_move() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        controller.handle(down(), start);
        controller.handle(
            PointerInput::Move {
                pos: PointerPos::new(40.0, 10.0),
            },
            start + ms(50),
        );
        let gestures = controller.handle(up(done(), 0), start + ms(100));
        assert!(gestures.is_empty());
        assert_eq!(controller.phase(), DragPhase::Idle);
    }

    #[test]
    fn second_pointer_is_ignored() {
        let start = Instant::now();
        let mut controller = DragController::new(GestureConfig::default());
        controller.handle(down(), start);
        let deadline = controller.next_deadline();
        controller.handle(
            PointerInput::Down {
                item: ItemKey::new(Variant::Task, "t9"),
                origin: done(),
                origin_index: 0,
                pos: PointerPos::new(0.0, 0.0),
            },
            start + ms(100),
        );
        assert_eq!(controller.next_deadline(), deadline);
        assert_eq!(
            controller.session().map(|session| session.item.id.as_str()),
            Some("t1")
        );
    }
}
