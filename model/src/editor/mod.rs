//! The interactive path editor. One `EditorSession` exists per editing UI. The UI sends it
//! `EditorCommand`s (or calls the methods directly) and subscribes to `EditorEvent`s to know what to
//! draw and what to tell the contributor. Nothing here knows about any particular UI toolkit.
//!
//! Snapping and saving call external services, so they're split into a `begin_*` and `finish_*`
//! half. Between the two the session is busy, and every other action is refused.

mod history;
mod overlay;

use std::fmt;

use anyhow::Result;
use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use geometry::{sanitize_path, snap_path_to_roads, Coordinate, Path, SnapClient};

use crate::{Route, RouteDetails, RouteDraft, RouteID};
pub use history::{History, MAX_HISTORY};
pub use overlay::Overlays;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    /// Every click appends a point
    Draw,
    /// Existing vertices can be inserted, moved, or removed
    Edit,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Draw => "draw",
            Mode::Edit => "edit",
        }
    }
}

/// Something waiting on an external service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Snap,
    Save,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Action::Snap => write!(f, "snapping"),
            Action::Save => write!(f, "saving"),
        }
    }
}

/// A change to one vertex of the draft, as reported by whatever lets the contributor drag things
/// around
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VertexEdit {
    Insert { idx: usize, pt: Coordinate },
    Move { idx: usize, pt: Coordinate },
    Remove { idx: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditorCommand {
    StartDrawing,
    AddPoint(Coordinate),
    StartEditing,
    EditVertex(VertexEdit),
    Undo,
    Redo,
    Exit,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
    ModeChanged(Mode),
    /// Something to show the contributor
    Status(String),
    Redraw(Overlays),
    Busy(bool),
}

pub struct EditorSession {
    mode: Mode,
    draft: Path,
    // Empty until snapping succeeds, and cleared whenever the draft changes
    snapped: Path,
    history: History,
    busy: Option<Action>,
    // Set when a stored route is loaded, so saving should update it and keep its region labels
    existing: Option<Route>,
    status: Option<String>,
    subscribers: Vec<UnboundedSender<EditorEvent>>,
}

impl EditorSession {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            draft: Vec::new(),
            snapped: Vec::new(),
            history: History::new(),
            busy: None,
            existing: None,
            status: None,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<EditorEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn draft(&self) -> &Path {
        &self.draft
    }

    pub fn snapped(&self) -> &Path {
        &self.snapped
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn busy(&self) -> Option<Action> {
        self.busy
    }

    /// The route being edited, if this session started from a stored one
    pub fn existing_route(&self) -> Option<RouteID> {
        self.existing.as_ref().map(|route| route.route_id)
    }

    /// The most recent message for the contributor
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn overlays(&self) -> Overlays {
        Overlays {
            mode: self.mode,
            draft: self.draft.clone(),
            snapped: self.snapped.clone(),
            undo_length: self.history.undo_length(),
            redo_length: self.history.redo_length(),
            busy: self.busy.is_some(),
        }
    }

    /// Returns true if the command did something.
    pub fn handle(&mut self, cmd: EditorCommand) -> bool {
        match cmd {
            EditorCommand::StartDrawing => self.start_drawing(),
            EditorCommand::AddPoint(pt) => self.add_point(pt),
            EditorCommand::StartEditing => self.start_editing(),
            EditorCommand::EditVertex(edit) => self.apply_vertex_edit(edit),
            EditorCommand::Undo => self.undo(),
            EditorCommand::Redo => self.redo(),
            EditorCommand::Exit => self.exit(),
        }
    }

    /// From idle, starts a new route. From edit mode, goes back to appending points.
    pub fn start_drawing(&mut self) -> bool {
        if self.refuse_if_busy() {
            return false;
        }
        match self.mode {
            Mode::Draw => {
                return false;
            }
            Mode::Idle => {
                self.reset();
            }
            Mode::Edit => {}
        }
        self.set_mode(Mode::Draw);
        self.set_status("Click the map to add points");
        self.redraw();
        true
    }

    pub fn add_point(&mut self, pt: Coordinate) -> bool {
        if self.refuse_if_busy() {
            return false;
        }
        if self.mode != Mode::Draw {
            self.set_status("Start drawing before adding points");
            return false;
        }
        let pt = match Coordinate::checked(pt.lat, pt.lng) {
            Some(pt) => pt.rounded(),
            None => {
                self.set_status("That isn't a valid point");
                return false;
            }
        };
        if self.draft.last() == Some(&pt) {
            return false;
        }

        self.draft.push(pt);
        self.after_draft_changed();
        true
    }

    pub fn start_editing(&mut self) -> bool {
        if self.refuse_if_busy() {
            return false;
        }
        if self.draft.len() < 2 {
            self.set_status("Draw at least 2 points before editing");
            return false;
        }
        if self.mode == Mode::Edit {
            return false;
        }
        self.set_mode(Mode::Edit);
        self.set_status("Drag points to move them, or insert and remove points");
        self.redraw();
        true
    }

    pub fn apply_vertex_edit(&mut self, edit: VertexEdit) -> bool {
        if self.refuse_if_busy() {
            return false;
        }
        if self.mode != Mode::Edit {
            self.set_status("Switch to editing before changing points");
            return false;
        }

        let len = self.draft.len();
        match edit {
            VertexEdit::Insert { idx, pt } => {
                if idx > len {
                    self.set_status(format!("Can't insert at {idx}; there are only {len} points"));
                    return false;
                }
                match Coordinate::checked(pt.lat, pt.lng) {
                    Some(pt) => self.draft.insert(idx, pt.rounded()),
                    None => {
                        self.set_status("That isn't a valid point");
                        return false;
                    }
                }
            }
            VertexEdit::Move { idx, pt } => {
                if idx >= len {
                    self.set_status(format!("There's no point {idx}"));
                    return false;
                }
                match Coordinate::checked(pt.lat, pt.lng) {
                    // With only 2 points, dragging one onto the other would merge them
                    Some(pt) if len == 2 && self.draft[1 - idx] == pt.rounded() => {
                        self.set_status("A route needs at least 2 points");
                        return false;
                    }
                    Some(pt) => self.draft[idx] = pt.rounded(),
                    None => {
                        self.set_status("That isn't a valid point");
                        return false;
                    }
                }
            }
            VertexEdit::Remove { idx } => {
                if idx >= len {
                    self.set_status(format!("There's no point {idx}"));
                    return false;
                }
                if len <= 2 {
                    self.set_status("A route needs at least 2 points");
                    return false;
                }
                self.draft.remove(idx);
            }
        }
        // Dragging a point onto its neighbor merges them
        self.draft.dedup();
        self.after_draft_changed();
        true
    }

    pub fn undo(&mut self) -> bool {
        if self.refuse_if_busy() {
            return false;
        }
        match self.history.undo() {
            Some(path) => {
                self.restore(path);
                true
            }
            None => {
                self.set_status("Nothing to undo");
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.refuse_if_busy() {
            return false;
        }
        match self.history.redo() {
            Some(path) => {
                self.restore(path);
                true
            }
            None => {
                self.set_status("Nothing to redo");
                false
            }
        }
    }

    /// Throws away everything and goes back to idle.
    pub fn exit(&mut self) -> bool {
        if self.refuse_if_busy() {
            return false;
        }
        self.reset();
        self.set_mode(Mode::Idle);
        self.redraw();
        true
    }

    /// Starts editing a stored route. Saving afterwards should update it.
    pub fn edit_existing(&mut self, route: &Route) -> bool {
        if self.refuse_if_busy() {
            return false;
        }
        self.reset();
        self.draft = route.draft.path.clone();
        // A stored route that was never snapped just has a copy of the drawn path
        if route.draft.snapped_path != route.draft.path {
            self.snapped = route.draft.snapped_path.clone();
        }
        self.history.record(&self.draft);
        self.existing = Some(route.clone());
        self.set_mode(if self.draft.len() >= 2 {
            Mode::Edit
        } else {
            Mode::Draw
        });
        self.set_status(format!("Editing route {}", route.route_id.0));
        self.redraw();
        true
    }

    /// Returns the path to snap, or None if snapping can't happen now. The caller must pass the
    /// result to `finish_snap`.
    pub fn begin_snap(&mut self) -> Option<Path> {
        if self.refuse_if_busy() {
            return None;
        }
        if self.draft.len() < 2 {
            self.set_status("Draw at least 2 points before snapping");
            return None;
        }
        self.set_busy(Some(Action::Snap));
        self.set_status("Snapping to roads...");
        Some(self.draft.clone())
    }

    /// On success, shows the snapped path next to the draft. On failure, nothing changes.
    pub fn finish_snap(&mut self, result: Result<Path>) -> bool {
        if self.busy != Some(Action::Snap) {
            warn!("Got a snapping result, but wasn't waiting for one");
            return false;
        }
        self.set_busy(None);
        match result {
            Ok(path) if path.len() >= 2 => {
                self.set_status(format!(
                    "Snapped {} points to {} points along roads",
                    self.draft.len(),
                    path.len()
                ));
                self.snapped = path;
                self.redraw();
                true
            }
            Ok(_) => {
                self.set_status("Couldn't snap this route to roads. Try again.");
                false
            }
            Err(err) => {
                warn!("Snapping failed: {:#}", err);
                self.set_status(format!("Snapping failed: {err:#}. Try again."));
                false
            }
        }
    }

    /// Snaps synchronously
    pub fn snap_with(&mut self, client: &dyn SnapClient) -> bool {
        match self.begin_snap() {
            Some(path) => {
                let result = snap_path_to_roads(&path, client);
                self.finish_snap(result)
            }
            None => false,
        }
    }

    /// Returns what to persist, or None if saving can't happen now. The snapped path is preferred
    /// when there is one. The caller must pass the result to `finish_save`.
    pub fn begin_save(&mut self, details: RouteDetails) -> Option<RouteDraft> {
        if self.refuse_if_busy() {
            return None;
        }
        let geometry = if self.snapped.len() >= 2 {
            &self.snapped
        } else {
            &self.draft
        };
        if geometry.len() < 2 {
            self.set_status("Draw at least 2 points before saving");
            return None;
        }
        let draft = RouteDraft {
            details,
            path: sanitize_path(&self.draft),
            snapped_path: sanitize_path(geometry),
            // Region inference only overwrites these when it finds something
            province: self
                .existing
                .as_ref()
                .map(|route| route.draft.province.clone())
                .unwrap_or_default(),
            city: self
                .existing
                .as_ref()
                .map(|route| route.draft.city.clone())
                .unwrap_or_default(),
        };
        self.set_busy(Some(Action::Save));
        self.set_status("Saving...");
        Some(draft)
    }

    /// On success, the session is finished and goes back to idle. On failure, nothing changes, so
    /// the contributor can try again without redrawing.
    pub fn finish_save(&mut self, result: Result<Route>) -> Option<Route> {
        if self.busy != Some(Action::Save) {
            warn!("Got a saving result, but wasn't waiting for one");
            return None;
        }
        self.set_busy(None);
        match result {
            Ok(route) => {
                self.reset();
                self.set_mode(Mode::Idle);
                self.set_status(format!("Saved route {}", route.route_id.0));
                self.redraw();
                Some(route)
            }
            Err(err) => {
                warn!("Saving failed: {:#}", err);
                self.set_status(format!("Couldn't save the route: {err:#}. Try again."));
                None
            }
        }
    }

    /// Saves synchronously. `persist` should store the route and return the stored version.
    pub fn save_with<F: FnOnce(RouteDraft) -> Result<Route>>(
        &mut self,
        details: RouteDetails,
        persist: F,
    ) -> Option<Route> {
        let draft = self.begin_save(details)?;
        let result = persist(draft);
        self.finish_save(result)
    }

    fn restore(&mut self, path: Path) {
        self.draft = path;
        self.snapped.clear();
        // Editing vertices needs at least 2 of them
        if self.mode == Mode::Edit && self.draft.len() < 2 {
            self.set_mode(Mode::Draw);
        }
        self.redraw();
    }

    fn after_draft_changed(&mut self) {
        self.snapped.clear();
        self.history.record(&self.draft);
        self.redraw();
    }

    fn reset(&mut self) {
        self.draft.clear();
        self.snapped.clear();
        self.history.clear();
        self.existing = None;
    }

    fn refuse_if_busy(&mut self) -> bool {
        if let Some(action) = self.busy {
            self.set_status(format!("Still {action}; wait for it to finish"));
            return true;
        }
        false
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            self.mode = mode;
            self.emit(EditorEvent::ModeChanged(mode));
        }
    }

    fn set_busy(&mut self, busy: Option<Action>) {
        self.busy = busy;
        self.emit(EditorEvent::Busy(busy.is_some()));
    }

    fn set_status<S: Into<String>>(&mut self, msg: S) {
        let msg = msg.into();
        debug!("Editor status: {msg}");
        self.status = Some(msg.clone());
        self.emit(EditorEvent::Status(msg));
    }

    fn redraw(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let overlays = self.overlays();
        self.emit(EditorEvent::Redraw(overlays));
    }

    fn emit(&mut self, event: EditorEvent) {
        // Receivers that've been dropped don't need anything else
        self.subscribers
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}
