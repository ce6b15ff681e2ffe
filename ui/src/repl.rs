//! A line-oriented front-end for the path editor. Clicks and drags become typed commands, so the
//! whole draw, snap, save loop can be driven from a terminal or a script.

use std::io::{BufRead, Write};
use std::thread;
use std::time::Duration;

use abstutil::Timer;
use anyhow::Result;
use futures_channel::mpsc::UnboundedReceiver;
use futures_channel::oneshot;

use geometry::{snap_path_to_roads, Coordinate, GeocodeClient, Path, SnapClient};
use model::{
    normalize_route, EditorCommand, EditorEvent, EditorSession, Fare, RouteDetails, RouteID,
    RouteRepository, Stop, VertexEdit,
};

const HELP: &str = "\
draw                      start drawing, or keep drawing
click LAT LNG             add a point while drawing
edit                      edit vertices of the draft
insert IDX LAT LNG        insert a vertex before IDX
move IDX LAT LNG          move vertex IDX
remove IDX                remove vertex IDX
undo, redo
snap                      snap the draft to roads in the background
wait                      block until snapping finishes
name TEXT                 set the route name
from TEXT, to TEXT        set the names of both ends
fare MIN MAX [CURRENCY]   set the fare range
stop LAT LNG NAME         add a named stop
notes TEXT                set free-form notes
save                      store the route
load ID                   edit a stored route
list                      list stored routes
show                      print the editor layers as GeoJSON
exit                      abandon the draft
quit";

#[derive(Debug, PartialEq)]
enum Command {
    Editor(EditorCommand),
    Snap,
    Wait,
    Save,
    Load(RouteID),
    List,
    Show,
    Name(String),
    From(String),
    To(String),
    Notes(String),
    Fare(Fare),
    Stop(Stop),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let cmd = match verb {
        "draw" => Command::Editor(EditorCommand::StartDrawing),
        "click" => Command::Editor(EditorCommand::AddPoint(parse_pt(&args, 0)?)),
        "edit" => Command::Editor(EditorCommand::StartEditing),
        "insert" => Command::Editor(EditorCommand::EditVertex(VertexEdit::Insert {
            idx: parse_idx(&args)?,
            pt: parse_pt(&args, 1)?,
        })),
        "move" => Command::Editor(EditorCommand::EditVertex(VertexEdit::Move {
            idx: parse_idx(&args)?,
            pt: parse_pt(&args, 1)?,
        })),
        "remove" => Command::Editor(EditorCommand::EditVertex(VertexEdit::Remove {
            idx: parse_idx(&args)?,
        })),
        "undo" => Command::Editor(EditorCommand::Undo),
        "redo" => Command::Editor(EditorCommand::Redo),
        "exit" => Command::Editor(EditorCommand::Exit),
        "snap" => Command::Snap,
        "wait" => Command::Wait,
        "save" => Command::Save,
        "load" => Command::Load(RouteID(parse_idx(&args)?)),
        "list" => Command::List,
        "show" => Command::Show,
        "name" => Command::Name(rest.to_string()),
        "from" => Command::From(rest.to_string()),
        "to" => Command::To(rest.to_string()),
        "notes" => Command::Notes(rest.to_string()),
        "fare" => {
            if args.len() < 2 {
                bail!("fare needs MIN MAX");
            }
            Command::Fare(Fare {
                min: parse_num(args[0])?,
                max: parse_num(args[1])?,
                currency: args.get(2).unwrap_or(&"ZAR").to_string(),
            })
        }
        "stop" => {
            let pt = parse_pt(&args, 0)?;
            if args.len() < 3 {
                bail!("stop needs LAT LNG NAME");
            }
            Command::Stop(Stop {
                name: args[2..].join(" "),
                lat: pt.lat,
                lng: pt.lng,
            })
        }
        "help" | "?" => Command::Help,
        "quit" | "q" => Command::Quit,
        _ => bail!("Unknown command {verb}; try help"),
    };
    Ok(Some(cmd))
}

fn parse_num(x: &str) -> Result<f64> {
    x.parse::<f64>()
        .map_err(|_| anyhow!("{x} isn't a number"))
}

fn parse_idx(args: &[&str]) -> Result<usize> {
    let x = args.first().ok_or_else(|| anyhow!("missing an index"))?;
    x.parse::<usize>()
        .map_err(|_| anyhow!("{x} isn't an index"))
}

// Coordinates are checked by the editor, not here
fn parse_pt(args: &[&str], start: usize) -> Result<Coordinate> {
    match (args.get(start), args.get(start + 1)) {
        (Some(lat), Some(lng)) => Ok(Coordinate::new(parse_num(lat)?, parse_num(lng)?)),
        _ => bail!("expected LAT LNG"),
    }
}

/// Owns the session and everything it talks to
pub struct Repl<'a, R, S> {
    session: EditorSession,
    events: UnboundedReceiver<EditorEvent>,
    details: RouteDetails,
    pending_snap: Option<oneshot::Receiver<Result<Path>>>,
    store: &'a mut R,
    roads: S,
    geocoder: &'a dyn GeocodeClient,
}

impl<'a, R, S> Repl<'a, R, S>
where
    R: RouteRepository,
    S: SnapClient + Clone + Send + 'static,
{
    pub fn new(store: &'a mut R, roads: S, geocoder: &'a dyn GeocodeClient) -> Self {
        let mut session = EditorSession::new();
        let events = session.subscribe();
        Self {
            session,
            events,
            details: RouteDetails::default(),
            pending_snap: None,
            store,
            roads,
            geocoder,
        }
    }

    pub fn run<I: BufRead, O: Write>(&mut self, input: I, mut out: O) -> Result<()> {
        writeln!(out, "Type help for commands")?;
        for line in input.lines() {
            let line = line?;
            self.poll_snap();
            match parse_command(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(cmd)) => self.execute(cmd, &mut out)?,
                Ok(None) => {}
                Err(err) => writeln!(out, "{err}")?,
            }
            self.print_events(&mut out)?;
        }
        if self.pending_snap.is_some() {
            warn!("Quitting while still snapping; the result is discarded");
        }
        Ok(())
    }

    fn execute<O: Write>(&mut self, cmd: Command, out: &mut O) -> Result<()> {
        match cmd {
            Command::Editor(cmd) => {
                // Abandoning a draft, loaded or not, abandons what was typed about it too
                if self.session.handle(cmd) && cmd == EditorCommand::Exit {
                    self.details = RouteDetails::default();
                }
            }
            Command::Snap => self.start_snap(),
            Command::Wait => {
                while self.pending_snap.is_some() {
                    thread::sleep(Duration::from_millis(50));
                    self.poll_snap();
                }
            }
            Command::Save => self.save(),
            Command::Load(id) => match self.store.get(id) {
                Some(route) => {
                    if self.session.edit_existing(&route) {
                        self.details = route.draft.details;
                    }
                }
                None => writeln!(out, "No route {}", id.0)?,
            },
            Command::List => {
                for route in self.store.list() {
                    writeln!(out, "{}", route.describe())?;
                }
            }
            Command::Show => writeln!(out, "{}", self.session.overlays().to_geojson_string()?)?,
            Command::Name(x) => self.details.name = x,
            Command::From(x) => self.details.point_a_name = x,
            Command::To(x) => self.details.point_b_name = x,
            Command::Notes(x) => self.details.notes = x,
            Command::Fare(fare) => self.details.fare = Some(fare),
            Command::Stop(stop) => self.details.stops.push(stop),
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => {}
        }
        Ok(())
    }

    fn start_snap(&mut self) {
        let path = match self.session.begin_snap() {
            Some(path) => path,
            None => return,
        };
        let (tx, rx) = oneshot::channel();
        let roads = self.roads.clone();
        thread::spawn(move || {
            // The receiver may be gone if the user quit
            let _ = tx.send(snap_path_to_roads(&path, &roads));
        });
        self.pending_snap = Some(rx);
    }

    fn poll_snap(&mut self) {
        let rx = match self.pending_snap.as_mut() {
            Some(rx) => rx,
            None => return,
        };
        let result = match rx.try_recv() {
            Ok(Some(result)) => result,
            Ok(None) => return,
            Err(_) => Err(anyhow!("The snapping thread died")),
        };
        self.pending_snap = None;
        self.session.finish_snap(result);
    }

    fn save(&mut self) {
        let mut draft = match self.session.begin_save(self.details.clone()) {
            Some(draft) => draft,
            None => return,
        };
        let existing = self.session.existing_route();

        let mut timer = Timer::new("save route");
        timer.start("normalize");
        let result = normalize_route(&mut draft, self.geocoder);
        timer.stop("normalize");
        let result = result.and_then(|_| match existing {
            Some(id) => self.store.update(id, draft),
            None => self.store.create(draft),
        });

        if let Some(route) = self.session.finish_save(result) {
            info!("Saved {}", route.describe());
            self.details = RouteDetails::default();
        }
    }

    fn print_events<O: Write>(&mut self, out: &mut O) -> Result<()> {
        while let Ok(Some(event)) = self.events.try_next() {
            match event {
                EditorEvent::Status(msg) => writeln!(out, "{msg}")?,
                EditorEvent::ModeChanged(mode) => writeln!(out, "[{}]", mode.as_str())?,
                EditorEvent::Redraw(overlays) => debug!(
                    "{} drawn points, {} snapped, {} undo steps",
                    overlays.draft.len(),
                    overlays.snapped.len(),
                    overlays.undo_length
                ),
                EditorEvent::Busy(busy) => debug!("Busy: {busy}"),
            }
        }
        Ok(())
    }
}
