#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

pub mod editor;
mod normalize;
mod route;
mod store;

pub use self::editor::{EditorCommand, EditorEvent, EditorSession, Mode, Overlays, VertexEdit};
pub use self::normalize::{normalize_route, resnap_route};
pub use self::route::{Fare, Route, RouteDetails, RouteDraft, RouteID, Stop};
pub use self::store::{RouteRepository, RouteStore};
