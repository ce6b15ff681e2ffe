#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod google;
mod repl;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use abstutil::Timer;
use anyhow::Result;
use structopt::StructOpt;

use geometry::CachedGeocoder;
use model::{normalize_route, resnap_route, RouteID, RouteRepository, RouteStore};

use self::google::{GeocodingClient, RoadsClient};

#[derive(StructOpt)]
#[structopt(about = "Draw minibus-taxi routes and snap them to roads")]
struct Args {
    /// The JSON file holding every stored route
    #[structopt(long, default_value = "data/routes.json")]
    routes: PathBuf,
    /// Needed for snapping and region lookups
    #[structopt(long, env = "GOOGLE_MAPS_API_KEY")]
    api_key: Option<String>,
    /// Defaults to Google's Roads API
    #[structopt(long)]
    roads_url: Option<String>,
    /// Defaults to Google's Geocoding API
    #[structopt(long)]
    geocode_url: Option<String>,
    /// How long to wait for each request to Google
    #[structopt(long, default_value = "10")]
    timeout_secs: u64,
    #[structopt(subcommand)]
    cmd: Option<Command>,
}

#[derive(StructOpt)]
enum Command {
    /// Draw and edit routes interactively. This is the default.
    Edit,
    /// List stored routes
    List,
    /// Delete a stored route
    Delete { id: usize },
    /// Clean up a stored route and infer its region again
    Normalize {
        id: usize,
        /// Snap the drawn path to roads again first
        #[structopt(long)]
        snap: bool,
    },
}

impl Args {
    fn clients(&self) -> Result<(RoadsClient, GeocodingClient)> {
        if self.api_key.is_none() {
            warn!("No Google Maps API key; snapping and region lookups will fail");
        }
        let http = google::http_client(Duration::from_secs(self.timeout_secs))?;
        Ok((
            RoadsClient::new(
                http.clone(),
                self.roads_url
                    .clone()
                    .unwrap_or_else(|| google::ROADS_URL.to_string()),
                self.api_key.clone(),
            ),
            GeocodingClient::new(
                http,
                self.geocode_url
                    .clone()
                    .unwrap_or_else(|| google::GEOCODE_URL.to_string()),
                self.api_key.clone(),
            ),
        ))
    }

    fn run(mut self) -> Result<()> {
        let mut store = RouteStore::open(&self.routes)?;
        match self.cmd.take() {
            None | Some(Command::Edit) => {
                let (roads, geocoder) = self.clients()?;
                let geocoder = CachedGeocoder::new(geocoder);
                let stdin = io::stdin();
                repl::Repl::new(&mut store, roads, &geocoder).run(stdin.lock(), io::stdout())
            }
            Some(Command::List) => {
                for route in store.list() {
                    println!("{}", route.describe());
                }
                Ok(())
            }
            Some(Command::Delete { id }) => store.delete(RouteID(id)),
            Some(Command::Normalize { id, snap }) => {
                let (roads, geocoder) = self.clients()?;
                let mut route = store
                    .get(RouteID(id))
                    .ok_or_else(|| anyhow!("No route {id}"))?;

                let mut timer = Timer::new(format!("normalize route {id}"));
                if snap {
                    timer.start("snap");
                    let result = resnap_route(&mut route.draft, &roads);
                    timer.stop("snap");
                    result?;
                }
                timer.start("normalize");
                let result = normalize_route(&mut route.draft, &CachedGeocoder::new(geocoder));
                timer.stop("normalize");
                result?;

                let route = store.update(RouteID(id), route.draft)?;
                println!("{}", route.describe());
                Ok(())
            }
        }
    }
}

fn main() {
    abstutil::logger::setup();

    let args = Args::from_iter(abstutil::cli_args());
    if let Err(err) = args.run() {
        error!("{:?}", err);
        std::process::exit(1);
    }
}
