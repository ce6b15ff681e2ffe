use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::{Route, RouteDraft, RouteID};

/// Where finished routes go
pub trait RouteRepository {
    fn create(&mut self, draft: RouteDraft) -> Result<Route>;
    fn update(&mut self, id: RouteID, draft: RouteDraft) -> Result<Route>;
    fn delete(&mut self, id: RouteID) -> Result<()>;
    fn list(&self) -> Vec<Route>;
    fn get(&self, id: RouteID) -> Option<Route>;
}

/// Keeps every route in memory, optionally writing the whole list to a JSON file after every change.
/// If writing fails, the change is undone in memory too.
pub struct RouteStore {
    file: Option<PathBuf>,
    routes: Vec<Route>,
}

impl RouteStore {
    pub fn in_memory() -> Self {
        Self {
            file: None,
            routes: Vec::new(),
        }
    }

    /// A missing file just means there aren't any routes yet
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            warn!("{} doesn't exist, starting with no routes", path.display());
            return Ok(Self {
                file: Some(path),
                routes: Vec::new(),
            });
        }
        let contents = fs_err::read_to_string(&path)?;
        let routes: Vec<Route> = serde_json::from_str(&contents)
            .with_context(|| format!("parsing routes from {}", path.display()))?;
        info!("Loaded {} routes from {}", routes.len(), path.display());
        Ok(Self {
            file: Some(path),
            routes,
        })
    }

    fn next_id(&self) -> RouteID {
        RouteID(
            self.routes
                .iter()
                .map(|r| r.route_id.0)
                .max()
                .unwrap_or(0)
                + 1,
        )
    }

    fn idx(&self, id: RouteID) -> Result<usize> {
        match self.routes.iter().position(|r| r.route_id == id) {
            Some(idx) => Ok(idx),
            None => bail!("No route {}", id.0),
        }
    }

    fn flush(&self) -> Result<()> {
        let path = match self.file {
            Some(ref path) => path,
            None => return Ok(()),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(&self.routes)?;
        fs_err::write(path, contents)?;
        Ok(())
    }
}

impl RouteRepository for RouteStore {
    fn create(&mut self, draft: RouteDraft) -> Result<Route> {
        let route = Route {
            route_id: self.next_id(),
            draft,
            updated_at: Some(Utc::now()),
        };
        self.routes.push(route.clone());
        if let Err(err) = self.flush() {
            self.routes.pop();
            return Err(err.context(format!("creating route {}", route.route_id.0)));
        }
        info!("Created route {}", route.route_id.0);
        Ok(route)
    }

    fn update(&mut self, id: RouteID, draft: RouteDraft) -> Result<Route> {
        let idx = self.idx(id)?;
        let route = Route {
            route_id: id,
            draft,
            updated_at: Some(Utc::now()),
        };
        let old = std::mem::replace(&mut self.routes[idx], route.clone());
        if let Err(err) = self.flush() {
            self.routes[idx] = old;
            return Err(err.context(format!("updating route {}", id.0)));
        }
        info!("Updated route {}", id.0);
        Ok(route)
    }

    fn delete(&mut self, id: RouteID) -> Result<()> {
        let idx = self.idx(id)?;
        let old = self.routes.remove(idx);
        if let Err(err) = self.flush() {
            self.routes.insert(idx, old);
            return Err(err.context(format!("deleting route {}", id.0)));
        }
        info!("Deleted route {}", id.0);
        Ok(())
    }

    fn list(&self) -> Vec<Route> {
        self.routes.clone()
    }

    fn get(&self, id: RouteID) -> Option<Route> {
        self.routes.iter().find(|r| r.route_id == id).cloned()
    }
}
