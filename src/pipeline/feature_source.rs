//! Feature-read boundary (§1.5): every filter/weigher queries feature
//! tables and reservation/server rows through this trait rather than a
//! raw `Conn`, so step-level tests can swap in the in-memory
//! `FakeFeatureSource` and run with no database at all.

use std::collections::HashMap;

use async_trait::async_trait;
use displaydoc::Display;
use thiserror::Error;

use crate::db::Conn;
use crate::model::feature::capabilities::HostCapabilities;
use crate::model::feature::contention::{HostContention, Window};
use crate::model::feature::utilization::HostUtilization;
use crate::model::reservation::Reservation;
use crate::model::server::Server;

#[derive(Debug, Display, Error)]
pub enum Error {
    /// feature read failed: {0}
    Read(String),
}

#[async_trait]
pub trait FeatureSource: Send {
    async fn az_map(&mut self) -> Result<HashMap<String, Option<String>>, Error>;
    async fn capabilities_map(&mut self) -> Result<HashMap<String, HostCapabilities>, Error>;
    async fn utilization_map(&mut self) -> Result<HashMap<String, HostUtilization>, Error>;
    async fn noisy_projects_map(&mut self) -> Result<HashMap<(String, String), f64>, Error>;
    async fn contention_map(&mut self, window: Window) -> Result<HashMap<String, HostContention>, Error>;
    async fn active_reservations(&mut self, host_name: &str) -> Result<Vec<Reservation>, Error>;
    async fn servers_by_host(&mut self, host_name: &str) -> Result<Vec<Server>, Error>;
}

/// The production implementation: delegates every read straight to the
/// per-table model queries against a live connection.
pub struct ConnFeatureSource<'a, 'b> {
    conn: &'a mut Conn<'b>,
}

impl<'a, 'b> ConnFeatureSource<'a, 'b> {
    pub fn new(conn: &'a mut Conn<'b>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<'a, 'b> FeatureSource for ConnFeatureSource<'a, 'b> {
    async fn az_map(&mut self) -> Result<HashMap<String, Option<String>>, Error> {
        crate::model::feature::az::HostAz::as_map(self.conn)
            .await
            .map_err(|e| Error::Read(e.to_string()))
    }

    async fn capabilities_map(&mut self) -> Result<HashMap<String, HostCapabilities>, Error> {
        HostCapabilities::as_map(self.conn)
            .await
            .map_err(|e| Error::Read(e.to_string()))
    }

    async fn utilization_map(&mut self) -> Result<HashMap<String, HostUtilization>, Error> {
        HostUtilization::as_map(self.conn)
            .await
            .map_err(|e| Error::Read(e.to_string()))
    }

    async fn noisy_projects_map(&mut self) -> Result<HashMap<(String, String), f64>, Error> {
        crate::model::feature::noisy_projects::NoisyProject::as_map(self.conn)
            .await
            .map_err(|e| Error::Read(e.to_string()))
    }

    async fn contention_map(&mut self, window: Window) -> Result<HashMap<String, HostContention>, Error> {
        HostContention::as_map(window, self.conn)
            .await
            .map_err(|e| Error::Read(e.to_string()))
    }

    async fn active_reservations(&mut self, host_name: &str) -> Result<Vec<Reservation>, Error> {
        Reservation::active_for_host(host_name, self.conn)
            .await
            .map_err(|e| Error::Read(e.to_string()))
    }

    async fn servers_by_host(&mut self, host_name: &str) -> Result<Vec<Server>, Error> {
        Server::by_host(host_name, self.conn)
            .await
            .map_err(|e| Error::Read(e.to_string()))
    }
}

/// In-memory `FeatureSource` for pipeline/step unit tests: every read
/// returns whatever was seeded via the builder methods, never touching
/// a database. Missing tables behave exactly as an empty feature table
/// would (empty map / empty vec), matching the production adapters.
#[derive(Debug, Default, Clone)]
pub struct FakeFeatureSource {
    az: HashMap<String, Option<String>>,
    capabilities: HashMap<String, HostCapabilities>,
    utilization: HashMap<String, HostUtilization>,
    noisy_projects: HashMap<(String, String), f64>,
    contention_long: HashMap<String, HostContention>,
    contention_short: HashMap<String, HostContention>,
    reservations: HashMap<String, Vec<Reservation>>,
    servers: HashMap<String, Vec<Server>>,
}

impl FakeFeatureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_az(mut self, az: HashMap<String, Option<String>>) -> Self {
        self.az = az;
        self
    }

    pub fn with_capabilities(mut self, capabilities: HashMap<String, HostCapabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_utilization(mut self, utilization: HashMap<String, HostUtilization>) -> Self {
        self.utilization = utilization;
        self
    }

    pub fn with_noisy_projects(mut self, noisy_projects: HashMap<(String, String), f64>) -> Self {
        self.noisy_projects = noisy_projects;
        self
    }

    pub fn with_contention(mut self, window: Window, contention: HashMap<String, HostContention>) -> Self {
        match window {
            Window::Long => self.contention_long = contention,
            Window::Short => self.contention_short = contention,
        }
        self
    }

    pub fn with_reservations(mut self, host_name: &str, reservations: Vec<Reservation>) -> Self {
        self.reservations.insert(host_name.to_string(), reservations);
        self
    }

    pub fn with_servers(mut self, host_name: &str, servers: Vec<Server>) -> Self {
        self.servers.insert(host_name.to_string(), servers);
        self
    }
}

#[async_trait]
impl FeatureSource for FakeFeatureSource {
    async fn az_map(&mut self) -> Result<HashMap<String, Option<String>>, Error> {
        Ok(self.az.clone())
    }

    async fn capabilities_map(&mut self) -> Result<HashMap<String, HostCapabilities>, Error> {
        Ok(self.capabilities.clone())
    }

    async fn utilization_map(&mut self) -> Result<HashMap<String, HostUtilization>, Error> {
        Ok(self.utilization.clone())
    }

    async fn noisy_projects_map(&mut self) -> Result<HashMap<(String, String), f64>, Error> {
        Ok(self.noisy_projects.clone())
    }

    async fn contention_map(&mut self, window: Window) -> Result<HashMap<String, HostContention>, Error> {
        Ok(match window {
            Window::Long => self.contention_long.clone(),
            Window::Short => self.contention_short.clone(),
        })
    }

    async fn active_reservations(&mut self, host_name: &str) -> Result<Vec<Reservation>, Error> {
        Ok(self.reservations.get(host_name).cloned().unwrap_or_default())
    }

    async fn servers_by_host(&mut self, host_name: &str) -> Result<Vec<Server>, Error> {
        Ok(self.servers.get(host_name).cloned().unwrap_or_default())
    }
}
