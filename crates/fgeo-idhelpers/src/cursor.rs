//! Mutable coordinate cursors used while walking the volume tree.
//!
//! A cursor holds raw coordinates and calls through to its helper whenever
//! an identifier is requested. It neither validates nor caches.

use std::sync::Arc;

use fgeo_types::Identifier;

use crate::{EmulsionId, FaserSctId};

#[derive(Debug, Clone)]
pub struct EmulsionIdentifier {
    helper: Arc<EmulsionId>,
    module: i32,
    base: i32,
    film: i32,
}

impl EmulsionIdentifier {
    pub fn new(helper: Arc<EmulsionId>) -> Self {
        Self {
            helper,
            module: -1,
            base: -1,
            film: -1,
        }
    }

    pub fn set_module(&mut self, module: i32) {
        self.module = module;
    }

    pub fn set_base(&mut self, base: i32) {
        self.base = base;
    }

    pub fn set_film(&mut self, film: i32) {
        self.film = film;
    }

    pub const fn module(&self) -> i32 {
        self.module
    }

    pub const fn base(&self) -> i32 {
        self.base
    }

    pub const fn film(&self) -> i32 {
        self.film
    }

    pub fn helper(&self) -> &Arc<EmulsionId> {
        &self.helper
    }

    pub fn module_id(&self) -> Identifier {
        self.helper.module_id(self.module)
    }

    pub fn base_id(&self) -> Identifier {
        self.helper.base_id(self.module, self.base)
    }

    pub fn film_id(&self) -> Identifier {
        self.helper.film_id(self.module, self.base, self.film)
    }
}

#[derive(Debug, Clone)]
pub struct SctIdentifier {
    helper: Arc<FaserSctId>,
    station: i32,
    layer: i32,
    phi_module: i32,
    eta_module: i32,
    side: i32,
}

impl SctIdentifier {
    pub fn new(helper: Arc<FaserSctId>) -> Self {
        Self {
            helper,
            station: -1,
            layer: -1,
            phi_module: -1,
            eta_module: -1,
            side: -1,
        }
    }

    pub fn set_station(&mut self, station: i32) {
        self.station = station;
    }

    pub fn set_layer(&mut self, layer: i32) {
        self.layer = layer;
    }

    pub fn set_phi_module(&mut self, phi: i32) {
        self.phi_module = phi;
    }

    pub fn set_eta_module(&mut self, eta: i32) {
        self.eta_module = eta;
    }

    pub fn set_side(&mut self, side: i32) {
        self.side = side;
    }

    pub const fn station(&self) -> i32 {
        self.station
    }

    pub const fn layer(&self) -> i32 {
        self.layer
    }

    pub const fn phi_module(&self) -> i32 {
        self.phi_module
    }

    pub const fn eta_module(&self) -> i32 {
        self.eta_module
    }

    pub const fn side(&self) -> i32 {
        self.side
    }

    pub fn helper(&self) -> &Arc<FaserSctId> {
        &self.helper
    }

    pub fn station_id(&self) -> Identifier {
        self.helper.station_id(self.station)
    }

    pub fn layer_id(&self) -> Identifier {
        self.helper.layer_id(self.station, self.layer)
    }

    pub fn module_id(&self) -> Identifier {
        self.helper
            .module_id(self.station, self.layer, self.phi_module, self.eta_module)
    }

    pub fn wafer_id(&self) -> Identifier {
        self.helper.wafer_id(
            self.station,
            self.layer,
            self.phi_module,
            self.eta_module,
            self.side,
        )
    }
}
