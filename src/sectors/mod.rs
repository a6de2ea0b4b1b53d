//! Immutable catalog of named airspace polygons.
//!
//! The catalog is loaded once at startup and shared behind an `Arc`. Loading
//! is all-or-nothing: a single malformed polygon fails the whole load, since
//! running with a partial catalog silently produces wrong occupancy data.

use std::{collections::HashSet, fs, path::Path};

use log::info;
use serde::Deserialize;

use crate::errors::{geometry_error, Result};
use crate::geo::{point_in_polygon, Position};

/// Polygon as it appears in the catalog file: `[[lat, lon], ...]`.
#[derive(Debug, Clone, Deserialize)]
pub struct SectorDef {
    pub name: String,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone)]
struct BoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl BoundingBox {
    fn of(ring: &[Position]) -> Self {
        ring.iter().fold(
            BoundingBox {
                min_lat: f64::INFINITY,
                max_lat: f64::NEG_INFINITY,
                min_lon: f64::INFINITY,
                max_lon: f64::NEG_INFINITY,
            },
            |bb, p| BoundingBox {
                min_lat: bb.min_lat.min(p.lat),
                max_lat: bb.max_lat.max(p.lat),
                min_lon: bb.min_lon.min(p.lon),
                max_lon: bb.max_lon.max(p.lon),
            },
        )
    }

    fn contains(&self, p: &Position) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lon >= self.min_lon
            && p.lon <= self.max_lon
    }
}

#[derive(Debug, Clone)]
pub struct Sector {
    pub name: String,
    ring: Vec<Position>,
    bbox: BoundingBox,
}

impl Sector {
    pub fn new(name: impl Into<String>, ring: Vec<Position>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(geometry_error!("sector with empty name"));
        }

        if let Some(bad) = ring.iter().find(|p| !p.is_valid()) {
            return Err(geometry_error!("sector {name} has invalid vertex {bad:?}"));
        }

        let mut ring = ring;
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(geometry_error!(
                "sector {name} needs at least 3 distinct vertices, got {}",
                ring.len()
            ));
        }

        let bbox = BoundingBox::of(&ring);
        Ok(Self { name, ring, bbox })
    }

    pub fn contains(&self, p: &Position) -> bool {
        self.bbox.contains(p) && point_in_polygon(p, &self.ring)
    }

    pub fn vertices(&self) -> &[Position] {
        &self.ring
    }
}

#[derive(Debug, Default)]
pub struct SectorCatalog {
    sectors: Vec<Sector>,
}

impl SectorCatalog {
    pub fn new(sectors: Vec<Sector>) -> Result<Self> {
        let mut seen = HashSet::new();
        for sector in &sectors {
            if !seen.insert(sector.name.as_str()) {
                return Err(geometry_error!("duplicate sector name {}", sector.name));
            }
        }
        Ok(Self { sectors })
    }

    pub fn from_defs(defs: Vec<SectorDef>) -> Result<Self> {
        let sectors = defs
            .into_iter()
            .map(|def| {
                let ring = def
                    .points
                    .iter()
                    .map(|[lat, lon]| Position::new(*lat, *lon))
                    .collect();
                Sector::new(def.name, ring)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(sectors)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let defs: Vec<SectorDef> = serde_json::from_str(json)?;
        Self::from_defs(defs)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let catalog = Self::from_json(&contents)?;
        info!(
            "Loaded {} sectors from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// First sector (in catalog order) containing the point.
    pub fn sector_at(&self, p: &Position) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.contains(p))
    }

    pub fn get(&self, name: &str) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }
}
