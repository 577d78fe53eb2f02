use crate::config::{MapConfig, MarkerStyle};
use crate::processing::parse_geo_point;
use crate::types::{Coordinate, Record};
use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use image::{ImageBuffer, Pixel, Rgba, RgbaImage};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

// Constants for Web Mercator
const TILE_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayer {
    pub url_template: String,
    pub attribution: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircleMarker {
    pub position: Coordinate,
    pub style: MarkerStyle,
}

// Wrapper for RTree indexing
struct MarkerIndex {
    index: usize,
    position: [f64; 2],
}

impl RTreeObject for MarkerIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Overlay holding only the data markers; cleared and refilled on every render.
#[derive(Default)]
pub struct MarkerLayer {
    markers: Vec<CircleMarker>,
    tree: RTree<MarkerIndex>,
}

impl MarkerLayer {
    pub fn clear_layers(&mut self) {
        self.markers.clear();
        self.tree = RTree::new();
    }

    pub fn add(&mut self, marker: CircleMarker) {
        self.tree.insert(MarkerIndex {
            index: self.markers.len(),
            position: [marker.position.x(), marker.position.y()],
        });
        self.markers.push(marker);
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn markers(&self) -> &[CircleMarker] {
        &self.markers
    }

    /// Markers inside a lon/lat bounding box, in insertion order. Corner order does not matter.
    pub fn within(&self, min: [f64; 2], max: [f64; 2]) -> Vec<&CircleMarker> {
        let envelope = AABB::from_corners(min, max);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();
        hits.into_iter().filter_map(|i| self.markers.get(i)).collect()
    }

    pub fn to_geojson<'a, I>(markers: I) -> FeatureCollection
    where
        I: IntoIterator<Item = &'a CircleMarker>,
    {
        let features = markers
            .into_iter()
            .map(|marker| {
                let mut properties = JsonObject::new();
                properties.insert("radius".to_string(), marker.style.radius.into());
                properties.insert("color".to_string(), marker.style.color.clone().into());
                properties.insert("fillColor".to_string(), marker.style.fill_color.clone().into());
                properties.insert("fillOpacity".to_string(), marker.style.fill_opacity.into());
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![
                        marker.position.x(),
                        marker.position.y(),
                    ]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

/// The tile map: a persistent base layer and viewport plus the marker overlay.
pub struct MapSurface {
    pub center: Coordinate,
    pub zoom: u8,
    pub tile_layer: TileLayer,
    pub markers: MarkerLayer,
    size: (u32, u32),
    container: (u32, u32),
    container_visible: bool,
    measurements: u32,
}

impl MapSurface {
    fn new(config: &MapConfig) -> Self {
        Self {
            center: Coordinate::new(config.center_lon, config.center_lat),
            zoom: config.zoom,
            tile_layer: TileLayer {
                url_template: config.tile_url.clone(),
                attribution: config.attribution.clone(),
            },
            markers: MarkerLayer::default(),
            size: (config.width, config.height),
            container: (config.width, config.height),
            container_visible: true,
            measurements: 1,
        }
    }

    /// Pan/zoom set by the user; kept across re-renders.
    pub fn set_view(&mut self, center: Coordinate, zoom: u8) {
        self.center = center;
        self.zoom = zoom;
    }

    /// Re-read the container's pixel dimensions.
    pub fn invalidate_size(&mut self) {
        self.size = if self.container_visible { self.container } else { (0, 0) };
        self.measurements += 1;
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn measurements(&self) -> u32 {
        self.measurements
    }

    fn set_container_visible(&mut self, visible: bool) {
        self.container_visible = visible;
        if !visible {
            self.size = (0, 0);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MapSnapshot {
    /// `[lat, lon]`
    pub center: [f64; 2],
    pub zoom: u8,
    pub tile_layer: TileLayer,
    pub size: (u32, u32),
    pub marker_count: usize,
    pub markers: FeatureCollection,
}

pub struct MapRenderer {
    config: MapConfig,
    surface: Option<Arc<Mutex<MapSurface>>>,
    pending_resize: Option<JoinHandle<()>>,
}

fn lock(surface: &Mutex<MapSurface>) -> MutexGuard<'_, MapSurface> {
    surface.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MapRenderer {
    pub fn new(config: MapConfig) -> Self {
        Self {
            config,
            surface: None,
            pending_resize: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.surface.is_some()
    }

    pub fn surface(&self) -> Option<Arc<Mutex<MapSurface>>> {
        self.surface.clone()
    }

    /// Show the map and replace its markers with one per geocoded record.
    pub fn draw(&mut self, records: &[Record]) -> MapSnapshot {
        let surface = match self.surface.clone() {
            Some(surface) => {
                {
                    let mut map = lock(&surface);
                    map.set_container_visible(true);
                    map.markers.clear_layers();
                }
                self.schedule_resize(Arc::clone(&surface));
                surface
            }
            None => {
                info!(zoom = self.config.zoom, "Initializing map surface");
                let surface = Arc::new(Mutex::new(MapSurface::new(&self.config)));
                self.surface = Some(Arc::clone(&surface));
                surface
            }
        };

        let mut map = lock(&surface);
        for position in records.iter().filter_map(|r| parse_geo_point(r.geo_point_2d.as_deref())) {
            map.markers.add(CircleMarker {
                position,
                style: self.config.marker.clone(),
            });
        }
        debug!(markers = map.markers.len(), records = records.len(), "Map markers updated");

        snapshot(&map, map.markers.markers())
    }

    /// Hide the map container.
    pub fn hide(&mut self) {
        if let Some(surface) = &self.surface {
            lock(surface).set_container_visible(false);
        }
    }

    pub fn snapshot(&self) -> Option<MapSnapshot> {
        let surface = self.surface.as_ref()?;
        let map = lock(surface);
        Some(snapshot(&map, map.markers.markers()))
    }

    /// Snapshot restricted to the markers inside a lon/lat bounding box.
    pub fn snapshot_within(&self, min: [f64; 2], max: [f64; 2]) -> Option<MapSnapshot> {
        let surface = self.surface.as_ref()?;
        let map = lock(surface);
        let markers = map.markers.within(min, max);
        Some(snapshot(&map, markers))
    }

    // The container may have been zero-sized while hidden; re-measure once it has laid out again.
    fn schedule_resize(&mut self, surface: Arc<Mutex<MapSurface>>) {
        if let Some(pending) = self.pending_resize.take() {
            pending.abort();
        }
        let delay = Duration::from_millis(self.config.resize_delay_ms);
        match Handle::try_current() {
            Ok(handle) => {
                self.pending_resize = Some(handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    lock(&surface).invalidate_size();
                }));
            }
            Err(_) => {
                debug!("No async runtime, re-measuring map immediately");
                lock(&surface).invalidate_size();
            }
        }
    }

    /// Rasterize the marker overlay into `{dir}/{z}/{x}/{y}.png` tiles.
    pub fn export_tiles(&self, dir: &Path, min_zoom: u8, max_zoom: u8) -> Result<()> {
        let Some(surface) = &self.surface else {
            return Ok(());
        };
        let markers = lock(surface).markers.markers().to_vec();
        info!(min_zoom, max_zoom, markers = markers.len(), "Generating marker tiles");

        (min_zoom..=max_zoom)
            .into_par_iter()
            .map(|z| render_zoom_level(dir, z, &markers))
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }
}

impl Drop for MapRenderer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending_resize.take() {
            pending.abort();
        }
    }
}

fn snapshot<'a, I>(map: &MapSurface, markers: I) -> MapSnapshot
where
    I: IntoIterator<Item = &'a CircleMarker>,
{
    let markers = MarkerLayer::to_geojson(markers);
    MapSnapshot {
        center: [map.center.y(), map.center.x()],
        zoom: map.zoom,
        tile_layer: map.tile_layer.clone(),
        size: map.size,
        marker_count: markers.features.len(),
        markers,
    }
}

fn render_zoom_level(dir: &Path, zoom: u8, markers: &[CircleMarker]) -> Result<usize> {
    let mut local_tiles: HashMap<(u32, u32), RgbaImage> = HashMap::new();
    let world = TILE_SIZE as i64 * (1_i64 << zoom);

    for marker in markers {
        let (gx, gy) = lat_lon_to_pixel(marker.position.y(), marker.position.x(), zoom);
        if !gx.is_finite() || !gy.is_finite() {
            continue;
        }
        let fill = color_to_rgba(&marker.style.fill_color, marker.style.fill_opacity);
        let r = marker.style.radius as i64;
        let (cx, cy) = (gx as i64, gy as i64);

        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let (px, py) = (cx + dx, cy + dy);
                if px < 0 || py < 0 || px >= world || py >= world {
                    continue;
                }
                let tile = ((px / TILE_SIZE as i64) as u32, (py / TILE_SIZE as i64) as u32);
                let tile_img = local_tiles
                    .entry(tile)
                    .or_insert_with(|| ImageBuffer::new(TILE_SIZE, TILE_SIZE));
                let pixel = tile_img.get_pixel_mut(
                    (px % TILE_SIZE as i64) as u32,
                    (py % TILE_SIZE as i64) as u32,
                );
                pixel.blend(&fill);
            }
        }
    }

    // Save tiles: {dir}/{z}/{x}/{y}.png
    let z_dir = dir.join(zoom.to_string());
    fs::create_dir_all(&z_dir).context("Failed to create zoom directory")?;

    local_tiles.par_iter().try_for_each(|((x, y), img)| -> Result<()> {
        let x_dir = z_dir.join(x.to_string());
        fs::create_dir_all(&x_dir)
            .with_context(|| format!("Failed to create tile directory: {:?}", x_dir))?;
        let path = x_dir.join(format!("{}.png", y));
        img.save(&path).with_context(|| format!("Failed to save tile: {:?}", path))
    })?;

    Ok(local_tiles.len())
}

/// Named CSS colors used by the marker style, or a `#rrggbb` hex code.
fn color_to_rgba(color: &str, opacity: f64) -> Rgba<u8> {
    let hex = match color {
        "orange" => "ffa500",
        "red" => "ff0000",
        "blue" => "0000ff",
        "black" => "000000",
        "white" => "ffffff",
        other => other.trim_start_matches('#'),
    };
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range).and_then(|h| u8::from_str_radix(h, 16).ok()).unwrap_or(0)
    };
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba([channel(0..2), channel(2..4), channel(4..6), alpha])
}

// Coordinate conversions
fn lat_lon_to_pixel(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let n = 2.0_f64.powi(zoom as i32); // Use powi for integer power
    let x_t = (lon + 180.0) / 360.0 * n;
    let lat_rad = lat.to_radians();
    let y_t = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * n;

    (x_t * TILE_SIZE as f64, y_t * TILE_SIZE as f64)
}
