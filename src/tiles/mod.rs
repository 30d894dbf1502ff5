//! Map tile sources
//!
//! This module provides:
//! - Web Mercator projection helpers
//! - the `TileSource` interface a map view drives
//! - `ChartTileSource` for the provider's enroute charts

mod chart_source;
pub mod projection;

use async_trait::async_trait;
use crate::Result;

pub use chart_source::{ChartTileSource, ChartVariant, COPYRIGHT};
pub use projection::{transform_zoomed_point, world_to_xy, xy_to_world, Point};

/// Decoded tile imagery
pub type TileImage = image::RgbaImage;

/// Address of one tile in a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub page: i32,
    pub x: i32,
    pub y: i32,
    pub zoom: u32,
}

impl TileAddress {
    pub fn new(page: i32, x: i32, y: i32, zoom: u32) -> Self {
        Self { page, x, y, zoom }
    }
}

impl std::fmt::Display for TileAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}/{}", self.page, self.zoom, self.x, self.y)
    }
}

/// A source of map tiles
#[async_trait]
pub trait TileSource: Send + Sync {
    fn min_zoom_level(&self) -> u32;
    fn max_zoom_level(&self) -> u32;
    fn initial_zoom_level(&self) -> u32;
    fn supports_world_coords(&self) -> bool;
    fn suggest_initial_center(&self, page: i32) -> Point<f64>;
    fn tile_dimensions(&self, zoom: u32) -> Point<u32>;
    fn page_count(&self) -> i32;
    fn copyright_info(&self) -> &str;

    /// Rescale `point` so it stays anchored when the zoom level changes
    fn transform_zoomed_point(&self, page: i32, point: Point<f64>, old_zoom: u32, new_zoom: u32) -> Point<f64>;
    fn world_to_xy(&self, lon: f64, lat: f64, zoom: u32) -> Point<f64>;
    fn xy_to_world(&self, x: f64, y: f64, zoom: u32) -> Point<f64>;

    fn is_tile_valid(&self, tile: &TileAddress) -> bool;

    /// Stable identifier of a tile; fails for invalid addresses
    fn unique_tile_name(&self, tile: &TileAddress) -> Result<String>;

    async fn load_tile_image(&self, tile: &TileAddress) -> Result<TileImage>;

    /// Make in-flight and later loads fail until loading resumes
    fn cancel_pending_loads(&self);
    fn resume_loading(&self);
}
