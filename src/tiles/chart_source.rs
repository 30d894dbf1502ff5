//! Enroute chart tiles
//!
//! Tiles live at `<tile_host>/<enroute key>/<variant>-1x/<zoom>/<x>/<flipped y>.png`
//! and are fetched with the session's signed cookies. The tile host counts
//! rows from the bottom, so y is flipped relative to the slippy-map grid.

use std::sync::Arc;

use async_trait::async_trait;
use crate::Result;
use crate::auth::ChartCredentials;
use crate::cancel::CancelToken;
use crate::config::{ChartsConfig, Config};
use crate::error::Error;
use crate::http::HttpsClient;
use super::projection::{self, Point};
use super::{TileAddress, TileImage, TileSource};

pub const COPYRIGHT: &str = "(c) Navigraph | Jeppesen - Not for Navigational Use";

const MIN_ZOOM: u32 = 3;
const MAX_ZOOM: u32 = 11;
const INITIAL_ZOOM: u32 = 10;
const TILE_SIZE: u32 = 256;

/// Which enroute chart is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartVariant {
    /// High-altitude routes instead of low-altitude ones
    pub high_routes: bool,
    pub day_mode: bool,
}

impl ChartVariant {
    fn path_prefix(&self) -> &'static str {
        match (self.high_routes, self.day_mode) {
            (true, true) => "hd",
            (true, false) => "hn",
            (false, true) => "ld",
            (false, false) => "ln",
        }
    }
}

impl From<&ChartsConfig> for ChartVariant {
    fn from(config: &ChartsConfig) -> Self {
        Self {
            high_routes: config.high_routes,
            day_mode: config.day_mode,
        }
    }
}

/// Tile source for the provider's enroute charts
pub struct ChartTileSource {
    credentials: Arc<dyn ChartCredentials>,
    http: HttpsClient,
    tile_host: String,
    variant: ChartVariant,
    cancel: CancelToken,
}

impl ChartTileSource {
    pub fn new(
        credentials: Arc<dyn ChartCredentials>,
        tile_host: impl Into<String>,
        variant: ChartVariant,
    ) -> Self {
        Self {
            credentials,
            http: HttpsClient::new(),
            tile_host: tile_host.into(),
            variant,
            cancel: CancelToken::new(),
        }
    }

    pub fn from_config(credentials: Arc<dyn ChartCredentials>, config: &Config) -> Self {
        Self::new(
            credentials,
            config.endpoints.tile_host.clone(),
            ChartVariant::from(&config.charts),
        )
    }

    pub fn variant(&self) -> ChartVariant {
        self.variant
    }
}

#[async_trait]
impl TileSource for ChartTileSource {
    fn min_zoom_level(&self) -> u32 {
        MIN_ZOOM
    }

    fn max_zoom_level(&self) -> u32 {
        MAX_ZOOM
    }

    fn initial_zoom_level(&self) -> u32 {
        INITIAL_ZOOM
    }

    fn supports_world_coords(&self) -> bool {
        true
    }

    fn suggest_initial_center(&self, _page: i32) -> Point<f64> {
        Point::new(0.0, 0.0)
    }

    fn tile_dimensions(&self, _zoom: u32) -> Point<u32> {
        Point::new(TILE_SIZE, TILE_SIZE)
    }

    fn page_count(&self) -> i32 {
        1
    }

    fn copyright_info(&self) -> &str {
        COPYRIGHT
    }

    fn transform_zoomed_point(&self, _page: i32, point: Point<f64>, old_zoom: u32, new_zoom: u32) -> Point<f64> {
        projection::transform_zoomed_point(point, old_zoom, new_zoom)
    }

    fn world_to_xy(&self, lon: f64, lat: f64, zoom: u32) -> Point<f64> {
        projection::world_to_xy(lon, lat, zoom)
    }

    fn xy_to_world(&self, x: f64, y: f64, zoom: u32) -> Point<f64> {
        projection::xy_to_world(x, y, zoom)
    }

    fn is_tile_valid(&self, tile: &TileAddress) -> bool {
        if tile.page != 0 {
            return false;
        }
        if tile.zoom < MIN_ZOOM || tile.zoom > MAX_ZOOM {
            return false;
        }

        let end = 1i64 << tile.zoom;

        // y does not repeat
        if tile.y < 0 || i64::from(tile.y) >= end {
            return false;
        }

        // no x wrapping: it renders wrong on the higher zoom layers
        if tile.x < 0 || i64::from(tile.x) >= end {
            return false;
        }

        true
    }

    fn unique_tile_name(&self, tile: &TileAddress) -> Result<String> {
        if !self.is_tile_valid(tile) {
            return Err(Error::InvalidTile {
                page: tile.page,
                x: tile.x,
                y: tile.y,
                zoom: tile.zoom,
            });
        }

        let flipped_y = (1i64 << tile.zoom) - 1 - i64::from(tile.y);
        Ok(format!(
            "/{}-1x/{}/{}/{}.png",
            self.variant.path_prefix(),
            tile.zoom,
            tile.x,
            flipped_y
        ))
    }

    async fn load_tile_image(&self, tile: &TileAddress) -> Result<TileImage> {
        self.cancel.reset();

        let path = self.unique_tile_name(tile)?;
        let access = self.credentials.signed_access(&self.cancel).await?;

        // the URL carries the key, log the path only
        tracing::debug!("Loading chart tile {}", path);
        let url = format!("{}/{}{}", self.tile_host.trim_end_matches('/'), access.key, path);
        let data = self.http.download(&url, &access.cookies, &self.cancel).await?;
        self.cancel.check()?;

        let image = image::load_from_memory(&data)?.to_rgba8();
        Ok(image)
    }

    fn cancel_pending_loads(&self) {
        self.cancel.cancel();
    }

    fn resume_loading(&self) {
        self.cancel.reset();
    }
}
