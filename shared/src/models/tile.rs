use serde::{Deserialize, Serialize};

use crate::errors::{CompositeError, RenderResult};

/// One physical display region of the mosaic. Static for a session unless
/// the display configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
    pub display_rank: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileLayout {
    pub full_width: u32,
    pub full_height: u32,
    pub tiles: Vec<Tile>,
}

impl TileLayout {
    /// The common desktop-delivery case: one tile covering the whole image,
    /// displayed by rank 0.
    pub fn single(full_width: u32, full_height: u32) -> Self {
        Self {
            full_width,
            full_height,
            tiles: vec![Tile {
                origin_x: 0,
                origin_y: 0,
                width: full_width,
                height: full_height,
                display_rank: 0,
            }],
        }
    }

    /// Checks that the tiles exactly partition the full mosaic and that no
    /// display rank is assigned twice.
    pub fn validate(&self) -> RenderResult<()> {
        let mut covered: u64 = 0;
        let mut ranks = Vec::with_capacity(self.tiles.len());
        for tile in &self.tiles {
            if tile.origin_x + tile.width > self.full_width
                || tile.origin_y + tile.height > self.full_height
            {
                return Err(CompositeError::InvalidLayout(format!(
                    "tile at ({}, {}) overflows the {}x{} mosaic",
                    tile.origin_x, tile.origin_y, self.full_width, self.full_height
                )));
            }
            if ranks.contains(&tile.display_rank) {
                return Err(CompositeError::InvalidLayout(format!(
                    "display rank {} assigned to more than one tile",
                    tile.display_rank
                )));
            }
            ranks.push(tile.display_rank);
            covered += tile.width as u64 * tile.height as u64;
        }
        let full = self.full_width as u64 * self.full_height as u64;
        if covered != full {
            return Err(CompositeError::InvalidLayout(format!(
                "tiles cover {covered} pixels, mosaic has {full}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tile_layout_is_valid() {
        assert!(TileLayout::single(640, 480).validate().is_ok());
    }

    #[test]
    fn overflowing_tile_is_rejected() {
        let mut layout = TileLayout::single(100, 100);
        layout.tiles[0].width = 200;
        assert!(layout.validate().is_err());
    }

    #[test]
    fn duplicate_display_rank_is_rejected() {
        let layout = TileLayout {
            full_width: 200,
            full_height: 100,
            tiles: vec![
                Tile {
                    origin_x: 0,
                    origin_y: 0,
                    width: 100,
                    height: 100,
                    display_rank: 0,
                },
                Tile {
                    origin_x: 100,
                    origin_y: 0,
                    width: 100,
                    height: 100,
                    display_rank: 0,
                },
            ],
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn partial_coverage_is_rejected() {
        let layout = TileLayout {
            full_width: 200,
            full_height: 100,
            tiles: vec![Tile {
                origin_x: 0,
                origin_y: 0,
                width: 100,
                height: 100,
                display_rank: 0,
            }],
        };
        assert!(layout.validate().is_err());
    }
}
