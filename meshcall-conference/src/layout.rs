//! Video grid geometry for a call

use serde::{Deserialize, Serialize};

/// Calls larger than this move the camera preview out of the grid
const PREVIEW_IN_GRID_LIMIT: usize = 9;
const OVERLAY_WIDTH: f64 = 320.0;
const OVERLAY_HEIGHT: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridLayout {
    pub columns: usize,
    pub rows: usize,
    /// Size of one cell
    pub width: f64,
    pub height: f64,
}

/// Fit `tiles` videos into the viewport in a near-square grid
#[must_use]
pub fn compute_grid(tiles: usize, viewport: Viewport) -> GridLayout {
    let tiles = tiles.max(1);
    let mut columns = 1;
    while columns * columns < tiles {
        columns += 1;
    }
    let rows = tiles.div_ceil(columns);
    GridLayout {
        columns,
        rows,
        width: f64::from(viewport.width) / columns as f64,
        height: f64::from(viewport.height) / rows as f64,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreviewPlacement {
    /// Preview occupies one grid cell
    InGrid { width: f64, height: f64 },
    /// Small preview floating over the bottom-right corner
    Overlay { width: f64, height: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CallLayout {
    pub grid: GridLayout,
    pub preview: PreviewPlacement,
    pub receiver_tiles: usize,
    /// One extra cell shows the shared screen
    pub display_tile: bool,
}

/// Arrange a call of `participants` people (self included)
#[must_use]
pub fn plan_layout(participants: usize, presenting: bool, viewport: Viewport) -> CallLayout {
    let receivers = participants.saturating_sub(1);

    if participants > PREVIEW_IN_GRID_LIMIT && !presenting {
        return CallLayout {
            grid: compute_grid(receivers, viewport),
            preview: PreviewPlacement::Overlay {
                width: OVERLAY_WIDTH,
                height: OVERLAY_HEIGHT,
            },
            receiver_tiles: receivers,
            display_tile: false,
        };
    }

    let tiles = if presenting { participants + 1 } else { participants };
    let grid = compute_grid(tiles, viewport);
    CallLayout {
        grid,
        preview: PreviewPlacement::InGrid {
            width: grid.width,
            height: grid.height,
        },
        receiver_tiles: receivers,
        display_tile: presenting,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HD: Viewport = Viewport {
        width: 1920,
        height: 1080,
    };

    #[test]
    fn test_grid_shapes() {
        let cases = [(1, 1, 1), (2, 2, 1), (4, 2, 2), (5, 3, 2), (9, 3, 3), (10, 4, 3), (16, 4, 4)];
        for (tiles, columns, rows) in cases {
            let grid = compute_grid(tiles, HD);
            assert_eq!((grid.columns, grid.rows), (columns, rows), "tiles = {tiles}");
        }
    }

    #[test]
    fn test_cell_size() {
        let grid = compute_grid(4, HD);
        assert!((grid.width - 960.0).abs() < f64::EPSILON);
        assert!((grid.height - 540.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_small_call_preview_in_grid() {
        let layout = plan_layout(5, false, HD);
        assert_eq!(layout.grid.columns, 3);
        assert_eq!(layout.receiver_tiles, 4);
        assert!(!layout.display_tile);
        assert!(matches!(layout.preview, PreviewPlacement::InGrid { .. }));
    }

    #[test]
    fn test_large_call_preview_overlay() {
        let layout = plan_layout(10, false, HD);
        // grid holds the 9 receivers only
        assert_eq!((layout.grid.columns, layout.grid.rows), (3, 3));
        assert_eq!(
            layout.preview,
            PreviewPlacement::Overlay {
                width: 320.0,
                height: 180.0
            }
        );
    }

    #[test]
    fn test_presenting_adds_a_tile() {
        let layout = plan_layout(10, true, HD);
        // 10 people + shared screen
        assert_eq!((layout.grid.columns, layout.grid.rows), (4, 3));
        assert!(layout.display_tile);
        assert!(matches!(layout.preview, PreviewPlacement::InGrid { .. }));
    }
}
