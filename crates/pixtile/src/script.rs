/// JSON edit scripts: a list of steps replayed against a `CanvasDocument`.
use std::path::Path;

use anyhow::{Context, Result};
use pixtile_config::HexColor;
use pixtile_core::{CanvasDocument, LayerId, Rect, TileId};
use serde::Deserialize;

/// One scripted edit. Layer and tile ids are the numbers the document
/// assigns: the first layer is 1, the first tile is 1.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    AddLayer {
        #[serde(default)]
        name: Option<String>,
    },
    AddFolder {
        #[serde(default)]
        name: Option<String>,
    },
    Duplicate {
        layer: u64,
    },
    Remove {
        layer: u64,
    },
    SetActive {
        layer: Option<u64>,
    },
    MoveLayer {
        layer: u64,
        index: usize,
    },
    MoveToFolder {
        layer: u64,
        #[serde(default)]
        folder: Option<u64>,
        #[serde(default)]
        index: Option<usize>,
    },
    MergeDown {
        layer: u64,
    },
    FlattenFolder {
        folder: u64,
    },
    SetVisible {
        layer: u64,
        visible: bool,
    },
    /// Fills a rectangle of a raster layer with one color.
    Fill {
        layer: u64,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        color: HexColor,
    },
    DefineTile {
        color: HexColor,
    },
    UpdateTile {
        tile: u32,
        color: HexColor,
    },
    StampTile {
        layer: u64,
        column: u32,
        row: u32,
        tile: u32,
        #[serde(default = "default_map")]
        map: bool,
    },
    ClearMapping {
        layer: u64,
    },
    RemoveTile {
        tile: u32,
    },
    SelectRect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Resize {
        width: u32,
        height: u32,
    },
    Undo,
    Redo,
    Jump {
        depth: usize,
    },
    MarkSaved,
}

fn default_map() -> bool {
    true
}

/// Reads a script file: a JSON array of steps.
///
/// # Errors
///
/// Returns an error if the file can't be read or parsed.
pub fn load(path: &Path) -> Result<Vec<ScriptStep>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse script: {}", path.display()))
}

/// Runs every step in order, stopping at the first failing one.
///
/// # Errors
///
/// Returns the failing step's error, tagged with its position.
pub fn run(doc: &mut CanvasDocument, steps: &[ScriptStep]) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        apply(doc, step).with_context(|| format!("Step {} ({step:?}) failed", index + 1))?;
    }
    Ok(())
}

fn apply(doc: &mut CanvasDocument, step: &ScriptStep) -> Result<()> {
    match step {
        ScriptStep::AddLayer { name } => {
            let id = doc.add_layer(name.as_deref());
            tracing::info!("Added layer {id}");
        }
        ScriptStep::AddFolder { name } => {
            let id = doc.add_folder(name.as_deref());
            tracing::info!("Added folder {id}");
        }
        ScriptStep::Duplicate { layer } => {
            doc.duplicate_layer(LayerId(*layer))?;
        }
        ScriptStep::Remove { layer } => doc.remove_layer(LayerId(*layer))?,
        ScriptStep::SetActive { layer } => doc.set_active_layer(layer.map(LayerId))?,
        ScriptStep::MoveLayer { layer, index } => doc.move_layer(LayerId(*layer), *index)?,
        ScriptStep::MoveToFolder {
            layer,
            folder,
            index,
        } => doc.move_to_folder(LayerId(*layer), folder.map(LayerId), *index)?,
        ScriptStep::MergeDown { layer } => {
            doc.merge_down(LayerId(*layer))?;
        }
        ScriptStep::FlattenFolder { folder } => {
            doc.flatten_folder(LayerId(*folder))?;
        }
        ScriptStep::SetVisible { layer, visible } => {
            let id = LayerId(*layer);
            let mut props = doc
                .layer_properties(id)
                .with_context(|| format!("No layer {id}"))?;
            props.visible = *visible;
            doc.set_layer_properties(id, props)?;
        }
        ScriptStep::Fill {
            layer,
            x,
            y,
            width,
            height,
            color,
        } => {
            let pixels = color.to_bgra().repeat(*width as usize * *height as usize);
            let rect = Rect::new(*x, *y, *width, *height);
            doc.commit_pixels(LayerId(*layer), rect, &pixels)?;
        }
        ScriptStep::DefineTile { color } => {
            let (tile_width, tile_height) = doc.tile_size();
            let pixels = color
                .to_bgra()
                .repeat(tile_width as usize * tile_height as usize);
            doc.define_tile(pixels)?;
        }
        ScriptStep::UpdateTile { tile, color } => {
            let (tile_width, tile_height) = doc.tile_size();
            let pixels = color
                .to_bgra()
                .repeat(tile_width as usize * tile_height as usize);
            doc.update_tile(TileId(*tile), &pixels)?;
        }
        ScriptStep::StampTile {
            layer,
            column,
            row,
            tile,
            map,
        } => {
            doc.stamp_tile(LayerId(*layer), *column, *row, TileId(*tile), *map)?;
        }
        ScriptStep::ClearMapping { layer } => {
            doc.clear_tile_mapping(LayerId(*layer))?;
        }
        ScriptStep::RemoveTile { tile } => doc.remove_tile(TileId(*tile))?,
        ScriptStep::SelectRect {
            x,
            y,
            width,
            height,
        } => {
            doc.select_rect(Rect::new(*x, *y, *width, *height));
        }
        ScriptStep::Resize { width, height } => {
            doc.resize(*width, *height)?;
        }
        ScriptStep::Undo => {
            if !doc.undo() {
                tracing::warn!("Nothing to undo");
            }
        }
        ScriptStep::Redo => {
            if !doc.redo() {
                tracing::warn!("Nothing to redo");
            }
        }
        ScriptStep::Jump { depth } => {
            let reached = doc.jump_to(*depth);
            if reached != *depth {
                tracing::warn!("Jump to {depth} stopped at {reached}");
            }
        }
        ScriptStep::MarkSaved => doc.mark_saved(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<ScriptStep> {
        serde_json::from_str(json).expect("parse")
    }

    #[test]
    fn test_parse_steps() {
        let steps = parse(
            r##"[
                {"op": "add_layer"},
                {"op": "fill", "layer": 1, "x": 0, "y": 0, "width": 2, "height": 1, "color": "#FF0000"},
                {"op": "stamp_tile", "layer": 1, "column": 0, "row": 0, "tile": 1},
                {"op": "undo"}
            ]"##,
        );
        assert_eq!(steps[0], ScriptStep::AddLayer { name: None });
        assert!(matches!(steps[2], ScriptStep::StampTile { map: true, .. }));
        assert_eq!(steps[3], ScriptStep::Undo);
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        assert!(serde_json::from_str::<Vec<ScriptStep>>(r#"[{"op": "explode"}]"#).is_err());
    }

    #[test]
    fn test_run_tile_script() {
        let mut doc = CanvasDocument::new(4, 2, 2, 2).expect("doc");
        let steps = parse(
            r##"[
                {"op": "define_tile", "color": "#00FF00"},
                {"op": "stamp_tile", "layer": 1, "column": 0, "row": 0, "tile": 1},
                {"op": "stamp_tile", "layer": 1, "column": 1, "row": 0, "tile": 1},
                {"op": "mark_saved"},
                {"op": "update_tile", "tile": 1, "color": "#0000FF"}
            ]"##,
        );
        run(&mut doc, &steps).expect("run");
        let surface = &doc.raster(LayerId(1)).expect("layer").surface;
        assert_eq!(surface.pixel(3, 1), Some(u32::from_le_bytes([255, 0, 0, 255])));
        assert!(doc.is_dirty());
        assert_eq!(doc.history().undo_count(), 3);
    }

    #[test]
    fn test_failing_step_reports_position() {
        let mut doc = CanvasDocument::new(4, 2, 2, 2).expect("doc");
        let steps = parse(r#"[{"op": "add_folder"}, {"op": "merge_down", "layer": 9}]"#);
        let err = run(&mut doc, &steps).expect_err("should fail");
        assert!(format!("{err:#}").contains("Step 2"));
    }

    #[test]
    fn test_remove_tile_then_undo() {
        let mut doc = CanvasDocument::new(4, 2, 2, 2).expect("doc");
        let steps = parse(
            r##"[
                {"op": "define_tile", "color": "#00FF00"},
                {"op": "stamp_tile", "layer": 1, "column": 0, "row": 0, "tile": 1},
                {"op": "clear_mapping", "layer": 1},
                {"op": "remove_tile", "tile": 1},
                {"op": "undo"},
                {"op": "undo"}
            ]"##,
        );
        run(&mut doc, &steps).expect("run");
        assert!(doc.tiles().get(TileId(1)).is_some());
        assert_eq!(doc.state().tile_positions(TileId(1)).len(), 1);
    }
}
