//! Pod layout: railing, floor tiles and placed components
//!
//! The layout is the spatial ground truth of the installation. Expanding it
//! against a [`ComponentLibrary`] yields the audio elements the router
//! registers: one per generated floor tile plus one per placed component
//! that carries an audio channel.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::audio::router::ElementSpec;
use crate::config::load_json;
use crate::error::ConfigError;
use crate::geometry::{Bounds, Vec3};
use crate::picker::Side;

/// Railing around the pod, with its door openings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RailingConfig {
    pub width: f32,
    pub depth: f32,
    pub height: f32,
    pub doors: Vec<Door>,
}

/// Opening in the railing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Door {
    pub side: Side,
    /// Offset along the side from its midpoint, in meters
    #[serde(default)]
    pub position: f32,
    /// Degrees about the vertical axis
    #[serde(default)]
    pub angle: f32,
}

/// Tiled floor centered on the pod origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorConfig {
    pub width: f32,
    pub depth: f32,
    pub tiles_x: u32,
    pub tiles_z: u32,
    /// Occupancy volume height above the floor
    pub height: f32,
    /// Tile name with `{X}` and `{Z}` replaced by the tile's column and row
    pub tile_name: String,
    /// First audio channel; tiles get consecutive channels row by row.
    /// Tiles have no audio when unset.
    pub first_channel: Option<usize>,
    pub mute_when_unoccupied: bool,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            width: 0.0,
            depth: 0.0,
            tiles_x: 0,
            tiles_z: 0,
            height: 0.5,
            tile_name: "Floor_{X}_{Z}".to_string(),
            first_channel: None,
            mute_when_unoccupied: true,
        }
    }
}

/// One generated floor tile
#[derive(Debug, Clone, PartialEq)]
pub struct FloorTile {
    pub name: String,
    pub column: u32,
    pub row: u32,
    pub bounds: Bounds,
}

/// A component instance placed in the pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPlacement {
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    pub position: Vec3,
    /// Euler angles in degrees; only yaw (`y`) affects bounds
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default)]
    pub audio_channel: Option<usize>,
    /// Overrides the component type's setting
    #[serde(default)]
    pub mute_when_unoccupied: Option<bool>,
}

impl ComponentPlacement {
    pub fn side(&self) -> Side {
        Side::classify(self.position.horizontal())
    }
}

/// Physical description shared by every placement of a type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentType {
    pub size: Vec3,
    #[serde(default)]
    pub mute_when_unoccupied: bool,
}

/// Component types keyed by type name
pub type ComponentLibrary = HashMap<String, ComponentType>;

/// Complete pod description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodLayout {
    pub railing: RailingConfig,
    pub floor: FloorConfig,
    pub components: Vec<ComponentPlacement>,
}

impl PodLayout {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    /// Floor tiles in row-major order, `{X}` the column and `{Z}` the row
    pub fn floor_tiles(&self) -> Vec<FloorTile> {
        let floor = &self.floor;
        if floor.tiles_x == 0 || floor.tiles_z == 0 {
            return Vec::new();
        }

        let tile_w = floor.width / floor.tiles_x as f32;
        let tile_d = floor.depth / floor.tiles_z as f32;
        let origin_x = -floor.width * 0.5;
        let origin_z = -floor.depth * 0.5;

        let mut tiles = Vec::with_capacity((floor.tiles_x * floor.tiles_z) as usize);
        for row in 0..floor.tiles_z {
            for column in 0..floor.tiles_x {
                let min = Vec3::new(
                    origin_x + column as f32 * tile_w,
                    0.0,
                    origin_z + row as f32 * tile_d,
                );
                let max = Vec3::new(min.x + tile_w, floor.height, min.z + tile_d);
                tiles.push(FloorTile {
                    name: floor
                        .tile_name
                        .replace("{X}", &column.to_string())
                        .replace("{Z}", &row.to_string()),
                    column,
                    row,
                    bounds: Bounds::new(min, max),
                });
            }
        }
        tiles
    }

    /// Expand into audio elements
    ///
    /// Fails on unknown component types and duplicate element names.
    pub fn element_specs(
        &self,
        library: &ComponentLibrary,
    ) -> Result<Vec<ElementSpec>, ConfigError> {
        let mut specs = Vec::new();

        if let Some(first) = self.floor.first_channel {
            for (i, tile) in self.floor_tiles().into_iter().enumerate() {
                specs.push(ElementSpec {
                    name: tile.name,
                    bounds: tile.bounds,
                    channel: first + i,
                    mute_when_unoccupied: self.floor.mute_when_unoccupied,
                });
            }
        }

        for placement in &self.components {
            let component = library.get(&placement.component_type).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "component {} has unknown type {}",
                    placement.name, placement.component_type
                ))
            })?;
            let Some(channel) = placement.audio_channel else {
                continue;
            };
            specs.push(ElementSpec {
                name: placement.name.clone(),
                bounds: Bounds::from_rotated(
                    placement.position,
                    component.size,
                    placement.rotation.y,
                ),
                channel,
                mute_when_unoccupied: placement
                    .mute_when_unoccupied
                    .unwrap_or(component.mute_when_unoccupied),
            });
        }

        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
        }
        Ok(specs)
    }
}

/// Component library file: `{"Panel": {"size": {"x": 1, "y": 2, "z": 0.1}}}`
pub fn load_library(path: &Path) -> Result<ComponentLibrary, ConfigError> {
    load_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> PodLayout {
        serde_json::from_str(
            r#"{
                "railing": {"width": 4.0, "depth": 4.0, "height": 1.1,
                            "doors": [{"side": "Back", "position": 0.5}]},
                "floor": {"width": 2.0, "depth": 2.0, "tiles_x": 2, "tiles_z": 2,
                          "tile_name": "Tile{X}{Z}", "first_channel": 4},
                "components": [
                    {"type": "Panel", "name": "PanelLeft", "position": {"x": 1.5, "y": 1.0, "z": 0.0},
                     "rotation": {"x": 0.0, "y": 90.0, "z": 0.0}, "audio_channel": 0},
                    {"type": "Fan", "name": "FanFront", "position": {"x": 0.0, "y": 1.5, "z": 1.8}}
                ]
            }"#,
        )
        .unwrap()
    }

    fn library() -> ComponentLibrary {
        let mut library = ComponentLibrary::new();
        library.insert(
            "Panel".to_string(),
            ComponentType {
                size: Vec3::new(1.0, 2.0, 0.1),
                mute_when_unoccupied: false,
            },
        );
        library.insert(
            "Fan".to_string(),
            ComponentType {
                size: Vec3::new(0.3, 0.3, 0.3),
                mute_when_unoccupied: false,
            },
        );
        library
    }

    #[test]
    fn test_floor_tiles_from_template() {
        let tiles = layout().floor_tiles();
        let names: Vec<&str> = tiles.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Tile00", "Tile10", "Tile01", "Tile11"]);
        assert_eq!(tiles[0].bounds.min, Vec3::new(-1.0, 0.0, -1.0));
        assert_eq!(tiles[3].bounds.max, Vec3::new(1.0, 0.5, 1.0));
    }

    #[test]
    fn test_element_specs() {
        let specs = layout().element_specs(&library()).unwrap();
        assert_eq!(specs.len(), 5);
        assert_eq!(specs[0].channel, 4);
        assert_eq!(specs[3].channel, 7);
        assert!(specs[0].mute_when_unoccupied);

        let panel = &specs[4];
        assert_eq!(panel.name, "PanelLeft");
        assert_eq!(panel.channel, 0);
        assert!(!panel.mute_when_unoccupied);
        // Rotated a quarter turn: thin along x, wide along z
        let extent = panel.bounds.max - panel.bounds.min;
        assert!((extent.x - 0.1).abs() < 1e-4);
        assert!((extent.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_component_side() {
        let layout = layout();
        assert_eq!(layout.components[0].side(), Side::LEFT);
        assert_eq!(layout.components[1].side(), Side::FRONT);
        assert_eq!(layout.railing.doors[0].side, Side::BACK);
    }

    #[test]
    fn test_unknown_component_type() {
        let mut layout = layout();
        layout.components[0].component_type = "Mystery".to_string();
        assert!(matches!(
            layout.element_specs(&library()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_duplicate_element_name() {
        let mut layout = layout();
        layout.components[0].name = "Tile00".to_string();
        assert!(matches!(
            layout.element_specs(&library()),
            Err(ConfigError::DuplicateName(_))
        ));
    }
}
