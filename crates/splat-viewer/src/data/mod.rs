pub mod scene_loader;
pub mod synthetic;

pub use scene_loader::{find_meta, load_scene, LoadOptions, LoadedScene};
