use anyhow::{bail, Context, Result};
use lcc::{
    decode_sh, decode_with, AxisAdapter, ByteSource, FileSource, Metadata, Mode, Scene, DATA_FILE,
    META_FILE, SH_FILE,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Explicit LOD level; wins over `max_splats`.
    pub level: Option<usize>,
    /// Pick the finest level with at most this many splats.
    pub max_splats: Option<u64>,
    pub axes: AxisAdapter,
    /// Read `shcoef.bin` for Extended scenes.
    pub load_sh: bool,
    /// Map the scene files instead of seek+read. Needs the `mmap` feature.
    pub mmap: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            level: None,
            max_splats: None,
            axes: AxisAdapter::default(),
            load_sh: true,
            mmap: false,
        }
    }
}

pub struct LoadedScene {
    pub scene: Arc<Scene>,
    pub meta: Metadata,
    pub root: PathBuf,
}

/// Resolves `path` to a metadata file: a file is taken as-is, a directory
/// is searched (shallowest match first) for `meta.lcc` or any `*.lcc`.
pub fn find_meta(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let mut candidates: Vec<(usize, PathBuf)> = WalkDir::new(path)
        .max_depth(4)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("lcc"))
        .map(|e| (e.depth(), e.path().to_path_buf()))
        .collect();

    // Prefer shallow, then the canonical file name.
    candidates.sort_by_key(|(depth, p)| {
        (
            *depth,
            p.file_name().and_then(|n| n.to_str()) != Some(META_FILE),
            p.clone(),
        )
    });

    match candidates.into_iter().next() {
        Some((_, p)) => Ok(p),
        None => bail!("no .lcc metadata found under '{}'", path.display()),
    }
}

#[cfg(feature = "mmap")]
fn open_source(path: &Path, mmap: bool) -> lcc::Result<Box<dyn ByteSource>> {
    if mmap {
        return Ok(Box::new(lcc::MmapSource::open(path)?));
    }
    Ok(Box::new(FileSource::open(path)?))
}

#[cfg(not(feature = "mmap"))]
fn open_source(path: &Path, mmap: bool) -> lcc::Result<Box<dyn ByteSource>> {
    if mmap {
        log::warn!(
            "built without the `mmap` feature; reading {} with seek+read",
            path.display()
        );
    }
    Ok(Box::new(FileSource::open(path)?))
}

fn pick_level(meta: &Metadata, opts: &LoadOptions) -> usize {
    match (opts.level, opts.max_splats) {
        (Some(level), _) => level,
        (None, Some(max)) => meta.pick_level(max),
        (None, None) => 0,
    }
}

/// Loads one LOD level of the scene at `path` (directory or metadata file).
///
/// Only the level's byte span of `data.bin` is read. SH problems are not
/// fatal: the scene falls back to base colors.
pub fn load_scene(path: &Path, opts: &LoadOptions) -> Result<LoadedScene> {
    let meta_path = find_meta(path)?;
    let root = meta_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let meta = Metadata::from_file(&meta_path)
        .with_context(|| format!("reading {}", meta_path.display()))?;
    let level = pick_level(&meta, opts);
    let span = meta.level_span(level)?;

    let data_path = root.join(DATA_FILE);
    let data = open_source(&data_path, opts.mmap)
        .with_context(|| format!("opening {}", data_path.display()))?;
    let bytes = data
        .fetch(span)
        .with_context(|| format!("fetching level {level} ({} bytes)", span.length))?;

    let mut scene = decode_with(&meta, &bytes, span.offset, level, &opts.axes)?;

    if meta.mode == Mode::Extended && opts.load_sh {
        match load_sh(&meta, &root, level, opts.mmap) {
            Ok(sh) => scene = scene.with_sh(sh)?,
            Err(e) => log::warn!("SH unavailable, using base colors: {e:#}"),
        }
    }

    log::info!(
        "Loaded '{}' level {}/{} | splats={} | sh={} | bbox min={:?} max={:?}",
        meta.name.as_deref().unwrap_or("scene"),
        level,
        meta.level_count(),
        scene.len(),
        scene.spherical_harmonics().is_some(),
        scene.bounding_box().min,
        scene.bounding_box().max,
    );

    Ok(LoadedScene {
        scene: Arc::new(scene),
        meta,
        root,
    })
}

fn load_sh(meta: &Metadata, root: &Path, level: usize, mmap: bool) -> Result<Vec<lcc::ShCoeffs>> {
    let span = meta.sh_level_span(level)?;
    let source = open_source(&root.join(SH_FILE), mmap)?;
    let bytes = source.fetch(span)?;
    Ok(decode_sh(meta, &bytes, span.offset, level)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::sphere_records;
    use lcc::{metadata_for, write_scene, SH_COEFFS};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("splat-viewer-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn two_levels() -> Vec<Vec<lcc::SplatRecord>> {
        vec![sphere_records(40), sphere_records(10)]
    }

    #[test]
    fn loads_requested_level_from_disk() {
        let dir = temp_dir("level");
        let levels = two_levels();
        let meta = metadata_for("sphere", &levels, None);
        write_scene(&dir, &meta, &levels, None).unwrap();

        let opts = LoadOptions {
            level: Some(1),
            axes: AxisAdapter::IDENTITY,
            ..LoadOptions::default()
        };
        let loaded = load_scene(&dir, &opts).unwrap();
        assert_eq!(loaded.scene.len(), 10);
        assert_eq!(loaded.scene.level(), 1);
        assert_eq!(loaded.scene.positions()[3], levels[1][3].position);
    }

    #[test]
    fn max_splats_picks_a_coarser_level() {
        let dir = temp_dir("budget");
        let levels = two_levels();
        let meta = metadata_for("sphere", &levels, None);
        write_scene(&dir, &meta, &levels, None).unwrap();

        let opts = LoadOptions {
            max_splats: Some(20),
            ..LoadOptions::default()
        };
        assert_eq!(load_scene(&dir, &opts).unwrap().scene.len(), 10);
    }

    #[test]
    fn level_out_of_range_is_an_error() {
        let dir = temp_dir("range");
        let levels = two_levels();
        let meta = metadata_for("sphere", &levels, None);
        write_scene(&dir, &meta, &levels, None).unwrap();

        let opts = LoadOptions {
            level: Some(5),
            ..LoadOptions::default()
        };
        let err = load_scene(&dir, &opts).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<lcc::LccError>(),
            Some(lcc::LccError::LevelOutOfRange { level: 5, levels: 2 })
        ));
    }

    #[test]
    fn extended_scene_loads_sh_and_falls_back_without_it() {
        let dir = temp_dir("sh");
        let levels = two_levels();
        let sh: Vec<Vec<lcc::ShCoeffs>> = levels
            .iter()
            .map(|l| vec![[[0.1, -0.2, 0.05]; SH_COEFFS]; l.len()])
            .collect();
        let meta = metadata_for("sphere", &levels, Some(&sh));
        write_scene(&dir, &meta, &levels, Some(&sh)).unwrap();

        let loaded = load_scene(&dir, &LoadOptions::default()).unwrap();
        assert_eq!(loaded.scene.spherical_harmonics().map(|s| s.len()), Some(40));

        std::fs::remove_file(dir.join(SH_FILE)).unwrap();
        let loaded = load_scene(&dir, &LoadOptions::default()).unwrap();
        assert!(loaded.scene.spherical_harmonics().is_none());
        assert_eq!(loaded.scene.len(), 40);
    }

    #[test]
    fn short_sh_file_falls_back_to_base_colors() {
        let dir = temp_dir("sh-short");
        let levels = two_levels();
        let sh: Vec<Vec<lcc::ShCoeffs>> = levels
            .iter()
            .map(|l| vec![[[0.1, -0.2, 0.05]; SH_COEFFS]; l.len()])
            .collect();
        let meta = metadata_for("sphere", &levels, Some(&sh));
        write_scene(&dir, &meta, &levels, Some(&sh)).unwrap();

        std::fs::OpenOptions::new()
            .write(true)
            .open(dir.join(SH_FILE))
            .unwrap()
            .set_len(100)
            .unwrap();

        let loaded = load_scene(&dir, &LoadOptions::default()).unwrap();
        assert!(loaded.scene.spherical_harmonics().is_none());
        assert_eq!(loaded.scene.len(), 40);
    }

    #[test]
    fn mapped_load_matches_file_load() {
        let dir = temp_dir("mmap");
        let levels = two_levels();
        let meta = metadata_for("sphere", &levels, None);
        write_scene(&dir, &meta, &levels, None).unwrap();

        let read = load_scene(&dir, &LoadOptions::default()).unwrap();
        let mapped = load_scene(
            &dir,
            &LoadOptions {
                mmap: true,
                ..LoadOptions::default()
            },
        )
        .unwrap();
        assert_eq!(read.scene.positions(), mapped.scene.positions());
        assert_eq!(read.scene.colors(), mapped.scene.colors());
    }

    #[test]
    fn finds_metadata_in_nested_directory() {
        let dir = temp_dir("nested");
        let nested = dir.join("a").join("b");
        let levels = vec![sphere_records(4)];
        write_scene(&nested, &metadata_for("x", &levels, None), &levels, None).unwrap();
        assert_eq!(find_meta(&dir).unwrap(), nested.join(META_FILE));
        assert!(find_meta(&temp_dir("empty")).is_err());
    }
}
