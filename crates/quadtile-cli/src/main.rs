//! Cluster runner: decompose a GeoJSON coverage into quadtree tile records
//!
//! Reads the coverage polygons, derives (or accepts) the power-of-two root
//! extent, runs the distributed decomposition, and writes the tile boundary
//! records as a GeoJSON feature collection. The exit status distinguishes a
//! completed run (0) from a job aborted on worker failure (2) and any other
//! fatal error (1).

use clap::Parser;
use geo::{MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson};
use quadtile_lib::{
    Classification, ClusterConfig, Coverage, Rect, TerminalRecord, TileError, TileRecord,
    base_extent, clipped_geometries, records_from_terminals, run_distributed,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "quadtile", version, about = "Quadtree tiling of a polygon coverage")]
struct Args {
    /// Coverage polygons (GeoJSON file)
    coverage: PathBuf,

    /// Output directory for tile records
    #[arg(short, long, default_value = "quadtile-out")]
    out_dir: PathBuf,

    /// Minimum tile side length: decomposition stops at this size
    #[arg(short = 't', long, default_value_t = 1024.0)]
    tile_size: f64,

    /// Tile unit for root extent alignment (defaults to the tile size)
    #[arg(short = 'u', long)]
    tile_unit: Option<f64>,

    /// Number of worker threads (defaults to the available parallelism)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Explicit root extent as `min_x,min_y,max_x,max_y`; derived from the
    /// coverage bounds when omitted
    #[arg(long, value_delimiter = ',', num_args = 4)]
    root_extent: Option<Vec<f64>>,

    /// Seed for the frontier shuffle, for reproducible batch partitions
    #[arg(long)]
    seed: Option<u64>,

    /// Also write the exact per-tile coverage clips
    #[arg(long)]
    clip: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error @ TileError::WorkerFailure { .. }) => {
            tracing::error!("job aborted: {error}");
            ExitCode::from(2)
        }
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> quadtile_lib::Result<()> {
    let coverage = read_coverage(&args.coverage)?;
    let unit = args.tile_unit.unwrap_or(args.tile_size);

    let root = match &args.root_extent {
        Some(extent) => Rect::from_extents(extent[0], extent[1], extent[2], extent[3])?,
        None => base_extent(&coverage.bounds(), unit)?,
    };
    tracing::info!(
        root = %root,
        tile_size = args.tile_size,
        bounds = %coverage.bounds(),
        "decomposing coverage"
    );

    let config = ClusterConfig {
        workers: args.workers.unwrap_or_else(|| ClusterConfig::default().workers),
        tile_size_limit: args.tile_size,
        shuffle_seed: args.seed,
    };
    let coverage = Arc::new(coverage);
    let terminals = run_distributed(root, Arc::clone(&coverage), &config)?;
    log_summary(&terminals);

    std::fs::create_dir_all(&args.out_dir)?;
    let records = records_from_terminals(&terminals);
    let tile_path = args.out_dir.join("tiles.geojson");
    write_records(&tile_path, &records, unit)?;
    tracing::info!(tiles = records.len(), path = %tile_path.display(), "wrote tile records");

    if args.clip {
        let clips = clipped_geometries(&terminals, &coverage);
        let clip_path = args.out_dir.join("clipped.geojson");
        write_clips(&clip_path, &clips)?;
        tracing::info!(clips = clips.len(), path = %clip_path.display(), "wrote coverage clips");
    }

    Ok(())
}

fn read_coverage(path: &Path) -> quadtile_lib::Result<Coverage> {
    let raw = std::fs::read_to_string(path)?;
    let geojson: GeoJson = raw
        .parse()
        .map_err(|error: geojson::Error| TileError::InvalidCoverage(error.to_string()))?;

    let mut polygons = Vec::new();
    match &geojson {
        GeoJson::FeatureCollection(collection) => {
            for feature in &collection.features {
                if let Some(geometry) = &feature.geometry {
                    collect_polygons(&geometry.value, &mut polygons);
                }
            }
        }
        GeoJson::Feature(feature) => {
            if let Some(geometry) = &feature.geometry {
                collect_polygons(&geometry.value, &mut polygons);
            }
        }
        GeoJson::Geometry(geometry) => collect_polygons(&geometry.value, &mut polygons),
    }

    tracing::info!(polygons = polygons.len(), path = %path.display(), "read coverage");
    Coverage::from_polygons(polygons)
}

fn collect_polygons(value: &geojson::Value, polygons: &mut Vec<Polygon<f64>>) {
    match value {
        geojson::Value::Polygon(_) => match Polygon::<f64>::try_from(value.clone()) {
            Ok(polygon) => polygons.push(polygon),
            Err(error) => tracing::warn!("skipping unreadable polygon: {error}"),
        },
        geojson::Value::MultiPolygon(_) => match MultiPolygon::<f64>::try_from(value.clone()) {
            Ok(multi) => polygons.extend(multi.0),
            Err(error) => tracing::warn!("skipping unreadable multipolygon: {error}"),
        },
        geojson::Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_polygons(&geometry.value, polygons);
            }
        }
        _ => {
            tracing::warn!("skipping non-polygon geometry");
        }
    }
}

fn log_summary(terminals: &[TerminalRecord]) {
    let count = |classification: Classification| {
        terminals
            .iter()
            .filter(|t| t.classification == classification)
            .count()
    };
    tracing::info!(
        total = terminals.len(),
        inside = count(Classification::Inside),
        intersects = count(Classification::Intersects),
        outside = count(Classification::Outside),
        "decomposition complete"
    );
}

fn write_records(path: &Path, records: &[TileRecord], unit: f64) -> quadtile_lib::Result<()> {
    let features = records
        .iter()
        .map(|record| {
            let mut properties = geojson::JsonObject::new();
            properties.insert("EN_REF".to_string(), record.grid_ref(unit).into());
            properties.insert("TYPE".to_string(), record.tile_type.into());
            properties.insert("DEPTH".to_string(), record.depth.into());
            properties.insert("CX".to_string(), record.cx.into());
            properties.insert("CY".to_string(), record.cy.into());
            properties.insert("MIN_X".to_string(), record.min_x.into());
            properties.insert("MIN_Y".to_string(), record.min_y.into());
            properties.insert("MAX_X".to_string(), record.max_x.into());
            properties.insert("MAX_Y".to_string(), record.max_y.into());
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &record.geometry,
                ))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    write_collection(path, features)
}

fn write_clips(path: &Path, clips: &[MultiPolygon<f64>]) -> quadtile_lib::Result<()> {
    let features = clips
        .iter()
        .map(|clip| Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(clip))),
            id: None,
            properties: None,
            foreign_members: None,
        })
        .collect();

    write_collection(path, features)
}

fn write_collection(path: &Path, features: Vec<Feature>) -> quadtile_lib::Result<()> {
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    std::fs::write(path, GeoJson::from(collection).to_string())?;
    Ok(())
}
