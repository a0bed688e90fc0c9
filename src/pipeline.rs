use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use log::{error, info, warn};

use crate::content::{convert_all, B3dmConverter, ContentConverter};
use crate::csv_reader::{read_instances, Instance};
use crate::decimation::{ClusteringDecimator, Decimator};
use crate::error::{AssemblyIssue, Error, Result};
use crate::model::bounds::Box3;
use crate::model::options::{InputKind, Options};
use crate::splitting::split_lods;
use crate::temp::TempFolder;
use crate::tiling::grid_pyramid::{build_grid_pyramid, ModelInfo};
use crate::tiling::mesh_pyramid::build_mesh_pyramid;
use crate::tiling::tileset::{read_tileset, write_tileset, TileElement};
use crate::validator::{NpxValidator, TilesetValidator};

/// Run-wide state handed to every stage.
pub struct PipelineContext {
	/// Short random id prefixed to log lines and temp folder names.
	pub run_id: String,
	pub options: Options,
}

impl PipelineContext {
	pub fn new(options: Options) -> PipelineContext {
		PipelineContext {
			run_id: format!("{:08x}", rand::random::<u32>()),
			options,
		}
	}
}

#[derive(Debug)]
pub struct RunSummary {
	pub tileset: PathBuf,
	pub issues: Vec<AssemblyIssue>,
}

fn report_issues(ctx: &PipelineContext, issues: &[AssemblyIssue]) {
	for issue in issues {
		warn!("[{}] {}", ctx.run_id, issue);
	}
}

/// `LOD-{n}` index and leaf name of a converted file.
fn lod_and_name(path: &Path) -> Option<(usize, String)> {
	let lod = path
		.parent()?
		.file_name()?
		.to_str()?
		.strip_prefix("LOD-")?
		.parse()
		.ok()?;
	let name = path.file_stem()?.to_str()?.to_string();
	Some((lod, name))
}

/// Decimates, splits and converts one OBJ mesh into `out_dir`, then writes
/// its `tileset.json`.
pub fn tile_mesh(
	ctx: &PipelineContext,
	input: &Path,
	out_dir: &Path,
	transform: Option<[f64; 16]>,
	decimator: &dyn Decimator,
	converter: &dyn ContentConverter,
) -> Result<RunSummary> {
	let options = &ctx.options;
	fs::create_dir_all(out_dir)?;
	let stem = input
		.file_stem()
		.and_then(|s| s.to_str())
		.unwrap_or("mesh");
	let temp = TempFolder::create(
		out_dir,
		&format!("{}-{}", ctx.run_id, stem),
		options.use_system_temp,
		options.keep_intermediate,
	)?;

	info!("[{}] Decimation stage with {} LODs", ctx.run_id, options.lods);
	let start = Instant::now();
	let decimated = decimator.decimate(input, &temp.subfolder("decimation")?, options.lods)?;
	info!(
		"[{}] Decimation stage done in {}ms",
		ctx.run_id,
		start.elapsed().as_millis()
	);

	info!(
		"[{}] Splitting stage with {} divisions{}",
		ctx.run_id,
		options.divisions,
		if options.z_split { " and z-split" } else { "" }
	);
	let start = Instant::now();
	let split_root = temp.subfolder("split")?;
	let results = split_lods(ctx, &decimated.dest_files, &split_root, Some(decimated.bounds));
	let mut level_boxes: Vec<HashMap<String, Box3>> = Vec::with_capacity(results.len());
	for (lod, result) in results.into_iter().enumerate() {
		match result {
			Ok(boxes) => level_boxes.push(boxes),
			Err(err) if lod == 0 => {
				return Err(Error::Split {
					lod: "LOD-0".to_string(),
					reason: err.to_string(),
				})
			}
			Err(_) => level_boxes.push(HashMap::new()),
		}
	}
	info!(
		"[{}] Splitting stage done in {}ms",
		ctx.run_id,
		start.elapsed().as_millis()
	);

	let summary = convert_all(ctx, converter, &split_root, out_dir, level_boxes.len())?;
	for (path, _) in &summary.failures {
		if let Some((lod, name)) = lod_and_name(path) {
			if let Some(boxes) = level_boxes.get_mut(lod) {
				boxes.remove(&name);
			}
		}
	}

	info!("[{}] Tiling stage", ctx.run_id);
	let pyramid = build_mesh_pyramid(&level_boxes, transform)?;
	report_issues(ctx, &pyramid.issues);
	let tileset = write_tileset(&pyramid.tileset, &out_dir.join("tileset.json"))?;
	info!("[{}] Wrote {}", ctx.run_id, tileset.display());

	Ok(RunSummary {
		tileset,
		issues: pyramid.issues,
	})
}

/// Mesh input: one tileset of detail levels, placed at the optional
/// coordinates.
pub fn run_obj(
	ctx: &PipelineContext,
	decimator: &dyn Decimator,
	converter: &dyn ContentConverter,
) -> Result<RunSummary> {
	let options = &ctx.options;
	let transform = options.coords.map(|c| c.to_ecef_transform());
	tile_mesh(ctx, &options.input, &options.output, transform, decimator, converter)
}

/// Relative path that stays inside the tileset's folder.
fn is_relative_file(uri: &str) -> bool {
	!uri.contains("://")
		&& Path::new(uri)
			.components()
			.all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn collect_uris<'a>(element: &'a TileElement, uris: &mut Vec<&'a str>) {
	if let Some(content) = &element.content {
		uris.push(&content.uri);
	}
	for child in element.children.iter().flatten() {
		collect_uris(child, uris);
	}
}

/// Copies an existing tileset and the content files it references into
/// `dest`. Returns the copied tileset path.
pub fn copy_model_tileset(source: &Path, dest: &Path) -> Result<PathBuf> {
	let tileset = read_tileset(source)?;
	let source_dir = source.parent().unwrap_or_else(|| Path::new("."));
	fs::create_dir_all(dest)?;

	let mut uris = Vec::new();
	collect_uris(&tileset.root, &mut uris);
	for uri in uris {
		if !is_relative_file(uri) {
			warn!("Not copying content outside the model folder: {}", uri);
			continue;
		}
		let from = source_dir.join(uri);
		let to = dest.join(uri);
		if let Some(parent) = to.parent() {
			fs::create_dir_all(parent)?;
		}
		if let Err(err) = fs::copy(&from, &to) {
			warn!("Could not copy {}: {}", from.display(), err);
		}
	}

	let path = dest.join("tileset.json");
	fs::copy(source, &path)?;
	Ok(path)
}

/// Builds or copies one model tileset per instance type below
/// `{out_dir}/tiles/{type}`.
pub fn prepare_models(
	ctx: &PipelineContext,
	instances: &[Instance],
	out_dir: &Path,
	decimator: &dyn Decimator,
	converter: &dyn ContentConverter,
) -> Result<HashMap<String, ModelInfo>> {
	let kinds: BTreeSet<&str> = instances.iter().map(|i| i.kind.as_str()).collect();
	let mut models = HashMap::new();
	for kind in kinds {
		let source = ctx.options.models.get(kind).ok_or_else(|| {
			Error::InvalidInput(format!("no model given for instance type '{}'", kind))
		})?;
		let dest = out_dir.join("tiles").join(kind);
		let ext = source
			.extension()
			.and_then(|e| e.to_str())
			.map(|e| e.to_ascii_lowercase());
		info!("[{}] Preparing model '{}' from {}", ctx.run_id, kind, source.display());
		let tileset_path = match ext.as_deref() {
			Some("obj") => tile_mesh(ctx, source, &dest, None, decimator, converter)?.tileset,
			Some("json") => copy_model_tileset(source, &dest)?,
			_ => return Err(Error::UnsupportedInput(source.clone())),
		};
		let tileset = read_tileset(&tileset_path)?;
		let uri = format!("tiles/{}/tileset.json", kind);
		models.insert(kind.to_string(), ModelInfo::from_tileset(&uri, &tileset));
	}
	Ok(models)
}

/// Instance input: model tilesets placed on a grid of cells, merged into
/// coarser levels around the reference coordinates.
pub fn run_csv(
	ctx: &PipelineContext,
	decimator: &dyn Decimator,
	converter: &dyn ContentConverter,
) -> Result<RunSummary> {
	let options = &ctx.options;
	info!("[{}] Reading instances from {}", ctx.run_id, options.input.display());
	let instances = read_instances(&options.input)?;
	if instances.is_empty() {
		return Err(Error::InvalidInput(format!(
			"{} contains no instances",
			options.input.display()
		)));
	}
	info!("[{}] Read {} instances", ctx.run_id, instances.len());

	fs::create_dir_all(&options.output)?;
	let models = prepare_models(ctx, &instances, &options.output, decimator, converter)?;
	let reference = options.coords.unwrap_or_default();
	let pyramid = build_grid_pyramid(ctx, &instances, &models, &options.output, &reference)?;
	report_issues(ctx, &pyramid.issues);

	Ok(RunSummary {
		tileset: pyramid.root_path,
		issues: pyramid.issues,
	})
}

/// Runs the external validator; the outcome is only logged.
pub fn validate_output(ctx: &PipelineContext, validator: &dyn TilesetValidator, tileset: &Path) {
	match validator.validate(tileset) {
		Ok(report) if report.errors == 0 => info!(
			"[{}] Validation passed with {} warnings",
			ctx.run_id, report.warnings
		),
		Ok(report) => warn!(
			"[{}] Validation found {} errors and {} warnings",
			ctx.run_id, report.errors, report.warnings
		),
		Err(err) => error!("[{}] Validation could not run: {}", ctx.run_id, err),
	}
}

/// Checks the options and runs the pipeline for the input kind with the
/// default collaborators.
pub fn run(ctx: &PipelineContext) -> Result<RunSummary> {
	let kind = ctx.options.validate()?;
	let start = Instant::now();
	let decimator = ClusteringDecimator::default();
	let converter = B3dmConverter;

	let summary = match kind {
		InputKind::Obj => run_obj(ctx, &decimator, &converter)?,
		InputKind::Csv => run_csv(ctx, &decimator, &converter)?,
	};
	if ctx.options.validate {
		validate_output(ctx, &NpxValidator::default(), &summary.tileset);
	}
	info!(
		"[{}] Pipeline completed in {}ms",
		ctx.run_id,
		start.elapsed().as_millis()
	);
	Ok(summary)
}
