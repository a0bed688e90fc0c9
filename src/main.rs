mod content;
mod csv_reader;
mod decimation;
mod error;
mod model;
mod obj_reader;
mod pipeline;
mod splitting;
mod temp;
mod tiling;
mod validator;
mod writer;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use crate::model::coords::GpsCoords;
use crate::model::options::{parse_models, Options, SplitPointStrategy};
use crate::pipeline::PipelineContext;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SplitPoint {
	/// Mean of the vertex positions.
	VertexBaricenter,
	/// Center of the mesh bounds.
	AbsoluteCenter,
}

impl From<SplitPoint> for SplitPointStrategy {
	fn from(value: SplitPoint) -> Self {
		match value {
			SplitPoint::VertexBaricenter => SplitPointStrategy::VertexBaricenter,
			SplitPoint::AbsoluteCenter => SplitPointStrategy::AbsoluteCenter,
		}
	}
}

#[derive(Parser, Debug)]
#[command(name = "rusty-tiles-converter", version)]
struct Args {
	/// OBJ mesh or CSV instance file
	#[arg(long)]
	input: PathBuf,

	#[arg(long)]
	output: PathBuf,

	/// Number of detail levels, at least 1
	#[arg(long, default_value_t = 3)]
	lods: usize,

	/// Split depth, 0 to 10
	#[arg(long, default_value_t = 2)]
	divisions: usize,

	/// Also split along the vertical axis
	#[arg(long, default_value_t = false)]
	zsplit: bool,

	#[arg(long, allow_hyphen_values = true)]
	lat: Option<f64>,

	#[arg(long, allow_hyphen_values = true)]
	lon: Option<f64>,

	#[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
	alt: f64,

	#[arg(long, default_value_t = false)]
	keep_intermediate: bool,

	#[arg(long, default_value_t = false)]
	use_system_temp: bool,

	/// Model per instance type for CSV input, as `type=path,type=path`
	#[arg(long)]
	models: Option<String>,

	/// Split every LOD by this rule instead of the shared LOD0 bounds
	#[arg(long, value_enum)]
	split_point: Option<SplitPoint>,

	/// Run the 3D Tiles validator on the result
	#[arg(long, default_value_t = false)]
	validate: bool,
}

impl Args {
	fn into_options(self) -> Result<Options> {
		let coords = match (self.lat, self.lon) {
			(Some(lat), Some(lon)) => Some(GpsCoords::new(lat, lon, self.alt)),
			(None, None) => None,
			_ => bail!("--lat and --lon must be given together"),
		};
		let models = match &self.models {
			Some(models) => parse_models(models)?,
			None => Default::default(),
		};

		let mut options = Options::new(self.input, self.output);
		options.lods = self.lods;
		options.divisions = self.divisions;
		options.z_split = self.zsplit;
		options.coords = coords;
		options.keep_intermediate = self.keep_intermediate;
		options.use_system_temp = self.use_system_temp;
		options.models = models;
		options.split_point = self.split_point.map(Into::into);
		options.validate = self.validate;
		Ok(options)
	}
}

fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();
	let options = args.into_options()?;
	let ctx = PipelineContext::new(options);
	info!(
		"[{}] Converting {} into {}",
		ctx.run_id,
		ctx.options.input.display(),
		ctx.options.output.display()
	);

	let summary = pipeline::run(&ctx)
		.with_context(|| format!("Conversion of {} failed", ctx.options.input.display()))?;
	info!(
		"[{}] Done: {} with {} assembly issues",
		ctx.run_id,
		summary.tileset.display(),
		summary.issues.len()
	);
	Ok(())
}
