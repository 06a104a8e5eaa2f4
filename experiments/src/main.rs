//! Runs one extraction over a serialized e-graph and reports its costs.
//!
//! ```text
//! extract --extractor parallel-greedy-dag --threads 8 --bound 1.25 \
//!   --warm-start out/start.mst --zero-nodes out/zero.mst graph.json
//! ```

use anyhow::{Context, bail};
use clap::Parser;
use dag_extract::{
  ChoiceFile, EGraph, ExtractConfig, ExtractionResult, ExtractorKind,
  IncumbentLog, canonicalize::remove_redundant_nodes, serialize,
};
use log::info;
use serde::Serialize;
use std::{
  fs::{self, File, OpenOptions},
  io::{self, BufWriter, Write},
  path::{Path, PathBuf},
  time::Instant,
};

#[derive(Parser, Debug)]
#[clap(version, about = "Greedy DAG extraction of a serialized e-graph")]
struct Opts {
  /// The e-graph to extract, in JSON
  #[clap(parse(from_os_str))]
  input: PathBuf,

  /// TOML file with extraction settings; flags below override it
  #[clap(long, parse(from_os_str))]
  config: Option<PathBuf>,

  /// `greedy-dag`, `parallel-greedy-dag`, `bottom-up` or `ast-depth`
  #[clap(long)]
  extractor: Option<ExtractorKind>,

  #[clap(long)]
  passes: Option<usize>,

  #[clap(long)]
  threads: Option<usize>,

  /// Wall-clock budget in seconds
  #[clap(long)]
  timeout: Option<u64>,

  /// Zero-node threshold, as a multiple of each class's cheapest candidate
  #[clap(long)]
  bound: Option<f64>,

  /// Skip redundant-node removal
  #[clap(long)]
  no_canonicalize: bool,

  /// Write warm-start hints here
  #[clap(long, parse(from_os_str))]
  warm_start: Option<PathBuf>,

  /// Write zero-node hints here
  #[clap(long, parse(from_os_str))]
  zero_nodes: Option<PathBuf>,

  /// An exact solver's solution, in choice-file form, to check and cost
  #[clap(long, parse(from_os_str))]
  solution: Option<PathBuf>,

  /// Append improving incumbents here
  #[clap(long, parse(from_os_str))]
  cost_log: Option<PathBuf>,

  /// Append a summary row to this CSV file
  #[clap(long, parse(from_os_str))]
  csv: Option<PathBuf>,

  /// Write the JSON summary here instead of stdout
  #[clap(short, long, parse(from_os_str))]
  output: Option<PathBuf>,
}

#[derive(Serialize, Debug, Clone, Copy)]
struct Costs {
  tree_cost: f64,
  dag_cost: f64,
  depth: usize,
}

#[derive(Serialize, Debug)]
struct Summary {
  input: String,
  extractor: String,
  nodes: usize,
  classes: usize,
  roots: usize,
  removed: usize,
  chosen: usize,
  #[serde(flatten)]
  costs: Costs,
  elapsed_secs: f64,
  zero_nodes: Option<usize>,
  solution: Option<Costs>,
}

#[derive(Serialize, Debug)]
struct Row<'a> {
  input: &'a str,
  extractor: &'a str,
  nodes: usize,
  classes: usize,
  removed: usize,
  tree_cost: f64,
  dag_cost: f64,
  depth: usize,
  elapsed_secs: f64,
  solution_dag_cost: Option<f64>,
}

impl Opts {
  fn config(&self) -> anyhow::Result<ExtractConfig> {
    let mut config = match &self.config {
      Some(path) => ExtractConfig::from_file(path)?,
      None => ExtractConfig::default(),
    };
    if let Some(extractor) = self.extractor {
      config.extractor = extractor;
    }
    if let Some(passes) = self.passes {
      config.passes = passes;
    }
    if self.threads.is_some() {
      config.threads = self.threads;
    }
    if self.timeout.is_some() {
      config.timeout_secs = self.timeout;
    }
    if let Some(bound) = self.bound {
      config.bound = bound;
    }
    if self.no_canonicalize {
      config.canonicalize = false;
    }
    config.validate()?;
    Ok(config)
  }
}

fn costs(
  result: &ExtractionResult,
  egraph: &EGraph,
) -> anyhow::Result<Costs> {
  let roots = egraph.root_eclasses();
  Ok(Costs {
    tree_cost: result.tree_cost(egraph, roots)?.into_inner(),
    dag_cost: result.dag_cost(egraph, roots)?.into_inner(),
    depth: result.depth_cost(egraph, roots)?,
  })
}

fn append_row(path: &Path, row: &Row<'_>) -> anyhow::Result<()> {
  let fresh = fs::metadata(path).map_or(true, |m| m.len() == 0);
  let file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .with_context(|| format!("failed to open {}", path.display()))?;
  let mut writer = csv::WriterBuilder::new()
    .has_headers(fresh)
    .from_writer(file);
  writer.serialize(row)?;
  writer.flush()?;
  Ok(())
}

fn main() -> anyhow::Result<()> {
  env_logger::init();
  let opts = Opts::parse();
  let config = opts.config()?;
  let start = Instant::now();

  let mut builder = serialize::from_json_file(&opts.input)
    .with_context(|| format!("failed to load {}", opts.input.display()))?;
  let removed = if config.canonicalize {
    remove_redundant_nodes(&mut builder)?
  } else {
    0
  };
  let egraph = builder.build()?;
  if egraph.root_eclasses().is_empty() {
    bail!("{} declares no root classes", opts.input.display());
  }

  let extractor = config.extractor.build(&config)?;
  let result = extractor.extract(&egraph, egraph.root_eclasses())?;
  let elapsed = start.elapsed();
  result
    .check(&egraph)
    .context("extraction produced an invalid result")?;
  let heuristic = costs(&result, &egraph)?;
  info!(
    "{}: tree cost {}, dag cost {}, depth {} in {elapsed:?}",
    config.extractor, heuristic.tree_cost, heuristic.dag_cost, heuristic.depth
  );

  if let Some(path) = &opts.warm_start {
    ChoiceFile::warm_start(&result, &egraph)?
      .to_file(path)
      .with_context(|| format!("failed to write {}", path.display()))?;
  }

  let mut zero_count = None;
  if let Some(path) = &opts.zero_nodes {
    let zero = result.zero_nodes(config.zero_node_bound()?);
    info!("{} zero-node hints at bound {}", zero.len(), config.bound);
    zero_count = Some(zero.len());
    ChoiceFile::zero_nodes(&zero)
      .to_file(path)
      .with_context(|| format!("failed to write {}", path.display()))?;
  }

  let solution = match &opts.solution {
    Some(path) => {
      let imported = ChoiceFile::from_file(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .to_result(&egraph)?;
      imported
        .check(&egraph)
        .with_context(|| format!("{} is not a valid extraction", path.display()))?;
      Some(costs(&imported, &egraph)?)
    }
    None => None,
  };

  if let Some(path) = &opts.cost_log {
    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(path)
      .with_context(|| format!("failed to open {}", path.display()))?;
    let mut log = IncumbentLog::new(BufWriter::new(file));
    log.record(elapsed.as_secs_f64(), heuristic.dag_cost)?;
    if let Some(solution) = solution {
      log.record(start.elapsed().as_secs_f64(), solution.dag_cost)?;
    }
  }

  let input = opts.input.display().to_string();
  let extractor_name = config.extractor.to_string();
  let summary = Summary {
    input: input.clone(),
    extractor: extractor_name.clone(),
    nodes: egraph.num_nodes(),
    classes: egraph.num_classes(),
    roots: egraph.root_eclasses().len(),
    removed,
    chosen: result.len(),
    costs: heuristic,
    elapsed_secs: elapsed.as_secs_f64(),
    zero_nodes: zero_count,
    solution,
  };

  if let Some(path) = &opts.csv {
    append_row(
      path,
      &Row {
        input: &input,
        extractor: &extractor_name,
        nodes: summary.nodes,
        classes: summary.classes,
        removed,
        tree_cost: heuristic.tree_cost,
        dag_cost: heuristic.dag_cost,
        depth: heuristic.depth,
        elapsed_secs: summary.elapsed_secs,
        solution_dag_cost: solution.map(|s| s.dag_cost),
      },
    )?;
  }

  match &opts.output {
    Some(path) => {
      let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
      let mut writer = BufWriter::new(file);
      serde_json::to_writer_pretty(&mut writer, &summary)?;
      writeln!(writer)?;
      writer.flush()?;
    }
    None => {
      let stdout = io::stdout();
      let mut lock = stdout.lock();
      serde_json::to_writer_pretty(&mut lock, &summary)?;
      writeln!(lock)?;
    }
  }
  Ok(())
}
