//! Decoding modules and the registry used to construct them by id.
//!
//! A [DecodingModule] performs a complete run: it reads an input file of frames, decodes
//! instrument data and writes images. Modules are looked up by id in a [Registry] which
//! holds a [ModuleDescriptor] for each one.
//!
//! # Example
//! ```no_run
//! use downlink::module::{registry, Parameters};
//!
//! let params: Parameters = [("max_loss_ratio", "0.1")].into_iter().collect();
//! let mut module = registry()
//!     .create("metop_mhs", "metop.cadu".as_ref(), "out/metop".as_ref(), &params)
//!     .unwrap();
//! let report = module.process().unwrap();
//! for path in module.output_files() {
//!     println!("{path:?}");
//! }
//! ```
mod metop_mhs;
mod noaa_avhrr;
mod params;
mod report;

pub use metop_mhs::MetopMhs;
pub use noaa_avhrr::NoaaAvhrr;
pub use params::*;
pub use report::*;

use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use rayon::prelude::*;
use serde::Serialize;

use crate::{Error, Result};

/// A complete decoding pipeline for one kind of input.
pub trait DecodingModule: Send {
    fn id(&self) -> &'static str;

    /// Parameters this module accepts.
    fn declared_parameters(&self) -> &'static [ParameterSpec];

    /// Run the full decode synchronously.
    ///
    /// # Errors
    /// Only if the run cannot start, e.g., the input cannot be opened. Data errors are
    /// counted in the report and output failures are listed in it.
    fn process(&mut self) -> Result<RunReport>;

    /// Files written by the last call to [DecodingModule::process], in creation order.
    fn output_files(&self) -> &[PathBuf];
}

/// Constructs a module from an input path, an output path hint and parameters.
pub type Constructor = fn(&Path, &Path, &Parameters) -> Result<Box<dyn DecodingModule>>;

/// Registry entry for a module.
#[derive(Clone, Copy, Serialize)]
pub struct ModuleDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub parameters: &'static [ParameterSpec],
    #[serde(skip)]
    pub constructor: Constructor,
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Parameters every built-in module accepts.
pub const COMMON_PARAMETERS: [ParameterSpec; 2] = [
    ParameterSpec {
        name: "max_loss_ratio",
        kind: ParamKind::Float,
        default: "0.25",
        description: "Flag the run as degraded when more than this fraction of data is lost",
    },
    ParameterSpec {
        name: "progress_interval",
        kind: ParamKind::Int,
        default: "10",
        description: "Seconds between progress log messages",
    },
];

/// Settings shared by the built-in modules, taken from resolved parameters.
#[derive(Debug, Clone, Copy)]
struct RunOptions {
    max_loss_ratio: f64,
    progress_interval: Duration,
}

impl RunOptions {
    fn from_params(params: &Parameters) -> Result<Self> {
        let max_loss_ratio = params.get_float("max_loss_ratio").unwrap_or(0.25);
        if !(0.0..=1.0).contains(&max_loss_ratio) {
            return Err(Error::Parameter {
                key: "max_loss_ratio".to_string(),
                reason: format!("{max_loss_ratio} is not between 0 and 1"),
            });
        }
        let secs = params.get_int("progress_interval").unwrap_or(10);
        let secs = u64::try_from(secs).map_err(|_| Error::Parameter {
            key: "progress_interval".to_string(),
            reason: format!("{secs} is negative"),
        })?;
        Ok(RunOptions {
            max_loss_ratio,
            progress_interval: Duration::from_secs(secs),
        })
    }
}

/// Open a module input, returning the file and its size.
fn open_input(path: &Path) -> Result<(File, u64)> {
    let err = |source| Error::Input {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(err)?;
    let size = file.metadata().map_err(err)?.len();
    Ok((file, size))
}

/// Maps module ids to their descriptors.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    modules: BTreeMap<&'static str, ModuleDescriptor>,
}

impl Registry {
    /// Registry with all built-in modules.
    pub fn builtin() -> Self {
        let mut registry = Registry::default();
        registry.register(MetopMhs::descriptor());
        registry.register(NoaaAvhrr::descriptor());
        registry
    }

    /// Add a module, returning any descriptor previously registered with the same id.
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Option<ModuleDescriptor> {
        self.modules.insert(descriptor.id, descriptor)
    }

    pub fn get(&self, id: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(id)
    }

    /// Descriptors ordered by id.
    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    /// Construct the module registered as `id`.
    ///
    /// # Errors
    /// [Error::UnknownModule] if there is no such module, or any error from the module's
    /// constructor, e.g., [Error::Parameter].
    pub fn create(
        &self,
        id: &str,
        input: &Path,
        output_hint: &Path,
        parameters: &Parameters,
    ) -> Result<Box<dyn DecodingModule>> {
        let descriptor = self
            .get(id)
            .ok_or_else(|| Error::UnknownModule(id.to_string()))?;
        (descriptor.constructor)(input, output_hint, parameters)
    }
}

/// Process wide registry of built-in modules.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::builtin)
}

/// Run independent modules concurrently, returning their results in the same order.
///
/// `threads` limits the size of the pool; `None` lets rayon decide.
///
/// # Errors
/// If the thread pool cannot be created. Errors from individual runs are returned in
/// their position of the result.
pub fn process_all(
    modules: &mut [Box<dyn DecodingModule>],
    threads: Option<usize>,
) -> Result<Vec<Result<RunReport>>> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(num) = threads {
        builder = builder.num_threads(num);
    }
    let pool = builder.build()?;
    Ok(pool.install(|| modules.par_iter_mut().map(|m| m.process()).collect()))
}
