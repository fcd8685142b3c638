//! Entry point for the CGame asset tool.
//! Loads an asset tree, resolves single assets, and compiles text meshes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use asset::{AssetRegistry, GpuBackend, HeadlessBackend, RegistryConfig, cobj};
use renderer::WgpuBackend;

#[derive(Debug, PartialEq)]
struct Options {
    asset_root: PathBuf,
    /// `None` runs headless.
    backends: Option<wgpu::Backends>,
    resolve: Option<String>,
    compile: Option<(PathBuf, PathBuf)>,
    retain_cpu: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            backends: None,
            resolve: None,
            compile: None,
            retain_cpu: false,
        }
    }
}

fn parse_backend(val: &str) -> Option<wgpu::Backends> {
    // Accept: auto|vulkan|dx12|metal|gl|none
    match val.to_ascii_lowercase().as_str() {
        "none" | "headless" => None,
        "auto" => Some(wgpu::Backends::all()),
        "vulkan" | "vk" => Some(wgpu::Backends::VULKAN),
        "dx12" | "d3d12" => Some(wgpu::Backends::DX12),
        "metal" | "mtl" => Some(wgpu::Backends::METAL),
        "gl" | "opengl" | "gles" => Some(wgpu::Backends::GL),
        other => {
            log::warn!("Unknown backend '{}', running headless.", other);
            None
        }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options> {
    let mut opts = Options::default();
    for arg in args {
        if let Some(val) = arg.strip_prefix("--asset-root=") {
            opts.asset_root = PathBuf::from(val);
        } else if let Some(val) = arg.strip_prefix("--gpu-backend=") {
            opts.backends = parse_backend(val);
        } else if let Some(val) = arg.strip_prefix("--resolve=") {
            opts.resolve = Some(val.to_owned());
        } else if let Some(val) = arg.strip_prefix("--compile=") {
            let (input, output) = val
                .split_once(':')
                .with_context(|| format!("--compile expects IN.obj:OUT.cobj, got '{val}'"))?;
            opts.compile = Some((PathBuf::from(input), PathBuf::from(output)));
        } else if arg == "--retain-cpu" {
            opts.retain_cpu = true;
        } else {
            log::warn!("Ignoring unknown argument '{}'", arg);
        }
    }
    Ok(opts)
}

/// Parse a text mesh and write it in the binary format.
fn compile(input: &Path, output: &Path) -> Result<()> {
    let geometry = asset::obj::load_obj_from_path(input)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    cobj::save_cobj(output, &geometry)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!(
        "Compiled {} -> {} ({} vertices, {} indices)",
        input.display(),
        output.display(),
        geometry.data.vertices.len(),
        geometry.data.indices.len()
    );
    Ok(())
}

fn resolve(config: &RegistryConfig, name: &str) -> Result<PathBuf> {
    let registry = AssetRegistry::new(config.clone(), HeadlessBackend);
    match registry.mesh_path(name)? {
        Some(path) => Ok(path),
        None => bail!("No asset named '{}' in {}", name, config.index_file().display()),
    }
}

fn load_all<B: GpuBackend>(config: RegistryConfig, backend: B) -> Result<()> {
    let mut registry = AssetRegistry::new(config, backend);
    let report = registry.load_from_index()?;
    registry.log_loaded();

    if !registry.validate_gpu_resources() {
        bail!("Some meshes have invalid GPU resources");
    }
    for failure in &report.failures {
        log::error!("{}: {}", failure.metadata_path.display(), failure.error);
    }
    if !report.is_success() {
        bail!(
            "{} of {} assets failed to load",
            report.failures.len(),
            report.failures.len() + report.loaded.len()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = parse_args(std::env::args().skip(1))?;
    log::info!(
        "Starting CGame assets. Root: {}, backend: {:?}",
        opts.asset_root.display(),
        opts.backends
    );

    if let Some((input, output)) = &opts.compile {
        return compile(input, output);
    }

    let mut config = RegistryConfig::new(&opts.asset_root);
    config.retain_cpu_geometry = opts.retain_cpu;

    if let Some(name) = &opts.resolve {
        let path = resolve(&config, name)?;
        println!("{}", path.display());
        return Ok(());
    }

    match opts.backends {
        Some(backends) => {
            let backend = pollster::block_on(WgpuBackend::new(backends))
                .context("Failed to initialize GPU backend")?;
            load_all(config, backend)?;
        }
        None => load_all(config, HeadlessBackend)?,
    }

    log::info!("Graceful shutdown. Bye!");
    Ok(())
}
