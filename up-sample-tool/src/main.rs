use anyhow::{ensure, format_err, Context, Result};
use clap::Parser;
use log::info;
use prettytable::{cell, row, Table};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};
use tch::{Device, Kind, Tensor};
use texture_runtime::{shared_runtime, square_side, TchRuntime};
use up_sample_3d::{ExecutionMode, UpSampling3DConfig, UpSampling3DInit};

#[derive(Debug, Clone, Parser)]
enum Opts {
    /// Print the output shape of a layer configuration.
    Info {
        /// configuration file
        config_file: PathBuf,
        /// input shape, e.g. 4,8,8,3
        input_shape: InputShape,
    },
    /// Run a random input through the host and texture paths and compare.
    Check {
        /// configuration file
        config_file: PathBuf,
        /// input shape, e.g. 4,8,8,3
        input_shape: InputShape,
        /// random seed
        #[clap(long, default_value = "0")]
        seed: i64,
        /// device of the texture runtime, "cpu" or "cuda"
        #[clap(long, default_value = "cpu")]
        device: DeviceArg,
    },
}

#[derive(Debug, Clone)]
struct InputShape(Vec<i64>);

impl FromStr for InputShape {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let shape: Vec<i64> = text
            .split(',')
            .map(|dim| {
                let dim: i64 = dim.trim().parse()?;
                ensure!(dim > 0, "dimensions must be positive, but get {}", dim);
                Ok(dim)
            })
            .collect::<Result<_>>()?;
        ensure!(
            shape.len() == 4,
            "expect 4 dimensions, but get {}",
            shape.len()
        );
        Ok(Self(shape))
    }
}

#[derive(Debug, Clone, Copy)]
struct DeviceArg(Device);

impl FromStr for DeviceArg {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let device = match text {
            "cpu" => Device::Cpu,
            "cuda" => Device::cuda_if_available(),
            _ => return Err(format_err!("unknown device '{}'", text)),
        };
        Ok(Self(device))
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    match Opts::parse() {
        Opts::Info {
            config_file,
            input_shape,
        } => {
            info(config_file, input_shape)?;
        }
        Opts::Check {
            config_file,
            input_shape,
            seed,
            device,
        } => {
            check(config_file, input_shape, seed, device)?;
        }
    }

    Ok(())
}

fn load_init(config_file: &Path) -> Result<UpSampling3DInit> {
    let config = UpSampling3DConfig::open(config_file)
        .with_context(|| format!("failed to load '{}'", config_file.display()))?;
    Ok(config.into())
}

fn info(config_file: PathBuf, input_shape: InputShape) -> Result<()> {
    let init = load_init(&config_file)?;
    let InputShape(input_shape) = input_shape;
    let output_shape = init.output_shape(&input_shape)?;
    let input_side = square_side(input_shape.iter().product());
    let output_side = square_side(output_shape.iter().product());

    let mut table = Table::new();
    table.add_row(row!["size", format!("{:?}", init.size.as_ref())]);
    table.add_row(row!["data format", init.data_format.as_ref()]);
    table.add_row(row!["outbound", init.outbound]);
    table.add_row(row!["input shape", format!("{:?}", input_shape)]);
    table.add_row(row!["output shape", format!("{:?}", output_shape)]);
    table.add_row(row![
        "input texture",
        format!("{}x{}", input_side, input_side)
    ]);
    table.add_row(row![
        "output texture",
        format!("{}x{}", output_side, output_side)
    ]);
    table.printstd();

    Ok(())
}

fn check(
    config_file: PathBuf,
    input_shape: InputShape,
    seed: i64,
    device: DeviceArg,
) -> Result<()> {
    let init = UpSampling3DInit {
        // the comparison needs the texture path to read its output back
        outbound: 0,
        ..load_init(&config_file)?
    };
    let InputShape(input_shape) = input_shape;
    let DeviceArg(device) = device;

    tch::manual_seed(seed);
    let input = Tensor::rand(&input_shape, (Kind::Float, Device::Cpu));

    let mut cpu = init.build(ExecutionMode::Cpu)?;
    let runtime = shared_runtime(TchRuntime::new(device));
    let mut gpu = init.build(ExecutionMode::Gpu(runtime))?;
    info!("running on the host path");
    let cpu_output = cpu.f_forward_tensor(&input)?;
    info!("running on the texture path with device {:?}", device);
    let gpu_output = gpu.f_forward_tensor(&input)?;

    ensure!(
        cpu_output.size() == gpu_output.size(),
        "output shapes differ: {:?} on the host path, {:?} on the texture path",
        cpu_output.size(),
        gpu_output.size()
    );
    let num_mismatches = i64::from(cpu_output.ne_tensor(&gpu_output).sum(Kind::Int64));
    ensure!(
        num_mismatches == 0,
        "{} of {} elements differ between the host and texture paths",
        num_mismatches,
        cpu_output.numel()
    );

    println!(
        "ok: {} elements of shape {:?} are identical on both paths",
        cpu_output.numel(),
        cpu_output.size()
    );
    Ok(())
}
