use crate::{
    common::*,
    program::{Program, ProgramInterface},
    runtime::{ComputeRuntime, RuntimeError},
    texture::{Texture, TextureFormat, TextureInput},
};
use std::str::FromStr;

/// Kernels [TchRuntime] knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
enum Kernel {
    MapInput,
}

impl Kernel {
    /// Samplers the kernel reads, with their expected formats.
    fn samplers(&self) -> &'static [(&'static str, TextureFormat)] {
        match self {
            Self::MapInput => &[
                ("x", TextureFormat::Float),
                ("rowIndexMap", TextureFormat::Int),
                ("colIndexMap", TextureFormat::Int),
            ],
        }
    }
}

#[derive(Debug)]
struct CompiledProgram {
    kernel: Kernel,
    interface: ProgramInterface,
}

/// A [ComputeRuntime] storing textures as 2-D libtorch tensors on a device.
///
/// Textures and programs are kept in arenas indexed by their handle ids and
/// live as long as the runtime.
#[derive(Derivative, CopyGetters)]
#[derivative(Debug)]
pub struct TchRuntime {
    #[getset(get_copy = "pub")]
    device: Device,
    #[derivative(Debug = "ignore")]
    textures: Vec<(Texture, Tensor)>,
    programs: Vec<CompiledProgram>,
    #[derivative(Debug = "ignore")]
    program_ids: HashMap<String, Program>,
    /// Number of programs compiled so far.
    #[getset(get_copy = "pub")]
    num_compilations: usize,
    /// Number of successful program runs so far.
    #[getset(get_copy = "pub")]
    num_dispatches: usize,
}

impl TchRuntime {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            textures: vec![],
            programs: vec![],
            program_ids: HashMap::new(),
            num_compilations: 0,
            num_dispatches: 0,
        }
    }

    pub fn num_textures(&self) -> usize {
        self.textures.len()
    }

    fn texture_data(&self, texture: &Texture) -> Result<&Tensor, RuntimeError> {
        match self.textures.get(texture.id()) {
            Some((stored, data)) if stored == texture => Ok(data),
            _ => Err(RuntimeError::InvalidTexture(format!(
                "texture {} is not owned by this runtime",
                texture.id()
            ))),
        }
    }

    fn push_texture(&mut self, data: Tensor, format: TextureFormat) -> Texture {
        let (rows, cols) = (data.size()[0], data.size()[1]);
        let texture = Texture::new(self.textures.len(), rows, cols, format);
        self.textures.push((texture, data));
        texture
    }

    fn run_map_input(
        &self,
        x: &Tensor,
        row_map: &Tensor,
        col_map: &Tensor,
        output: &Texture,
    ) -> Result<Tensor, RuntimeError> {
        if row_map.size() != output.shape() || col_map.size() != output.shape() {
            return Err(RuntimeError::Dispatch(format!(
                "index maps of shape {:?} and {:?} do not match the output texture of shape {:?}",
                row_map.size(),
                col_map.size(),
                output.shape()
            )));
        }

        let (x_rows, x_cols) = (x.size()[0], x.size()[1]);
        let flat_index = row_map.to_kind(Kind::Int64) * x_cols + col_map.to_kind(Kind::Int64);

        if flat_index.numel() > 0 {
            let min = i64::from(flat_index.min());
            let max = i64::from(flat_index.max());
            if min < 0 || max >= x_rows * x_cols {
                return Err(RuntimeError::Dispatch(format!(
                    "index map addresses texel {} outside of the {}x{} input texture",
                    if min < 0 { min } else { max },
                    x_rows,
                    x_cols
                )));
            }
        }

        let gathered = x
            .reshape(&[-1])
            .index_select(0, &flat_index.reshape(&[-1]))
            .view([output.rows(), output.cols()]);
        Ok(gathered)
    }
}

impl ComputeRuntime for TchRuntime {
    fn device(&self) -> Device {
        self.device
    }

    fn compile_program(&mut self, source: &str) -> Result<Program> {
        if let Some(&program) = self.program_ids.get(source) {
            return Ok(program);
        }

        let interface = ProgramInterface::parse(source)
            .map_err(|err| RuntimeError::Compile(format!("{:#}", err)))?;
        let kernel = Kernel::from_str(&interface.kernel).map_err(|_| {
            RuntimeError::Compile(format!("unknown kernel '{}'", interface.kernel))
        })?;

        for &(name, format) in kernel.samplers() {
            match interface.sampler(name) {
                Some(sampler) if sampler.format == format => {}
                Some(sampler) => {
                    return Err(RuntimeError::Compile(format!(
                        "sampler '{}' of kernel '{}' must be {}, but is declared as {}",
                        name,
                        kernel.as_ref(),
                        format.as_ref(),
                        sampler.format.as_ref()
                    ))
                    .into())
                }
                None => {
                    return Err(RuntimeError::Compile(format!(
                        "kernel '{}' requires the sampler '{}'",
                        kernel.as_ref(),
                        name
                    ))
                    .into())
                }
            }
        }

        let program = Program::new(self.programs.len());
        self.programs.push(CompiledProgram { kernel, interface });
        self.program_ids.insert(source.to_string(), program);
        self.num_compilations += 1;
        debug!("compiled program {} with kernel '{}'", program.id(), kernel.as_ref());

        Ok(program)
    }

    fn create_texture(&mut self, data: &Tensor, format: TextureFormat) -> Result<Texture> {
        let (rows, cols) = data.size2().map_err(|_| {
            RuntimeError::InvalidTexture(format!(
                "texture data must be 2-dimensional, but get shape {:?}",
                data.size()
            ))
        })?;

        let kind = data.kind();
        match (format, kind) {
            (TextureFormat::Float, Kind::Float) | (TextureFormat::Int, Kind::Int) => {}
            (TextureFormat::Float, Kind::Double | Kind::Half | Kind::BFloat16) => {
                warn!("{:?} data is converted to a 32-bit float texture", kind);
            }
            (TextureFormat::Int, Kind::Int64 | Kind::Int16 | Kind::Int8 | Kind::Uint8) => {}
            _ => {
                return Err(RuntimeError::InvalidTexture(format!(
                    "{:?} data cannot be stored in a {} texture",
                    kind,
                    format.as_ref()
                ))
                .into())
            }
        }

        let data = data.to_device(self.device).to_kind(format.kind()).copy();
        let texture = self.push_texture(data, format);
        debug!(
            "created {} texture {} of size {}x{}",
            format.as_ref(),
            texture.id(),
            rows,
            cols
        );
        Ok(texture)
    }

    fn allocate_texture(
        &mut self,
        rows: i64,
        cols: i64,
        format: TextureFormat,
    ) -> Result<Texture> {
        if rows < 0 || cols < 0 {
            return Err(RuntimeError::InvalidTexture(format!(
                "invalid texture size {}x{}",
                rows, cols
            ))
            .into());
        }
        let data = Tensor::zeros(&[rows, cols], (format.kind(), self.device));
        Ok(self.push_texture(data, format))
    }

    fn read_texture(&self, texture: &Texture) -> Result<Tensor> {
        let data = self.texture_data(texture)?;
        Ok(data.to_device(Device::Cpu).copy())
    }

    fn run_program(
        &mut self,
        program: &Program,
        inputs: &[TextureInput<'_>],
        output: &Texture,
    ) -> Result<()> {
        let CompiledProgram { kernel, interface } =
            self.programs.get(program.id()).ok_or_else(|| {
                RuntimeError::Dispatch(format!("program {} is not compiled", program.id()))
            })?;
        let kernel = *kernel;

        // bind inputs to the declared samplers
        let mut bound: HashMap<&str, &Tensor> = HashMap::new();
        for TextureInput { name, texture } in inputs.iter().copied() {
            let sampler = interface.sampler(name).ok_or_else(|| {
                RuntimeError::Dispatch(format!("program has no sampler named '{}'", name))
            })?;
            if sampler.format != texture.format() {
                return Err(RuntimeError::Dispatch(format!(
                    "sampler '{}' expects a {} texture, but get {}",
                    name,
                    sampler.format.as_ref(),
                    texture.format().as_ref()
                ))
                .into());
            }
            let data = self.texture_data(texture)?;
            if bound.insert(name, data).is_some() {
                return Err(
                    RuntimeError::Dispatch(format!("sampler '{}' is bound twice", name)).into(),
                );
            }
        }
        if let Some(unbound) = interface
            .samplers
            .iter()
            .find(|sampler| !bound.contains_key(sampler.name.as_str()))
        {
            return Err(RuntimeError::Dispatch(format!(
                "sampler '{}' is not bound",
                unbound.name
            ))
            .into());
        }

        self.texture_data(output)?;
        if output.format() != TextureFormat::Float {
            return Err(RuntimeError::Dispatch(format!(
                "kernel '{}' writes float texels, but the output texture is {}",
                kernel.as_ref(),
                output.format().as_ref()
            ))
            .into());
        }

        let result = match kernel {
            Kernel::MapInput => self.run_map_input(
                bound["x"],
                bound["rowIndexMap"],
                bound["colIndexMap"],
                output,
            )?,
        };

        let (_, target) = &mut self.textures[output.id()];
        target.f_copy_(&result)?;
        self.num_dispatches += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::MAP_INPUT_PROGRAM;

    #[test]
    fn compile_once_per_source() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let first = runtime.compile_program(MAP_INPUT_PROGRAM).unwrap();
        let second = runtime.compile_program(MAP_INPUT_PROGRAM).unwrap();
        assert_eq!(first, second);
        assert_eq!(runtime.num_compilations(), 1);
    }

    #[test]
    fn compile_rejects_unknown_kernel() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let source = MAP_INPUT_PROGRAM.replace("kernel map_input", "kernel bilinear");
        let err = runtime.compile_program(&source).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Compile(_))
        ));
    }

    #[test]
    fn compile_rejects_wrong_sampler_format() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let source = MAP_INPUT_PROGRAM.replace("isampler2D rowIndexMap", "sampler2D rowIndexMap");
        assert!(runtime.compile_program(&source).is_err());
    }

    #[test]
    fn map_input_gathers_texels() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let program = runtime.compile_program(MAP_INPUT_PROGRAM).unwrap();

        let x = Tensor::of_slice(&[1.0f32, 2.0, 3.0, 4.0]).view([2, 2]);
        let rows = Tensor::of_slice(&[1i32, 1, 0, 0]).view([2, 2]);
        let cols = Tensor::of_slice(&[0i32, 1, 0, 1]).view([2, 2]);

        let x = runtime.create_texture(&x, TextureFormat::Float).unwrap();
        let rows = runtime.create_texture(&rows, TextureFormat::Int).unwrap();
        let cols = runtime.create_texture(&cols, TextureFormat::Int).unwrap();
        let output = runtime.allocate_texture(2, 2, TextureFormat::Float).unwrap();

        runtime
            .run_program(
                &program,
                &[
                    TextureInput::new("x", &x),
                    TextureInput::new("rowIndexMap", &rows),
                    TextureInput::new("colIndexMap", &cols),
                ],
                &output,
            )
            .unwrap();

        let values: Vec<f32> = runtime.read_texture(&output).unwrap().reshape(&[-1]).into();
        assert_eq!(values, vec![3.0, 4.0, 1.0, 2.0]);
        assert_eq!(runtime.num_dispatches(), 1);
    }

    #[test]
    fn run_rejects_unbound_sampler() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let program = runtime.compile_program(MAP_INPUT_PROGRAM).unwrap();
        let x = runtime
            .create_texture(&Tensor::ones(&[2, 2], tch::kind::FLOAT_CPU), TextureFormat::Float)
            .unwrap();
        let output = runtime.allocate_texture(2, 2, TextureFormat::Float).unwrap();

        let err = runtime
            .run_program(&program, &[TextureInput::new("x", &x)], &output)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::Dispatch(_))
        ));
        assert_eq!(runtime.num_dispatches(), 0);
    }

    #[test]
    fn run_rejects_out_of_range_index() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let program = runtime.compile_program(MAP_INPUT_PROGRAM).unwrap();
        let x = runtime
            .create_texture(&Tensor::ones(&[1, 1], tch::kind::FLOAT_CPU), TextureFormat::Float)
            .unwrap();
        let index = runtime
            .create_texture(&Tensor::of_slice(&[3i32]).view([1, 1]), TextureFormat::Int)
            .unwrap();
        let output = runtime.allocate_texture(1, 1, TextureFormat::Float).unwrap();

        let result = runtime.run_program(
            &program,
            &[
                TextureInput::new("x", &x),
                TextureInput::new("rowIndexMap", &index),
                TextureInput::new("colIndexMap", &index),
            ],
            &output,
        );
        assert!(result.is_err());
    }

    #[test]
    fn create_texture_rejects_non_2d_data() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let data = Tensor::ones(&[2, 2, 2], tch::kind::FLOAT_CPU);
        assert!(runtime.create_texture(&data, TextureFormat::Float).is_err());
    }

    #[test]
    fn foreign_texture_is_rejected() {
        let runtime = TchRuntime::new(Device::Cpu);
        let texture = Texture::new(0, 1, 1, TextureFormat::Float);
        assert!(runtime.read_texture(&texture).is_err());
    }
}
